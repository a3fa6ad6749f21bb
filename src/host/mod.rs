mod adma;
mod block;
mod bus;
mod card;
mod clock;
mod cmd;

pub use adma::{Adma2Descriptor, DescAttr};

use crate::constants::*;
use crate::io::HostIo;
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdhciError {
    /// Instance not initialized or configuration invalid.
    NotReady,
    /// Command or data line inhibited by an in-flight operation.
    Busy,
    /// Controller reported an error interrupt during a command or transfer.
    CommandError,
    /// Card-detect says no card in the slot.
    NoCard,
    /// Card is neither SD nor MMC/eMMC, or lacks a required feature.
    UnsupportedCard,
    /// Transfer length is zero or exceeds the descriptor table capacity.
    InvalidBlockCount,
    /// A width/speed/voltage/tuning negotiation step failed.
    NegotiationFailed,
    /// No legal clock divisor reaches the requested frequency.
    DivisorNotFound,
    /// A bounded hardware wait expired.
    Timeout,
}

pub type SdhciResult<T = ()> = Result<T, SdhciError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    Sd,
    Mmc,
    EMmc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardVersion {
    V1_0,
    V2_0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    OneBit = 1,
    FourBit = 4,
    EightBit = 8,
}

/// UHS-I bus speed modes; the discriminant is the host control 2 mode field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UhsMode {
    Sdr12 = 0,
    Sdr25 = 1,
    Sdr50 = 2,
    Sdr104 = 3,
    Ddr50 = 4,
}

/// Static controller wiring, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct SdhciConfig {
    pub input_clock_hz: u32,
    pub card_detect: bool,
    pub write_protect: bool,
}

/// One SD host controller instance plus the session state of the card
/// behind it. Exactly one command or transfer may be in flight at a time;
/// callers serialize access (no internal locking).
pub struct SdhciHost<IO: HostIo> {
    pub(crate) io: IO,
    pub(crate) config: SdhciConfig,
    pub(crate) hc_version: u16,
    pub(crate) host_caps: u32,
    pub(crate) is_ready: bool,

    pub(crate) card_type: CardType,
    pub(crate) card_version: CardVersion,
    pub(crate) high_capacity: bool,
    pub(crate) switch_1v8: bool,
    pub(crate) rel_card_addr: u32,
    pub(crate) card_id: [u32; 4],
    pub(crate) bus_width: BusWidth,
    pub(crate) bus_speed: u32,

    pub(crate) desc_table: [Adma2Descriptor; ADMA2_DESC_CAPACITY],
}

// Bounded-wait iteration counts (1 ms per iteration unless noted).
pub(crate) const RESET_TIMEOUT: u32 = 100;
pub(crate) const CLOCK_STABLE_TIMEOUT: u32 = 150;
// 10 us per iteration.
pub(crate) const CMD_COMPLETE_TIMEOUT: u32 = 100_000;
pub(crate) const XFER_COMPLETE_TIMEOUT: u32 = 500_000;
pub(crate) const LINE_LEVEL_TIMEOUT: u32 = 100_000;
// Protocol retry caps.
pub(crate) const OCR_READY_RETRIES: u32 = 10_000;
pub(crate) const RCA_RETRIES: u32 = 1_000;

impl<IO: HostIo> SdhciHost<IO> {
    pub fn new(io: IO, config: SdhciConfig) -> Self {
        SdhciHost {
            io,
            config,
            hc_version: 0,
            host_caps: 0,
            is_ready: false,
            card_type: CardType::Sd,
            card_version: CardVersion::V2_0,
            high_capacity: false,
            switch_1v8: false,
            rel_card_addr: 0,
            card_id: [0; 4],
            bus_width: BusWidth::OneBit,
            bus_speed: CLK_400_KHZ,
            desc_table: [Adma2Descriptor::EMPTY; ADMA2_DESC_CAPACITY],
        }
    }

    /// Brings the host controller to a known state: full software reset,
    /// bus power at the highest supported voltage, 400 kHz clock, ADMA2,
    /// interrupt status enabled with signal generation left off (polling
    /// model), default transfer mode and 512-byte block size.
    pub fn initialize(&mut self) -> SdhciResult {
        info!("sdhci: controller init");

        // Power the bus down before resetting so the card sees a clean
        // power-up edge afterwards.
        self.io.write_reg8(SDHCI_POWER_CTRL, 0);
        self.io.delay_us(POWER_OFF_DELAY_US);

        self.reset(SDHCI_SWRST_ALL)?;

        self.hc_version = self.io.read_reg16(SDHCI_HOST_CNTRL_VER) & SDHCI_HC_SPEC_VER_MASK;
        self.host_caps = self.io.read_reg32(SDHCI_CAPABILITIES);
        debug!(
            "sdhci: spec version {:#x}, caps {:#010x}",
            self.hc_version, self.host_caps
        );

        let power_level = if self.host_caps & SDHCI_CAP_VOLT_3V3 != 0 {
            SDHCI_PC_BUS_VSEL_3V3
        } else if self.host_caps & SDHCI_CAP_VOLT_3V0 != 0 {
            SDHCI_PC_BUS_VSEL_3V0
        } else if self.host_caps & SDHCI_CAP_VOLT_1V8 != 0 {
            SDHCI_PC_BUS_VSEL_1V8
        } else {
            info!("sdhci: no supported bus voltage in caps");
            return Err(SdhciError::UnsupportedCard);
        };
        self.io
            .write_reg8(SDHCI_POWER_CTRL, power_level | SDHCI_PC_BUS_PWR);

        self.is_ready = true;
        self.set_clock_frequency(CLK_400_KHZ)?;

        self.io.write_reg8(SDHCI_HOST_CTRL1, SDHCI_HC_DMA_ADMA2_32);

        // Status bits for everything except the card interrupt; signal
        // generation stays off, completion is observed by polling.
        self.io.write_reg16(
            SDHCI_NORMAL_INT_STAT_EN,
            SDHCI_NORM_INTR_ALL & !SDHCI_INTR_CARD,
        );
        self.io
            .write_reg16(SDHCI_ERROR_INT_STAT_EN, SDHCI_ERROR_INTR_ALL);
        self.io.write_reg16(SDHCI_NORMAL_INT_SIG_EN, 0);
        self.io.write_reg16(SDHCI_ERROR_INT_SIG_EN, 0);

        self.io.write_reg16(
            SDHCI_XFER_MODE,
            SDHCI_TM_DMA_EN | SDHCI_TM_BLK_CNT_EN | SDHCI_TM_DAT_DIR_READ,
        );
        self.io.write_reg16(SDHCI_BLK_SIZE, SDHCI_BLK_SIZE_512);

        info!("sdhci: controller init done");
        Ok(())
    }

    /// Asserts the given software-reset bits and waits for completion.
    pub(crate) fn reset(&self, mask: u8) -> SdhciResult {
        self.io.write_reg8(SDHCI_SOFTWARE_RESET, mask);

        let mut timeout = RESET_TIMEOUT;
        while self.io.read_reg8(SDHCI_SOFTWARE_RESET) & mask != 0 {
            if timeout == 0 {
                return Err(SdhciError::Timeout);
            }
            timeout -= 1;
            self.io.delay_us(1000);
        }

        Ok(())
    }

    pub(crate) fn ensure_ready(&self) -> SdhciResult {
        if self.is_ready {
            Ok(())
        } else {
            Err(SdhciError::NotReady)
        }
    }

    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    pub fn card_version(&self) -> CardVersion {
        self.card_version
    }

    pub fn is_high_capacity(&self) -> bool {
        self.high_capacity
    }

    /// Relative card address, pre-shifted to the upper 16 bits.
    pub fn relative_card_address(&self) -> u32 {
        self.rel_card_addr
    }

    pub fn card_id(&self) -> &[u32; 4] {
        &self.card_id
    }

    pub fn bus_width(&self) -> BusWidth {
        self.bus_width
    }

    pub fn bus_speed(&self) -> u32 {
        self.bus_speed
    }

    pub fn host_version(&self) -> u16 {
        self.hc_version
    }

    /// The ADMA2 descriptor table as last built. Diagnostic view; rebuilt
    /// before every DMA-bearing command.
    pub fn descriptors(&self) -> &[Adma2Descriptor; ADMA2_DESC_CAPACITY] {
        &self.desc_table
    }
}
