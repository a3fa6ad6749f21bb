//! Card-type probe and the SD / MMC identification state machines.

use crate::constants::*;
use crate::host::{
    BusWidth, CardType, CardVersion, LINE_LEVEL_TIMEOUT, OCR_READY_RETRIES, RCA_RETRIES,
    SdhciError, SdhciHost, SdhciResult, UhsMode,
};
use crate::io::{DmaBuffer, HostIo};
use log::{debug, info};

impl<IO: HostIo> SdhciHost<IO> {
    /// Full identification-mode bring-up: classify the card, run the
    /// matching identification sequence, select it and negotiate bus
    /// width, speed (and voltage/tuning where applicable), then restore
    /// the default 512-byte block length.
    pub fn identify_and_initialize_card(&mut self) -> SdhciResult {
        self.ensure_ready()?;

        // Session defaults.
        self.bus_width = BusWidth::OneBit;
        self.card_type = CardType::Sd;
        self.switch_1v8 = false;
        self.bus_speed = CLK_400_KHZ;

        // An embedded slot on a v3 host can only hold a soldered-down
        // eMMC device; the CMD0/CMD1 probe is pointless there.
        if self.hc_version == SDHCI_HC_SPEC_V3
            && self.host_caps & SDHCI_CAPS_SLOT_TYPE_MASK == SDHCI_CAPS_EMBEDDED_SLOT
        {
            self.card_type = CardType::EMmc;
        } else {
            self.identify_card()?;
        }

        match self.card_type {
            CardType::Sd => {
                self.sd_card_initialize()?;
                self.bus_speed = SD_CLK_25_MHZ;
            }
            CardType::Mmc | CardType::EMmc => {
                self.mmc_card_initialize()?;
                self.bus_speed = MMC_CLK_26_MHZ;
            }
        }
        self.set_clock_frequency(self.bus_speed)?;

        self.select_card()?;

        // Width/speed/tuning failures surface uniformly, whatever the
        // underlying command outcome was.
        match self.card_type {
            CardType::Sd => self.sd_post_identification(),
            CardType::Mmc => self.mmc_post_identification(),
            CardType::EMmc => self.emmc_post_identification(),
        }
        .map_err(|_| SdhciError::NegotiationFailed)?;

        self.set_block_size(SDHCI_BLK_SIZE_512)?;

        info!(
            "sdhci: card up, type {:?}, {}-bit bus at {} Hz",
            self.card_type, self.bus_width as u32, self.bus_speed
        );
        Ok(())
    }

    /// Probes the card family with CMD0 + CMD1: only an MMC-family device
    /// answers CMD1, so a command error there means SD. Leaves the
    /// controller clean again via a command-line-only reset.
    pub(crate) fn identify_card(&mut self) -> SdhciResult {
        // Cards want 74 clock cycles after power-up before the first command.
        self.io.delay_us(INIT_74_CLK_DELAY_US);

        self.issue_command(CMD0, 0, 0)?;

        // Host high-capacity support + high voltage window. The probe
        // interprets failure, so the error is not propagated.
        match self.issue_command(CMD1, SD_ACMD41_HCS | MMC_CMD1_HIGH_VOL, 0) {
            Ok(()) => self.card_type = CardType::Mmc,
            Err(_) => self.card_type = CardType::Sd,
        }
        debug!("sdhci: probe classified card as {:?}", self.card_type);

        self.io
            .write_reg16(SDHCI_NORMAL_INT_STAT, SDHCI_NORM_INTR_ALL);
        self.io
            .write_reg16(SDHCI_ERROR_INT_STAT, SDHCI_ERROR_INTR_ALL);

        // The failed probe leaves the command line wedged on SD cards.
        self.reset(SDHCI_SWRST_CMD_LINE)
    }

    /// SD identification sequence: CMD0, CMD8 voltage check, ACMD41 loop
    /// until the card leaves power-up, optional 1.8 V switch, CMD2 card
    /// ID, CMD3 until a nonzero relative address, CMD9 CSD.
    pub(crate) fn sd_card_initialize(&mut self) -> SdhciResult {
        if self.config.card_detect
            && self.io.read_reg32(SDHCI_PRESENT_STATE) & SDHCI_PSR_CARD_INSERTED == 0
        {
            return Err(SdhciError::NoCard);
        }

        self.issue_command(CMD0, 0, 0)?;

        // Voltage check with echo pattern; a v1.0 card cannot echo it back.
        self.issue_command(CMD8, SD_CMD8_VOL_PATTERN, 0)?;
        self.card_version = if self.response(0) != SD_CMD8_VOL_PATTERN {
            CardVersion::V1_0
        } else {
            CardVersion::V2_0
        };

        let mut arg = SD_ACMD41_HCS | SD_ACMD41_3V3 | (0x1FF << 15);
        if self.hc_version == SDHCI_HC_SPEC_V3 {
            arg |= SD_OCR_S18;
        }

        let mut ocr = 0;
        let mut retries = OCR_READY_RETRIES;
        while ocr & SD_OCR_READY == 0 {
            if retries == 0 {
                return Err(SdhciError::Timeout);
            }
            retries -= 1;

            self.issue_command(CMD55, 0, 0)?;
            self.issue_command(ACMD41, arg, 0)?;
            ocr = self.response(0);
        }

        if ocr & SD_ACMD41_HCS != 0 {
            self.high_capacity = true;
        }

        if ocr & SD_OCR_S18 != 0 {
            self.switch_1v8 = true;
            self.switch_voltage()
                .map_err(|_| SdhciError::NegotiationFailed)?;
        }

        self.issue_command(CMD2, 0, 0)?;
        for n in 0..4 {
            self.card_id[n as usize] = self.response(n);
        }

        // The card hands out the address; zero means "ask again".
        let mut retries = RCA_RETRIES;
        loop {
            if retries == 0 {
                return Err(SdhciError::Timeout);
            }
            retries -= 1;

            self.issue_command(CMD3, 0, 0)?;
            self.rel_card_addr = self.response(0) & 0xFFFF_0000;
            if self.rel_card_addr != 0 {
                break;
            }
        }
        debug!("sdhci: sd rca {:#010x}", self.rel_card_addr);

        // CSD is read out but not interpreted.
        self.issue_command(CMD9, self.rel_card_addr, 0)?;
        let _csd = [
            self.response(0),
            self.response(1),
            self.response(2),
            self.response(3),
        ];

        Ok(())
    }

    /// 3.3 V → 1.8 V signaling switch: CMD11, both lines sag low, clock
    /// stopped, 1.8 V enabled in host control 2, clock restarted at
    /// 400 kHz, both lines back high.
    pub(crate) fn switch_voltage(&mut self) -> SdhciResult {
        info!("sdhci: switching signaling to 1.8V");

        self.issue_command(CMD11, 0, 0)?;

        let lines = SDHCI_PSR_CMD_LVL | SDHCI_PSR_DAT30_LVL;
        let mut timeout = LINE_LEVEL_TIMEOUT;
        while self.io.read_reg32(SDHCI_PRESENT_STATE) & lines != 0 {
            if timeout == 0 {
                return Err(SdhciError::Timeout);
            }
            timeout -= 1;
            self.io.delay_us(10);
        }

        let clock_reg = self.io.read_reg16(SDHCI_CLOCK_CTRL);
        self.io.write_reg16(
            SDHCI_CLOCK_CTRL,
            clock_reg & !(SDHCI_CC_SD_CLK_EN | SDHCI_CC_INT_CLK_EN),
        );

        // Card requires the clock held off for at least 5 ms.
        self.io.delay_us(VOLTAGE_SWITCH_DELAY_US);

        let ctrl2 = self.io.read_reg16(SDHCI_HOST_CTRL2);
        self.io
            .write_reg16(SDHCI_HOST_CTRL2, ctrl2 | SDHCI_HC2_1V8_EN);

        self.set_clock_frequency(CLK_400_KHZ)?;

        let mut timeout = LINE_LEVEL_TIMEOUT;
        while self.io.read_reg32(SDHCI_PRESENT_STATE) & lines != lines {
            if timeout == 0 {
                return Err(SdhciError::Timeout);
            }
            timeout -= 1;
            self.io.delay_us(10);
        }

        Ok(())
    }

    /// MMC/eMMC identification: CMD0, CMD1 loop until ready, CMD2 card
    /// ID, host-assigned fixed relative address via CMD3, CMD9 CSD. No
    /// voltage switch; the supply was fixed at controller power-on.
    pub(crate) fn mmc_card_initialize(&mut self) -> SdhciResult {
        if self.config.card_detect
            && self.io.read_reg32(SDHCI_PRESENT_STATE) & SDHCI_PSR_CARD_INSERTED == 0
        {
            return Err(SdhciError::NoCard);
        }

        self.issue_command(CMD0, 0, 0)?;

        let mut ocr = 0;
        let mut retries = OCR_READY_RETRIES;
        while ocr & SD_OCR_READY == 0 {
            if retries == 0 {
                return Err(SdhciError::Timeout);
            }
            retries -= 1;

            self.issue_command(CMD1, SD_ACMD41_HCS | MMC_CMD1_HIGH_VOL, 0)?;
            ocr = self.response(0);
        }

        if ocr & SD_ACMD41_HCS != 0 {
            self.high_capacity = true;
        }

        self.issue_command(CMD2, 0, 0)?;
        for n in 0..4 {
            self.card_id[n as usize] = self.response(n);
        }

        // MMC relative addresses are assigned by the host, not the card.
        self.rel_card_addr = MMC_FIXED_RCA;
        self.issue_command(CMD3, self.rel_card_addr, 0)?;

        self.issue_command(CMD9, self.rel_card_addr, 0)?;
        let _csd = [
            self.response(0),
            self.response(1),
            self.response(2),
            self.response(3),
        ];

        Ok(())
    }

    /// SD bus negotiation after selection: pull-up disconnect, SCR-driven
    /// width switch, then either UHS bring-up (1.8 V cards on a 4-bit
    /// bus) or the legacy high-speed query/switch.
    fn sd_post_identification(&mut self) -> SdhciResult {
        // DAT3 pull-up is only in the way once the line carries data.
        self.pullup_disconnect()?;

        let mut scr = DmaBuffer::<8>::new();
        self.query_supported_bus_width(&mut scr.0)?;

        if scr.0[1] & SD_SCR_4BIT_SUPPORT != 0 {
            self.switch_bus_width()?;
        }

        if self.switch_1v8 && self.bus_width == BusWidth::FourBit {
            self.init_uhs_mode(UhsMode::Sdr104)
        } else {
            let mut status = DmaBuffer::<64>::new();
            self.query_supported_bus_speed(&mut status.0)?;

            if status.0[SD_SWITCH_STATUS_HS_BYTE] & SD_SWITCH_STATUS_HS_SUPPORT != 0 {
                self.switch_bus_speed()?;
            }
            Ok(())
        }
    }

    /// MMC negotiation: 4-bit width, EXT_CSD verification, high speed if
    /// the device type advertises it.
    fn mmc_post_identification(&mut self) -> SdhciResult {
        self.switch_bus_width()?;

        let mut ext_csd = DmaBuffer::<512>::new();
        self.read_extended_csd(&mut ext_csd.0)?;
        if ext_csd.0[EXT_CSD_BUS_WIDTH_BYTE] != EXT_CSD_BUS_WIDTH_4BIT {
            return Err(SdhciError::NegotiationFailed);
        }

        if ext_csd.0[EXT_CSD_DEVICE_TYPE_BYTE] & EXT_CSD_DEVICE_TYPE_HIGH_SPEED != 0 {
            self.switch_bus_speed()?;

            self.read_extended_csd(&mut ext_csd.0)?;
            if ext_csd.0[EXT_CSD_HS_TIMING_BYTE] != EXT_CSD_HS_TIMING_HIGH {
                return Err(SdhciError::NegotiationFailed);
            }
        }

        Ok(())
    }

    /// eMMC negotiation: 8-bit width, EXT_CSD verification, HS200 with
    /// tuning if the device type advertises it.
    fn emmc_post_identification(&mut self) -> SdhciResult {
        self.switch_bus_width()?;

        let mut ext_csd = DmaBuffer::<512>::new();
        self.read_extended_csd(&mut ext_csd.0)?;
        if ext_csd.0[EXT_CSD_BUS_WIDTH_BYTE] != EXT_CSD_BUS_WIDTH_8BIT {
            return Err(SdhciError::NegotiationFailed);
        }

        if ext_csd.0[EXT_CSD_DEVICE_TYPE_BYTE]
            & (EXT_CSD_DEVICE_TYPE_HS200_SDR_1V8 | EXT_CSD_DEVICE_TYPE_HS200_SDR_1V2)
            != 0
        {
            self.switch_bus_speed()?;

            self.read_extended_csd(&mut ext_csd.0)?;
            if ext_csd.0[EXT_CSD_HS_TIMING_BYTE] != EXT_CSD_HS_TIMING_HS200 {
                return Err(SdhciError::NegotiationFailed);
            }
        }

        Ok(())
    }
}
