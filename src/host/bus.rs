//! Bus width, speed and UHS mode negotiation plus metadata reads.

use crate::constants::*;
use crate::host::{BusWidth, CardType, SdhciHost, SdhciResult, UhsMode};
use crate::io::{DmaBuffer, HostIo};
use log::{debug, info};

impl<IO: HostIo> SdhciHost<IO> {
    /// Switches card and host to the widest supported bus: ACMD6 for SD
    /// (4-bit), CMD6 EXT_CSD write for MMC (4-bit) and v3-hosted eMMC
    /// (8-bit), then mirrors the width into host control 1 after the
    /// card-side switch has settled.
    pub fn switch_bus_width(&mut self) -> SdhciResult {
        self.ensure_ready()?;

        if self.card_type == CardType::Sd {
            self.issue_command(CMD55, self.rel_card_addr, 0)?;

            self.bus_width = BusWidth::FourBit;
            self.issue_command(ACMD6, self.bus_width as u32, 0)?;
        } else {
            self.bus_width =
                if self.hc_version == SDHCI_HC_SPEC_V3 && self.card_type == CardType::EMmc {
                    BusWidth::EightBit
                } else {
                    BusWidth::FourBit
                };

            let arg = if self.bus_width == BusWidth::EightBit {
                MMC_SWITCH_8BIT_BUS_ARG
            } else {
                MMC_SWITCH_4BIT_BUS_ARG
            };
            self.issue_command(CMD6, arg, 0)?;
        }

        self.io.delay_us(SWITCH_SETTLE_DELAY_US);

        let mut ctrl1 = self.io.read_reg8(SDHCI_HOST_CTRL1);
        if self.bus_width == BusWidth::EightBit {
            ctrl1 |= SDHCI_HC_8BIT_WIDTH;
        } else {
            ctrl1 |= SDHCI_HC_4BIT_WIDTH;
        }
        self.io.write_reg8(SDHCI_HOST_CTRL1, ctrl1);

        debug!("sdhci: bus width now {}-bit", self.bus_width as u32);
        let _ = self.response(0);

        Ok(())
    }

    /// Reads the 8-byte SCR register (ACMD51 DMA read); byte 1 carries
    /// the bus-width support bits. `scr` must satisfy the platform's DMA
    /// alignment constraint.
    pub fn query_supported_bus_width(&mut self, scr: &mut [u8; 8]) -> SdhciResult {
        self.ensure_ready()?;
        scr.fill(0);

        self.issue_command(CMD55, self.rel_card_addr, 0)?;

        self.io
            .write_reg16(SDHCI_BLK_SIZE, SD_SCR_BLKSIZE & SDHCI_BLK_SIZE_MASK);
        self.setup_adma2_descriptors(SD_SCR_BLKCNT, scr.as_mut_ptr() as usize)?;

        self.io
            .write_reg16(SDHCI_XFER_MODE, SDHCI_TM_DAT_DIR_READ | SDHCI_TM_DMA_EN);
        self.io
            .invalidate_range(scr.as_mut_ptr() as usize, scr.len());

        self.issue_command(ACMD51, 0, SD_SCR_BLKCNT)?;
        self.wait_transfer_complete()?;

        let _ = self.response(0);
        Ok(())
    }

    /// Queries the SD function-switch status (CMD6 mode 0) into a 64-byte
    /// buffer; byte 13 carries high-speed support. `status` must satisfy
    /// the platform's DMA alignment constraint.
    pub fn query_supported_bus_speed(&mut self, status: &mut [u8; 64]) -> SdhciResult {
        self.ensure_ready()?;
        status.fill(0);

        self.io.write_reg16(
            SDHCI_BLK_SIZE,
            SD_SWITCH_CMD_BLKSIZE & SDHCI_BLK_SIZE_MASK,
        );
        self.setup_adma2_descriptors(SD_SWITCH_CMD_BLKCNT, status.as_mut_ptr() as usize)?;

        self.io
            .write_reg16(SDHCI_XFER_MODE, SDHCI_TM_DAT_DIR_READ | SDHCI_TM_DMA_EN);
        self.io
            .invalidate_range(status.as_mut_ptr() as usize, status.len());

        self.issue_command(CMD6, SD_SWITCH_HS_QUERY_ARG, SD_SWITCH_CMD_BLKCNT)?;
        self.wait_transfer_complete()?;

        let _ = self.response(0);
        Ok(())
    }

    /// Switches the card to its high-speed function and raises the bus
    /// clock accordingly: 50 MHz SD, 52 MHz MMC, 200 MHz HS200 for eMMC
    /// (followed by a tuning exchange). Width negotiation must already
    /// have happened.
    pub fn switch_bus_speed(&mut self) -> SdhciResult {
        self.ensure_ready()?;

        match self.card_type {
            CardType::Sd => {
                let mut buf = DmaBuffer::<64>::new();
                let buf_addr = buf.addr_mut();

                self.io.write_reg16(
                    SDHCI_BLK_SIZE,
                    SD_SWITCH_CMD_BLKSIZE & SDHCI_BLK_SIZE_MASK,
                );
                self.setup_adma2_descriptors(SD_SWITCH_CMD_BLKCNT, buf_addr)?;
                self.io.flush_range(buf_addr, buf.0.len());

                self.io
                    .write_reg16(SDHCI_XFER_MODE, SDHCI_TM_DAT_DIR_READ | SDHCI_TM_DMA_EN);

                self.issue_command(CMD6, SD_SWITCH_HS_SET_ARG, SD_SWITCH_CMD_BLKCNT)?;
                self.wait_transfer_complete()?;

                self.bus_speed = SD_CLK_50_MHZ;
                self.set_clock_frequency(self.bus_speed)?;
            }
            CardType::Mmc => {
                self.issue_command(CMD6, MMC_SWITCH_HIGH_SPEED_ARG, 0)?;

                self.bus_speed = MMC_CLK_52_MHZ;
                self.set_clock_frequency(self.bus_speed)?;
            }
            CardType::EMmc => {
                self.issue_command(CMD6, MMC_SWITCH_HS200_ARG, 0)?;

                self.bus_speed = MMC_CLK_HS200;
                self.set_clock_frequency(self.bus_speed)?;
                self.execute_tuning()?;
            }
        }

        self.io.delay_us(SWITCH_SETTLE_DELAY_US);

        let ctrl1 = self.io.read_reg8(SDHCI_HOST_CTRL1);
        self.io
            .write_reg8(SDHCI_HOST_CTRL1, ctrl1 | SDHCI_HC_HIGH_SPEED);

        info!("sdhci: bus speed now {} Hz", self.bus_speed);
        let _ = self.response(0);

        Ok(())
    }

    /// Puts an SD card into the given UHS-I mode: function switch, mode
    /// field in host control 2, mode-specific maximum clock, and a tuning
    /// exchange for the modes that need resampling (SDR104, DDR50).
    /// Requires a prior 1.8 V switch and 4-bit bus.
    pub fn init_uhs_mode(&mut self, mode: UhsMode) -> SdhciResult {
        self.ensure_ready()?;

        let mut buf = DmaBuffer::<64>::new();
        let buf_addr = buf.addr_mut();

        self.io.write_reg16(
            SDHCI_BLK_SIZE,
            SD_SWITCH_CMD_BLKSIZE & SDHCI_BLK_SIZE_MASK,
        );
        self.setup_adma2_descriptors(SD_SWITCH_CMD_BLKCNT, buf_addr)?;
        self.io.flush_range(buf_addr, buf.0.len());

        self.io
            .write_reg16(SDHCI_XFER_MODE, SDHCI_TM_DAT_DIR_READ | SDHCI_TM_DMA_EN);

        let arg = match mode {
            UhsMode::Sdr12 => {
                self.bus_speed = SD_SDR12_MAX_CLK;
                SD_SWITCH_SDR12_ARG
            }
            UhsMode::Sdr25 => {
                self.bus_speed = SD_SDR25_MAX_CLK;
                SD_SWITCH_SDR25_ARG
            }
            UhsMode::Sdr50 => {
                self.bus_speed = SD_SDR50_MAX_CLK;
                SD_SWITCH_SDR50_ARG
            }
            UhsMode::Sdr104 => {
                self.bus_speed = SD_SDR104_MAX_CLK;
                SD_SWITCH_SDR104_ARG
            }
            UhsMode::Ddr50 => {
                self.bus_speed = SD_DDR50_MAX_CLK;
                SD_SWITCH_DDR50_ARG
            }
        };

        self.issue_command(CMD6, arg, SD_SWITCH_CMD_BLKCNT)?;
        self.wait_transfer_complete()?;

        let ctrl2 = self.io.read_reg16(SDHCI_HOST_CTRL2);
        self.io.write_reg16(
            SDHCI_HOST_CTRL2,
            (ctrl2 & !SDHCI_HC2_UHS_MODE_MASK) | mode as u16,
        );

        self.set_clock_frequency(self.bus_speed)?;

        if matches!(mode, UhsMode::Sdr104 | UhsMode::Ddr50) {
            self.execute_tuning()?;
        }

        info!("sdhci: UHS mode {:?} at {} Hz", mode, self.bus_speed);
        Ok(())
    }

    /// Single tuning-pattern exchange: one CMD19 (SD) / CMD21 (MMC) read
    /// of the fixed pattern, doubled block size on an 8-bit bus. Command
    /// completion is taken as success; there is no iterative
    /// sampling-window search.
    pub(crate) fn execute_tuning(&mut self) -> SdhciResult {
        let mut buf = DmaBuffer::<128>::new();

        let mut blk_size = TUNING_CMD_BLKSIZE;
        if self.bus_width == BusWidth::EightBit {
            blk_size *= 2;
        }
        let blk_size = blk_size & SDHCI_BLK_SIZE_MASK;
        self.io.write_reg16(SDHCI_BLK_SIZE, blk_size);

        buf.0[..blk_size as usize].fill(0);
        let buf_addr = buf.addr_mut();

        self.setup_adma2_descriptors(TUNING_CMD_BLKCNT, buf_addr)?;

        self.io
            .write_reg16(SDHCI_XFER_MODE, SDHCI_TM_DAT_DIR_READ | SDHCI_TM_DMA_EN);
        self.io.invalidate_range(buf_addr, blk_size as usize);

        let cmd = if self.card_type == CardType::Sd {
            CMD19
        } else {
            CMD21
        };
        self.issue_command(cmd, 0, TUNING_CMD_BLKCNT)?;
        self.wait_transfer_complete()?;

        debug!("sdhci: tuning exchange complete");
        Ok(())
    }

    /// Reads the eMMC/MMC 512-byte extended CSD (CMD8 DMA read) into a
    /// caller-provided buffer, which must satisfy the platform's DMA
    /// alignment constraint.
    pub fn read_extended_csd(&mut self, ext_csd: &mut [u8; 512]) -> SdhciResult {
        self.ensure_ready()?;
        ext_csd.fill(0);

        self.io
            .write_reg16(SDHCI_BLK_SIZE, MMC_EXT_CSD_BLKSIZE & SDHCI_BLK_SIZE_MASK);
        self.setup_adma2_descriptors(MMC_EXT_CSD_BLKCNT, ext_csd.as_mut_ptr() as usize)?;

        self.io
            .invalidate_range(ext_csd.as_mut_ptr() as usize, ext_csd.len());
        self.io
            .write_reg16(SDHCI_XFER_MODE, SDHCI_TM_DAT_DIR_READ | SDHCI_TM_DMA_EN);

        self.issue_command(CMD8, 0, MMC_EXT_CSD_BLKCNT)?;
        self.wait_transfer_complete()?;

        let _ = self.response(0);
        Ok(())
    }

    /// Disconnects the DAT3 pull-up (CMD55 + ACMD42) before 4-bit use.
    pub(crate) fn pullup_disconnect(&self) -> SdhciResult {
        self.issue_command(CMD55, self.rel_card_addr, 0)?;
        self.issue_command(ACMD42, 0, 0)
    }
}
