//! Command framing and the issue/poll/clear engine.

use crate::constants::*;
use crate::host::{CMD_COMPLETE_TIMEOUT, CardType, SdhciError, SdhciHost, SdhciResult};
use crate::io::HostIo;
use log::trace;

/// Frames the command-register value for a command: the command index in
/// bits 13:8 plus response-type, CRC/index-check and data-present flags.
///
/// This is a fixed mapping, not derived from the SD spec at runtime. CMD6
/// and CMD8 frame differently per card family: SD CMD6 is a data-bearing
/// function switch and MMC CMD6 an R1b register write; SD CMD8 is the
/// voltage-check handshake and MMC CMD8 the data-bearing SEND_EXT_CSD.
pub(crate) fn frame_command(card_type: CardType, cmd: u32) -> u32 {
    let flags = match cmd {
        CMD0 | CMD4 | CMD58 => RESP_NONE,
        CMD1 => RESP_R3,
        CMD2 | CMD9 => RESP_R2,
        CMD3 => RESP_R6,
        CMD5 => RESP_R1B,
        CMD6 => {
            if card_type == CardType::Sd {
                RESP_R1 | SDHCI_CMD_DATA_PRESENT
            } else {
                RESP_R1B
            }
        }
        CMD8 => {
            if card_type == CardType::Sd {
                RESP_R1
            } else {
                RESP_R1 | SDHCI_CMD_DATA_PRESENT
            }
        }
        ACMD6 | CMD7 | CMD10 | CMD11 | CMD12 | ACMD13 | CMD16 | ACMD42 | CMD52 | CMD55 => RESP_R1,
        CMD17 | CMD18 | CMD19 | CMD21 => RESP_R1 | SDHCI_CMD_DATA_PRESENT,
        CMD23 | ACMD23 | CMD24 | CMD25 | ACMD51 => RESP_R1 | SDHCI_CMD_DATA_PRESENT,
        ACMD41 => RESP_R3,
        _ => RESP_NONE,
    };

    cmd | flags
}

impl<IO: HostIo> SdhciHost<IO> {
    /// Issues one command and polls for completion.
    ///
    /// Fails `Busy` without touching the argument or command registers if
    /// the command line is inhibited, and likewise for a data-bearing
    /// command while the data line is inhibited. The response, if any, is
    /// left in the response registers for the caller. `blk_cnt` goes into
    /// the 16-bit block count register; the block transfer entry points
    /// cap it well below that.
    pub fn issue_command(&self, cmd: u32, arg: u32, blk_cnt: u32) -> SdhciResult {
        self.ensure_ready()?;

        // No overlapping command transfers.
        let present_state = self.io.read_reg32(SDHCI_PRESENT_STATE);
        if present_state & SDHCI_PSR_INHIBIT_CMD != 0 {
            return Err(SdhciError::Busy);
        }

        self.io.write_reg16(SDHCI_BLK_CNT, blk_cnt as u16);
        self.io
            .write_reg8(SDHCI_TIMEOUT_CTRL, SDHCI_TIMEOUT_DEFAULT);
        self.io.write_reg32(SDHCI_ARGUMENT, arg);

        // Clear stale completion/error status before triggering.
        self.io
            .write_reg16(SDHCI_NORMAL_INT_STAT, SDHCI_NORM_INTR_ALL);
        self.io
            .write_reg16(SDHCI_ERROR_INT_STAT, SDHCI_ERROR_INTR_ALL);

        let command = frame_command(self.card_type, cmd) & SDHCI_CMD_REG_MASK;

        if command & SDHCI_CMD_DATA_PRESENT != 0
            && self.io.read_reg32(SDHCI_PRESENT_STATE) & SDHCI_PSR_INHIBIT_DAT != 0
        {
            return Err(SdhciError::Busy);
        }

        trace!(
            "sdhci: cmd{} arg={:#010x} blk_cnt={} reg={:#06x}",
            (cmd >> 8) & 0x3F,
            arg,
            blk_cnt,
            command
        );
        self.io.write_reg16(SDHCI_COMMAND, command as u16);

        let mut timeout = CMD_COMPLETE_TIMEOUT;
        loop {
            let status = self.io.read_reg16(SDHCI_NORMAL_INT_STAT);

            if status & SDHCI_INTR_ERR != 0 {
                self.io
                    .write_reg16(SDHCI_ERROR_INT_STAT, SDHCI_ERROR_INTR_ALL);
                return Err(SdhciError::CommandError);
            }

            if status & SDHCI_INTR_CC != 0 {
                self.io.write_reg16(SDHCI_NORMAL_INT_STAT, SDHCI_INTR_CC);
                return Ok(());
            }

            if timeout == 0 {
                return Err(SdhciError::Timeout);
            }
            timeout -= 1;
            self.io.delay_us(10);
        }
    }

    /// 32-bit response word `n` (0..=3).
    pub fn response(&self, n: u32) -> u32 {
        self.io.read_reg32(SDHCI_RESP0 + n * 4)
    }

    /// Polls for the transfer-complete bit of an in-flight data phase,
    /// clearing it on success. An error interrupt aborts with its status
    /// bits cleared.
    pub(crate) fn wait_transfer_complete(&self) -> SdhciResult {
        let mut timeout = crate::host::XFER_COMPLETE_TIMEOUT;
        loop {
            let status = self.io.read_reg16(SDHCI_NORMAL_INT_STAT);

            if status & SDHCI_INTR_ERR != 0 {
                self.io
                    .write_reg16(SDHCI_ERROR_INT_STAT, SDHCI_ERROR_INTR_ALL);
                return Err(SdhciError::CommandError);
            }

            if status & SDHCI_INTR_TC != 0 {
                self.io.write_reg16(SDHCI_NORMAL_INT_STAT, SDHCI_INTR_TC);
                return Ok(());
            }

            if timeout == 0 {
                return Err(SdhciError::Timeout);
            }
            timeout -= 1;
            self.io.delay_us(10);
        }
    }
}
