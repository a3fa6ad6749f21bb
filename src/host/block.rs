//! Polled multi-block read/write, card select and block-size control.

use crate::constants::*;
use crate::host::{SdhciError, SdhciHost, SdhciResult};
use crate::io::HostIo;
use log::trace;

impl<IO: HostIo> SdhciHost<IO> {
    /// Reads `blk_cnt` 512-byte blocks into `buf` via CMD18 with
    /// auto-CMD12. `arg` is the card address (block number on
    /// high-capacity cards, byte address otherwise). `buf` must satisfy
    /// the platform's DMA alignment constraint and hold `blk_cnt * 512`
    /// bytes. At most 4096 blocks (2 MiB, the descriptor table capacity)
    /// per call; zero blocks is refused.
    pub fn read_blocks(&mut self, arg: u32, blk_cnt: u32, buf: &mut [u8]) -> SdhciResult {
        self.ensure_ready()?;
        trace!("sdhci: read {} blocks at arg {:#010x}", blk_cnt, arg);

        if self.config.card_detect
            && self.io.read_reg32(SDHCI_PRESENT_STATE) & SDHCI_PSR_CARD_INSERTED == 0
        {
            return Err(SdhciError::NoCard);
        }

        // Metadata reads leave other block sizes behind.
        if self.io.read_reg16(SDHCI_BLK_SIZE) != SDHCI_BLK_SIZE_512 {
            self.set_block_size(SDHCI_BLK_SIZE_512)?;
        }

        self.setup_adma2_descriptors(blk_cnt, buf.as_mut_ptr() as usize)?;

        self.io.write_reg16(
            SDHCI_XFER_MODE,
            SDHCI_TM_AUTO_CMD12_EN
                | SDHCI_TM_BLK_CNT_EN
                | SDHCI_TM_DAT_DIR_READ
                | SDHCI_TM_DMA_EN
                | SDHCI_TM_MULTI_BLOCK,
        );

        // The device writes this range; drop any stale cached lines so
        // the CPU reads what the card delivered.
        self.io.invalidate_range(
            buf.as_mut_ptr() as usize,
            (blk_cnt * SDHCI_BLK_SIZE_512 as u32) as usize,
        );

        self.issue_command(CMD18, arg, blk_cnt)?;
        self.wait_transfer_complete()?;

        let _ = self.response(0);
        Ok(())
    }

    /// Writes `blk_cnt` 512-byte blocks from `buf` via CMD25 with
    /// auto-CMD12. Same addressing, alignment and block-count rules as
    /// [`Self::read_blocks`].
    pub fn write_blocks(&mut self, arg: u32, blk_cnt: u32, buf: &[u8]) -> SdhciResult {
        self.ensure_ready()?;
        trace!("sdhci: write {} blocks at arg {:#010x}", blk_cnt, arg);

        if self.config.card_detect
            && self.io.read_reg32(SDHCI_PRESENT_STATE) & SDHCI_PSR_CARD_INSERTED == 0
        {
            return Err(SdhciError::NoCard);
        }

        if self.io.read_reg16(SDHCI_BLK_SIZE) != SDHCI_BLK_SIZE_512 {
            self.set_block_size(SDHCI_BLK_SIZE_512)?;
        }

        self.setup_adma2_descriptors(blk_cnt, buf.as_ptr() as usize)?;

        // Push the payload out of cache before the engine fetches it.
        self.io.flush_range(
            buf.as_ptr() as usize,
            (blk_cnt * SDHCI_BLK_SIZE_512 as u32) as usize,
        );

        self.io.write_reg16(
            SDHCI_XFER_MODE,
            SDHCI_TM_AUTO_CMD12_EN
                | SDHCI_TM_BLK_CNT_EN
                | SDHCI_TM_MULTI_BLOCK
                | SDHCI_TM_DMA_EN,
        );

        self.issue_command(CMD25, arg, blk_cnt)?;
        self.wait_transfer_complete()
    }

    /// Selects the identified card (CMD7 with its relative address).
    pub fn select_card(&self) -> SdhciResult {
        self.ensure_ready()?;
        self.issue_command(CMD7, self.rel_card_addr, 0)
    }

    /// Sets the card block length (CMD16) and mirrors it into the
    /// block-size register. Refused while any command, data or read/write
    /// activity is pending.
    pub fn set_block_size(&self, blk_size: u16) -> SdhciResult {
        self.ensure_ready()?;

        let present_state = self.io.read_reg32(SDHCI_PRESENT_STATE);
        if present_state
            & (SDHCI_PSR_INHIBIT_CMD
                | SDHCI_PSR_INHIBIT_DAT
                | SDHCI_PSR_WR_ACTIVE
                | SDHCI_PSR_RD_ACTIVE)
            != 0
        {
            return Err(SdhciError::Busy);
        }

        self.issue_command(CMD16, blk_size as u32, 0)?;
        let _ = self.response(0);

        self.io
            .write_reg16(SDHCI_BLK_SIZE, blk_size & SDHCI_BLK_SIZE_MASK);

        Ok(())
    }
}
