//! ADMA2 scatter/gather descriptor table construction.

use crate::constants::*;
use crate::host::{SdhciError, SdhciHost, SdhciResult};
use crate::io::HostIo;
use bitflags::bitflags;
use core::mem::size_of;

bitflags! {
    /// ADMA2 descriptor attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescAttr: u16 {
        const VALID = 0x0001;
        const END = 0x0002;
        const INT = 0x0004;
        const TRAN = 0x0020;
    }
}

/// One 8-byte ADMA2 descriptor: attribute, length, 32-bit address.
/// A length field of 0 encodes 65536 by hardware convention.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Adma2Descriptor {
    pub attribute: u16,
    pub length: u16,
    pub address: u32,
}

impl Adma2Descriptor {
    pub const EMPTY: Self = Adma2Descriptor {
        attribute: 0,
        length: 0,
        address: 0,
    };

    /// Length in bytes with the 0-means-65536 encoding undone.
    pub fn decoded_length(&self) -> u32 {
        if self.length == 0 {
            ADMA2_DESC_MAX_LENGTH
        } else {
            self.length as u32
        }
    }

    pub fn attr(&self) -> DescAttr {
        DescAttr::from_bits_truncate(self.attribute)
    }
}

impl<IO: HostIo> SdhciHost<IO> {
    /// Builds the descriptor chain covering `blk_cnt` blocks at `buf_addr`
    /// (block size taken from the block-size register), points the ADMA
    /// system-address register at the table and flushes the whole
    /// fixed-capacity table region from cache.
    ///
    /// Every entry except the last covers exactly 65536 bytes (length
    /// encoded as 0); only the last carries the end-of-list attribute. The
    /// flush covers all 32 slots, used or not, so the engine never sees a
    /// half-written line; it must complete before the command register
    /// write that starts the transfer, which the callers guarantee by
    /// calling this first.
    ///
    /// Zero-length requests and requests past the fixed table capacity
    /// (32 entries, 2 MiB at 512-byte blocks) are refused: a length
    /// field of 0 would otherwise be decoded as a 64 KiB line.
    pub(crate) fn setup_adma2_descriptors(&mut self, blk_cnt: u32, buf_addr: usize) -> SdhciResult {
        let blk_size = (self.io.read_reg16(SDHCI_BLK_SIZE) & SDHCI_BLK_SIZE_MASK) as u32;
        let total = match blk_cnt.checked_mul(blk_size) {
            Some(total) if total > 0 => total,
            _ => return Err(SdhciError::InvalidBlockCount),
        };

        let desc_lines = if total < ADMA2_DESC_MAX_LENGTH {
            1
        } else {
            total.div_ceil(ADMA2_DESC_MAX_LENGTH)
        };
        if desc_lines as usize > ADMA2_DESC_CAPACITY {
            return Err(SdhciError::InvalidBlockCount);
        }

        let mut covered = 0u32;
        for num in 0..desc_lines - 1 {
            self.desc_table[num as usize] = Adma2Descriptor {
                attribute: (DescAttr::VALID | DescAttr::TRAN).bits(),
                // Writes 0, which the engine reads as 65536.
                length: ADMA2_DESC_MAX_LENGTH as u16,
                address: (buf_addr as u32).wrapping_add(covered),
            };
            covered += ADMA2_DESC_MAX_LENGTH;
        }

        self.desc_table[(desc_lines - 1) as usize] = Adma2Descriptor {
            attribute: (DescAttr::VALID | DescAttr::TRAN | DescAttr::END).bits(),
            length: (total - covered) as u16,
            address: (buf_addr as u32).wrapping_add(covered),
        };

        let table_addr = self.desc_table.as_ptr() as usize;
        self.io.write_reg32(SDHCI_ADMA_SYS_ADDR, table_addr as u32);
        self.io.flush_range(
            table_addr,
            size_of::<Adma2Descriptor>() * ADMA2_DESC_CAPACITY,
        );

        Ok(())
    }
}
