//! Polled SD/SDIO/MMC/eMMC host controller driver.
//!
//! Drives a memory-mapped SD host controller register block: controller
//! bring-up, card detection and identification (SD v1/v2, MMC, eMMC),
//! bus width/speed/voltage negotiation including UHS and HS200, ADMA2
//! scatter/gather descriptor construction and polled multi-block I/O.
//!
//! The platform supplies register access, cache maintenance and delays
//! through the [`HostIo`] trait; everything above that is portable.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod constants;
pub mod host;
pub mod io;

pub use host::{
    Adma2Descriptor, BusWidth, CardType, CardVersion, DescAttr, SdhciConfig, SdhciError,
    SdhciHost, SdhciResult, UhsMode,
};
pub use io::HostIo;
