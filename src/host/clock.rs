//! Bus clock divisor search and clock reprogramming.

use crate::constants::*;
use crate::host::{CLOCK_STABLE_TIMEOUT, SdhciError, SdhciHost, SdhciResult};
use crate::io::HostIo;
use log::debug;

/// Finds the smallest legal divisor count `d` with `input_hz / d <= target_hz`.
///
/// Spec v3 controllers search every count in the 10-bit extended range
/// 1..=2046; older controllers only the power-of-two counts 1..=256. The
/// returned value is the raw count; the programmed divisor field is
/// `count >> 1` (0 means divide-by-1 in hardware).
pub(crate) fn calc_divisor(hc_version: u16, input_hz: u32, target_hz: u32) -> SdhciResult<u32> {
    if hc_version == SDHCI_HC_SPEC_V3 {
        let mut div_cnt = 1;
        while div_cnt <= SDHCI_CC_EXT_MAX_DIV_CNT {
            if input_hz / div_cnt <= target_hz {
                return Ok(div_cnt);
            }
            div_cnt += 1;
        }
    } else {
        let mut div_cnt = 1;
        while div_cnt <= SDHCI_CC_MAX_DIV_CNT {
            if input_hz / div_cnt <= target_hz {
                return Ok(div_cnt);
            }
            div_cnt <<= 1;
        }
    }

    Err(SdhciError::DivisorNotFound)
}

impl<IO: HostIo> SdhciHost<IO> {
    /// Reprograms the bus clock to at most `target_hz`: disable, program
    /// the divisor (split low/extended fields on v3 hosts), enable the
    /// internal clock, wait for it to stabilize, then gate the SD clock
    /// back on.
    pub fn set_clock_frequency(&self, target_hz: u32) -> SdhciResult {
        self.ensure_ready()?;

        let mut clock_reg = self.io.read_reg16(SDHCI_CLOCK_CTRL);
        clock_reg &= !(SDHCI_CC_SD_CLK_EN | SDHCI_CC_INT_CLK_EN);
        self.io.write_reg16(SDHCI_CLOCK_CTRL, clock_reg);

        let div_cnt = calc_divisor(self.hc_version, self.config.input_clock_hz, target_hz)?;
        let divisor = (div_cnt >> 1) as u16;

        let mut clock_reg = self.io.read_reg16(SDHCI_CLOCK_CTRL);
        if self.hc_version == SDHCI_HC_SPEC_V3 {
            clock_reg &= !(SDHCI_CC_SDCLK_FREQ_SEL_MASK | SDHCI_CC_SDCLK_FREQ_SEL_EXT_MASK);
            let ext = ((divisor >> 8) << SDHCI_CC_EXT_DIV_SHIFT) & SDHCI_CC_SDCLK_FREQ_SEL_EXT_MASK;
            let low = (divisor << SDHCI_CC_DIV_SHIFT) & SDHCI_CC_SDCLK_FREQ_SEL_MASK;
            clock_reg |= low | ext | SDHCI_CC_INT_CLK_EN;
        } else {
            clock_reg &= !SDHCI_CC_SDCLK_FREQ_SEL_MASK;
            clock_reg |= ((divisor << SDHCI_CC_DIV_SHIFT) & SDHCI_CC_SDCLK_FREQ_SEL_MASK)
                | SDHCI_CC_INT_CLK_EN;
        }
        self.io.write_reg16(SDHCI_CLOCK_CTRL, clock_reg);

        debug!(
            "sdhci: clock target {} Hz, div count {}, reg {:#06x}",
            target_hz, div_cnt, clock_reg
        );

        let mut timeout = CLOCK_STABLE_TIMEOUT;
        while self.io.read_reg16(SDHCI_CLOCK_CTRL) & SDHCI_CC_INT_CLK_STABLE == 0 {
            if timeout == 0 {
                debug!("sdhci: internal clock never stabilised");
                return Err(SdhciError::Timeout);
            }
            timeout -= 1;
            self.io.delay_us(1000);
        }

        let clock_reg = self.io.read_reg16(SDHCI_CLOCK_CTRL);
        self.io
            .write_reg16(SDHCI_CLOCK_CTRL, clock_reg | SDHCI_CC_SD_CLK_EN);

        Ok(())
    }
}
