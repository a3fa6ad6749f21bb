//! Register-level host controller and card simulator for the
//! integration tests.
//!
//! `MockIo` models the controller register file with the write semantics
//! the driver depends on: the command register triggers a scripted card
//! model and latches responses and completion status, the interrupt
//! status registers are write-one-to-clear, software reset self-clears
//! and the internal clock is stable as soon as it is enabled. Data
//! transfers land in the memory range of the most recent cache
//! maintenance call, which in every driver data path is the transfer
//! buffer itself (the descriptor-table flush always comes first).

// Each test binary uses a different slice of the helpers.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use sdhci_host::HostIo;
use sdhci_host::constants::*;

pub const STORAGE_BLOCKS: usize = 4096;

/// Simulated card RCA handed out by CMD3 on SD cards (upper 16 bits).
pub const SD_CARD_RCA: u32 = 0x5678_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    SdV1,
    SdV2,
    Mmc,
    EMmc,
}

impl CardKind {
    fn is_sd(self) -> bool {
        matches!(self, CardKind::SdV1 | CardKind::SdV2)
    }
}

/// Scripted card behavior. Counters are consumed as the driver polls.
pub struct CardModel {
    pub kind: CardKind,
    /// CMD1/ACMD41 polls answered without the ready bit before the card
    /// reports power-up done.
    pub ocr_busy_polls: u32,
    /// CMD3 responses carrying a zero RCA before a real one (SD only).
    pub rca_zero_attempts: u32,
    pub s18_support: bool,
    pub high_capacity: bool,
    /// ACMD6 answers with a command error (width switch refused).
    pub fail_acmd6: bool,
    pub scr: [u8; 8],
    pub switch_status: [u8; 64],
    pub ext_csd: [u8; 512],
}

impl CardModel {
    pub fn sd_v2() -> Self {
        let mut scr = [0u8; 8];
        scr[1] = SD_SCR_4BIT_SUPPORT;
        let mut switch_status = [0u8; 64];
        switch_status[SD_SWITCH_STATUS_HS_BYTE] = SD_SWITCH_STATUS_HS_SUPPORT;
        CardModel {
            kind: CardKind::SdV2,
            ocr_busy_polls: 0,
            rca_zero_attempts: 0,
            s18_support: false,
            high_capacity: true,
            fail_acmd6: false,
            scr,
            switch_status,
            ext_csd: [0u8; 512],
        }
    }

    pub fn sd_v1() -> Self {
        CardModel {
            kind: CardKind::SdV1,
            high_capacity: false,
            scr: [0u8; 8],
            switch_status: [0u8; 64],
            ..CardModel::sd_v2()
        }
    }

    pub fn mmc() -> Self {
        let mut ext_csd = [0u8; 512];
        ext_csd[EXT_CSD_DEVICE_TYPE_BYTE] = EXT_CSD_DEVICE_TYPE_HIGH_SPEED;
        CardModel {
            kind: CardKind::Mmc,
            ocr_busy_polls: 0,
            rca_zero_attempts: 0,
            s18_support: false,
            high_capacity: true,
            fail_acmd6: false,
            scr: [0u8; 8],
            switch_status: [0u8; 64],
            ext_csd,
        }
    }

    pub fn emmc() -> Self {
        let mut card = CardModel::mmc();
        card.kind = CardKind::EMmc;
        card.ext_csd[EXT_CSD_DEVICE_TYPE_BYTE] =
            EXT_CSD_DEVICE_TYPE_HIGH_SPEED | EXT_CSD_DEVICE_TYPE_HS200_SDR_1V8;
        card
    }
}

/// One issued command as seen on the wire: index, app-command flag,
/// argument register content at issue time.
#[derive(Debug, Clone, Copy)]
pub struct IssuedCmd {
    pub index: u8,
    pub acmd: bool,
    pub arg: u32,
}

pub struct MockIo {
    regs: RefCell<[u8; 0x100]>,
    present_state: Cell<u32>,
    card: RefCell<CardModel>,
    app_cmd: Cell<bool>,
    voltage_switch_pending: Cell<bool>,
    last_cache_op: Cell<(usize, usize)>,
    cmd_log: RefCell<Vec<IssuedCmd>>,
    write_log: RefCell<Vec<u32>>,
    storage: RefCell<Vec<u8>>,
}

const LINE_LEVELS: u32 = SDHCI_PSR_CMD_LVL | SDHCI_PSR_DAT30_LVL;

impl MockIo {
    /// Spec v3 host with a 3.3 V-capable (plus 1.8 V) slot.
    pub fn new(card: CardModel) -> Self {
        let caps = if card.kind == CardKind::EMmc {
            SDHCI_CAP_VOLT_3V3 | SDHCI_CAP_VOLT_1V8 | SDHCI_CAPS_EMBEDDED_SLOT
        } else {
            SDHCI_CAP_VOLT_3V3 | SDHCI_CAP_VOLT_1V8
        };
        Self::with_host(SDHCI_HC_SPEC_V3, caps, card)
    }

    pub fn with_host(version: u16, caps: u32, card: CardModel) -> Self {
        let io = MockIo {
            regs: RefCell::new([0u8; 0x100]),
            present_state: Cell::new(SDHCI_PSR_CARD_INSERTED | LINE_LEVELS),
            card: RefCell::new(card),
            app_cmd: Cell::new(false),
            voltage_switch_pending: Cell::new(false),
            last_cache_op: Cell::new((0, 0)),
            cmd_log: RefCell::new(Vec::new()),
            write_log: RefCell::new(Vec::new()),
            storage: RefCell::new(vec![0u8; STORAGE_BLOCKS * 512]),
        };
        io.store16(SDHCI_HOST_CNTRL_VER, version);
        io.store32(SDHCI_CAPABILITIES, caps);
        io
    }

    pub fn storage(&self) -> std::cell::Ref<'_, Vec<u8>> {
        self.storage.borrow()
    }

    pub fn ext_csd_byte(&self, index: usize) -> u8 {
        self.card.borrow().ext_csd[index]
    }

    pub fn reg16(&self, offset: u32) -> u16 {
        self.load16(offset)
    }

    pub fn set_present_state_bits(&self, bits: u32) {
        self.present_state.set(self.present_state.get() | bits);
    }

    pub fn clear_present_state_bits(&self, bits: u32) {
        self.present_state.set(self.present_state.get() & !bits);
    }

    pub fn commands(&self) -> Vec<IssuedCmd> {
        self.cmd_log.borrow().clone()
    }

    pub fn count_cmd(&self, index: u8, acmd: bool) -> usize {
        self.cmd_log
            .borrow()
            .iter()
            .filter(|c| c.index == index && c.acmd == acmd)
            .count()
    }

    pub fn clear_write_log(&self) {
        self.write_log.borrow_mut().clear();
    }

    pub fn written_offsets(&self) -> Vec<u32> {
        self.write_log.borrow().clone()
    }

    fn store16(&self, offset: u32, value: u16) {
        let mut regs = self.regs.borrow_mut();
        regs[offset as usize..offset as usize + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn store32(&self, offset: u32, value: u32) {
        let mut regs = self.regs.borrow_mut();
        regs[offset as usize..offset as usize + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn load16(&self, offset: u32) -> u16 {
        let regs = self.regs.borrow();
        u16::from_le_bytes([regs[offset as usize], regs[offset as usize + 1]])
    }

    fn load32(&self, offset: u32) -> u32 {
        let regs = self.regs.borrow();
        let o = offset as usize;
        u32::from_le_bytes([regs[o], regs[o + 1], regs[o + 2], regs[o + 3]])
    }

    fn raise_status(&self, normal: u16, error: u16) {
        self.store16(SDHCI_NORMAL_INT_STAT, self.load16(SDHCI_NORMAL_INT_STAT) | normal);
        if error != 0 {
            self.store16(SDHCI_ERROR_INT_STAT, self.load16(SDHCI_ERROR_INT_STAT) | error);
        }
    }

    fn set_responses(&self, resp: [u32; 4]) {
        self.store32(SDHCI_RESP0, resp[0]);
        self.store32(SDHCI_RESP1, resp[1]);
        self.store32(SDHCI_RESP2, resp[2]);
        self.store32(SDHCI_RESP3, resp[3]);
    }

    fn command_failed(&self) {
        // Command timeout in the error status plus the aggregate error
        // bit in the normal status.
        self.raise_status(SDHCI_INTR_ERR, 0x0001);
    }

    /// Copies `payload` into the DMA target (the most recent cache
    /// maintenance range) and reports transfer completion.
    fn dma_to_host(&self, payload: &[u8]) {
        let (addr, len) = self.last_cache_op.get();
        let n = payload.len().min(len);
        if n == 0 {
            return;
        }
        unsafe {
            core::ptr::copy_nonoverlapping(payload.as_ptr(), addr as *mut u8, n);
        }
    }

    fn ocr_response(&self, arg: u32) -> u32 {
        let mut card = self.card.borrow_mut();
        if card.ocr_busy_polls > 0 {
            card.ocr_busy_polls -= 1;
            return 0;
        }
        let mut ocr = SD_OCR_READY;
        if card.high_capacity && arg & SD_ACMD41_HCS != 0 {
            ocr |= SD_ACMD41_HCS;
        }
        if card.s18_support && arg & SD_OCR_S18 != 0 {
            ocr |= SD_OCR_S18;
        }
        ocr
    }

    fn handle_command(&self, cmd_reg: u16) {
        let index = ((cmd_reg >> 8) & 0x3F) as u8;
        let arg = self.load32(SDHCI_ARGUMENT);
        let acmd = self.app_cmd.replace(false) && index != 55;
        self.cmd_log.borrow_mut().push(IssuedCmd { index, acmd, arg });

        let kind = self.card.borrow().kind;
        let mut resp = [0u32; 4];
        let mut transfer = false;

        match (index, acmd) {
            (0, false) => {}
            (1, false) => {
                if kind.is_sd() {
                    // SD cards do not answer CMD1.
                    self.command_failed();
                    return;
                }
                resp[0] = self.ocr_response(arg);
            }
            (2, false) => resp = [0x1122_3344, 0x5566_7788, 0x99AA_BBCC, 0xDDEE_FF00],
            (3, false) => {
                if kind.is_sd() {
                    let mut card = self.card.borrow_mut();
                    if card.rca_zero_attempts > 0 {
                        card.rca_zero_attempts -= 1;
                        resp[0] = 0;
                    } else {
                        resp[0] = SD_CARD_RCA | 0x0500;
                    }
                } else {
                    resp[0] = 0x0500;
                }
            }
            (6, false) => {
                if kind.is_sd() {
                    let status = self.card.borrow().switch_status;
                    self.dma_to_host(&status);
                    transfer = true;
                } else {
                    // EXT_CSD byte write: index in bits 23:16, value in 15:8.
                    let byte = ((arg >> 16) & 0xFF) as usize;
                    let value = ((arg >> 8) & 0xFF) as u8;
                    self.card.borrow_mut().ext_csd[byte] = value;
                    resp[0] = 0x0900;
                }
            }
            (6, true) => {
                if self.card.borrow().fail_acmd6 {
                    self.command_failed();
                    return;
                }
                resp[0] = 0x0920;
            }
            (7, false) => resp[0] = 0x0700,
            (8, false) => match kind {
                CardKind::SdV2 => resp[0] = arg,
                CardKind::SdV1 => resp[0] = 0,
                CardKind::Mmc | CardKind::EMmc => {
                    let ext_csd = self.card.borrow().ext_csd;
                    self.dma_to_host(&ext_csd);
                    transfer = true;
                }
            },
            (9, false) => resp = [0x8C26_012A, 0x0FF9_7F80, 0x5B59_0000, 0x0040_0E00],
            (11, false) => {
                // Both lines sag low until the host re-enables the clock
                // with 1.8 V signaling selected.
                self.clear_present_state_bits(LINE_LEVELS);
                self.voltage_switch_pending.set(true);
                resp[0] = 0x0700;
            }
            (16, false) => resp[0] = 0x0900,
            (18, false) | (25, false) => {
                let (addr, len) = self.last_cache_op.get();
                let base = arg as usize * 512;
                let mut storage = self.storage.borrow_mut();
                assert!(len > 0 && base + len <= storage.len());
                unsafe {
                    if index == 18 {
                        core::ptr::copy_nonoverlapping(
                            storage[base..base + len].as_ptr(),
                            addr as *mut u8,
                            len,
                        );
                    } else {
                        core::ptr::copy_nonoverlapping(
                            addr as *const u8,
                            storage[base..base + len].as_mut_ptr(),
                            len,
                        );
                    }
                }
                resp[0] = 0x0900;
                transfer = true;
            }
            (19, false) | (21, false) => {
                let pattern = [0xA5u8; 128];
                self.dma_to_host(&pattern);
                transfer = true;
            }
            (41, true) => resp[0] = self.ocr_response(arg),
            (42, true) => resp[0] = 0x0920,
            (51, true) => {
                let scr = self.card.borrow().scr;
                self.dma_to_host(&scr);
                transfer = true;
            }
            (55, false) => {
                self.app_cmd.set(true);
                resp[0] = 0x0120;
            }
            _ => {
                self.command_failed();
                return;
            }
        }

        self.set_responses(resp);
        let normal = if transfer {
            SDHCI_INTR_CC | SDHCI_INTR_TC
        } else {
            SDHCI_INTR_CC
        };
        self.raise_status(normal, 0);
    }

    fn handle_clock_write(&self, value: u16) {
        let mut stored = value;
        if stored & SDHCI_CC_INT_CLK_EN != 0 {
            stored |= SDHCI_CC_INT_CLK_STABLE;
        } else {
            stored &= !SDHCI_CC_INT_CLK_STABLE;
        }
        self.store16(SDHCI_CLOCK_CTRL, stored);

        // Lines come back high once the clock restarts after CMD11.
        if stored & SDHCI_CC_SD_CLK_EN != 0 && self.voltage_switch_pending.replace(false) {
            self.set_present_state_bits(LINE_LEVELS);
        }
    }
}

impl HostIo for MockIo {
    fn read_reg8(&self, offset: u32) -> u8 {
        self.regs.borrow()[offset as usize]
    }

    fn read_reg16(&self, offset: u32) -> u16 {
        self.load16(offset)
    }

    fn read_reg32(&self, offset: u32) -> u32 {
        if offset == SDHCI_PRESENT_STATE {
            return self.present_state.get();
        }
        self.load32(offset)
    }

    fn write_reg8(&self, offset: u32, value: u8) {
        self.write_log.borrow_mut().push(offset);
        if offset == SDHCI_SOFTWARE_RESET {
            // Self-clearing: the reset completes instantly.
            return;
        }
        self.regs.borrow_mut()[offset as usize] = value;
    }

    fn write_reg16(&self, offset: u32, value: u16) {
        self.write_log.borrow_mut().push(offset);
        match offset {
            SDHCI_COMMAND => {
                self.store16(offset, value);
                self.handle_command(value);
            }
            SDHCI_CLOCK_CTRL => self.handle_clock_write(value),
            SDHCI_NORMAL_INT_STAT | SDHCI_ERROR_INT_STAT => {
                let cleared = self.load16(offset) & !value;
                self.store16(offset, cleared);
            }
            _ => self.store16(offset, value),
        }
    }

    fn write_reg32(&self, offset: u32, value: u32) {
        self.write_log.borrow_mut().push(offset);
        self.store32(offset, value);
    }

    fn flush_range(&self, addr: usize, len: usize) {
        self.last_cache_op.set((addr, len));
    }

    fn invalidate_range(&self, addr: usize, len: usize) {
        self.last_cache_op.set((addr, len));
    }

    fn delay_us(&self, _us: u32) {}
}
