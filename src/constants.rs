//! SD host controller register map, bit masks and command encodings.

// Register offsets from the controller base address.
pub const SDHCI_SDMA_SYS_ADDR: u32 = 0x00;
pub const SDHCI_BLK_SIZE: u32 = 0x04;
pub const SDHCI_BLK_CNT: u32 = 0x06;
pub const SDHCI_ARGUMENT: u32 = 0x08;
pub const SDHCI_XFER_MODE: u32 = 0x0C;
pub const SDHCI_COMMAND: u32 = 0x0E;
pub const SDHCI_RESP0: u32 = 0x10;
pub const SDHCI_RESP1: u32 = 0x14;
pub const SDHCI_RESP2: u32 = 0x18;
pub const SDHCI_RESP3: u32 = 0x1C;
pub const SDHCI_BUF_DATA: u32 = 0x20;
pub const SDHCI_PRESENT_STATE: u32 = 0x24;
pub const SDHCI_HOST_CTRL1: u32 = 0x28;
pub const SDHCI_POWER_CTRL: u32 = 0x29;
pub const SDHCI_CLOCK_CTRL: u32 = 0x2C;
pub const SDHCI_TIMEOUT_CTRL: u32 = 0x2E;
pub const SDHCI_SOFTWARE_RESET: u32 = 0x2F;
pub const SDHCI_NORMAL_INT_STAT: u32 = 0x30;
pub const SDHCI_ERROR_INT_STAT: u32 = 0x32;
pub const SDHCI_NORMAL_INT_STAT_EN: u32 = 0x34;
pub const SDHCI_ERROR_INT_STAT_EN: u32 = 0x36;
pub const SDHCI_NORMAL_INT_SIG_EN: u32 = 0x38;
pub const SDHCI_ERROR_INT_SIG_EN: u32 = 0x3A;
pub const SDHCI_HOST_CTRL2: u32 = 0x3E;
pub const SDHCI_CAPABILITIES: u32 = 0x40;
pub const SDHCI_ADMA_SYS_ADDR: u32 = 0x58;
pub const SDHCI_HOST_CNTRL_VER: u32 = 0xFE;

// Present state register.
pub const SDHCI_PSR_INHIBIT_CMD: u32 = 0x0000_0001;
pub const SDHCI_PSR_INHIBIT_DAT: u32 = 0x0000_0002;
pub const SDHCI_PSR_WR_ACTIVE: u32 = 0x0000_0100;
pub const SDHCI_PSR_RD_ACTIVE: u32 = 0x0000_0200;
pub const SDHCI_PSR_CARD_INSERTED: u32 = 0x0001_0000;
pub const SDHCI_PSR_DAT30_LVL: u32 = 0x00F0_0000;
pub const SDHCI_PSR_CMD_LVL: u32 = 0x0100_0000;

// Software reset register.
pub const SDHCI_SWRST_ALL: u8 = 0x01;
pub const SDHCI_SWRST_CMD_LINE: u8 = 0x02;
pub const SDHCI_SWRST_DAT_LINE: u8 = 0x04;

// Power control register.
pub const SDHCI_PC_BUS_PWR: u8 = 0x01;
pub const SDHCI_PC_BUS_VSEL_1V8: u8 = 0x0A;
pub const SDHCI_PC_BUS_VSEL_3V0: u8 = 0x0C;
pub const SDHCI_PC_BUS_VSEL_3V3: u8 = 0x0E;

// Host control 1 register.
pub const SDHCI_HC_4BIT_WIDTH: u8 = 0x02;
pub const SDHCI_HC_HIGH_SPEED: u8 = 0x04;
pub const SDHCI_HC_DMA_ADMA2_32: u8 = 0x10;
pub const SDHCI_HC_8BIT_WIDTH: u8 = 0x20;

// Host control 2 register.
pub const SDHCI_HC2_UHS_MODE_MASK: u16 = 0x0007;
pub const SDHCI_HC2_1V8_EN: u16 = 0x0008;

// Clock control register.
pub const SDHCI_CC_INT_CLK_EN: u16 = 0x0001;
pub const SDHCI_CC_INT_CLK_STABLE: u16 = 0x0002;
pub const SDHCI_CC_SD_CLK_EN: u16 = 0x0004;
pub const SDHCI_CC_DIV_SHIFT: u16 = 8;
pub const SDHCI_CC_SDCLK_FREQ_SEL_MASK: u16 = 0xFF00;
pub const SDHCI_CC_EXT_DIV_SHIFT: u16 = 6;
pub const SDHCI_CC_SDCLK_FREQ_SEL_EXT_MASK: u16 = 0x00C0;
// Largest divisor count searched: power-of-two range pre-v3, 10-bit
// extended range on spec v3 controllers.
pub const SDHCI_CC_MAX_DIV_CNT: u32 = 256;
pub const SDHCI_CC_EXT_MAX_DIV_CNT: u32 = 2046;

// Timeout control: fixed DAT line timeout of TMCLK * 2^27.
pub const SDHCI_TIMEOUT_DEFAULT: u8 = 0xE;

// Normal / error interrupt status.
pub const SDHCI_INTR_CC: u16 = 0x0001;
pub const SDHCI_INTR_TC: u16 = 0x0002;
pub const SDHCI_INTR_CARD: u16 = 0x0100;
pub const SDHCI_INTR_ERR: u16 = 0x8000;
pub const SDHCI_NORM_INTR_ALL: u16 = 0xFFFF;
pub const SDHCI_ERROR_INTR_ALL: u16 = 0xF3FF;

// Capabilities register.
pub const SDHCI_CAP_VOLT_3V3: u32 = 0x0100_0000;
pub const SDHCI_CAP_VOLT_3V0: u32 = 0x0200_0000;
pub const SDHCI_CAP_VOLT_1V8: u32 = 0x0400_0000;
pub const SDHCI_CAPS_SLOT_TYPE_MASK: u32 = 0xC000_0000;
pub const SDHCI_CAPS_EMBEDDED_SLOT: u32 = 0x4000_0000;

// Host controller version register.
pub const SDHCI_HC_SPEC_VER_MASK: u16 = 0x00FF;
pub const SDHCI_HC_SPEC_V3: u16 = 0x0002;
pub const SDHCI_HC_SPEC_V2: u16 = 0x0001;
pub const SDHCI_HC_SPEC_V1: u16 = 0x0000;

// Transfer mode register.
pub const SDHCI_TM_DMA_EN: u16 = 0x0001;
pub const SDHCI_TM_BLK_CNT_EN: u16 = 0x0002;
pub const SDHCI_TM_AUTO_CMD12_EN: u16 = 0x0004;
pub const SDHCI_TM_DAT_DIR_READ: u16 = 0x0010;
pub const SDHCI_TM_MULTI_BLOCK: u16 = 0x0020;

// Block size register.
pub const SDHCI_BLK_SIZE_MASK: u16 = 0x0FFF;
pub const SDHCI_BLK_SIZE_512: u16 = 0x200;

// Command register response-type framing (low bits of the command word).
pub const SDHCI_CMD_RESP_NONE: u32 = 0x0000_0000;
pub const SDHCI_CMD_RESP_L136: u32 = 0x0000_0001;
pub const SDHCI_CMD_RESP_L48: u32 = 0x0000_0002;
pub const SDHCI_CMD_RESP_L48_BUSY: u32 = 0x0000_0003;
pub const SDHCI_CMD_CRC_CHK_EN: u32 = 0x0000_0008;
pub const SDHCI_CMD_INDEX_CHK_EN: u32 = 0x0000_0010;
pub const SDHCI_CMD_DATA_PRESENT: u32 = 0x0000_0020;

pub const RESP_NONE: u32 = SDHCI_CMD_RESP_NONE;
pub const RESP_R1: u32 = SDHCI_CMD_RESP_L48 | SDHCI_CMD_CRC_CHK_EN | SDHCI_CMD_INDEX_CHK_EN;
pub const RESP_R1B: u32 = SDHCI_CMD_RESP_L48_BUSY | SDHCI_CMD_CRC_CHK_EN | SDHCI_CMD_INDEX_CHK_EN;
pub const RESP_R2: u32 = SDHCI_CMD_RESP_L136 | SDHCI_CMD_CRC_CHK_EN;
pub const RESP_R3: u32 = SDHCI_CMD_RESP_L48;
pub const RESP_R6: u32 = SDHCI_CMD_RESP_L48_BUSY | SDHCI_CMD_CRC_CHK_EN | SDHCI_CMD_INDEX_CHK_EN;

// Only bits 13:0 of the framed command word reach hardware. Bit 31 is
// reused internally to tell an ACMD from the CMD of the same index and
// must be masked off before the register write.
pub const SDHCI_CMD_REG_MASK: u32 = 0x3FFF;
pub const SDHCI_APP_CMD_FLAG: u32 = 0x8000_0000;

// Command encodings: index in bits 13:8 of the command register.
pub const CMD0: u32 = 0x0000;
pub const CMD1: u32 = 0x0100;
pub const CMD2: u32 = 0x0200;
pub const CMD3: u32 = 0x0300;
pub const CMD4: u32 = 0x0400;
pub const CMD5: u32 = 0x0500;
pub const CMD6: u32 = 0x0600;
pub const ACMD6: u32 = SDHCI_APP_CMD_FLAG | 0x0600;
pub const CMD7: u32 = 0x0700;
pub const CMD8: u32 = 0x0800;
pub const CMD9: u32 = 0x0900;
pub const CMD10: u32 = 0x0A00;
pub const CMD11: u32 = 0x0B00;
pub const CMD12: u32 = 0x0C00;
pub const ACMD13: u32 = SDHCI_APP_CMD_FLAG | 0x0D00;
pub const CMD16: u32 = 0x1000;
pub const CMD17: u32 = 0x1100;
pub const CMD18: u32 = 0x1200;
pub const CMD19: u32 = 0x1300;
pub const CMD21: u32 = 0x1500;
pub const CMD23: u32 = 0x1700;
pub const ACMD23: u32 = SDHCI_APP_CMD_FLAG | 0x1700;
pub const CMD24: u32 = 0x1800;
pub const CMD25: u32 = 0x1900;
pub const ACMD41: u32 = SDHCI_APP_CMD_FLAG | 0x2900;
pub const ACMD42: u32 = SDHCI_APP_CMD_FLAG | 0x2A00;
pub const ACMD51: u32 = SDHCI_APP_CMD_FLAG | 0x3300;
pub const CMD52: u32 = 0x3400;
pub const CMD55: u32 = 0x3700;
pub const CMD58: u32 = 0x3A00;

// Identification-sequence arguments and response bits.
pub const SD_CMD8_VOL_PATTERN: u32 = 0x1AA;
pub const SD_OCR_READY: u32 = 0x8000_0000;
pub const SD_ACMD41_HCS: u32 = 0x4000_0000;
pub const SD_ACMD41_3V3: u32 = 0x0030_0000;
pub const SD_OCR_S18: u32 = 0x0100_0000;
pub const MMC_CMD1_HIGH_VOL: u32 = 0x00FF_8000;
// Host-assigned eMMC/MMC relative card address, pre-shifted to the upper
// 16 bits the way every RCA-bearing command argument wants it.
pub const MMC_FIXED_RCA: u32 = 0x1234_0000;

// SD CMD6 function-switch arguments (mode bit 31: 0 = query, 1 = set).
pub const SD_SWITCH_HS_QUERY_ARG: u32 = 0x00FF_FFF0;
pub const SD_SWITCH_HS_SET_ARG: u32 = 0x80FF_FFF1;
pub const SD_SWITCH_SDR12_ARG: u32 = 0x80FF_FFF0;
pub const SD_SWITCH_SDR25_ARG: u32 = 0x80FF_FFF1;
pub const SD_SWITCH_SDR50_ARG: u32 = 0x80FF_FFF2;
pub const SD_SWITCH_SDR104_ARG: u32 = 0x80FF_FFF3;
pub const SD_SWITCH_DDR50_ARG: u32 = 0x80FF_FFF4;
// Byte 13 of the 64-byte switch status: function group 1 support bits.
pub const SD_SWITCH_STATUS_HS_BYTE: usize = 13;
pub const SD_SWITCH_STATUS_HS_SUPPORT: u8 = 0x2;
// SCR byte 1: bus width support bits.
pub const SD_SCR_4BIT_SUPPORT: u8 = 0x4;

// MMC/eMMC CMD6 switch arguments (EXT_CSD byte writes).
pub const MMC_SWITCH_4BIT_BUS_ARG: u32 = 0x03B7_0100;
pub const MMC_SWITCH_8BIT_BUS_ARG: u32 = 0x03B7_0200;
pub const MMC_SWITCH_HIGH_SPEED_ARG: u32 = 0x03B9_0100;
pub const MMC_SWITCH_HS200_ARG: u32 = 0x03B9_0200;

// EXT_CSD layout.
pub const EXT_CSD_BUS_WIDTH_BYTE: usize = 183;
pub const EXT_CSD_HS_TIMING_BYTE: usize = 185;
pub const EXT_CSD_DEVICE_TYPE_BYTE: usize = 196;
pub const EXT_CSD_BUS_WIDTH_4BIT: u8 = 1;
pub const EXT_CSD_BUS_WIDTH_8BIT: u8 = 2;
pub const EXT_CSD_HS_TIMING_HIGH: u8 = 1;
pub const EXT_CSD_HS_TIMING_HS200: u8 = 2;
pub const EXT_CSD_DEVICE_TYPE_HIGH_SPEED: u8 = 0x2;
pub const EXT_CSD_DEVICE_TYPE_HS200_SDR_1V8: u8 = 0x10;
pub const EXT_CSD_DEVICE_TYPE_HS200_SDR_1V2: u8 = 0x20;

// Metadata-read transfer geometry.
pub const SD_SCR_BLKCNT: u32 = 1;
pub const SD_SCR_BLKSIZE: u16 = 8;
pub const SD_SWITCH_CMD_BLKCNT: u32 = 1;
pub const SD_SWITCH_CMD_BLKSIZE: u16 = 64;
pub const MMC_EXT_CSD_BLKCNT: u32 = 1;
pub const MMC_EXT_CSD_BLKSIZE: u16 = 512;
pub const TUNING_CMD_BLKCNT: u32 = 1;
pub const TUNING_CMD_BLKSIZE: u16 = 64;

// Bus clock rates.
pub const CLK_400_KHZ: u32 = 400_000;
pub const SD_CLK_25_MHZ: u32 = 25_000_000;
pub const MMC_CLK_26_MHZ: u32 = 26_000_000;
pub const SD_CLK_50_MHZ: u32 = 50_000_000;
pub const MMC_CLK_52_MHZ: u32 = 52_000_000;
pub const MMC_CLK_HS200: u32 = 200_000_000;
pub const SD_SDR12_MAX_CLK: u32 = 25_000_000;
pub const SD_SDR25_MAX_CLK: u32 = 50_000_000;
pub const SD_SDR50_MAX_CLK: u32 = 100_000_000;
pub const SD_SDR104_MAX_CLK: u32 = 208_000_000;
pub const SD_DDR50_MAX_CLK: u32 = 50_000_000;

// Delays (microseconds).
pub const POWER_OFF_DELAY_US: u32 = 1_000_000;
pub const INIT_74_CLK_DELAY_US: u32 = 10_000;
pub const SWITCH_SETTLE_DELAY_US: u32 = 1_000;
pub const VOLTAGE_SWITCH_DELAY_US: u32 = 5_000;

// ADMA2 descriptor geometry (8-byte, 32-bit-address flavor).
pub const ADMA2_DESC_MAX_LENGTH: u32 = 65536;
pub const ADMA2_DESC_CAPACITY: usize = 32;
