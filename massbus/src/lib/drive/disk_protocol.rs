// RP/RM register numbers.
pub const REG_CS1: u8 = 0o00;   // Control and status 1.
pub const REG_DS: u8 = 0o01;    // Drive status.
pub const REG_ER1: u8 = 0o02;   // Error 1.
pub const REG_DA: u8 = 0o05;    // Desired track (high byte) and sector (low byte).
pub const REG_DT: u8 = 0o06;    // Drive type.
pub const REG_SN: u8 = 0o10;    // Serial number.
pub const REG_OF: u8 = 0o11;    // Offset.
pub const REG_DC: u8 = 0o12;    // Desired cylinder.
pub const REG_CC: u8 = 0o13;    // Current cylinder.
pub const REG_ER2: u8 = 0o14;
pub const REG_ER3: u8 = 0o15;

// Drive status bits.
pub const DS_ATA: u16 = 0o100000;   // Attention.
pub const DS_ERR: u16 = 0o040000;   // Composite error.
pub const DS_MOL: u16 = 0o010000;   // Medium online.
pub const DS_WRL: u16 = 0o004000;   // Write lock.
pub const DS_DRY: u16 = 0o000200;   // Drive ready.
pub const DS_VV: u16 = 0o000100;    // Volume valid.

// Error 1 bits.
pub const ER1_ILF: u16 = 0o000001;  // Illegal function.
pub const ER1_IAE: u16 = 0o002000;  // Invalid address.
pub const ER1_WLE: u16 = 0o004000;  // Write lock error.

// Offset register bits.
pub const OF_FMT22: u16 = 0o010000; // 18 bit format.

// Functions, including the GO bit.
pub const FN_NOP: u8 = 0o01;
pub const FN_UNLOAD: u8 = 0o03;
pub const FN_SEEK: u8 = 0o05;
pub const FN_RECALIBRATE: u8 = 0o07;
pub const FN_DRIVE_CLEAR: u8 = 0o11;
pub const FN_RELEASE: u8 = 0o13;
pub const FN_OFFSET: u8 = 0o15;
pub const FN_RETURN_TO_CENTERLINE: u8 = 0o17;
pub const FN_READ_IN_PRESET: u8 = 0o21;
pub const FN_PACK_ACK: u8 = 0o23;
pub const FN_SEARCH: u8 = 0o31;
pub const FN_WRITE_CHECK: u8 = 0o51;
pub const FN_WRITE_CHECK_HEADER: u8 = 0o53;
pub const FN_WRITE: u8 = 0o61;
pub const FN_WRITE_HEADER: u8 = 0o63;
pub const FN_READ: u8 = 0o71;
pub const FN_READ_HEADER: u8 = 0o73;

// Every transfer moves one sector of this many bus words.
pub const SECTOR_WORDS: usize = 256;
