// TM78 register numbers.
pub const REG_CS: u8 = 0o00;    // Data transfer command.
pub const REG_DIC: u8 = 0o01;   // Data transfer interrupt code.
pub const REG_TC: u8 = 0o02;    // Tape control: format, skip count, record count, slave.
pub const REG_BC: u8 = 0o05;    // Byte count.
pub const REG_DT: u8 = 0o06;    // Drive type.
pub const REG_US: u8 = 0o07;    // Unit status of the last sensed slave.
pub const REG_SN: u8 = 0o10;    // Serial number, BCD.
pub const REG_NIC: u8 = 0o13;   // Motion interrupt code.
pub const REG_NCS0: u8 = 0o14;  // Motion command for slaves 0-3.
pub const REG_NCS3: u8 = 0o17;
pub const REG_HC: u8 = 0o21;    // Hardware control.

pub const SLAVES: u8 = 4;

// Tape control fields.
pub const TC_FORMAT_MASK: u16 = 0o070000;
pub const TC_FORMAT_SHIFT: u16 = 12;
pub const TC_SKIP_COUNT_MASK: u16 = 0o007400;
pub const TC_RECORD_COUNT_MASK: u16 = 0o000374;
pub const TC_RECORD_COUNT_SHIFT: u16 = 2;
pub const TC_SLAVE_MASK: u16 = 0o000003;

// Motion command: repeat count in the high byte, GO in bit 0.
pub const NCS_COUNT_SHIFT: u16 = 8;
pub const NCS_GO: u16 = 0o000001;

// Data command register: formatter available.
pub const CS_DVA: u16 = 0o004000;

// Interrupt registers: failure code in bits 15-10, slave in 9-8 (motion
// only), code in 5-0. The data interrupt register also carries DPR.
pub const IC_SLAVE_SHIFT: u16 = 8;
pub const IC_FAILURE_SHIFT: u16 = 10;
pub const DIC_DPR: u16 = 0o000400;

// Hardware control: formatter clear.
pub const HC_CLEAR: u16 = 0o040000;

// Interrupt codes.
pub const IC_DONE: u8 = 0o01;
pub const IC_TAPE_MARK: u8 = 0o02;
pub const IC_BOT: u8 = 0o03;
pub const IC_EOT: u8 = 0o04;
pub const IC_FILE_PROTECT: u8 = 0o10;
pub const IC_NOT_AVAILABLE: u8 = 0o12;
pub const IC_OFFLINE: u8 = 0o13;
pub const IC_ONLINE: u8 = 0o17;
pub const IC_LONG_RECORD: u8 = 0o20;
pub const IC_SHORT_RECORD: u8 = 0o21;
pub const IC_UNREADABLE: u8 = 0o24;
pub const IC_BAD_TAPE: u8 = 0o27;
pub const IC_FORMATTER_FAULT: u8 = 0o30;

// Failure code sent with UNREADABLE.
pub const FAILURE_UNREADABLE: u8 = 1;

// Unit status bits.
pub const US_RDY: u16 = 0o100000;   // Ready.
pub const US_PRES: u16 = 0o040000;  // Present.
pub const US_ONL: u16 = 0o020000;   // Online.
pub const US_PE: u16 = 0o004000;    // Phase encoded.
pub const US_BOT: u16 = 0o002000;   // At load point.
pub const US_EOT: u16 = 0o001000;   // Past end of tape.
pub const US_FPT: u16 = 0o000400;   // File protected.
pub const US_AVAIL: u16 = 0o000200; // Available to this port.

// Motion functions, including the GO bit.
pub const MF_NOP: u8 = 0o03;
pub const MF_UNLOAD: u8 = 0o05;
pub const MF_REWIND: u8 = 0o07;
pub const MF_SENSE: u8 = 0o11;
pub const MF_DATA_SECURITY_ERASE: u8 = 0o13;
pub const MF_WRITE_MARK_PE: u8 = 0o15;
pub const MF_WRITE_MARK_GCR: u8 = 0o17;
pub const MF_SPACE_FORWARD_RECORD: u8 = 0o21;
pub const MF_SPACE_REVERSE_RECORD: u8 = 0o23;
pub const MF_SPACE_FORWARD_FILE: u8 = 0o25;
pub const MF_SPACE_REVERSE_FILE: u8 = 0o27;
pub const MF_SPACE_FORWARD_EITHER: u8 = 0o31;
pub const MF_SPACE_REVERSE_EITHER: u8 = 0o33;
pub const MF_ERASE_GAP_PE: u8 = 0o35;
pub const MF_ERASE_GAP_GCR: u8 = 0o37;

// Data transfer functions.
pub const DF_WRITE_PE: u8 = 0o61;
pub const DF_WRITE_GCR: u8 = 0o63;
pub const DF_READ_FORWARD: u8 = 0o71;
pub const DF_EXTENDED_SENSE: u8 = 0o73;
pub const DF_READ_REVERSE: u8 = 0o77;

/// Longest record the formatter will handle.
pub const MAX_RECORD: usize = 65535;

/// A zero byte count means this many.
pub const ZERO_BYTE_COUNT: usize = 65536;

/// Half-words of extended sense data.
pub const EXTENDED_SENSE_HALVES: usize = 30;
