use std::fmt;

const VALID: u32 = 1 << 31;
const END_OF_BLOCK: u32 = 1 << 30;
const UNIT_SHIFT: u32 = 16;
const REGISTER_SHIFT: u32 = 8;

/// One command from the host, as delivered by the hardware interface.
///
/// Layout: bit 31 valid, bit 30 end of block, bits 18-16 unit, bits 12-8
/// register, bits 5-0 function. The low function bit is the GO bit and is
/// always set in a real command.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommandWord(pub u32);

impl CommandWord {
    /// Build a valid command word.
    pub fn new(unit: u8, register: u8, function: u8) -> Self {
        CommandWord(VALID
            | ((unit as u32) & 0o7) << UNIT_SHIFT
            | ((register as u32) & 0o37) << REGISTER_SHIFT
            | (function as u32) & 0o77)
    }

    /// The same command with the end of block flag set.
    pub fn with_end_of_block(self) -> Self {
        CommandWord(self.0 | END_OF_BLOCK)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 & VALID != 0
    }

    #[inline]
    pub fn end_of_block(self) -> bool {
        self.0 & END_OF_BLOCK != 0
    }

    #[inline]
    pub fn unit(self) -> u8 {
        ((self.0 >> UNIT_SHIFT) & 0o7) as u8
    }

    #[inline]
    pub fn register(self) -> u8 {
        ((self.0 >> REGISTER_SHIFT) & 0o37) as u8
    }

    /// Function code including the GO bit.
    #[inline]
    pub fn function(self) -> u8 {
        (self.0 & 0o77) as u8
    }

    #[inline]
    pub fn go(self) -> bool {
        self.0 & 1 != 0
    }
}

impl fmt::Debug for CommandWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandWord(unit={} reg={:02o} fn={:02o}{}{})",
               self.unit(), self.register(), self.function(),
               if self.end_of_block() { " EBL" } else { "" },
               if self.is_valid() { "" } else { " INVALID" })
    }
}
