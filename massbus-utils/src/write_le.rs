use std::io::{self, Write};

/// Write little-endian integers directly to a stream.
pub trait WriteLE: Write {
    fn write_le_u16(&mut self, val: u16) -> io::Result<()>;
    fn write_le_u32(&mut self, val: u32) -> io::Result<()>;
    fn write_le_u64(&mut self, val: u64) -> io::Result<()>;
}

/// Everything that implements Write can also implement WriteLE.
impl<T: Write> WriteLE for T {
    fn write_le_u16(&mut self, val: u16) -> io::Result<()> {
        self.write_all(&val.to_le_bytes())
    }

    fn write_le_u32(&mut self, val: u32) -> io::Result<()> {
        self.write_all(&val.to_le_bytes())
    }

    fn write_le_u64(&mut self, val: u64) -> io::Result<()> {
        self.write_all(&val.to_le_bytes())
    }
}
