use std::io::{self, Read};

/// Read little-endian integers directly from a stream.
pub trait ReadLE: Read {
    fn read_le_u16(&mut self) -> io::Result<u16>;
    fn read_le_u32(&mut self) -> io::Result<u32>;
    fn read_le_u64(&mut self) -> io::Result<u64>;
}

/// Everything that implements Read can also implement ReadLE.
impl<T: Read> ReadLE for T {
    fn read_le_u16(&mut self) -> io::Result<u16> {
        let mut buf = [0; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_le_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_le_u64(&mut self) -> io::Result<u64> {
        let mut buf = [0; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// Read as many bytes as the stream has, up to `buf.len()`. Unlike
/// `read_exact`, hitting end of file early is not an error; the number of
/// bytes actually read is returned.
pub fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
