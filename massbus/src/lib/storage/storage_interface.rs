use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

/// How an image may be shared with other units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    Exclusive,
    Shared,
}

/// What a tape operation found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeRecord {
    /// A data record of this many bytes.
    Data(u32),
    TapeMark,
    /// Ran off the end of the tape in the direction of motion (the
    /// physical end going forward, the load point going backward).
    EndOfTape,
    BadTape,
}

/// Host storage behind a disk drive.
pub trait DiskStorage: Send {
    fn open(&mut self, path: &Path, read_only: bool, share: ShareMode) -> io::Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    /// The access mode actually granted by the last `open`.
    fn is_read_only(&self) -> bool;
    fn set_sector_size(&mut self, bytes: usize);
    fn read_sector(&mut self, lba: u32, buf: &mut [u8]) -> io::Result<()>;
    fn write_sector(&mut self, lba: u32, buf: &[u8]) -> io::Result<()>;
}

/// Host storage behind a tape transport.
///
/// Reads always return the record's bytes in forward order, whichever way
/// the tape moved; after `read_reverse_record` the tape is positioned
/// before the record. `buf` is resized to the record length.
pub trait TapeStorage: Send {
    fn open(&mut self, path: &Path, read_only: bool, share: ShareMode) -> io::Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn is_read_only(&self) -> bool;
    fn rewind(&mut self) -> io::Result<()>;
    fn is_at_bot(&self) -> bool;
    fn is_at_eot(&self) -> bool;
    fn read_forward_record(&mut self, buf: &mut Vec<u8>) -> io::Result<TapeRecord>;
    fn read_reverse_record(&mut self, buf: &mut Vec<u8>) -> io::Result<TapeRecord>;
    /// Write a record at the current position, discarding everything after
    /// it.
    fn write_record(&mut self, data: &[u8]) -> io::Result<()>;
    fn write_mark(&mut self) -> io::Result<()>;
    fn space_forward_record(&mut self) -> io::Result<TapeRecord>;
    fn space_reverse_record(&mut self) -> io::Result<TapeRecord>;
    /// Space past the next tape mark. Returns `TapeMark` on success.
    fn space_forward_file(&mut self) -> io::Result<TapeRecord>;
    fn space_reverse_file(&mut self) -> io::Result<TapeRecord>;
    /// Discard everything from the current position onward.
    fn truncate(&mut self) -> io::Result<()>;
}

/// Open an image file, honouring the requested access mode. A file whose
/// permissions say read-only is opened read-only whatever was asked for,
/// as is one we aren't allowed to write. Missing files are created when
/// writable. Returns the file and whether it ended up read-only.
pub(super) fn open_image(path: &Path, read_only: bool) -> io::Result<(File, bool)> {
    let forced = match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            return Err(io::Error::new(io::ErrorKind::Other,
                                      format!("'{}' is a directory", path.display())));
        }
        Ok(meta) => meta.permissions().readonly(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };
    if read_only || forced {
        return Ok((File::open(path)?, true));
    }
    match OpenOptions::new().read(true).write(true).create(true).open(path) {
        Ok(file) => Ok((file, false)),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Ok((File::open(path)?, true)),
        Err(e) => Err(e),
    }
}
