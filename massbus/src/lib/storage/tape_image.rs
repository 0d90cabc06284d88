//! Tapes stored in the SIMH `.tap` container format.
//!
//! Each record is a 4-byte little-endian length, the data (padded to an
//! even length), then the length again. A zero length is a tape mark.
//! `0xFFFFFFFF` marks the end of recorded medium, `0xFFFFFFFE` is an erase
//! gap, and a set top bit flags a record that was read with errors.

use log::{debug, trace};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use massbus_utils::read_le::ReadLE;
use massbus_utils::write_le::WriteLE;

use super::storage_interface::*;

const TAPE_MARK: u32 = 0;
const END_OF_MEDIUM: u32 = 0xFFFF_FFFF;
const ERASE_GAP: u32 = 0xFFFF_FFFE;
const BAD_RECORD: u32 = 0x8000_0000;
const LENGTH_MASK: u32 = 0x00FF_FFFF;

/// A tape image and the current position within it.
pub struct TapeImage {
    file: Option<File>,
    read_only: bool,
    position: u64,
    end: u64,
}

#[inline]
fn padded(len: u32) -> u64 {
    (len as u64 + 1) & !1
}

impl TapeImage {
    pub fn new() -> Self {
        TapeImage {
            file: None,
            read_only: false,
            position: 0,
            end: 0,
        }
    }

    /// Byte offset of the tape head within the container.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file.as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "tape image not open"))
    }

    fn writable(&mut self) -> io::Result<&mut File> {
        if self.read_only {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "tape is write protected"));
        }
        self.file()
    }

    fn read_u32_at(&mut self, offset: u64) -> io::Result<u32> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_le_u32()
    }

    fn read_data_at(&mut self, offset: u64, len: u32, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.resize(len as usize, 0);
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    /// Move forward over one record, reading it into `buf` if given.
    fn forward(&mut self, mut buf: Option<&mut Vec<u8>>) -> io::Result<TapeRecord> {
        loop {
            if self.position >= self.end {
                return Ok(TapeRecord::EndOfTape);
            }
            if self.position + 4 > self.end {
                self.position = self.end;
                return Ok(TapeRecord::BadTape);
            }
            let header = self.read_u32_at(self.position)?;
            match header {
                TAPE_MARK => {
                    self.position += 4;
                    return Ok(TapeRecord::TapeMark);
                }
                END_OF_MEDIUM => return Ok(TapeRecord::EndOfTape),
                ERASE_GAP => {
                    self.position += 4;
                    continue;
                }
                _ => {}
            }
            let len = header & LENGTH_MASK;
            let data_start = self.position + 4;
            let record_end = data_start + padded(len) + 4;
            if record_end > self.end {
                self.position = self.end;
                return Ok(TapeRecord::BadTape);
            }
            if let Some(buf) = buf.as_deref_mut() {
                self.read_data_at(data_start, len, buf)?;
            }
            let trailer = self.read_u32_at(data_start + padded(len))?;
            self.position = record_end;
            if trailer != header || header & BAD_RECORD != 0 {
                return Ok(TapeRecord::BadTape);
            }
            return Ok(TapeRecord::Data(len));
        }
    }

    /// Move backward over one record, reading it into `buf` if given.
    fn reverse(&mut self, mut buf: Option<&mut Vec<u8>>) -> io::Result<TapeRecord> {
        loop {
            if self.position == 0 {
                return Ok(TapeRecord::EndOfTape);
            }
            if self.position < 4 {
                self.position = 0;
                return Ok(TapeRecord::BadTape);
            }
            let trailer = self.read_u32_at(self.position - 4)?;
            match trailer {
                TAPE_MARK => {
                    self.position -= 4;
                    return Ok(TapeRecord::TapeMark);
                }
                ERASE_GAP | END_OF_MEDIUM => {
                    self.position -= 4;
                    continue;
                }
                _ => {}
            }
            let len = trailer & LENGTH_MASK;
            let span = padded(len) + 8;
            if span > self.position {
                self.position = 0;
                return Ok(TapeRecord::BadTape);
            }
            let start = self.position - span;
            let header = self.read_u32_at(start)?;
            if let Some(buf) = buf.as_deref_mut() {
                self.read_data_at(start + 4, len, buf)?;
            }
            self.position = start;
            if header != trailer || trailer & BAD_RECORD != 0 {
                return Ok(TapeRecord::BadTape);
            }
            return Ok(TapeRecord::Data(len));
        }
    }

    /// Cut the container off at the current position.
    fn cut(&mut self) -> io::Result<()> {
        let position = self.position;
        self.writable()?.set_len(position)?;
        self.end = position;
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        let position = self.position;
        let file = self.writable()?;
        file.seek(SeekFrom::Start(position))?;
        file.write_all(bytes)?;
        self.position += bytes.len() as u64;
        self.cut()
    }

    fn space_file(&mut self, forward: bool) -> io::Result<TapeRecord> {
        loop {
            let result = if forward { self.forward(None)? } else { self.reverse(None)? };
            if let TapeRecord::Data(_) = result {
                continue;
            }
            return Ok(result);
        }
    }
}

impl Default for TapeImage {
    fn default() -> Self {
        Self::new()
    }
}

impl TapeStorage for TapeImage {
    fn open(&mut self, path: &Path, read_only: bool, _share: ShareMode) -> io::Result<()> {
        let (file, read_only) = open_image(path, read_only)?;
        self.end = file.metadata()?.len();
        self.file = Some(file);
        self.read_only = read_only;
        self.position = 0;
        debug!("Opened tape image '{}' ({} bytes){}.", path.display(), self.end,
               if read_only { " read only" } else { "" });
        Ok(())
    }

    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if !self.read_only {
                let _ = file.sync_all();
            }
        }
        self.position = 0;
        self.end = 0;
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.file()?;
        self.position = 0;
        Ok(())
    }

    fn is_at_bot(&self) -> bool {
        self.position == 0
    }

    fn is_at_eot(&self) -> bool {
        self.position >= self.end
    }

    fn read_forward_record(&mut self, buf: &mut Vec<u8>) -> io::Result<TapeRecord> {
        let result = self.forward(Some(buf))?;
        trace!("Tape read forward: {:?} at {}.", result, self.position);
        Ok(result)
    }

    fn read_reverse_record(&mut self, buf: &mut Vec<u8>) -> io::Result<TapeRecord> {
        let result = self.reverse(Some(buf))?;
        trace!("Tape read reverse: {:?} at {}.", result, self.position);
        Ok(result)
    }

    fn write_record(&mut self, data: &[u8]) -> io::Result<()> {
        let len = data.len() as u32;
        let mut bytes = Vec::with_capacity(data.len() + 9);
        bytes.write_le_u32(len)?;
        bytes.extend_from_slice(data);
        if len & 1 != 0 {
            bytes.push(0);
        }
        bytes.write_le_u32(len)?;
        self.append(&bytes)
    }

    fn write_mark(&mut self) -> io::Result<()> {
        self.append(&TAPE_MARK.to_le_bytes())
    }

    fn space_forward_record(&mut self) -> io::Result<TapeRecord> {
        self.forward(None)
    }

    fn space_reverse_record(&mut self) -> io::Result<TapeRecord> {
        self.reverse(None)
    }

    fn space_forward_file(&mut self) -> io::Result<TapeRecord> {
        self.space_file(true)
    }

    fn space_reverse_file(&mut self) -> io::Result<TapeRecord> {
        self.space_file(false)
    }

    fn truncate(&mut self) -> io::Result<()> {
        self.cut()
    }
}
