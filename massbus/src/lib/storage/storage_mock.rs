use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::storage_interface::*;

/// Calls seen by a `MockDisk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskCall {
    Open(bool),
    Close,
    SectorSize(usize),
    Read(u32),
    Write(u32, Vec<u8>),
}

#[derive(Default)]
struct MockDiskState {
    open: bool,
    read_only: bool,
    calls: Vec<DiskCall>,
}

/// Handle for inspecting a `MockDisk` after it has been moved into a drive.
#[derive(Clone, Default)]
pub struct MockDiskLog(Arc<Mutex<MockDiskState>>);

impl MockDiskLog {
    pub fn calls(&self) -> Vec<DiskCall> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn reads(&self) -> Vec<u32> {
        self.calls().into_iter()
            .filter_map(|c| if let DiskCall::Read(lba) = c { Some(lba) } else { None })
            .collect()
    }

    pub fn writes(&self) -> Vec<(u32, Vec<u8>)> {
        self.calls().into_iter()
            .filter_map(|c| if let DiskCall::Write(lba, data) = c { Some((lba, data)) } else { None })
            .collect()
    }
}

/// A disk that records every call. Sector `n` reads back as bytes equal
/// to `n`; opening fails if `fail_open` is set.
pub struct MockDisk {
    state: MockDiskLog,
    force_read_only: bool,
    fail_open: bool,
    fail_io: bool,
}

impl MockDisk {
    pub fn new() -> (Self, MockDiskLog) {
        let log = MockDiskLog::default();
        (MockDisk { state: log.clone(), force_read_only: false, fail_open: false, fail_io: false },
         log)
    }

    pub fn read_only() -> (Self, MockDiskLog) {
        let (mut disk, log) = Self::new();
        disk.force_read_only = true;
        (disk, log)
    }

    pub fn failing_open() -> (Self, MockDiskLog) {
        let (mut disk, log) = Self::new();
        disk.fail_open = true;
        (disk, log)
    }

    pub fn failing_io() -> (Self, MockDiskLog) {
        let (mut disk, log) = Self::new();
        disk.fail_io = true;
        (disk, log)
    }

    fn io_result(&self) -> io::Result<()> {
        if self.fail_io {
            Err(io::Error::new(io::ErrorKind::Other, "mock I/O failure"))
        } else {
            Ok(())
        }
    }
}

impl DiskStorage for MockDisk {
    fn open(&mut self, _path: &Path, read_only: bool, _share: ShareMode) -> io::Result<()> {
        if self.fail_open {
            return Err(io::Error::new(io::ErrorKind::NotFound, "mock open failure"));
        }
        let mut s = self.state.0.lock().unwrap();
        s.open = true;
        s.read_only = read_only || self.force_read_only;
        let granted = s.read_only;
        s.calls.push(DiskCall::Open(granted));
        Ok(())
    }

    fn close(&mut self) {
        let mut s = self.state.0.lock().unwrap();
        s.open = false;
        s.calls.push(DiskCall::Close);
    }

    fn is_open(&self) -> bool {
        self.state.0.lock().unwrap().open
    }

    fn is_read_only(&self) -> bool {
        self.state.0.lock().unwrap().read_only
    }

    fn set_sector_size(&mut self, bytes: usize) {
        self.state.0.lock().unwrap().calls.push(DiskCall::SectorSize(bytes));
    }

    fn read_sector(&mut self, lba: u32, buf: &mut [u8]) -> io::Result<()> {
        self.state.0.lock().unwrap().calls.push(DiskCall::Read(lba));
        self.io_result()?;
        buf.fill(lba as u8);
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8]) -> io::Result<()> {
        self.state.0.lock().unwrap().calls.push(DiskCall::Write(lba, buf.to_vec()));
        self.io_result()
    }
}

/// One thing on a mock tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEntry {
    Record(Vec<u8>),
    Mark,
    Bad,
}

#[derive(Default)]
pub struct MockTapeState {
    pub open: bool,
    pub read_only: bool,
    pub entries: Vec<MockEntry>,
    /// Index of the entry under the head.
    pub position: usize,
}

/// A tape held as a list of entries.
#[derive(Clone, Default)]
pub struct MockTape(pub Arc<Mutex<MockTapeState>>);

impl MockTape {
    pub fn with_entries(entries: Vec<MockEntry>) -> Self {
        let tape = MockTape::default();
        tape.0.lock().unwrap().entries = entries;
        tape
    }

    pub fn position(&self) -> usize {
        self.0.lock().unwrap().position
    }

    pub fn set_position(&self, position: usize) {
        self.0.lock().unwrap().position = position;
    }

    pub fn entries(&self) -> Vec<MockEntry> {
        self.0.lock().unwrap().entries.clone()
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.0.lock().unwrap().read_only = read_only;
    }

    fn step(&self, forward: bool, buf: Option<&mut Vec<u8>>) -> TapeRecord {
        let mut s = self.0.lock().unwrap();
        let index = if forward {
            if s.position >= s.entries.len() {
                return TapeRecord::EndOfTape;
            }
            s.position += 1;
            s.position - 1
        } else {
            if s.position == 0 {
                return TapeRecord::EndOfTape;
            }
            s.position -= 1;
            s.position
        };
        match &s.entries[index] {
            MockEntry::Record(data) => {
                if let Some(buf) = buf {
                    *buf = data.clone();
                }
                TapeRecord::Data(data.len() as u32)
            }
            MockEntry::Mark => TapeRecord::TapeMark,
            MockEntry::Bad => TapeRecord::BadTape,
        }
    }

    fn step_file(&self, forward: bool) -> TapeRecord {
        loop {
            match self.step(forward, None) {
                TapeRecord::Data(_) => continue,
                other => return other,
            }
        }
    }

    fn replace_tail(&self, entry: Option<MockEntry>) -> io::Result<()> {
        let mut s = self.0.lock().unwrap();
        if s.read_only {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "write protected"));
        }
        let position = s.position;
        s.entries.truncate(position);
        if let Some(entry) = entry {
            s.entries.push(entry);
            s.position += 1;
        }
        Ok(())
    }
}

impl TapeStorage for MockTape {
    fn open(&mut self, _path: &Path, read_only: bool, _share: ShareMode) -> io::Result<()> {
        let mut s = self.0.lock().unwrap();
        s.open = true;
        s.read_only |= read_only;
        s.position = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.0.lock().unwrap().open = false;
    }

    fn is_open(&self) -> bool {
        self.0.lock().unwrap().open
    }

    fn is_read_only(&self) -> bool {
        self.0.lock().unwrap().read_only
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.set_position(0);
        Ok(())
    }

    fn is_at_bot(&self) -> bool {
        self.position() == 0
    }

    fn is_at_eot(&self) -> bool {
        let s = self.0.lock().unwrap();
        s.position >= s.entries.len()
    }

    fn read_forward_record(&mut self, buf: &mut Vec<u8>) -> io::Result<TapeRecord> {
        Ok(self.step(true, Some(buf)))
    }

    fn read_reverse_record(&mut self, buf: &mut Vec<u8>) -> io::Result<TapeRecord> {
        Ok(self.step(false, Some(buf)))
    }

    fn write_record(&mut self, data: &[u8]) -> io::Result<()> {
        self.replace_tail(Some(MockEntry::Record(data.to_vec())))
    }

    fn write_mark(&mut self) -> io::Result<()> {
        self.replace_tail(Some(MockEntry::Mark))
    }

    fn space_forward_record(&mut self) -> io::Result<TapeRecord> {
        Ok(self.step(true, None))
    }

    fn space_reverse_record(&mut self) -> io::Result<TapeRecord> {
        Ok(self.step(false, None))
    }

    fn space_forward_file(&mut self) -> io::Result<TapeRecord> {
        Ok(self.step_file(true))
    }

    fn space_reverse_file(&mut self) -> io::Result<TapeRecord> {
        Ok(self.step_file(false))
    }

    fn truncate(&mut self) -> io::Result<()> {
        self.replace_tail(None)
    }
}
