//! A single drive position on a bus.
//!
//! Drives come in two variants, disk and tape, that share the `DriveBase`
//! state (unit number, alias, serial number, online and read only flags,
//! attached image). `Drive` dispatches to the right variant by matching.

mod disk;
pub mod disk_protocol;
mod tape;
pub mod tape_protocol;

pub use disk::DiskDrive;
pub use tape::TapeDrive;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::{ControllerFamily, DriveType};
use crate::command::CommandWord;
use crate::error::{MassbusError, MassbusResult};
use crate::hardware::MassbusInterface;
use crate::storage::{DiskImage, DiskStorage, ShareMode, TapeImage, TapeStorage};

pub const MAX_UNITS: u8 = 8;

/// Serial numbers default to this plus the unit number.
const DEFAULT_SERIAL_BASE: u16 = 1000;

/// Storage to put behind a new drive, in place of the default image file.
pub enum Backend {
    Disk(Box<dyn DiskStorage>),
    Tape(Box<dyn TapeStorage>),
}

/// State common to every kind of drive.
pub struct DriveBase {
    unit: u8,
    alias: Option<String>,
    serial: u16,
    online: bool,
    read_only: bool,
    drive_type: &'static DriveType,
    image: Option<PathBuf>,
    share: ShareMode,
    interface: Arc<dyn MassbusInterface>,
}

impl DriveBase {
    fn new(unit: u8, drive_type: &'static DriveType, interface: Arc<dyn MassbusInterface>) -> Self {
        DriveBase {
            unit,
            alias: None,
            serial: DEFAULT_SERIAL_BASE + unit as u16,
            online: false,
            read_only: false,
            drive_type,
            image: None,
            share: ShareMode::Exclusive,
            interface,
        }
    }

    #[inline]
    fn reg(&self, register: u8) -> u16 {
        self.interface.read_register(self.unit, register)
    }

    #[inline]
    fn set_reg(&self, register: u8, value: u16) {
        self.interface.write_register(self.unit, register, value);
    }

    #[inline]
    fn set_bits(&self, register: u8, mask: u16) {
        self.interface.set_bits(self.unit, register, mask);
    }

    #[inline]
    fn clear_bits(&self, register: u8, mask: u16) {
        self.interface.clear_bits(self.unit, register, mask);
    }

    /// Set or clear `mask` according to `on`.
    fn assign_bits(&self, register: u8, mask: u16, on: bool) {
        if on {
            self.set_bits(register, mask);
        } else {
            self.clear_bits(register, mask);
        }
    }

    /// Record a successful open.
    fn attached(&mut self, path: &Path, read_only: bool, share: ShareMode) {
        self.image = Some(path.to_path_buf());
        self.read_only = read_only;
        self.share = share;
    }
}

/// One drive: a disk or a tape formatter.
pub enum Drive {
    Disk(DiskDrive),
    Tape(TapeDrive),
}

impl Drive {
    /// Create a drive of the given type. Without an explicit backend the
    /// drive stores its medium in an image file.
    pub fn new(unit: u8, drive_type: &'static DriveType,
               interface: Arc<dyn MassbusInterface>,
               backend: Option<Backend>) -> MassbusResult<Drive> {
        if unit >= MAX_UNITS {
            return Err(MassbusError::BadUnit(unit));
        }
        let mismatch = || MassbusError::Config(
            format!("storage backend does not suit a {} drive", drive_type.name));
        match drive_type.family {
            ControllerFamily::DiskRp | ControllerFamily::DiskRm => {
                let disk = drive_type.as_disk()?;
                let storage = match backend {
                    None => Box::new(DiskImage::new()),
                    Some(Backend::Disk(storage)) => storage,
                    Some(Backend::Tape(_)) => return Err(mismatch()),
                };
                let base = DriveBase::new(unit, drive_type, interface);
                Ok(Drive::Disk(DiskDrive::new(base, disk, storage)))
            }
            ControllerFamily::TapeTm78 => {
                let tape = drive_type.as_tape()?;
                let storage = match backend {
                    None => Box::new(TapeImage::new()),
                    Some(Backend::Tape(storage)) => storage,
                    Some(Backend::Disk(_)) => return Err(mismatch()),
                };
                let base = DriveBase::new(unit, drive_type, interface);
                Ok(Drive::Tape(TapeDrive::new(base, tape, storage)))
            }
            ControllerFamily::TapeTm03 | ControllerFamily::None => {
                Err(MassbusError::UnsupportedDrive(drive_type.name))
            }
        }
    }

    fn base(&self) -> &DriveBase {
        match self {
            Drive::Disk(d) => &d.base,
            Drive::Tape(t) => &t.base,
        }
    }

    fn base_mut(&mut self) -> &mut DriveBase {
        match self {
            Drive::Disk(d) => &mut d.base,
            Drive::Tape(t) => &mut t.base,
        }
    }

    pub fn unit(&self) -> u8 {
        self.base().unit
    }

    pub fn drive_type(&self) -> &'static DriveType {
        self.base().drive_type
    }

    pub fn family(&self) -> ControllerFamily {
        self.base().drive_type.family
    }

    pub fn alias(&self) -> Option<&str> {
        self.base().alias.as_deref()
    }

    pub fn set_alias(&mut self, alias: Option<String>) {
        self.base_mut().alias = alias;
    }

    pub fn serial(&self) -> u16 {
        self.base().serial
    }

    pub fn is_online(&self) -> bool {
        self.base().online
    }

    pub fn is_read_only(&self) -> bool {
        self.base().read_only
    }

    pub fn is_attached(&self) -> bool {
        self.base().image.is_some()
    }

    pub fn image(&self) -> Option<&Path> {
        self.base().image.as_deref()
    }

    pub fn share_mode(&self) -> ShareMode {
        self.base().share
    }

    pub fn as_disk(&self) -> Option<&DiskDrive> {
        match self {
            Drive::Disk(d) => Some(d),
            Drive::Tape(_) => None,
        }
    }

    pub fn as_disk_mut(&mut self) -> Option<&mut DiskDrive> {
        match self {
            Drive::Disk(d) => Some(d),
            Drive::Tape(_) => None,
        }
    }

    pub fn as_tape(&self) -> Option<&TapeDrive> {
        match self {
            Drive::Tape(t) => Some(t),
            Drive::Disk(_) => None,
        }
    }

    /// Open an image. The drive stays offline; the read only flag ends up
    /// as whatever access the backend actually granted.
    pub fn attach(&mut self, path: &Path, read_only: bool, share: ShareMode) -> MassbusResult<()> {
        match self {
            Drive::Disk(d) => d.attach(path, read_only, share),
            Drive::Tape(t) => t.attach(path, read_only, share),
        }
    }

    /// Close the image, going offline first. Does nothing if not attached.
    pub fn detach(&mut self) {
        match self {
            Drive::Disk(d) => d.detach(),
            Drive::Tape(t) => t.detach(),
        }
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        match self {
            Drive::Disk(d) => d.set_read_only(read_only),
            Drive::Tape(t) => t.set_read_only(read_only),
        }
    }

    pub fn set_serial(&mut self, serial: u16) {
        match self {
            Drive::Disk(d) => d.set_serial(serial),
            Drive::Tape(t) => t.set_serial(serial),
        }
    }

    pub fn go_online(&mut self) -> MassbusResult<()> {
        match self {
            Drive::Disk(d) => d.go_online(),
            Drive::Tape(t) => t.go_online(),
        }
    }

    pub fn go_offline(&mut self) {
        match self {
            Drive::Disk(d) => d.go_offline(),
            Drive::Tape(t) => t.go_offline(),
        }
    }

    /// Reset the protocol registers to their power-on values.
    pub fn clear(&mut self) {
        match self {
            Drive::Disk(d) => d.clear(),
            Drive::Tape(t) => t.clear(),
        }
    }

    /// Rewind a tape at the operator's request.
    pub fn rewind(&mut self) -> MassbusResult<()> {
        match self {
            Drive::Disk(d) => Err(MassbusError::WrongFamily(d.base.drive_type.name, "tape")),
            Drive::Tape(t) => t.rewind_manually(),
        }
    }

    /// Carry out one command from the host.
    pub fn dispatch(&mut self, cmd: CommandWord) -> MassbusResult<()> {
        match self {
            Drive::Disk(d) => d.dispatch(cmd),
            Drive::Tape(t) => t.dispatch(cmd),
        }
    }
}

impl Drop for Drive {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::hardware::{BusMode, InMemoryInterface};
    use crate::storage::{MockDisk, MockTape};

    fn interface(mode: BusMode) -> Arc<dyn MassbusInterface> {
        Arc::new(InMemoryInterface::new(mode))
    }

    #[test]
    fn test_new_picks_variant() {
        let d = Drive::new(1, catalog::find("RM03").unwrap(), interface(BusMode::Disk), None).unwrap();
        assert!(d.as_disk().is_some());
        assert_eq!(d.unit(), 1);
        assert_eq!(d.serial(), 1001);
        assert!(!d.is_attached() && !d.is_online());

        let t = Drive::new(0, catalog::find("TU78").unwrap(), interface(BusMode::Tape), None).unwrap();
        assert!(t.as_tape().is_some());
        assert_eq!(t.family(), ControllerFamily::TapeTm78);
    }

    #[test]
    fn test_new_rejects() {
        let hw = interface(BusMode::Disk);
        assert!(matches!(Drive::new(8, catalog::find("RP06").unwrap(), hw.clone(), None),
                         Err(MassbusError::BadUnit(8))));
        assert!(matches!(Drive::new(0, catalog::find("TU45").unwrap(), hw.clone(), None),
                         Err(MassbusError::UnsupportedDrive("TU45"))));
        assert!(matches!(Drive::new(0, catalog::find("MEIS").unwrap(), hw.clone(), None),
                         Err(MassbusError::UnsupportedDrive("MEIS"))));
        let backend = Backend::Tape(Box::new(MockTape::default()));
        assert!(matches!(Drive::new(0, catalog::find("RP06").unwrap(), hw.clone(), Some(backend)),
                         Err(MassbusError::Config(_))));
        let (disk, _) = MockDisk::new();
        assert!(matches!(Drive::new(0, catalog::find("TU78").unwrap(), hw, Some(Backend::Disk(Box::new(disk)))),
                         Err(MassbusError::Config(_))));
    }

    #[test]
    fn test_attach_read_only_backend_wins() {
        let (disk, _) = MockDisk::read_only();
        let mut d = Drive::new(0, catalog::find("RP06").unwrap(), interface(BusMode::Disk),
                               Some(Backend::Disk(Box::new(disk)))).unwrap();
        d.attach(Path::new("pack.dsk"), false, ShareMode::Exclusive).unwrap();
        assert!(d.is_read_only());
        assert!(!d.is_online());
        assert_eq!(d.image(), Some(Path::new("pack.dsk")));
    }

    #[test]
    fn test_attach_read_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.dsk");
        std::fs::write(&path, [0u8; 1024]).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        for kind in ["RP06", "TU78"] {
            let mode = if kind == "RP06" { BusMode::Disk } else { BusMode::Tape };
            let mut d = Drive::new(0, catalog::find(kind).unwrap(), interface(mode), None).unwrap();
            d.attach(&path, false, ShareMode::Shared).unwrap();
            assert!(d.is_read_only(), "{}", kind);
        }
    }

    #[test]
    fn test_attach_failure_leaves_state() {
        let (disk, _) = MockDisk::failing_open();
        let mut d = Drive::new(0, catalog::find("RP06").unwrap(), interface(BusMode::Disk),
                               Some(Backend::Disk(Box::new(disk)))).unwrap();
        assert!(matches!(d.attach(Path::new("x"), false, ShareMode::Exclusive),
                         Err(MassbusError::Attach { .. })));
        assert!(!d.is_attached());
        assert!(d.go_online().is_err());
        assert!(!d.is_online());
    }

    #[test]
    fn test_detach_goes_offline_first() {
        let (disk, log) = MockDisk::new();
        let mut d = Drive::new(0, catalog::find("RP06").unwrap(), interface(BusMode::Disk),
                               Some(Backend::Disk(Box::new(disk)))).unwrap();
        d.attach(Path::new("x"), false, ShareMode::Exclusive).unwrap();
        d.go_online().unwrap();
        d.detach();
        assert!(!d.is_online() && !d.is_attached());
        d.detach();
        assert_eq!(log.calls().iter().filter(|c| **c == crate::storage::DiskCall::Close).count(), 1);
    }
}
