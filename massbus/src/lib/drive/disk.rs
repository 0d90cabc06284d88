use log::{debug, info, trace, warn};
use std::path::Path;

use massbus_utils::read_le::ReadLE;
use massbus_utils::words::{join_halves, split_word};
use massbus_utils::write_le::WriteLE;

use super::DriveBase;
use super::disk_protocol::*;
use crate::catalog::{Chs, DiskType, Geometry};
use crate::command::CommandWord;
use crate::error::{MassbusError, MassbusResult};
use crate::storage::{DiskStorage, ShareMode};

/// Backing bytes per sector with 18 bit words (128 36-bit words, 8 bytes each).
const SECTOR_BYTES_18: usize = 1024;
/// Backing bytes per sector with 16 bit words (256 words, 2 bytes each).
const SECTOR_BYTES_16: usize = 512;

/// An RP or RM disk drive.
pub struct DiskDrive {
    pub(super) base: DriveBase,
    disk: DiskType,
    storage: Box<dyn DiskStorage>,
    width_18: bool,
}

impl DiskDrive {
    pub(super) fn new(base: DriveBase, disk: DiskType, mut storage: Box<dyn DiskStorage>) -> Self {
        storage.set_sector_size(SECTOR_BYTES_18);
        let mut drive = DiskDrive {
            base,
            disk,
            storage,
            width_18: true,
        };
        drive.clear();
        drive
    }

    pub fn geometry(&self) -> Geometry {
        self.disk.geometry
    }

    pub fn is_18_bit(&self) -> bool {
        self.width_18
    }

    /// Bytes of backing storage per sector at the current word width.
    pub fn sector_bytes(&self) -> usize {
        if self.width_18 { SECTOR_BYTES_18 } else { SECTOR_BYTES_16 }
    }

    /// Switch between 18 and 16 bit words. The number of sectors per track
    /// changes with the width, so the geometry is announced again.
    pub fn set_word_width(&mut self, width_18: bool) {
        if width_18 == self.width_18 {
            return;
        }
        self.width_18 = width_18;
        self.storage.set_sector_size(self.sector_bytes());
        self.base.assign_bits(REG_OF, OF_FMT22, width_18);
        self.announce_geometry();
        debug!("Unit {} now uses {} bit words.", self.base.unit, if width_18 { 18 } else { 16 });
    }

    fn announce_geometry(&self) {
        let g = self.disk.geometry;
        self.base.interface.announce_geometry(
            self.base.unit, g.cylinders, g.heads, g.sectors(self.width_18));
    }

    pub(super) fn attach(&mut self, path: &Path, read_only: bool, share: ShareMode) -> MassbusResult<()> {
        if self.base.image.is_some() {
            self.detach();
        }
        self.storage.open(path, read_only, share)
            .map_err(|source| MassbusError::Attach { path: path.display().to_string(), source })?;
        let granted = self.storage.is_read_only();
        self.base.attached(path, granted, share);
        self.clear();
        info!("Unit {} ({}) attached to '{}'{}.", self.base.unit, self.base.drive_type.name,
              path.display(), if granted { " read only" } else { "" });
        Ok(())
    }

    pub(super) fn detach(&mut self) {
        if self.base.image.is_none() {
            return;
        }
        if self.base.online {
            self.go_offline();
        }
        self.storage.close();
        self.base.image = None;
        info!("Unit {} detached.", self.base.unit);
    }

    pub(super) fn set_read_only(&mut self, read_only: bool) {
        if read_only == self.base.read_only {
            return;
        }
        self.base.read_only = read_only;
        self.base.assign_bits(REG_DS, DS_WRL, read_only);
    }

    pub(super) fn set_serial(&mut self, serial: u16) {
        self.base.serial = serial;
        self.base.set_reg(REG_SN, serial);
    }

    pub(super) fn go_online(&mut self) -> MassbusResult<()> {
        if self.base.image.is_none() {
            return Err(MassbusError::NotAttached(format!("unit {}", self.base.unit)));
        }
        // Volume valid waits for a pack acknowledge from the host. The
        // hardware raises attention when it sees MOL change.
        self.base.online = true;
        self.base.set_bits(REG_DS, DS_MOL);
        info!("Unit {} online.", self.base.unit);
        Ok(())
    }

    pub(super) fn go_offline(&mut self) {
        self.base.online = false;
        self.base.clear_bits(REG_DS, DS_MOL | DS_VV);
        info!("Unit {} offline.", self.base.unit);
    }

    /// Reset the registers to power-on values. This leaves the drive
    /// offline, so it must only be used before spinning up.
    pub(super) fn clear(&mut self) {
        let b = &self.base;
        let mut status = DS_DRY;
        if b.read_only {
            status |= DS_WRL;
        }
        b.set_reg(REG_DS, status);
        b.set_reg(REG_ER1, 0);
        b.set_reg(REG_ER2, 0);
        b.set_reg(REG_ER3, 0);
        b.set_reg(REG_SN, b.serial);
        b.set_reg(REG_DT, b.drive_type.type_code);
        b.set_reg(REG_OF, if self.width_18 { OF_FMT22 } else { 0 });
        self.announce_geometry();
        self.base.online = false;
    }

    pub(super) fn dispatch(&mut self, cmd: CommandWord) -> MassbusResult<()> {
        trace!("Unit {}: {:?}", self.base.unit, cmd);
        if cmd.register() != REG_CS1 {
            return Err(MassbusError::Protocol(
                format!("unit {}: command through register {:02o}", self.base.unit, cmd.register())));
        }
        match cmd.function() {
            FN_NOP | FN_RELEASE => Ok(()),
            FN_SEEK | FN_OFFSET | FN_RETURN_TO_CENTERLINE | FN_SEARCH => {
                self.base.set_reg(REG_CC, self.base.reg(REG_DC));
                self.base.set_bits(REG_DS, DS_ATA);
                Ok(())
            }
            FN_RECALIBRATE => {
                self.base.set_reg(REG_CC, 0);
                self.base.set_bits(REG_DS, DS_ATA);
                Ok(())
            }
            FN_DRIVE_CLEAR => {
                self.base.set_reg(REG_ER1, 0);
                self.base.set_reg(REG_ER2, 0);
                self.base.set_reg(REG_ER3, 0);
                self.base.clear_bits(REG_DS, DS_ATA | DS_ERR);
                Ok(())
            }
            FN_PACK_ACK => {
                self.base.set_bits(REG_DS, DS_VV);
                Ok(())
            }
            FN_READ_IN_PRESET => {
                self.base.set_reg(REG_DA, 0);
                self.base.set_reg(REG_DC, 0);
                self.base.set_bits(REG_DS, DS_VV);
                Ok(())
            }
            FN_UNLOAD => {
                self.go_offline();
                Ok(())
            }
            FN_READ | FN_READ_HEADER | FN_WRITE_CHECK | FN_WRITE_CHECK_HEADER => self.read(),
            FN_WRITE | FN_WRITE_HEADER => self.write(),
            other => {
                self.base.set_bits(REG_ER1, ER1_ILF);
                self.base.set_bits(REG_DS, DS_ERR | DS_ATA);
                Err(MassbusError::Protocol(
                    format!("unit {}: illegal function {:02o}", self.base.unit, other)))
            }
        }
    }

    /// The address in DC and DA.
    fn desired_address(&self) -> Chs {
        let da = self.base.reg(REG_DA);
        Chs {
            cylinder: self.base.reg(REG_DC),
            head: da >> 8,
            sector: da & 0xFF,
        }
    }

    /// Resolve the desired address, failing the transfer if it's off the pack.
    fn target(&mut self) -> MassbusResult<(Chs, u32)> {
        let chs = self.desired_address();
        match self.disk.geometry.chs_to_lba(chs, self.width_18) {
            Some(lba) => Ok((chs, lba)),
            None => {
                self.base.set_bits(REG_ER1, ER1_IAE);
                self.base.set_bits(REG_DS, DS_ERR);
                Err(self.fail(MassbusError::InvalidAddress(chs.cylinder, chs.head, chs.sector)))
            }
        }
    }

    /// Take the drive offline after a transfer error.
    fn fail(&mut self, err: MassbusError) -> MassbusError {
        warn!("Unit {}: {}; going offline.", self.base.unit, err);
        self.go_offline();
        err
    }

    fn read(&mut self) -> MassbusResult<()> {
        let (chs, lba) = self.target()?;
        let mut buf = vec![0; self.sector_bytes()];
        if let Err(e) = self.storage.read_sector(lba, &mut buf) {
            return Err(self.fail(e.into()));
        }
        let words = match self.unpack(&buf) {
            Ok(words) => words,
            Err(e) => return Err(self.fail(e.into())),
        };
        if let Err(e) = self.base.interface.write_data(&words, false) {
            return Err(self.fail(e.into()));
        }
        trace!("Unit {}: read {} (block {}).", self.base.unit, chs, lba);
        self.advance(chs);
        Ok(())
    }

    fn write(&mut self) -> MassbusResult<()> {
        let (chs, lba) = self.target()?;
        let words = match self.base.interface.read_data(SECTOR_WORDS) {
            Ok(words) => words,
            Err(e) => return Err(self.fail(e.into())),
        };
        if self.base.read_only {
            self.base.set_bits(REG_ER1, ER1_WLE);
            self.base.set_bits(REG_DS, DS_ERR);
            return Err(self.fail(MassbusError::WriteLocked(self.base.unit)));
        }
        let buf = match self.pack(&words) {
            Ok(buf) => buf,
            Err(e) => return Err(self.fail(e.into())),
        };
        if let Err(e) = self.storage.write_sector(lba, &buf) {
            return Err(self.fail(e.into()));
        }
        trace!("Unit {}: wrote {} (block {}).", self.base.unit, chs, lba);
        self.advance(chs);
        Ok(())
    }

    /// Backing bytes to bus words. An 18 bit sector holds 36-bit words,
    /// sent left half first; a 16 bit sector holds one bus word per entry.
    fn unpack(&self, mut buf: &[u8]) -> std::io::Result<Vec<u32>> {
        let mut words = Vec::with_capacity(SECTOR_WORDS);
        if self.width_18 {
            for _ in 0..SECTOR_WORDS / 2 {
                let (left, right) = split_word(buf.read_le_u64()?);
                words.push(left);
                words.push(right);
            }
        } else {
            for _ in 0..SECTOR_WORDS {
                words.push(buf.read_le_u16()? as u32);
            }
        }
        Ok(words)
    }

    fn pack(&self, words: &[u32]) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.sector_bytes());
        if self.width_18 {
            for pair in words.chunks(2) {
                buf.write_le_u64(join_halves(pair[0], pair.get(1).copied().unwrap_or(0)))?;
            }
        } else {
            for word in words {
                buf.write_le_u16(*word as u16)?;
            }
        }
        Ok(buf)
    }

    /// Step the desired address to the sector after `chs`.
    fn advance(&self, chs: Chs) {
        let g = self.disk.geometry;
        let mut next = chs;
        next.sector += 1;
        if next.sector >= g.sectors(self.width_18) {
            next.sector = 0;
            next.head += 1;
            if next.head >= g.heads {
                next.head = 0;
                next.cylinder += 1;
            }
        }
        self.base.set_reg(REG_DA, next.head << 8 | next.sector);
        self.base.set_reg(REG_DC, next.cylinder);
        self.base.set_reg(REG_CC, next.cylinder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use ntest::timeout;
    use rand::RngCore;

    use crate::catalog;
    use crate::hardware::{BusMode, InMemoryInterface, MassbusInterface};
    use crate::storage::{DiskCall, DiskImage, MockDisk, MockDiskLog};

    const UNIT: u8 = 2;

    struct DiskFixture {
        hw: Arc<InMemoryInterface>,
        drive: DiskDrive,
        log: MockDiskLog,
    }

    impl DiskFixture {
        fn with_disk(kind: &str, disk: MockDisk, log: MockDiskLog) -> Self {
            crate::init_test_logging();
            let hw = Arc::new(InMemoryInterface::with_fifo(
                BusMode::Disk, usize::MAX, Duration::from_millis(20)));
            let drive_type = catalog::find(kind).unwrap();
            let base = DriveBase::new(UNIT, drive_type, hw.clone());
            let drive = DiskDrive::new(base, drive_type.as_disk().unwrap(), Box::new(disk));
            DiskFixture { hw, drive, log }
        }

        fn new(kind: &str) -> Self {
            let (disk, log) = MockDisk::new();
            Self::with_disk(kind, disk, log)
        }

        /// Attached and online.
        fn online(kind: &str) -> Self {
            let mut fixture = Self::new(kind);
            fixture.drive.attach(Path::new("pack"), false, ShareMode::Exclusive).unwrap();
            fixture.drive.go_online().unwrap();
            fixture
        }

        fn reg(&self, register: u8) -> u16 {
            self.hw.read_register(UNIT, register)
        }

        fn address(&self, cylinder: u16, head: u16, sector: u16) {
            self.hw.write_register(UNIT, REG_DC, cylinder);
            self.hw.write_register(UNIT, REG_DA, head << 8 | sector);
        }

        fn command(&mut self, function: u8) -> MassbusResult<()> {
            self.drive.dispatch(CommandWord::new(UNIT, REG_CS1, function))
        }
    }

    #[test]
    fn test_sector_bytes_follow_width() {
        let mut f = DiskFixture::new("RP06");
        f.drive.set_word_width(true);
        assert_eq!(f.drive.sector_bytes(), 1024);
        f.drive.set_word_width(false);
        assert_eq!(f.drive.sector_bytes(), 512);
        assert_eq!(f.reg(REG_OF) & OF_FMT22, 0);
        assert_eq!(f.hw.geometry(UNIT), Some((815, 19, 22)));
        f.drive.set_word_width(true);
        assert_eq!(f.reg(REG_OF) & OF_FMT22, OF_FMT22);
        assert_eq!(f.hw.geometry(UNIT), Some((815, 19, 20)));
        let sizes: Vec<_> = f.log.calls().into_iter()
            .filter_map(|c| if let DiskCall::SectorSize(n) = c { Some(n) } else { None })
            .collect();
        assert_eq!(sizes, vec![1024, 512, 1024]);
    }

    #[test]
    fn test_clear_sets_identity() {
        let mut f = DiskFixture::new("RM05");
        f.drive.set_serial(4321);
        f.drive.clear();
        assert_eq!(f.reg(REG_DT), 0o020027);
        assert_eq!(f.reg(REG_SN), 4321);
        assert_eq!(f.reg(REG_DS), DS_DRY);
        assert_eq!(f.reg(REG_OF), OF_FMT22);
        assert!(!f.drive.base.online);
    }

    #[test]
    fn test_online_offline_bits() {
        let mut f = DiskFixture::new("RP06");
        assert!(f.drive.go_online().is_err());
        f.drive.attach(Path::new("pack"), false, ShareMode::Shared).unwrap();
        f.drive.go_online().unwrap();
        assert_eq!(f.reg(REG_DS) & (DS_MOL | DS_VV), DS_MOL);
        f.command(FN_PACK_ACK).unwrap();
        assert_eq!(f.reg(REG_DS) & (DS_MOL | DS_VV), DS_MOL | DS_VV);
        f.drive.go_offline();
        assert_eq!(f.reg(REG_DS) & (DS_MOL | DS_VV), 0);
    }

    #[test]
    fn test_read_only_sets_write_lock() {
        let mut f = DiskFixture::new("RP06");
        f.drive.set_read_only(true);
        assert_ne!(f.reg(REG_DS) & DS_WRL, 0);
        f.drive.set_read_only(false);
        assert_eq!(f.reg(REG_DS) & DS_WRL, 0);
    }

    #[test]
    #[timeout(1000)]
    fn test_read_16_bit_first_sector() {
        let mut f = DiskFixture::online("RP06");
        f.drive.set_word_width(false);
        f.address(0, 0, 0);
        f.command(FN_READ).unwrap();
        assert_eq!(f.log.reads(), vec![0]);
        assert!(f.drive.base.online);
        let transfers = f.hw.take_transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].words, vec![0; SECTOR_WORDS]);
        assert!(!transfers[0].exception);
    }

    #[test]
    #[timeout(1000)]
    fn test_read_18_bit_packs_halves() {
        let mut f = DiskFixture::online("RP06");
        // Cylinder 1, head 2, sector 3 at 20 sectors per track.
        f.address(1, 2, 3);
        f.command(FN_READ).unwrap();
        let lba = (19 + 2) * 20 + 3;
        assert_eq!(f.log.reads(), vec![lba]);
        let (left, right) = split_word(u64::from_le_bytes([lba as u8; 8]));
        let words = &f.hw.take_transfers()[0].words;
        assert_eq!(words.len(), SECTOR_WORDS);
        assert!(words.chunks(2).all(|p| p == [left, right]));
        // The desired address moves on to the next sector.
        assert_eq!(f.reg(REG_DA), 2 << 8 | 4);
        assert_eq!(f.reg(REG_DC), 1);
    }

    #[test]
    #[timeout(1000)]
    fn test_read_past_last_cylinder() {
        let mut f = DiskFixture::online("RP06");
        for cylinder in [815, 1000] {
            f.address(cylinder, 0, 0);
            assert!(matches!(f.command(FN_READ), Err(MassbusError::InvalidAddress(..))));
            assert!(!f.drive.base.online);
            assert_ne!(f.reg(REG_ER1) & ER1_IAE, 0);
            f.drive.go_online().unwrap();
        }
        assert!(f.log.reads().is_empty());
    }

    #[test]
    #[timeout(1000)]
    fn test_bad_head_and_sector() {
        let mut f = DiskFixture::online("RM03");
        f.address(0, 5, 0);
        assert!(f.command(FN_READ).is_err());
        f.drive.go_online().unwrap();
        f.address(0, 0, 30);
        assert!(f.command(FN_READ).is_err());
        assert!(f.log.reads().is_empty());
        // 16 bit tracks are longer.
        f.drive.go_online().unwrap();
        f.drive.set_word_width(false);
        f.command(FN_READ).unwrap();
    }

    #[test]
    #[timeout(1000)]
    fn test_io_failure_goes_offline() {
        let (disk, log) = MockDisk::failing_io();
        let mut f = DiskFixture::with_disk("RP06", disk, log);
        f.drive.attach(Path::new("pack"), false, ShareMode::Exclusive).unwrap();
        f.drive.go_online().unwrap();
        assert!(matches!(f.command(FN_READ), Err(MassbusError::Io(_))));
        assert!(!f.drive.base.online);
        assert!(f.hw.take_transfers().is_empty());
    }

    #[test]
    #[timeout(1000)]
    fn test_write_16_bit() {
        let mut f = DiskFixture::online("RP06");
        f.drive.set_word_width(false);
        let words: Vec<u32> = (0..SECTOR_WORDS as u32).map(|w| 0o600000 | w).collect();
        f.hw.supply_data(&words);
        f.address(0, 0, 21);
        f.command(FN_WRITE).unwrap();
        let writes = f.log.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, 21);
        assert_eq!(writes[0].1.len(), 512);
        assert_eq!(&writes[0].1[2..4], &1u16.to_le_bytes());
        // Sector 21 was the last on the track.
        assert_eq!(f.reg(REG_DA), 1 << 8);
    }

    #[test]
    #[timeout(1000)]
    fn test_write_read_only_fails_after_data() {
        let (disk, log) = MockDisk::read_only();
        let mut f = DiskFixture::with_disk("RP06", disk, log);
        f.drive.attach(Path::new("pack"), false, ShareMode::Exclusive).unwrap();
        f.drive.go_online().unwrap();
        f.hw.supply_data(&[0; SECTOR_WORDS]);
        assert!(matches!(f.command(FN_WRITE), Err(MassbusError::WriteLocked(UNIT))));
        assert_eq!(f.hw.unread_data(), 0);
        assert!(f.log.writes().is_empty());
        assert!(!f.drive.base.online);
    }

    #[test]
    #[timeout(1000)]
    fn test_write_fifo_starved() {
        let mut f = DiskFixture::online("RP06");
        f.hw.supply_data(&[1, 2, 3]);
        assert!(matches!(f.command(FN_WRITE), Err(MassbusError::Fifo(_))));
        assert!(!f.drive.base.online);
        assert!(f.log.writes().is_empty());
    }

    #[test]
    fn test_positioning_and_housekeeping() {
        let mut f = DiskFixture::online("RP06");
        f.hw.write_register(UNIT, REG_DC, 77);
        f.command(FN_SEEK).unwrap();
        assert_eq!(f.reg(REG_CC), 77);
        f.command(FN_RECALIBRATE).unwrap();
        assert_eq!(f.reg(REG_CC), 0);
        assert_ne!(f.reg(REG_DS) & DS_ATA, 0);
        f.command(FN_DRIVE_CLEAR).unwrap();
        assert_eq!(f.reg(REG_DS) & (DS_ATA | DS_ERR), 0);
        f.command(FN_READ_IN_PRESET).unwrap();
        assert_eq!((f.reg(REG_DC), f.reg(REG_DA)), (0, 0));
        f.command(FN_UNLOAD).unwrap();
        assert!(!f.drive.base.online);
    }

    #[test]
    fn test_illegal_function() {
        let mut f = DiskFixture::online("RP06");
        assert!(matches!(f.command(0o45), Err(MassbusError::Protocol(_))));
        assert_ne!(f.reg(REG_ER1) & ER1_ILF, 0);
        assert!(matches!(f.drive.dispatch(CommandWord::new(UNIT, REG_DA, FN_READ)),
                         Err(MassbusError::Protocol(_))));
        assert!(f.log.reads().is_empty());
    }

    #[test]
    #[timeout(2000)]
    fn test_image_round_trip() {
        crate::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rm03.dsk");
        let hw = Arc::new(InMemoryInterface::new(BusMode::Disk));
        let drive_type = catalog::find("RM03").unwrap();
        let base = DriveBase::new(0, drive_type, hw.clone());
        let mut drive = DiskDrive::new(base, drive_type.as_disk().unwrap(), Box::new(DiskImage::new()));
        drive.attach(&path, false, ShareMode::Exclusive).unwrap();
        drive.go_online().unwrap();

        let mut rng = rand::thread_rng();
        let words: Vec<u32> = (0..SECTOR_WORDS).map(|_| rng.next_u32() & 0o777777).collect();
        hw.write_register(0, REG_DC, 3);
        hw.write_register(0, REG_DA, 1 << 8 | 7);
        hw.supply_data(&words);
        drive.dispatch(CommandWord::new(0, REG_CS1, FN_WRITE)).unwrap();

        hw.write_register(0, REG_DA, 1 << 8 | 7);
        drive.dispatch(CommandWord::new(0, REG_CS1, FN_READ)).unwrap();
        assert_eq!(hw.take_transfers()[0].words, words);
        assert_eq!(std::fs::metadata(&path).unwrap().len(),
                   ((3 * 5 + 1) * 30 + 8) * 1024);
    }
}
