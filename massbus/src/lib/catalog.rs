//! The table of drive types this server knows how to emulate.
//!
//! Every MASSBUS drive reports its model through the drive type register;
//! for disks the type also fixes the pack geometry. The table is compiled
//! in and never changes at runtime. Entries are looked up by index (the
//! position in `DRIVE_TYPES`) or by name.

use std::fmt;

use crate::error::{MassbusError, MassbusResult};

/// Which controller protocol a drive type speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerFamily {
    /// RP04/05/06/07 moving head disks.
    DiskRp,
    /// RM02/03/05/80 disks.
    DiskRm,
    /// TM02/TM03 formatter tapes (TU45, TU77).
    TapeTm03,
    /// TM78 formatter tapes (TU78).
    TapeTm78,
    /// Not a storage device (e.g. the network interface).
    None,
}

impl ControllerFamily {
    pub fn is_disk(self) -> bool {
        matches!(self, ControllerFamily::DiskRp | ControllerFamily::DiskRm)
    }

    pub fn is_tape(self) -> bool {
        matches!(self, ControllerFamily::TapeTm03 | ControllerFamily::TapeTm78)
    }
}

/// Disk pack geometry. The number of sectors per track depends on whether
/// the drive is formatted for 16 or 18 bit words; heads and cylinders
/// don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub cylinders: u16,
    pub heads: u16,
    pub sectors_16: u16,
    pub sectors_18: u16,
}

/// A cylinder/head/sector disk address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chs {
    pub cylinder: u16,
    pub head: u16,
    pub sector: u16,
}

impl fmt::Display for Chs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cylinder, self.head, self.sector)
    }
}

impl Geometry {
    /// Sectors per track for the given word width.
    #[inline]
    pub fn sectors(&self, width_18: bool) -> u16 {
        if width_18 { self.sectors_18 } else { self.sectors_16 }
    }

    /// Total sectors on the pack for the given word width.
    pub fn total_sectors(&self, width_18: bool) -> u32 {
        self.cylinders as u32 * self.heads as u32 * self.sectors(width_18) as u32
    }

    /// Convert a C/H/S address to a linear block address, or `None` if any
    /// component is out of range for this geometry.
    pub fn chs_to_lba(&self, chs: Chs, width_18: bool) -> Option<u32> {
        let sectors = self.sectors(width_18);
        if chs.cylinder >= self.cylinders || chs.head >= self.heads || chs.sector >= sectors {
            return None;
        }
        Some((chs.cylinder as u32 * self.heads as u32 + chs.head as u32) * sectors as u32
             + chs.sector as u32)
    }

    /// The exact inverse of `chs_to_lba`. Returns `None` for a block
    /// address past the end of the pack.
    pub fn lba_to_chs(&self, lba: u32, width_18: bool) -> Option<Chs> {
        let sectors = self.sectors(width_18) as u32;
        let heads = self.heads as u32;
        if sectors == 0 || heads == 0 {
            return None;
        }
        let cylinder = lba / sectors / heads;
        if cylinder >= self.cylinders as u32 {
            return None;
        }
        Some(Chs {
            cylinder: cylinder as u16,
            head: (lba / sectors % heads) as u16,
            sector: (lba % sectors) as u16,
        })
    }
}

/// One row of the drive type table.
#[derive(Debug, PartialEq, Eq)]
pub struct DriveType {
    pub name: &'static str,
    /// Value presented in the drive type register.
    pub type_code: u16,
    pub family: ControllerFamily,
    /// Present for disk types only.
    pub geometry: Option<Geometry>,
}

/// A drive type known to be a disk.
#[derive(Debug, Clone, Copy)]
pub struct DiskType {
    pub descriptor: &'static DriveType,
    pub geometry: Geometry,
}

/// A drive type known to be a tape formatter.
#[derive(Debug, Clone, Copy)]
pub struct TapeType {
    pub descriptor: &'static DriveType,
}

const fn disk(name: &'static str, type_code: u16, family: ControllerFamily,
              cylinders: u16, heads: u16, sectors_16: u16, sectors_18: u16) -> DriveType {
    DriveType {
        name,
        type_code,
        family,
        geometry: Some(Geometry { cylinders, heads, sectors_16, sectors_18 }),
    }
}

const fn other(name: &'static str, type_code: u16, family: ControllerFamily) -> DriveType {
    DriveType { name, type_code, family, geometry: None }
}

type F = ControllerFamily;

pub static DRIVE_TYPES: [DriveType; 12] = [
    disk("RP04", 0o020020, F::DiskRp, 411, 19, 22, 20),
    disk("RP05", 0o020021, F::DiskRp, 411, 19, 22, 20),
    disk("RP06", 0o020022, F::DiskRp, 815, 19, 22, 20),
    disk("RP07", 0o020042, F::DiskRm, 632, 32, 50, 43),
    disk("RM02", 0o020025, F::DiskRm, 823, 5, 32, 30),
    disk("RM03", 0o020024, F::DiskRm, 823, 5, 32, 30),
    disk("RM05", 0o020027, F::DiskRm, 823, 19, 32, 30),
    disk("RM80", 0o020026, F::DiskRm, 559, 14, 31, 30),
    other("TU45", 0o010052, F::TapeTm03),
    other("TU77", 0o010054, F::TapeTm03),
    other("TU78", 0o142101, F::TapeTm78),
    other("MEIS", 0o000000, F::None),
];

/// Look up a drive type by index. Panics if the index is out of range,
/// since indices only ever come from this table.
pub fn lookup(type_id: usize) -> &'static DriveType {
    match DRIVE_TYPES.get(type_id) {
        Some(t) => t,
        None => panic!("drive type index {} out of range", type_id),
    }
}

/// Find a drive type by (case insensitive) name.
pub fn find(name: &str) -> MassbusResult<&'static DriveType> {
    DRIVE_TYPES.iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| MassbusError::UnknownDriveType(name.to_string()))
}

impl DriveType {
    pub fn as_disk(&'static self) -> MassbusResult<DiskType> {
        match (self.family.is_disk(), self.geometry) {
            (true, Some(geometry)) => Ok(DiskType { descriptor: self, geometry }),
            _ => Err(MassbusError::WrongFamily(self.name, "disk")),
        }
    }

    pub fn as_tape(&'static self) -> MassbusResult<TapeType> {
        if self.family.is_tape() {
            Ok(TapeType { descriptor: self })
        } else {
            Err(MassbusError::WrongFamily(self.name, "tape"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rp06() -> Geometry {
        find("rp06").unwrap().as_disk().unwrap().geometry
    }

    #[test]
    fn test_lookup() {
        let t = lookup(2);
        assert_eq!(t.name, "RP06");
        assert_eq!(t.type_code, 0o020022);
        assert!(std::ptr::eq(find("RP06").unwrap(), t));
        assert!(find("RP99").is_err());
    }

    #[test]
    #[should_panic]
    fn test_lookup_out_of_range() {
        lookup(DRIVE_TYPES.len());
    }

    #[test]
    fn test_narrowing() {
        assert!(find("RM05").unwrap().as_disk().is_ok());
        assert!(find("RM05").unwrap().as_tape().is_err());
        assert!(find("TU78").unwrap().as_tape().is_ok());
        assert!(find("TU78").unwrap().as_disk().is_err());
        assert!(find("MEIS").unwrap().as_disk().is_err());
        assert!(find("MEIS").unwrap().as_tape().is_err());
    }

    #[test]
    fn test_disk_table_consistent() {
        for t in DRIVE_TYPES.iter() {
            assert_eq!(t.family.is_disk(), t.geometry.is_some(), "{}", t.name);
        }
    }

    #[test]
    fn test_chs_to_lba() {
        let g = rp06();
        let chs = |cylinder, head, sector| Chs { cylinder, head, sector };
        assert_eq!(g.chs_to_lba(chs(0, 0, 0), true), Some(0));
        assert_eq!(g.chs_to_lba(chs(0, 0, 19), true), Some(19));
        assert_eq!(g.chs_to_lba(chs(0, 1, 0), true), Some(20));
        assert_eq!(g.chs_to_lba(chs(1, 0, 0), true), Some(380));
        assert_eq!(g.chs_to_lba(chs(1, 0, 0), false), Some(418));
        // Sector 20 is only legal in 16 bit mode.
        assert_eq!(g.chs_to_lba(chs(0, 0, 20), true), None);
        assert_eq!(g.chs_to_lba(chs(0, 0, 20), false), Some(20));
        assert_eq!(g.chs_to_lba(chs(0, 0, 22), false), None);
        assert_eq!(g.chs_to_lba(chs(0, 19, 0), true), None);
        assert_eq!(g.chs_to_lba(chs(815, 0, 0), true), None);
        assert_eq!(g.chs_to_lba(chs(814, 18, 19), true),
                   Some(g.total_sectors(true) - 1));
    }

    #[test]
    fn test_chs_round_trip_all_types() {
        for t in DRIVE_TYPES.iter().filter(|t| t.family.is_disk()) {
            let g = t.geometry.unwrap();
            for width_18 in [false, true] {
                // Walk every cylinder, and every head/sector on a few of them.
                for cylinder in 0..g.cylinders {
                    let heads = if cylinder % 97 == 0 { 0..g.heads } else { 0..1 };
                    for head in heads {
                        for sector in 0..g.sectors(width_18) {
                            let chs = Chs { cylinder, head, sector };
                            let lba = g.chs_to_lba(chs, width_18).unwrap();
                            assert_eq!(g.lba_to_chs(lba, width_18), Some(chs), "{} {}", t.name, chs);
                        }
                    }
                }
                assert_eq!(g.lba_to_chs(g.total_sectors(width_18), width_18), None);
            }
        }
    }

    #[test]
    fn test_lba_round_trip_random() {
        let g = rp06();
        for _ in 0..1000 {
            let lba = rand::random::<u32>() % g.total_sectors(false);
            let chs = g.lba_to_chs(lba, false).unwrap();
            assert_eq!(g.chs_to_lba(chs, false), Some(lba));
        }
    }
}
