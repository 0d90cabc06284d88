//! Server configuration, written as compact strings so it can come straight
//! off the command line:
//!
//! - bus: `A:disk`, `B:tape`, `N:network`
//! - unit: `A0=RP06[,alias=DSK0][,serial=1234][,16bit|18bit]`
//! - attachment: `A0=/path/image[,ro][,shared][,offline]`, where the unit
//!   may also be given by alias

use std::path::PathBuf;
use std::str::FromStr;

use crate::catalog::{self, DriveType};
use crate::error::{MassbusError, MassbusResult};
use crate::hardware::BusMode;
use crate::registry::parse_unit_name;
use crate::storage::ShareMode;

/// Largest serial number that fits the four BCD digits of the register.
pub const MAX_SERIAL: u16 = 9999;

fn bad(what: &str, text: &str) -> MassbusError {
    MassbusError::Config(format!("bad {} '{}'", what, text))
}

/// Split `NAME=REST` or `NAME:REST`.
fn split_once<'a>(text: &'a str, sep: char, what: &str) -> MassbusResult<(&'a str, &'a str)> {
    match text.split_once(sep) {
        Some((name, rest)) if !name.is_empty() && !rest.is_empty() => Ok((name.trim(), rest.trim())),
        _ => Err(bad(what, text)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSpec {
    pub name: char,
    pub mode: BusMode,
}

impl FromStr for BusSpec {
    type Err = MassbusError;

    fn from_str(s: &str) -> MassbusResult<Self> {
        let (name, mode) = split_once(s, ':', "bus")?;
        let mut chars = name.chars();
        let name = match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphanumeric() => c.to_ascii_uppercase(),
            _ => return Err(bad("bus name", name)),
        };
        let mode = match mode.to_ascii_lowercase().as_str() {
            "disk" => BusMode::Disk,
            "tape" => BusMode::Tape,
            "network" => BusMode::Network,
            _ => return Err(bad("bus mode", mode)),
        };
        Ok(BusSpec { name, mode })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    pub bus: char,
    pub unit: u8,
    pub drive_type: &'static DriveType,
    pub alias: Option<String>,
    pub serial: Option<u16>,
    /// `Some(true)` for 18 bit words; disks only.
    pub width_18: Option<bool>,
}

impl FromStr for UnitSpec {
    type Err = MassbusError;

    fn from_str(s: &str) -> MassbusResult<Self> {
        let (target, rest) = split_once(s, '=', "unit")?;
        let (bus, unit) = parse_unit_name(target).ok_or_else(|| bad("unit name", target))?;
        let mut options = rest.split(',').map(str::trim);
        let drive_type = catalog::find(options.next().unwrap_or_default())?;
        let mut spec = UnitSpec { bus, unit, drive_type, alias: None, serial: None, width_18: None };
        for option in options {
            match option.split_once('=') {
                Some(("alias", alias)) if !alias.is_empty() => spec.alias = Some(alias.to_string()),
                Some(("serial", serial)) => {
                    let serial = serial.parse::<u16>().ok()
                        .filter(|n| *n <= MAX_SERIAL)
                        .ok_or_else(|| bad("serial number", serial))?;
                    spec.serial = Some(serial);
                }
                None if option.eq_ignore_ascii_case("16bit") => spec.width_18 = Some(false),
                None if option.eq_ignore_ascii_case("18bit") => spec.width_18 = Some(true),
                _ => return Err(bad("unit option", option)),
            }
        }
        if spec.width_18.is_some() && !drive_type.family.is_disk() {
            return Err(MassbusError::WrongFamily(drive_type.name, "disk"));
        }
        Ok(spec)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachSpec {
    /// Unit name or alias.
    pub target: String,
    pub path: PathBuf,
    pub read_only: bool,
    pub share: ShareMode,
    /// Bring the unit online once attached.
    pub online: bool,
}

impl FromStr for AttachSpec {
    type Err = MassbusError;

    fn from_str(s: &str) -> MassbusResult<Self> {
        let (target, rest) = split_once(s, '=', "attachment")?;
        let mut spec = AttachSpec {
            target: target.to_string(),
            path: PathBuf::new(),
            read_only: false,
            share: ShareMode::Exclusive,
            online: true,
        };
        // Options come off the end, so the path itself may contain commas.
        let mut parts: Vec<&str> = rest.split(',').collect();
        while parts.len() > 1 {
            let option = parts[parts.len() - 1].trim().to_ascii_lowercase();
            match option.as_str() {
                "ro" => spec.read_only = true,
                "shared" => spec.share = ShareMode::Shared,
                "offline" => spec.online = false,
                _ => break,
            }
            parts.pop();
        }
        let path = parts.join(",");
        if path.trim().is_empty() {
            return Err(bad("attachment", s));
        }
        spec.path = PathBuf::from(path.trim());
        Ok(spec)
    }
}

/// Everything needed to set up a server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub buses: Vec<BusSpec>,
    pub units: Vec<UnitSpec>,
    pub attachments: Vec<AttachSpec>,
}

impl Config {
    /// Parse each list of strings.
    pub fn parse<'a>(buses: impl IntoIterator<Item = &'a str>,
                     units: impl IntoIterator<Item = &'a str>,
                     attachments: impl IntoIterator<Item = &'a str>) -> MassbusResult<Config> {
        Ok(Config {
            buses: buses.into_iter().map(str::parse).collect::<Result<_, _>>()?,
            units: units.into_iter().map(str::parse).collect::<Result<_, _>>()?,
            attachments: attachments.into_iter().map(str::parse).collect::<Result<_, _>>()?,
        })
    }
}
