use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bus::Bus;
use crate::drive::MAX_UNITS;
use crate::error::{MassbusError, MassbusResult};
use crate::hardware::MassbusInterface;
use crate::storage::ShareMode;

/// Split a unit name like `A3` into its bus and unit number.
pub fn parse_unit_name(name: &str) -> Option<(char, u8)> {
    let mut chars = name.chars();
    let bus = chars.next()?;
    let unit = chars.next()?.to_digit(10)?;
    if chars.next().is_some() || !bus.is_ascii_alphanumeric() || unit >= MAX_UNITS as u32 {
        return None;
    }
    Some((bus.to_ascii_uppercase(), unit as u8))
}

/// Where two attachments are compared: the canonical path when the file
/// exists, the path as given otherwise.
fn identity(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Every bus in the server.
#[derive(Default)]
pub struct BusRegistry {
    buses: Vec<Bus>,
}

impl BusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bus> {
        self.buses.iter()
    }

    /// Add a bus. Names are unique, ignoring case.
    pub fn add(&mut self, bus: Bus) -> MassbusResult<&mut Bus> {
        if self.find(bus.name()).is_some() {
            return Err(MassbusError::DuplicateBus(bus.name()));
        }
        info!("Bus {} ({}) added.", bus.name(), bus.mode().name());
        self.buses.push(bus);
        let i = self.buses.len() - 1;
        Ok(&mut self.buses[i])
    }

    pub fn find(&self, name: char) -> Option<&Bus> {
        let name = name.to_ascii_uppercase();
        self.buses.iter().find(|b| b.name() == name)
    }

    pub fn find_mut(&mut self, name: char) -> Option<&mut Bus> {
        let name = name.to_ascii_uppercase();
        self.buses.iter_mut().find(|b| b.name() == name)
    }

    /// Like `find`, but a missing bus is an error.
    pub fn bus(&self, name: char) -> MassbusResult<&Bus> {
        self.find(name).ok_or_else(|| MassbusError::NoSuchBus(name.to_string()))
    }

    /// The bus driven by this hardware interface.
    pub fn find_by_interface(&self, interface: &Arc<dyn MassbusInterface>) -> Option<&Bus> {
        let wanted = Arc::as_ptr(interface) as *const ();
        self.buses.iter().find(|b| Arc::as_ptr(b.interface()) as *const () == wanted)
    }

    /// Resolve a unit name (`A3`) or alias to its bus and unit. The unit
    /// has to exist.
    pub fn resolve(&self, name: &str) -> MassbusResult<(char, u8)> {
        if let Some((bus, unit)) = parse_unit_name(name) {
            if let Some(b) = self.find(bus) {
                if b.lock()?.get(unit).is_some() {
                    return Ok((bus, unit));
                }
            }
            return Err(MassbusError::NoSuchUnit(name.to_string()));
        }
        for bus in &self.buses {
            let units = bus.lock()?;
            let found = units.iter()
                .find(|d| d.alias().map_or(false, |a| a.eq_ignore_ascii_case(name)));
            if let Some(drive) = found {
                return Ok((bus.name(), drive.unit()));
            }
        }
        Err(MassbusError::NoSuchUnit(name.to_string()))
    }

    /// Check `alias` could be given to unit `owner`: it mustn't look like a
    /// unit name or belong to any other unit.
    pub fn check_alias(&self, alias: &str, owner: (char, u8)) -> MassbusResult<()> {
        if alias.is_empty() || parse_unit_name(alias).is_some() {
            return Err(MassbusError::Config(format!("'{}' cannot be used as an alias", alias)));
        }
        for bus in &self.buses {
            let units = bus.lock()?;
            let clash = units.iter().any(|d| {
                (bus.name(), d.unit()) != owner
                    && d.alias().map_or(false, |a| a.eq_ignore_ascii_case(alias))
            });
            if clash {
                return Err(MassbusError::DuplicateAlias(alias.to_string()));
            }
        }
        Ok(())
    }

    /// Check `path` can be attached to unit `owner` in `share` mode. An
    /// image on another unit blocks it unless both attachments are shared.
    pub fn check_share(&self, path: &Path, share: ShareMode, owner: (char, u8)) -> MassbusResult<()> {
        let wanted = identity(path);
        for bus in &self.buses {
            let units = bus.lock()?;
            for drive in units.iter() {
                if (bus.name(), drive.unit()) == owner {
                    continue;
                }
                let same = drive.image().map_or(false, |p| identity(p) == wanted);
                if same && (share == ShareMode::Exclusive || drive.share_mode() == ShareMode::Exclusive) {
                    return Err(MassbusError::AlreadyInUse(
                        path.display().to_string(), format!("{}{}", bus.name(), drive.unit())));
                }
            }
        }
        debug!("'{}' may be attached {:?}.", path.display(), share);
        Ok(())
    }

    /// Start every bus that isn't already running.
    pub fn start_all(&mut self) -> MassbusResult<()> {
        for bus in self.buses.iter_mut() {
            if !bus.is_running() {
                bus.start()?;
            }
        }
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for bus in self.buses.iter_mut() {
            bus.stop();
        }
    }
}
