//! The top-level context: every bus, and the control operations an
//! operator can apply to their drives.

use log::info;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bus::Bus;
use crate::catalog;
use crate::config::{BusSpec, Config, UnitSpec, MAX_SERIAL};
use crate::drive::Drive;
use crate::error::{MassbusError, MassbusResult};
use crate::hardware::MassbusInterface;
use crate::registry::BusRegistry;
use crate::storage::ShareMode;

/// A snapshot of one unit, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: String,
    pub drive_type: &'static str,
    pub alias: Option<String>,
    pub serial: u16,
    pub image: Option<PathBuf>,
    pub online: bool,
    pub read_only: bool,
}

impl UnitStatus {
    fn of(bus: char, drive: &Drive) -> Self {
        UnitStatus {
            name: format!("{}{}", bus, drive.unit()),
            drive_type: drive.drive_type().name,
            alias: drive.alias().map(str::to_string),
            serial: drive.serial(),
            image: drive.image().map(Path::to_path_buf),
            online: drive.is_online(),
            read_only: drive.is_read_only(),
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<3} {:<5} {:<8} SN {:04} ", self.name, self.drive_type,
               self.alias.as_deref().unwrap_or("-"), self.serial)?;
        match &self.image {
            None => write!(f, "not attached"),
            Some(path) => write!(f, "{} {}{}", if self.online { "online " } else { "offline" },
                                 path.display(), if self.read_only { " (ro)" } else { "" }),
        }
    }
}

#[derive(Default)]
pub struct Server {
    registry: BusRegistry,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &BusRegistry {
        &self.registry
    }

    pub fn add_bus(&mut self, name: char, interface: Arc<dyn MassbusInterface>) -> MassbusResult<()> {
        self.registry.add(Bus::new(name, interface)).map(|_| ())
    }

    /// Build everything `config` describes. `transport` supplies the
    /// hardware interface for each bus. Stops at the first failure; items
    /// before it stay configured.
    pub fn configure(&mut self, config: &Config,
                     mut transport: impl FnMut(&BusSpec) -> Arc<dyn MassbusInterface>) -> MassbusResult<()> {
        for spec in &config.buses {
            let interface = transport(spec);
            if interface.mode() != spec.mode {
                return Err(MassbusError::Config(format!(
                    "bus {} wants a {} interface, got {}", spec.name, spec.mode.name(),
                    interface.mode().name())));
            }
            self.add_bus(spec.name, interface)?;
        }
        for spec in &config.units {
            self.connect_unit(spec)?;
        }
        for spec in &config.attachments {
            self.attach(&spec.target, &spec.path, spec.read_only, spec.share)?;
            if spec.online {
                self.set_online(&spec.target, true)?;
            }
        }
        info!("Configured {} bus(es), {} unit(s), {} attachment(s).",
              config.buses.len(), config.units.len(), config.attachments.len());
        Ok(())
    }

    /// Connect a unit as described. Everything that can fail is checked
    /// before the drive is created.
    pub fn connect_unit(&self, spec: &UnitSpec) -> MassbusResult<()> {
        if spec.width_18.is_some() && !spec.drive_type.family.is_disk() {
            return Err(MassbusError::WrongFamily(spec.drive_type.name, "disk"));
        }
        if let Some(serial) = spec.serial {
            check_serial(serial)?;
        }
        if let Some(alias) = &spec.alias {
            self.registry.check_alias(alias, (spec.bus, spec.unit))?;
        }
        let bus = self.registry.bus(spec.bus)?;
        let mut units = bus.lock()?;
        let drive = units.add(spec.unit, spec.drive_type, None)?;
        drive.set_alias(spec.alias.clone());
        if let Some(serial) = spec.serial {
            drive.set_serial(serial);
        }
        if let (Some(width_18), Some(disk)) = (spec.width_18, drive.as_disk_mut()) {
            disk.set_word_width(width_18);
        }
        Ok(())
    }

    /// Connect a drive by type name with default settings.
    pub fn connect(&self, bus: char, unit: u8, drive_type: &str) -> MassbusResult<()> {
        self.registry.bus(bus)?.add(unit, catalog::find(drive_type)?)
    }

    pub fn disconnect(&self, name: &str) -> MassbusResult<()> {
        let (bus, unit) = self.registry.resolve(name)?;
        self.registry.bus(bus)?.remove(unit)
    }

    /// Run `op` on a drive with its bus locked.
    fn with_drive<T>(&self, name: &str, op: impl FnOnce(&mut Drive) -> MassbusResult<T>) -> MassbusResult<T> {
        let (bus, unit) = self.registry.resolve(name)?;
        let bus = self.registry.bus(bus)?;
        let mut units = bus.lock()?;
        op(units.drive_mut(unit)?)
    }

    /// Attach an image, leaving the unit offline.
    pub fn attach(&self, name: &str, path: &Path, read_only: bool, share: ShareMode) -> MassbusResult<()> {
        let owner = self.registry.resolve(name)?;
        self.registry.check_share(path, share, owner)?;
        self.with_drive(name, |d| d.attach(path, read_only, share))
    }

    pub fn detach(&self, name: &str) -> MassbusResult<()> {
        self.with_drive(name, |d| {
            if !d.is_attached() {
                return Err(MassbusError::NotAttached(name.to_string()));
            }
            d.detach();
            Ok(())
        })
    }

    pub fn set_online(&self, name: &str, online: bool) -> MassbusResult<()> {
        self.with_drive(name, |d| {
            if online {
                d.go_online()
            } else {
                d.go_offline();
                Ok(())
            }
        })
    }

    pub fn set_read_only(&self, name: &str, read_only: bool) -> MassbusResult<()> {
        self.with_drive(name, |d| {
            d.set_read_only(read_only);
            Ok(())
        })
    }

    pub fn set_serial(&self, name: &str, serial: u16) -> MassbusResult<()> {
        check_serial(serial)?;
        self.with_drive(name, |d| {
            d.set_serial(serial);
            Ok(())
        })
    }

    pub fn set_word_width(&self, name: &str, width_18: bool) -> MassbusResult<()> {
        self.with_drive(name, |d| {
            let kind = d.drive_type().name;
            let disk = d.as_disk_mut().ok_or(MassbusError::WrongFamily(kind, "disk"))?;
            disk.set_word_width(width_18);
            Ok(())
        })
    }

    /// Give a unit an alias, or take it away with `None`.
    pub fn set_alias(&self, name: &str, alias: Option<&str>) -> MassbusResult<()> {
        if let Some(alias) = alias {
            let owner = self.registry.resolve(name)?;
            self.registry.check_alias(alias, owner)?;
        }
        self.with_drive(name, |d| {
            d.set_alias(alias.map(str::to_string));
            Ok(())
        })
    }

    pub fn rewind(&self, name: &str) -> MassbusResult<()> {
        self.with_drive(name, Drive::rewind)
    }

    /// Every unit on every bus.
    pub fn status(&self) -> MassbusResult<Vec<UnitStatus>> {
        let mut status = Vec::new();
        for bus in self.registry.iter() {
            let units = bus.lock()?;
            status.extend(units.iter().map(|d| UnitStatus::of(bus.name(), d)));
        }
        Ok(status)
    }

    pub fn start(&mut self) -> MassbusResult<()> {
        self.registry.start_all()
    }

    pub fn stop(&mut self) {
        self.registry.stop_all();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn check_serial(serial: u16) -> MassbusResult<()> {
    if serial > MAX_SERIAL {
        return Err(MassbusError::Config(format!("serial number {} has more than four digits", serial)));
    }
    Ok(())
}
