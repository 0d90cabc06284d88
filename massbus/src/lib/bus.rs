//! A MASSBUS: up to eight drives behind one hardware interface, and the
//! worker thread that feeds them commands.
//!
//! The slot array lives behind a single mutex. The worker holds it while it
//! processes one command, and every control operation (attach, online and
//! so on) holds it for the duration of the change, so drives on one bus are
//! never touched from two threads at once.

use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::catalog::DriveType;
use crate::command::CommandWord;
use crate::drive::{Backend, Drive, MAX_UNITS};
use crate::error::{MassbusError, MassbusResult};
use crate::hardware::{BusMode, MassbusInterface, WaitOutcome};

/// How long the worker waits for a command before checking whether it
/// should stop.
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// The drive slots of one bus. Only reachable through `Bus::lock`.
pub struct Units {
    name: char,
    interface: Arc<dyn MassbusInterface>,
    slots: [Option<Drive>; MAX_UNITS as usize],
    occupied: u8,
}

impl Units {
    fn new(name: char, interface: Arc<dyn MassbusInterface>) -> Self {
        Units {
            name,
            interface,
            slots: Default::default(),
            occupied: 0,
        }
    }

    pub fn get(&self, unit: u8) -> Option<&Drive> {
        self.slots.get(unit as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, unit: u8) -> Option<&mut Drive> {
        self.slots.get_mut(unit as usize)?.as_mut()
    }

    /// Like `get_mut`, but a missing unit is an error.
    pub fn drive_mut(&mut self, unit: u8) -> MassbusResult<&mut Drive> {
        let name = self.name;
        self.get_mut(unit).ok_or_else(|| MassbusError::NoSuchUnit(format!("{}{}", name, unit)))
    }

    /// Every occupied slot, in unit order.
    pub fn iter(&self) -> impl Iterator<Item = &Drive> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Drive> {
        self.slots.iter_mut().flatten()
    }

    /// Bitmap of occupied slots, unit 0 in bit 0.
    pub fn occupancy(&self) -> u8 {
        self.occupied
    }

    /// Create a drive in an empty slot. Nothing changes if it fails.
    pub fn add(&mut self, unit: u8, drive_type: &'static DriveType,
               backend: Option<Backend>) -> MassbusResult<&mut Drive> {
        if unit >= MAX_UNITS {
            return Err(MassbusError::BadUnit(unit));
        }
        let mode = self.interface.mode();
        if !mode.accepts(drive_type.family) {
            return Err(MassbusError::IncompatibleDrive { drive: drive_type.name, bus: mode.name() });
        }
        if self.slots[unit as usize].is_some() {
            return Err(MassbusError::SlotOccupied(unit));
        }
        let drive = Drive::new(unit, drive_type, self.interface.clone(), backend)?;
        info!("Bus {}: {} connected as unit {}.", self.name, drive_type.name, unit);
        self.occupied |= 1 << unit;
        self.interface.announce_occupancy(self.occupied);
        Ok(self.slots[unit as usize].insert(drive))
    }

    /// Take a drive off the bus. Its image is closed when it's dropped.
    pub fn remove(&mut self, unit: u8) -> MassbusResult<Drive> {
        let name = self.name;
        let drive = self.slots.get_mut(unit as usize)
            .and_then(Option::take)
            .ok_or_else(|| MassbusError::NoSuchUnit(format!("{}{}", name, unit)))?;
        info!("Bus {}: unit {} disconnected.", self.name, unit);
        self.occupied &= !(1 << unit);
        self.interface.announce_occupancy(self.occupied);
        Ok(drive)
    }

    /// Route one command to its drive. Failures are logged here; the host
    /// only ever learns about them through the drive's registers.
    pub fn dispatch(&mut self, cmd: CommandWord) {
        if !cmd.is_valid() || !cmd.go() {
            warn!("Bus {}: dropped malformed command {:?}.", self.name, cmd);
            return;
        }
        let name = self.name;
        let unit = cmd.unit();
        let drive = match self.get_mut(unit) {
            Some(drive) => drive,
            None => {
                warn!("Bus {}: command for missing unit {}: {:?}.", name, unit, cmd);
                return;
            }
        };
        // A tape formatter answers sense while its transport is offline,
        // so only disks filter here.
        if let Drive::Disk(_) = drive {
            if !drive.is_online() {
                debug!("Bus {}: unit {} is offline, dropped {:?}.", name, unit, cmd);
                return;
            }
        }
        if let Err(e) = drive.dispatch(cmd) {
            warn!("Bus {} unit {}: {}", name, unit, e);
        }
    }
}

/// One bus, its drives and its worker thread.
pub struct Bus {
    name: char,
    interface: Arc<dyn MassbusInterface>,
    units: Arc<Mutex<Units>>,
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Bus {
    pub fn new(name: char, interface: Arc<dyn MassbusInterface>) -> Self {
        let name = name.to_ascii_uppercase();
        Bus {
            name,
            units: Arc::new(Mutex::new(Units::new(name, interface.clone()))),
            interface,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn name(&self) -> char {
        self.name
    }

    pub fn mode(&self) -> BusMode {
        self.interface.mode()
    }

    pub fn interface(&self) -> &Arc<dyn MassbusInterface> {
        &self.interface
    }

    /// Take the bus lock. It's released when the guard drops.
    pub fn lock(&self) -> MassbusResult<MutexGuard<'_, Units>> {
        self.units.lock().map_err(|_| MassbusError::LockPoisoned)
    }

    /// Connect a drive with the default image backend.
    pub fn add(&self, unit: u8, drive_type: &'static DriveType) -> MassbusResult<()> {
        self.lock()?.add(unit, drive_type, None).map(|_| ())
    }

    /// Connect a drive with its own storage backend.
    pub fn add_with_backend(&self, unit: u8, drive_type: &'static DriveType,
                            backend: Backend) -> MassbusResult<()> {
        self.lock()?.add(unit, drive_type, Some(backend)).map(|_| ())
    }

    pub fn remove(&self, unit: u8) -> MassbusResult<()> {
        let drive = self.lock()?.remove(unit)?;
        // Close the image outside the lock.
        drop(drive);
        Ok(())
    }

    /// Process one command as the worker would.
    pub fn dispatch(&self, cmd: CommandWord) -> MassbusResult<()> {
        self.lock()?.dispatch(cmd);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().map_or(false, |w| !w.is_finished())
    }

    /// Start the worker thread.
    pub fn start(&mut self) -> MassbusResult<()> {
        if self.is_running() {
            return Err(MassbusError::AlreadyRunning(self.name));
        }
        // Reap a worker that stopped by itself.
        self.join();
        self.stop.store(false, Ordering::SeqCst);

        let name = self.name;
        let interface = Arc::clone(&self.interface);
        let units = Arc::clone(&self.units);
        let stop = Arc::clone(&self.stop);
        let worker = thread::Builder::new()
            .name(format!("bus-{}", name))
            .spawn(move || service(name, interface, units, stop))?;
        self.worker = Some(worker);
        info!("Bus {} started.", self.name);
        Ok(())
    }

    /// Stop the worker thread and wait for it. Does nothing if it isn't
    /// running.
    pub fn stop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        self.stop.store(true, Ordering::SeqCst);
        self.interface.cancel_wait();
        self.join();
        info!("Bus {} stopped.", self.name);
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Bus {} worker thread panicked.", self.name);
            }
        }
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The worker thread's loop.
fn service(name: char, interface: Arc<dyn MassbusInterface>,
           units: Arc<Mutex<Units>>, stop: Arc<AtomicBool>) {
    debug!("Bus {} worker running.", name);
    while !stop.load(Ordering::SeqCst) {
        let cmd = match interface.wait_for_command(WAIT_TIMEOUT) {
            Ok(WaitOutcome::Command(cmd)) => cmd,
            // A cancellation left over from an earlier stop is harmless:
            // the loop only ends once the stop flag is set.
            Ok(WaitOutcome::Timeout) | Ok(WaitOutcome::Cancelled) => continue,
            Err(e) => {
                error!("Bus {}: {}; worker exiting.", name, e);
                break;
            }
        };
        trace!("Bus {}: {:?}", name, cmd);
        match units.lock() {
            Ok(mut units) => units.dispatch(cmd),
            Err(_) => {
                error!("Bus {}: lock poisoned; worker exiting.", name);
                break;
            }
        }
    }
    debug!("Bus {} worker exited.", name);
}
