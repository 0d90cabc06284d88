use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::hardware_interface::*;
use crate::command::CommandWord;
use crate::error::HardwareError;

const UNITS: usize = 8;
const REGISTERS: usize = 32;

/// One completed drive-to-host transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub words: Vec<u32>,
    pub exception: bool,
}

struct Inner {
    registers: [[u16; REGISTERS]; UNITS],
    commands: VecDeque<CommandWord>,
    cancelled: bool,
    pending_error: Option<String>,
    from_host: VecDeque<u32>,
    to_host: Vec<u32>,
    transfers: Vec<Transfer>,
    geometry: [Option<(u16, u16, u16)>; UNITS],
    occupancy: u8,
}

/// A hardware interface held entirely in process memory. Commands are
/// queued with `post_command`, host data is supplied with `supply_data`,
/// and everything the drives send back is recorded for inspection. Used as
/// the loopback transport and by the tests.
pub struct InMemoryInterface {
    mode: BusMode,
    fifo_capacity: usize,
    budget: Duration,
    inner: Mutex<Inner>,
    signal: Condvar,
}

impl InMemoryInterface {
    pub fn new(mode: BusMode) -> Self {
        Self::with_fifo(mode, usize::MAX, FIFO_BUDGET)
    }

    /// Create an interface whose drive-to-host FIFO holds at most
    /// `fifo_capacity` words, polling for at most `budget`.
    pub fn with_fifo(mode: BusMode, fifo_capacity: usize, budget: Duration) -> Self {
        InMemoryInterface {
            mode,
            fifo_capacity,
            budget,
            inner: Mutex::new(Inner {
                registers: [[0; REGISTERS]; UNITS],
                commands: VecDeque::new(),
                cancelled: false,
                pending_error: None,
                from_host: VecDeque::new(),
                to_host: Vec::new(),
                transfers: Vec::new(),
                geometry: [None; UNITS],
                occupancy: 0,
            }),
            signal: Condvar::new(),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a command as if the host had issued it.
    pub fn post_command(&self, cmd: CommandWord) {
        self.inner().commands.push_back(cmd);
        self.signal.notify_all();
    }

    /// Make the next wait fail with a hardware error.
    pub fn fail_next_wait(&self, message: &str) {
        self.inner().pending_error = Some(message.to_string());
        self.signal.notify_all();
    }

    pub fn pending_commands(&self) -> usize {
        self.inner().commands.len()
    }

    /// Queue words for the drive to read as host data.
    pub fn supply_data(&self, words: &[u32]) {
        self.inner().from_host.extend(words.iter().copied());
    }

    /// Words supplied by `supply_data` that no drive has consumed.
    pub fn unread_data(&self) -> usize {
        self.inner().from_host.len()
    }

    /// Take every completed drive-to-host transfer.
    pub fn take_transfers(&self) -> Vec<Transfer> {
        std::mem::take(&mut self.inner().transfers)
    }

    pub fn geometry(&self, unit: u8) -> Option<(u16, u16, u16)> {
        self.inner().geometry[unit as usize & 7]
    }

    pub fn occupancy(&self) -> u8 {
        self.inner().occupancy
    }
}

impl MassbusInterface for InMemoryInterface {
    fn mode(&self) -> BusMode {
        self.mode
    }

    fn read_register(&self, unit: u8, register: u8) -> u16 {
        self.inner().registers[unit as usize & 7][register as usize & 0o37]
    }

    fn write_register(&self, unit: u8, register: u8, value: u16) {
        self.inner().registers[unit as usize & 7][register as usize & 0o37] = value;
    }

    fn set_bits(&self, unit: u8, register: u8, mask: u16) {
        self.inner().registers[unit as usize & 7][register as usize & 0o37] |= mask;
    }

    fn clear_bits(&self, unit: u8, register: u8, mask: u16) {
        self.inner().registers[unit as usize & 7][register as usize & 0o37] &= !mask;
    }

    fn wait_for_command(&self, timeout: Duration) -> Result<WaitOutcome, HardwareError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner();
        loop {
            if let Some(message) = inner.pending_error.take() {
                return Err(HardwareError(message));
            }
            if inner.cancelled {
                inner.cancelled = false;
                return Ok(WaitOutcome::Cancelled);
            }
            if let Some(cmd) = inner.commands.pop_front() {
                return Ok(WaitOutcome::Command(cmd));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitOutcome::Timeout);
            }
            inner = match self.signal.wait_timeout(inner, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn cancel_wait(&self) {
        self.inner().cancelled = true;
        self.signal.notify_all();
    }

    fn try_read_data(&self) -> Option<u32> {
        self.inner().from_host.pop_front()
    }

    fn try_write_data(&self, word: u32) -> bool {
        let mut inner = self.inner();
        if inner.to_host.len() >= self.fifo_capacity {
            return false;
        }
        inner.to_host.push(word);
        true
    }

    fn end_transfer(&self, force_exception: bool) {
        let mut inner = self.inner();
        let words = std::mem::take(&mut inner.to_host);
        inner.transfers.push(Transfer { words, exception: force_exception });
    }

    fn announce_geometry(&self, unit: u8, cylinders: u16, heads: u16, sectors: u16) {
        self.inner().geometry[unit as usize & 7] = Some((cylinders, heads, sectors));
    }

    fn announce_occupancy(&self, bitmap: u8) {
        self.inner().occupancy = bitmap;
    }

    fn fifo_budget(&self) -> Duration {
        self.budget
    }
}
