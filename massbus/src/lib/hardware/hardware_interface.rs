use std::hint;
use std::thread;
use std::time::{Duration, Instant};

use crate::catalog::ControllerFamily;
use crate::command::CommandWord;
use crate::error::{FifoDirection, FifoTimeout, HardwareError};

/// How long a data FIFO may go without progress before a transfer is
/// abandoned.
pub const FIFO_BUDGET: Duration = Duration::from_millis(250);

/// Spins between yields while polling a FIFO.
const SPINS_PER_YIELD: u32 = 64;

/// What kind of drives a bus's hardware interface is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMode {
    Disk,
    Tape,
    Network,
}

impl BusMode {
    pub fn name(self) -> &'static str {
        match self {
            BusMode::Disk => "disk",
            BusMode::Tape => "tape",
            BusMode::Network => "network",
        }
    }

    /// Whether drives of the given family may sit on a bus in this mode.
    pub fn accepts(self, family: ControllerFamily) -> bool {
        match self {
            BusMode::Disk => family.is_disk(),
            BusMode::Tape => family.is_tape(),
            BusMode::Network => family == ControllerFamily::None,
        }
    }
}

/// Result of waiting for the next command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Command(CommandWord),
    Timeout,
    /// `cancel_wait` was called; the worker should exit.
    Cancelled,
}

/// Poll `probe` until it yields a value or `budget` elapses without one.
pub fn retry_for<T>(budget: Duration, mut probe: impl FnMut() -> Option<T>) -> Option<T> {
    let start = Instant::now();
    let mut spins = 0u32;
    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if start.elapsed() >= budget {
            return None;
        }
        spins = spins.wrapping_add(1);
        if spins % SPINS_PER_YIELD == 0 {
            thread::yield_now();
        } else {
            hint::spin_loop();
        }
    }
}

/// The register-level view of one MASSBUS port in the hardware bridge.
///
/// Every register is logically 16 bits wide and addressed by unit (0-7)
/// and register number (0-37 octal). Data words are 18 bits carried in a
/// `u32`. Implementations synchronise internally; callers only ever need a
/// shared reference.
pub trait MassbusInterface: Send + Sync {
    fn mode(&self) -> BusMode;

    fn read_register(&self, unit: u8, register: u8) -> u16;
    fn write_register(&self, unit: u8, register: u8, value: u16);

    fn set_bits(&self, unit: u8, register: u8, mask: u16) {
        let value = self.read_register(unit, register);
        self.write_register(unit, register, value | mask);
    }

    fn clear_bits(&self, unit: u8, register: u8, mask: u16) {
        let value = self.read_register(unit, register);
        self.write_register(unit, register, value & !mask);
    }

    /// Block for at most `timeout` waiting for the next command.
    fn wait_for_command(&self, timeout: Duration) -> Result<WaitOutcome, HardwareError>;

    /// Make the current (or next) `wait_for_command` return `Cancelled`.
    fn cancel_wait(&self);

    /// Take one word from the host-to-drive FIFO, if one is waiting.
    fn try_read_data(&self) -> Option<u32>;

    /// Put one word in the drive-to-host FIFO. Returns false if it's full.
    fn try_write_data(&self, word: u32) -> bool;

    /// Mark the end of a drive-to-host transfer.
    fn end_transfer(&self, force_exception: bool);

    fn announce_geometry(&self, unit: u8, cylinders: u16, heads: u16, sectors: u16);
    fn announce_occupancy(&self, bitmap: u8);

    /// How long the FIFO helpers wait for progress.
    fn fifo_budget(&self) -> Duration {
        FIFO_BUDGET
    }

    /// Read `count` words sent by the host.
    fn read_data(&self, count: usize) -> Result<Vec<u32>, FifoTimeout> {
        let budget = self.fifo_budget();
        let mut words = Vec::with_capacity(count);
        while words.len() < count {
            match retry_for(budget, || self.try_read_data()) {
                Some(word) => words.push(word),
                None => return Err(FifoTimeout {
                    direction: FifoDirection::FromHost,
                    budget,
                    done: words.len(),
                    wanted: count,
                }),
            }
        }
        Ok(words)
    }

    /// Send `words` to the host and end the transfer. A stalled FIFO ends
    /// the transfer with an exception.
    fn write_data(&self, words: &[u32], force_exception: bool) -> Result<(), FifoTimeout> {
        let budget = self.fifo_budget();
        for (done, word) in words.iter().enumerate() {
            if retry_for(budget, || self.try_write_data(*word).then_some(())).is_none() {
                self.end_transfer(true);
                return Err(FifoTimeout {
                    direction: FifoDirection::ToHost,
                    budget,
                    done,
                    wanted: words.len(),
                });
            }
        }
        self.end_transfer(force_exception);
        Ok(())
    }

    /// End a transfer that carries no data, so the host still sees it
    /// complete.
    fn empty_transfer(&self) {
        self.end_transfer(true);
    }
}
