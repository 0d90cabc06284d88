use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::bitfiddler::CodecError;

/// Which way a data FIFO transfer was going when it stalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoDirection {
    ToHost,
    FromHost,
}

/// A data FIFO transfer did not make progress within its budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("data FIFO {direction:?} timed out after {budget:?} ({done} of {wanted} words)")]
pub struct FifoTimeout {
    pub direction: FifoDirection,
    pub budget: Duration,
    pub done: usize,
    pub wanted: usize,
}

/// The hardware transport failed in a way the dispatch loop cannot recover
/// from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("hardware interface error: {0}")]
pub struct HardwareError(pub String);

/// Errors that can occur while configuring or running the MASSBUS server.
#[derive(Error, Debug)]
pub enum MassbusError {
    #[error("unit {0} is out of range (0-7)")]
    BadUnit(u8),

    #[error("unit {0} is already occupied")]
    SlotOccupied(u8),

    #[error("unit {0} does not exist")]
    NoSuchUnit(String),

    #[error("no bus named '{0}'")]
    NoSuchBus(String),

    #[error("bus '{0}' already exists")]
    DuplicateBus(char),

    #[error("unknown drive type '{0}'")]
    UnknownDriveType(String),

    #[error("{drive} drives cannot be connected to a {bus} bus")]
    IncompatibleDrive { drive: &'static str, bus: &'static str },

    #[error("drive type {0} is not a {1} drive")]
    WrongFamily(&'static str, &'static str),

    #[error("drive type {0} is not supported")]
    UnsupportedDrive(&'static str),

    #[error("alias '{0}' is already in use")]
    DuplicateAlias(String),

    #[error("unit {0} is not attached")]
    NotAttached(String),

    #[error("'{0}' is already attached to unit {1}")]
    AlreadyInUse(String, String),

    #[error("failed to attach '{path}': {source}")]
    Attach { path: String, source: io::Error },

    #[error("invalid disk address C/H/S {0}/{1}/{2}")]
    InvalidAddress(u16, u16, u16),

    #[error("unit {0} is write locked")]
    WriteLocked(u8),

    #[error("bad configuration: {0}")]
    Config(String),

    #[error("bus lock poisoned")]
    LockPoisoned,

    #[error("bus '{0}' is already running")]
    AlreadyRunning(char),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Fifo(#[from] FifoTimeout),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for MASSBUS operations.
pub type MassbusResult<T> = Result<T, MassbusError>;
