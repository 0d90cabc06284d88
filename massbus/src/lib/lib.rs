//! MASSBUS disk and tape emulation. A `Server` holds a set of buses, each
//! with up to eight RP/RM disks or TM78 tape formatters whose media live in
//! host image files. Each bus runs its own worker thread that takes
//! commands from a hardware interface and carries them out.

pub mod bitfiddler;
pub mod bus;
pub mod catalog;
pub mod command;
pub mod config;
pub mod drive;
pub mod error;
pub mod hardware;
pub mod registry;
pub mod server;
pub mod storage;

pub use crate::bus::Bus;
pub use crate::catalog::DriveType;
pub use crate::command::CommandWord;
pub use crate::config::Config;
pub use crate::drive::Drive;
pub use crate::error::{MassbusError, MassbusResult};
pub use crate::hardware::{BusMode, InMemoryInterface, MassbusInterface};
pub use crate::registry::BusRegistry;
pub use crate::server::Server;
pub use crate::storage::ShareMode;

/// Send log output to the test harness. Safe to call from every test.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    use simplelog::{ConfigBuilder, LevelFilter, TestLogger};

    let config = ConfigBuilder::new()
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();
    let _ = TestLogger::init(LevelFilter::Trace, config);
}
