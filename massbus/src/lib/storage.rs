mod disk_image;
mod storage_interface;
mod tape_image;

pub use disk_image::DiskImage;
pub use storage_interface::*;
pub use tape_image::TapeImage;

// Mock implementations for testing.
#[cfg(test)]
mod storage_mock;
#[cfg(test)]
pub use storage_mock::*;
