#![no_std]

extern crate alloc;

pub mod bpb;
pub mod cache;
pub mod device;
pub mod dir;
pub mod entry;
pub mod error;
pub mod fat;
pub mod file;
pub mod mbr;
pub mod name;
pub mod path;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_support;

use alloc::sync::Arc;

pub use crate::error::Error;
pub use crate::file::{File, OpenFlags, Whence};
pub use crate::volume::{Volume, VolumeStats};

use crate::device::{BlockDevice, DeviceError};

pub type FsError = Error<DeviceError>;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

pub const DIRENT_SIZE: usize = 32;

pub const SPACE: u8 = 0x20;

pub const DIR_ENTRY_UNUSED: u8 = 0xE5;
pub const DIR_ENTRY_LAST_AND_UNUSED: u8 = 0x00;
pub const LAST_LONG_ENTRY: u8 = 0x40;

pub const MAX_CLUSTER_FAT16: usize = 65525;

/// The first legal data cluster number; 0 and 1 are reserved (spec.md §3).
pub const CLUSTER_FIRST_DATA: u32 = 2;

/// Canonical end-of-chain sentinel used internally regardless of variant,
/// collapsed from any raw value `>= 0xFFFFFFF8` (masked per variant).
pub const CLUSTER_EOC: u32 = 0x0FFF_FFFF;
/// Raw bad-cluster marker (never produced by `allocate_n`/`find_free`).
pub const CLUSTER_BAD: u32 = 0x0FFF_FFF7;

/// `mount(dev, read_cb, write_cb) -> volume` (spec.md §6). The device
/// itself carries the two callbacks via `BlockDevice`.
pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Volume, FsError> {
    Volume::mount(device).map_err(|_| Error::BadVolume)
}

/// `open(volume, path, mode) -> file`.
pub fn open(volume: &mut Volume, path: &str, mode: OpenFlags) -> Result<File, FsError> {
    file::open(volume, path, mode).map_err(Error::from)
}

/// `read(file, buf, n) -> n_read`.
pub fn read(volume: &mut Volume, file: &mut File, buf: &mut [u8]) -> Result<usize, FsError> {
    file::read(volume, file, buf).map_err(Error::from)
}

/// `write(file, buf, n) -> n_written`.
pub fn write(volume: &mut Volume, file: &mut File, buf: &[u8]) -> Result<usize, FsError> {
    file::write(volume, file, buf).map_err(Error::from)
}

/// `lseek(file, off, whence) -> pos`.
pub fn lseek(volume: &mut Volume, file: &mut File, off: i64, whence: Whence) -> Result<usize, FsError> {
    file::lseek(volume, file, off, whence).map_err(Error::from)
}

/// `close(file)`.
pub fn close(file: File) {
    file::close(file)
}

/// `unlink(volume, path) -> status`.
pub fn unlink(volume: &mut Volume, path: &str) -> Result<(), FsError> {
    file::unlink(volume, path).map_err(Error::from)
}

/// `stats(volume) -> {total, free, alloc}`.
pub fn stats(volume: &mut Volume) -> Result<VolumeStats, FsError> {
    volume.stats().map_err(Error::from)
}
