//! Block device interface
//!
//! The core never issues a sector-count-based I/O the way an LRU-backed
//! cache might prefer. Instead it uses the byte-addressed contract the
//! underlying medium actually exposes: `dev_read(offset, buf, n)` /
//! `dev_write(offset, buf, n)`. This is modeled as a two-method capability;
//! any concrete device (an SD card over SPI, a disk image, a RAM disk in
//! tests) can implement it.

use core::any::Any;
use core::marker::{Send, Sync};
use core::result::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    ReadError,
    WriteError,
}

/// Byte-addressed block device adapter.
///
/// No alignment is required of `byte_offset`/`n` beyond whatever the medium
/// itself imposes; a full-length transfer is expected on success. Partial
/// reads are unspecified by the source this crate is grounded on and are
/// not handled specially here (see DESIGN.md).
pub trait BlockDevice: Send + Sync + Any {
    /// Read `n` bytes starting at `byte_offset` into `buf`.
    fn dev_read(&self, byte_offset: usize, buf: &mut [u8], n: usize) -> Result<(), DeviceError>;

    /// Write `n` bytes from `buf` starting at `byte_offset`.
    fn dev_write(&self, byte_offset: usize, buf: &[u8], n: usize) -> Result<(), DeviceError>;
}
