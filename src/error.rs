//! Crate-wide error type.
//!
//! Every module that talks to the device or walks on-disk structures keeps
//! its own small error enum (`CacheError`, `FatError`, `DirError`,
//! `FileError`), the same way the teacher split errors by concern. This
//! module only provides the top-level `Error` that unifies them, matching
//! the error kinds named in the specification: `NoSuchFile`, `IsDir`,
//! `OutOfSpace`, `InvalidMode`, `BadVolume`, `CorruptChain`, `Device`.

use core::fmt;

use crate::device::DeviceError;
use crate::dir::DirError;
use crate::fat::FatError;
use crate::file::FileError;

/// Top-level error type, generic over the device adapter's own error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// Lookup failed and the caller did not ask for `CREAT`.
    NoSuchFile,
    /// Open of a directory for file I/O, or unlink of a directory.
    IsDir,
    /// The cluster allocator could not find a free cluster.
    OutOfSpace,
    /// Write attempted on a handle that was not opened writable.
    InvalidMode,
    /// Mount-time layout check failed.
    BadVolume,
    /// The FAT chain walker found a free entry where a link was expected.
    CorruptChain,
    /// Propagated verbatim from the device's read/write callbacks.
    Device(E),
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoSuchFile => write!(f, "no such file"),
            Error::IsDir => write!(f, "is a directory"),
            Error::OutOfSpace => write!(f, "out of space"),
            Error::InvalidMode => write!(f, "invalid mode for operation"),
            Error::BadVolume => write!(f, "not a recognizable FAT volume"),
            Error::CorruptChain => write!(f, "corrupt cluster chain"),
            Error::Device(e) => write!(f, "device error: {:?}", e),
        }
    }
}

impl<E: From<DeviceError>> From<DirError> for Error<E> {
    fn from(e: DirError) -> Self {
        match e {
            DirError::NotFound => Error::NoSuchFile,
            DirError::IsDir => Error::IsDir,
            DirError::NotDir => Error::IsDir,
            DirError::NameExists => Error::NoSuchFile,
            DirError::Corrupt => Error::CorruptChain,
            DirError::OutOfSpace => Error::OutOfSpace,
            DirError::Device(d) => Error::Device(d.into()),
        }
    }
}

impl<E: From<DeviceError>> From<FatError> for Error<E> {
    fn from(e: FatError) -> Self {
        match e {
            FatError::OutOfSpace => Error::OutOfSpace,
            FatError::Corrupt => Error::CorruptChain,
            FatError::Device(d) => Error::Device(d.into()),
        }
    }
}

impl<E: From<DeviceError>> From<FileError> for Error<E> {
    fn from(e: FileError) -> Self {
        match e {
            FileError::IsDir => Error::IsDir,
            FileError::InvalidMode => Error::InvalidMode,
            FileError::NotFound => Error::NoSuchFile,
            FileError::OutOfSpace => Error::OutOfSpace,
            FileError::Corrupt => Error::CorruptChain,
            FileError::Device(d) => Error::Device(d.into()),
        }
    }
}
