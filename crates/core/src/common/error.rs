//! Device error taxonomy.
//!
//! Every fallible entry point in this crate returns `Result<T, DeviceError>`. The variants
//! mirror the outcomes a floppy controller can actually report; nothing here is a catch-all.

use std::io;

use crate::backend::BackendError;
use thiserror::Error;

/// The complete set of ways a device request can fail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// No medium is present in the drive.
    #[error("no medium present")]
    NoMedia,

    /// The medium was ejected and reinserted (or removed) since the caller last checked the
    /// change counter, or the backend reports the medium is gone mid-operation.
    #[error("medium changed since last check")]
    DiskChanged,

    /// The medium (or backend) is write-protected.
    #[error("medium is write-protected")]
    WriteProtected,

    /// A request's offset failed alignment or bounds validation.
    #[error("address out of range or misaligned")]
    BadAddress,

    /// A request's length failed alignment or bounds validation.
    #[error("length out of range or misaligned")]
    BadLength,

    /// A sector header was expected but not found.
    #[error("sector header not found")]
    NoSectorHeader,

    /// A sector header was found but failed validation.
    #[error("sector header failed validation")]
    BadSectorHeader,

    /// A write-back failed for a reason not covered by the other variants.
    #[error("seek or I/O error")]
    SeekError,

    /// The request was removed from a queue before it could run.
    #[error("request aborted")]
    Aborted,

    /// The command code is unsupported, or addressed the wrong device.
    #[error("unsupported command")]
    NoCommand,

    /// A unit id was already registered when `create_unit` was called.
    #[error("unit already exists")]
    UnitAlreadyExists,

    /// A control operation was blocked because the drive is busy (a medium is inserted, or the
    /// motor has not yet spun down).
    #[error("drive in use")]
    DriveInUse,

    /// Write-protection cannot be cleared because the medium was mounted write-protected.
    #[error("read-only volume")]
    ReadOnlyVolume,

    /// Write-protection cannot be cleared because the backing image file itself is read-only.
    #[error("read-only file")]
    ReadOnlyFile,
}

impl From<BackendError> for DeviceError {
    /// Maps a low-level backend failure onto the public taxonomy.
    ///
    /// This is deliberately narrower than a blanket `std::io::Error` conversion: callers of the
    /// engine only ever see the outcomes above, never raw I/O error kinds. `UnexpectedEof` and
    /// `InvalidData` single out the two sector-header failure modes a backend read can report;
    /// every other I/O error kind falls back to `SeekError`.
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::WriteProtected => Self::WriteProtected,
            BackendError::MediumRemoved => Self::DiskChanged,
            BackendError::OutOfRange => Self::BadAddress,
            BackendError::Io(io::ErrorKind::UnexpectedEof) => Self::NoSectorHeader,
            BackendError::Io(io::ErrorKind::InvalidData) => Self::BadSectorHeader,
            BackendError::Io(_) => Self::SeekError,
        }
    }
}
