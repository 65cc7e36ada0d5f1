//! Pluggable storage backend for a unit's image file.
//!
//! The engine never touches `std::fs` directly; it goes through [`ImageBackend`] so that tests
//! can substitute a mock and so that a future embedder could back a unit with something other
//! than a plain file (a compressed image, a network-backed one, ...).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Low-level failure modes an [`ImageBackend`] can report.
///
/// This is intentionally narrower than [`std::io::Error`]: callers only need to distinguish the
/// handful of outcomes the engine reacts to differently (see
/// [`DeviceError`](crate::common::error::DeviceError)'s `From<BackendError>` impl).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendError {
    /// The backend cannot satisfy a write because the medium is read-only.
    WriteProtected,
    /// The backend's underlying medium has been removed.
    MediumRemoved,
    /// The requested range lies outside the backend's extent.
    OutOfRange,
    /// An I/O error not classified as one of the above.
    Io(io::ErrorKind),
}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::WriteProtected,
            io::ErrorKind::NotFound => Self::MediumRemoved,
            kind => Self::Io(kind),
        }
    }
}

/// Storage backend for a single unit's image.
///
/// Implementors own exactly one open handle; `read_track`/`write_track` operate on whole tracks
/// at a byte offset the caller computes from geometry.
pub trait ImageBackend: Send {
    /// Reads `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::OutOfRange`] if the range exceeds the backend's extent, or
    /// [`BackendError::MediumRemoved`]/[`BackendError::Io`] on lower-level failure.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), BackendError>;

    /// Writes `buf` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WriteProtected`] if the backend is read-only, or
    /// [`BackendError::OutOfRange`]/[`BackendError::MediumRemoved`]/[`BackendError::Io`] otherwise.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), BackendError>;

    /// Flushes any OS-level buffering for this backend.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] if the flush fails.
    fn flush(&mut self) -> Result<(), BackendError>;

    /// Total addressable size of the backend in bytes.
    fn len(&self) -> u64;

    /// Whether the backend rejects writes.
    fn is_write_protected(&self) -> bool;

    /// Whether the backend is empty (size zero). Mirrors `Vec::is_empty` for `len`.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An [`ImageBackend`] over a plain disk-image file.
#[derive(Debug)]
pub struct FileBackend {
    file: File,
    len: u64,
    write_protected: bool,
}

impl FileBackend {
    /// Opens `path` as an image backend.
    ///
    /// `write_protected` forces read-only behavior even if the file itself is writable (the
    /// device's own write-protect tab, independent of filesystem permissions).
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the file cannot be opened, or its size does not match a
    /// supported geometry total (validated by the caller against
    /// [`crate::geometry::DriveKind::from_image_len`] — this constructor does not duplicate that
    /// check so non-standard-sized images can still be opened for inspection).
    pub fn open(path: impl AsRef<Path>, write_protected: bool) -> Result<Self, BackendError> {
        let file = OpenOptions::new()
            .read(true)
            .write(!write_protected)
            .open(path)?;
        let len = file.metadata().map_err(BackendError::from)?.len();
        Ok(Self {
            file,
            len,
            write_protected,
        })
    }
}

impl ImageBackend for FileBackend {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), BackendError> {
        if offset.saturating_add(buf.len() as u64) > self.len {
            return Err(BackendError::OutOfRange);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), BackendError> {
        if self.write_protected {
            return Err(BackendError::WriteProtected);
        }
        if offset.saturating_add(buf.len() as u64) > self.len {
            return Err(BackendError::OutOfRange);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BackendError> {
        self.file.flush()?;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn is_write_protected(&self) -> bool {
        self.write_protected
    }
}
