//! Emulated floppy-disk block device.
//!
//! This crate implements the device-independent core of a floppy block device driver:
//! 1. **Backend:** a pluggable [`backend::ImageBackend`] trait, backed by real disk-image files.
//! 2. **Cache:** a shared two-segment (SLRU) [`cache::TrackCache`] indexed by a splay tree.
//! 3. **Unit:** per-drive track buffering, write-back, and change notification ([`unit`]).
//! 4. **Command:** the request/reply types and immediate-vs-queued dispatch rules ([`command`]).
//! 5. **Supervisor:** [`supervisor::DeviceSupervisor`], the top-level owner of units and cache.
//!
//! Raw MFM encoding ([`mfm`]) is exposed as a pure, self-contained encoder: the host's
//! device-registration shims, filesystem-metadata decoding, and the command-line companion
//! tool that drives this crate are deliberately left outside it.

/// Shared error types and the track-payload checksum.
pub mod common;
/// Device, cache, and geometry configuration.
pub mod config;
/// Disk geometry constants and derived sizes.
pub mod geometry;
/// Pluggable image-file storage backend.
pub mod backend;
/// Pure MFM bitstream encoder for raw track reads.
pub mod mfm;
/// Shared two-segment (SLRU) track cache.
pub mod cache;
/// Per-unit track engine and worker task.
pub mod unit;
/// Request/reply types and command classification.
pub mod command;
/// Top-level owner of units and the shared cache.
pub mod supervisor;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Shared device error taxonomy.
pub use crate::common::error::DeviceError;
/// Top-level supervisor; construct with `DeviceSupervisor::new`.
pub use crate::supervisor::DeviceSupervisor;
