//! Per-unit track buffering, write-back, change notification, and the worker task that
//! serializes a unit's commands.

pub mod engine;
pub mod worker;

pub use engine::UnitEngine;
pub use worker::UnitWorker;

use crate::geometry::DriveKind;

/// A registered change-notification listener.
///
/// Listeners are invoked synchronously, in registration order, under the unit's critical
/// section whenever media is inserted or ejected. A listener must be short and must not block.
pub type ChangeListener = Box<dyn Fn() + Send>;

/// The track-buffer's state machine, tracked per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BufferState {
    /// No track currently loaded.
    Idle,
    /// `track` is loaded and matches the backing store.
    Holding { track: u32 },
    /// `track` is loaded and has unflushed modifications.
    Dirty { track: u32 },
}

impl BufferState {
    pub(crate) fn current_track(self) -> Option<u32> {
        match self {
            Self::Idle => None,
            Self::Holding { track } | Self::Dirty { track } => Some(track),
        }
    }
}

/// Media currently inserted in a unit.
pub(crate) struct Medium {
    pub backend: Box<dyn crate::backend::ImageBackend>,
    pub kind: DriveKind,
    pub write_protected: bool,
    pub mfm: crate::mfm::MfmContext,
}
