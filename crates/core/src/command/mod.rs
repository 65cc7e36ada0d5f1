//! Request/reply types and the immediate-vs-queued classification of commands.

pub mod router;

pub use router::Router;

use crate::geometry::{DriveKind, Geometry};
use crate::unit::ChangeListener;
use crate::unit::engine::ListenerId;

/// One device command, with its arguments.
pub enum Command {
    /// Invalidate the track buffer without writing it back.
    Clear,
    /// Read `len` bytes starting at `offset`.
    Read { offset: u64, len: usize },
    /// Write `data` starting at `offset`.
    Write { offset: u64, data: Vec<u8> },
    /// Flush the dirty buffer, if any.
    Update,
    /// Overwrite whole tracks with `data` starting at `offset`.
    Format { offset: u64, data: Vec<u8> },
    /// Nominal head move to `offset` (validated, otherwise a no-op).
    Seek { offset: u64 },
    /// Turn the motor on (`true`) or off (`false`).
    Motor { on: bool },
    /// Unmount the current medium.
    Eject,
    /// Is media present? (`true` result means absent, matching the wire polarity.)
    ChangeState,
    /// Read the per-unit change counter.
    ChangeNum,
    /// Register a change listener under a caller-chosen id. Parked (no reply) until a matching
    /// `RemChangeInt` for the same id arrives, unless this request is run on a stopped unit's
    /// inline-fallback path, where there is no worker channel to park on.
    AddChangeInt(ListenerId, ChangeListener),
    /// Unregister a previously registered listener, completing its parked reply.
    RemChangeInt(ListenerId),
    /// Set (`Some`) or clear (`None`) the single legacy listener slot.
    RemoveLegacy(Option<ChangeListener>),
    /// Is the medium write-protected?
    ProtStatus,
    /// The drive kind of the inserted medium.
    GetDriveType,
    /// Cylinder count.
    GetNumTracks,
    /// Full geometry record.
    GetGeometry,
    /// MFM-encoded raw read of `track`, capped at `len` bytes.
    RawRead { track: u32, len: usize },
    /// Capability/identity query.
    DeviceQuery,
    /// Sets (`true`) or attempts to clear (`false`) the medium's write-protect flag.
    SetWriteProtect { protected: bool },
    /// Starts a stopped unit's worker thread. Always-immediate so it can run even though, by
    /// definition, there is no worker yet to queue onto.
    Start,
    /// Stops a unit's worker thread. Requires that no medium be inserted.
    Stop,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Clear => "Clear",
            Self::Read { .. } => "Read",
            Self::Write { .. } => "Write",
            Self::Update => "Update",
            Self::Format { .. } => "Format",
            Self::Seek { .. } => "Seek",
            Self::Motor { .. } => "Motor",
            Self::Eject => "Eject",
            Self::ChangeState => "ChangeState",
            Self::ChangeNum => "ChangeNum",
            Self::AddChangeInt(..) => "AddChangeInt",
            Self::RemChangeInt(_) => "RemChangeInt",
            Self::RemoveLegacy(_) => "RemoveLegacy",
            Self::ProtStatus => "ProtStatus",
            Self::GetDriveType => "GetDriveType",
            Self::GetNumTracks => "GetNumTracks",
            Self::GetGeometry => "GetGeometry",
            Self::RawRead { .. } => "RawRead",
            Self::DeviceQuery => "DeviceQuery",
            Self::SetWriteProtect { .. } => "SetWriteProtect",
            Self::Start => "Start",
            Self::Stop => "Stop",
        };
        f.write_str(name)
    }
}

impl Command {
    /// Whether this command always runs on the caller's context, never queued to the worker.
    ///
    /// These are exactly the read-only/control queries from the external interface that must work
    /// even while the worker is stopped or busy: `RemChangeInt` so a caller can always unregister
    /// using the same id it passed to `AddChangeInt`, and `Start` so starting a stopped unit never
    /// deadlocks waiting on a worker that doesn't exist yet. `Start`/`Stop` themselves are
    /// intercepted by [`crate::supervisor::DeviceSupervisor::dispatch`] before reaching the
    /// router, since only the supervisor can start or stop a worker thread.
    #[must_use]
    pub const fn is_always_immediate(&self) -> bool {
        matches!(
            self,
            Self::ChangeNum
                | Self::ChangeState
                | Self::GetDriveType
                | Self::GetNumTracks
                | Self::RemChangeInt(_)
                | Self::Start
                | Self::DeviceQuery
        )
    }
}

/// A request submitted to a unit.
pub struct Request {
    /// The command and its arguments.
    pub command: Command,
    /// For `ETD_*` (extended) commands: the change counter the caller last observed. If it no
    /// longer matches the unit's current counter, the command fails with
    /// [`crate::DeviceError::DiskChanged`] before running.
    pub stale_check: Option<u32>,
    /// Whether the caller asked for quick-mode (run inline when the command supports it).
    pub quick: bool,
}

impl Request {
    /// Builds a plain (non-extended, non-quick) request.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            stale_check: None,
            quick: false,
        }
    }

    /// Marks this as an extended (`ETD_*`) request checked against `counter`.
    #[must_use]
    pub const fn with_stale_check(mut self, counter: u32) -> Self {
        self.stale_check = Some(counter);
        self
    }

    /// Marks this as a quick-mode request.
    #[must_use]
    pub const fn quick(mut self) -> Self {
        self.quick = true;
        self
    }
}

/// The successful outcome of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyValue {
    /// No data, just success.
    Ok,
    /// Bytes read back to the caller (`Read`, `RawRead`).
    Bytes(Vec<u8>),
    /// A scalar result (`actual`, in the external interface's terms).
    Actual(u64),
    /// A boolean result (`ChangeState`, `ProtStatus`).
    Bool(bool),
    /// `GetDriveType`'s result.
    DriveType(DriveKind),
    /// `GetGeometry`'s result.
    Geometry(Geometry),
}

/// A command's outcome.
pub type Reply = Result<ReplyValue, crate::DeviceError>;
