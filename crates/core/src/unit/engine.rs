//! The per-unit track-buffer state machine: read/write/format/seek/update/clear, eject, media
//! insert, change notification, and motor timeout.

use std::sync::Arc;
use std::sync::mpsc::Sender;

use tracing::{debug, trace, warn};

use crate::command::{Reply, ReplyValue};

use crate::backend::ImageBackend;
use crate::cache::{StoreMode, TrackCache};
use crate::common::checksum::Checksum;
use crate::common::error::DeviceError;
use crate::config::UnitConfig;
use crate::geometry::{Geometry, SECTOR_BYTES};
use crate::mfm::MfmContext;

use super::{BufferState, ChangeListener, Medium};

/// Identifies a registered change listener, so it can later be removed.
///
/// This is a Rust-idiomatic stand-in for the original protocol's "resubmit the same request to
/// `RemChangeInt`" convention: a caller chooses an id, passes it to
/// [`UnitEngine::add_change_listener`] (or [`UnitEngine::park_change_listener`]), and later
/// passes the same id to [`UnitEngine::remove_change_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wraps a caller-chosen id. Any value the caller can reliably reproduce later works (the
    /// original protocol reuses the same request pointer for add and remove; this is the
    /// Rust-idiomatic stand-in).
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Per-unit track engine: owns the track buffer, the current medium (if any), and the
/// change-notification/motor state machine.
pub struct UnitEngine {
    id: u32,
    config: UnitConfig,
    cache: Arc<TrackCache>,

    medium: Option<Medium>,
    buffer: Vec<u8>,
    state: BufferState,
    file_pos: i64,
    last_checksum: Checksum,
    ignore_checksum_once: bool,

    motor_on: bool,
    turn_motor_off_requested: bool,

    change_counter: u32,
    listeners: Vec<(ListenerId, ChangeListener)>,
    parked_listeners: Vec<(ListenerId, Sender<Reply>)>,
    legacy_listener: Option<ChangeListener>,

    changes_made_since_mount: bool,
}

impl std::fmt::Debug for UnitEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitEngine")
            .field("id", &self.id)
            .field("has_medium", &self.medium.is_some())
            .field("motor_on", &self.motor_on)
            .field("change_counter", &self.change_counter)
            .finish_non_exhaustive()
    }
}

impl UnitEngine {
    /// Builds an engine for `id` with no medium inserted.
    #[must_use]
    pub fn new(id: u32, config: UnitConfig, cache: Arc<TrackCache>) -> Self {
        Self {
            id,
            config,
            cache,
            medium: None,
            buffer: Vec::new(),
            state: BufferState::Idle,
            file_pos: -1,
            last_checksum: Checksum::default(),
            ignore_checksum_once: false,
            motor_on: false,
            turn_motor_off_requested: false,
            change_counter: 0,
            listeners: Vec::new(),
            parked_listeners: Vec::new(),
            legacy_listener: None,
            changes_made_since_mount: false,
        }
    }

    /// This unit's id.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// The current per-unit change counter.
    #[must_use]
    pub const fn change_counter(&self) -> u32 {
        self.change_counter
    }

    /// Whether a medium is currently inserted.
    #[must_use]
    pub const fn has_medium(&self) -> bool {
        self.medium.is_some()
    }

    /// Whether the inserted medium (if any) rejects writes.
    #[must_use]
    pub fn is_write_protected(&self) -> bool {
        self.medium.as_ref().is_some_and(|m| m.write_protected)
    }

    /// The inserted medium's drive kind.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoMedia`] if no medium is inserted.
    pub fn drive_kind(&self) -> Result<crate::geometry::DriveKind, DeviceError> {
        self.medium.as_ref().map(|m| m.kind).ok_or(DeviceError::NoMedia)
    }

    /// The disk geometry of the inserted medium.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoMedia`] if no medium is inserted.
    pub fn geometry(&self) -> Result<Geometry, DeviceError> {
        self.drive_kind().map(Geometry::for_kind)
    }

    /// Turns the motor on immediately, or requests that it turn off, returning whether it was
    /// previously on.
    ///
    /// Turning on cancels any pending off-request and takes effect at once. Turning off does not
    /// stop the motor on the spot (a real drive can't spin down instantly either): it only arms
    /// [`Self::request_motor_off`]'s flag, which the worker's periodic tick
    /// ([`Self::motor_timeout_tick`]) acts on once the unit is idle.
    pub fn set_motor(&mut self, on: bool) -> bool {
        let was_on = self.motor_on;
        if on {
            self.motor_on = true;
            self.turn_motor_off_requested = false;
        } else {
            self.turn_motor_off_requested = true;
        }
        was_on
    }

    /// Requests that the motor turn off once the unit goes idle; the worker's periodic tick
    /// (see [`Self::motor_timeout_tick`]) performs the actual transition.
    pub fn request_motor_off(&mut self) {
        self.turn_motor_off_requested = true;
    }

    /// Runs at each periodic timer tick. If an off request is pending and the unit is not mid
    /// command, flushes any dirty buffer and turns the motor off.
    ///
    /// # Errors
    ///
    /// Propagates a write-back failure from [`Self::update`].
    pub fn motor_timeout_tick(&mut self) -> Result<(), DeviceError> {
        if !self.turn_motor_off_requested || !self.motor_on {
            return Ok(());
        }
        self.update()?;
        self.motor_on = false;
        self.turn_motor_off_requested = false;
        self.state = BufferState::Idle;
        debug!(unit = self.id, "motor timed out, turned off");
        Ok(())
    }

    /// Registers a change listener under caller-chosen `id`, invoked synchronously on every
    /// insert/eject. Used for the always-immediate/inline-fallback dispatch paths, where there is
    /// no worker channel to park a reply on.
    pub fn add_change_listener(&mut self, id: ListenerId, listener: ChangeListener) {
        self.listeners.push((id, listener));
    }

    /// Registers a change listener exactly like [`Self::add_change_listener`], but parks
    /// `reply_to` instead of letting the caller reply right away: it is only completed once a
    /// matching [`Self::remove_change_listener`] call fires, per the spec's
    /// "no reply until removed" contract for a queued `AddChangeInt`.
    pub fn park_change_listener(&mut self, id: ListenerId, listener: ChangeListener, reply_to: Sender<Reply>) {
        self.listeners.push((id, listener));
        self.parked_listeners.push((id, reply_to));
    }

    /// Unregisters a previously added listener, completing its parked reply (if any) with
    /// success. No-op if already removed.
    pub fn remove_change_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|(existing, _)| *existing != id);
        if let Some(pos) = self.parked_listeners.iter().position(|(existing, _)| *existing == id) {
            let (_, reply_to) = self.parked_listeners.remove(pos);
            let _ = reply_to.send(Ok(ReplyValue::Ok));
        }
    }

    /// Completes every still-parked listener reply with [`DeviceError::Aborted`]. Called when a
    /// worker is torn down so a caller blocked on `AddChangeInt`'s eventual reply doesn't hang
    /// forever.
    pub fn abort_parked_listeners(&mut self) {
        for (_, reply_to) in self.parked_listeners.drain(..) {
            let _ = reply_to.send(Err(DeviceError::Aborted));
        }
    }

    /// Sets (`true`) or attempts to clear (`false`) the medium's write-protect flag.
    ///
    /// Engaging protection always succeeds (or is a no-op if already engaged). Clearing it never
    /// succeeds once engaged: a real drive's write-protect tab isn't something the controller can
    /// flip, only the medium's owner can. The two error variants distinguish where the
    /// restriction originates, for a caller that wants to react differently.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoMedia`] if no medium is inserted. Clearing protection that is
    /// currently engaged returns [`DeviceError::ReadOnlyFile`] if the backing file itself is
    /// read-only, or [`DeviceError::ReadOnlyVolume`] if the medium was simply mounted
    /// write-protected.
    pub fn set_write_protected(&mut self, protected: bool) -> Result<(), DeviceError> {
        let medium = self.medium.as_mut().ok_or(DeviceError::NoMedia)?;
        if protected {
            medium.write_protected = true;
            return Ok(());
        }
        if !medium.write_protected {
            return Ok(());
        }
        if medium.backend.is_write_protected() {
            return Err(DeviceError::ReadOnlyFile);
        }
        Err(DeviceError::ReadOnlyVolume)
    }

    /// Sets (or clears, with `None`) the single legacy listener slot.
    pub fn set_legacy_listener(&mut self, listener: Option<ChangeListener>) {
        self.legacy_listener = listener;
    }

    fn notify_change(&mut self) {
        self.change_counter = self.change_counter.wrapping_add(1);
        if let Some(legacy) = &self.legacy_listener {
            legacy();
        }
        for (_, listener) in &self.listeners {
            listener();
        }
    }

    /// Inserts a medium backed by `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::BadLength`] if the backend's size doesn't match a supported
    /// geometry.
    pub fn insert_medium(
        &mut self,
        backend: Box<dyn ImageBackend>,
        write_protected: bool,
    ) -> Result<(), DeviceError> {
        let kind = crate::geometry::DriveKind::from_image_len(backend.len())
            .ok_or(DeviceError::BadLength)?;
        let track_bytes = kind.track_bytes();

        self.buffer = vec![0u8; track_bytes];
        self.state = BufferState::Idle;
        self.file_pos = -1;
        self.changes_made_since_mount = false;

        let write_protected = write_protected || backend.is_write_protected();
        self.medium = Some(Medium {
            backend,
            kind,
            write_protected,
            mfm: MfmContext::for_kind(kind),
        });

        if self.config.cache_enabled
            && kind == crate::geometry::DriveKind::Dd
            && self.cache.fits(kind.image_bytes())
        {
            self.prefill_cache();
        }

        self.notify_change();
        debug!(unit = self.id, ?kind, "medium inserted");
        Ok(())
    }

    fn prefill_cache(&mut self) {
        let Some(medium) = self.medium.as_mut() else {
            return;
        };
        let track_bytes = medium.kind.track_bytes();
        let mut scratch = vec![0u8; track_bytes];
        for track in 0..medium.kind.num_tracks() as u32 {
            let offset = u64::from(track) * track_bytes as u64;
            if medium.backend.read_at(offset, &mut scratch).is_err() {
                return;
            }
            self.cache
                .store(self.id, track, &scratch, StoreMode::Allocate);
        }
        trace!(unit = self.id, "prefilled cache from freshly inserted medium");
    }

    /// Ejects the current medium, flushing any dirty buffer first.
    ///
    /// # Errors
    ///
    /// Propagates a write-back failure from [`Self::update`]; the medium remains inserted in
    /// that case so the caller can retry or give up without losing track of unsaved writes.
    pub fn eject(&mut self) -> Result<(), DeviceError> {
        self.update()?;
        if let Some(mut medium) = self.medium.take() {
            if self.changes_made_since_mount {
                let _ = medium.backend.flush();
            }
        }
        self.state = BufferState::Idle;
        self.file_pos = -1;
        self.motor_on = false;
        self.cache.invalidate_unit(self.id);
        self.notify_change();
        debug!(unit = self.id, "medium ejected");
        Ok(())
    }

    /// Is media present? Returns `true` if no medium (matching the original command's polarity:
    /// 0 means present).
    #[must_use]
    pub const fn change_state_absent(&self) -> bool {
        self.medium.is_none()
    }

    fn track_bytes(&self) -> Result<usize, DeviceError> {
        self.medium.as_ref().map(|m| m.kind.track_bytes()).ok_or(DeviceError::NoMedia)
    }

    fn validate_range(&self, offset: u64, len: usize) -> Result<(), DeviceError> {
        if offset % SECTOR_BYTES as u64 != 0 {
            return Err(DeviceError::BadAddress);
        }
        if len % SECTOR_BYTES != 0 {
            return Err(DeviceError::BadLength);
        }
        let total = self.medium.as_ref().ok_or(DeviceError::NoMedia)?.kind.image_bytes() as u64;
        if offset.saturating_add(len as u64) > total {
            return Err(DeviceError::BadAddress);
        }
        Ok(())
    }

    /// Flushes the buffer if dirty. A no-op if the buffer's checksum is unchanged from the last
    /// write-back (unless [`Self::mark_whole_track_overwrite`] set the ignore-once flag).
    ///
    /// # Errors
    ///
    /// Maps backend failures through [`DeviceError`]; a write-protect-like failure additionally
    /// marks the medium write-protected, and a removed-medium failure ejects the medium.
    pub fn update(&mut self) -> Result<(), DeviceError> {
        let BufferState::Dirty { track } = self.state else {
            return Ok(());
        };
        let new_checksum = Checksum::compute(&self.buffer);
        if !self.ignore_checksum_once && new_checksum == self.last_checksum {
            self.state = BufferState::Holding { track };
            return Ok(());
        }

        let track_bytes = self.track_bytes()?;
        let offset = u64::from(track) * track_bytes as u64;
        let buffer = self.buffer.clone();

        let write_result = {
            let medium = self.medium.as_mut().ok_or(DeviceError::NoMedia)?;
            medium.backend.write_at(offset, &buffer)
        };

        if let Err(backend_err) = write_result {
            let mapped: DeviceError = backend_err.into();
            match mapped {
                DeviceError::WriteProtected => {
                    if let Some(medium) = self.medium.as_mut() {
                        medium.write_protected = true;
                    }
                }
                DeviceError::DiskChanged => {
                    self.medium = None;
                    self.motor_on = false;
                }
                _ => {}
            }
            warn!(unit = self.id, track, error = ?mapped, "write-back failed");
            return Err(mapped);
        }

        self.file_pos = i64::try_from(offset + track_bytes as u64).unwrap_or(-1);
        self.cache.store(self.id, track, &buffer, StoreMode::UpdateOnly);
        self.changes_made_since_mount = true;
        self.last_checksum = new_checksum;
        self.ignore_checksum_once = false;
        self.state = BufferState::Holding { track };
        trace!(unit = self.id, track, "write-back committed");
        Ok(())
    }

    /// Loads `track` into the buffer, flushing a dirty buffer for a different track first, and
    /// skipping the load entirely if the buffer already holds `track`.
    fn ensure_track_loaded(&mut self, track: u32) -> Result<(), DeviceError> {
        if self.state.current_track() == Some(track) {
            return Ok(());
        }
        self.update()?;

        let track_bytes = self.track_bytes()?;
        let kind = self.medium.as_ref().ok_or(DeviceError::NoMedia)?.kind;
        let cacheable = self.config.cache_enabled && kind == crate::geometry::DriveKind::Dd;

        if cacheable && self.cache.lookup(self.id, track, &mut self.buffer) {
            trace!(unit = self.id, track, "track cache hit");
        } else {
            let offset = u64::from(track) * track_bytes as u64;
            let medium = self.medium.as_mut().ok_or(DeviceError::NoMedia)?;
            medium
                .backend
                .read_at(offset, &mut self.buffer)
                .map_err(DeviceError::from)?;
            self.file_pos = i64::try_from(offset + track_bytes as u64).unwrap_or(-1);
            if cacheable {
                self.cache.store(self.id, track, &self.buffer, StoreMode::Allocate);
            }
            trace!(unit = self.id, track, "track loaded from backend");
        }
        self.last_checksum = Checksum::compute(&self.buffer);
        self.state = BufferState::Holding { track };
        Ok(())
    }

    /// Reads `len` bytes starting at `offset` into `out`.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_range`] and [`Self::ensure_track_loaded`].
    pub fn read(&mut self, offset: u64, out: &mut [u8]) -> Result<(), DeviceError> {
        self.validate_range(offset, out.len())?;
        self.motor_on = true;
        self.turn_motor_off_requested = false;
        let track_bytes = self.track_bytes()?;

        let mut done = 0usize;
        while done < out.len() {
            let abs = offset + done as u64;
            #[allow(clippy::cast_possible_truncation)]
            let track = (abs / track_bytes as u64) as u32;
            #[allow(clippy::cast_possible_truncation)]
            let track_offset = (abs % track_bytes as u64) as usize;

            self.ensure_track_loaded(track)?;
            let take = (track_bytes - track_offset).min(out.len() - done);
            out[done..done + take].copy_from_slice(&self.buffer[track_offset..track_offset + take]);
            done += take;
        }
        Ok(())
    }

    /// Writes `data` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::WriteProtected`] if the medium is write-protected; see also
    /// [`Self::validate_range`] and [`Self::ensure_track_loaded`].
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        self.validate_range(offset, data.len())?;
        if self.is_write_protected() {
            return Err(DeviceError::WriteProtected);
        }
        self.motor_on = true;
        self.turn_motor_off_requested = false;
        let track_bytes = self.track_bytes()?;

        let mut done = 0usize;
        while done < data.len() {
            let abs = offset + done as u64;
            #[allow(clippy::cast_possible_truncation)]
            let track = (abs / track_bytes as u64) as u32;
            #[allow(clippy::cast_possible_truncation)]
            let track_offset = (abs % track_bytes as u64) as usize;
            let take = (track_bytes - track_offset).min(data.len() - done);

            let whole_track = track_offset == 0 && take == track_bytes;
            if whole_track {
                if self.state.current_track() != Some(track) {
                    self.update()?;
                }
                self.ignore_checksum_once = true;
            } else {
                self.ensure_track_loaded(track)?;
            }

            self.buffer[track_offset..track_offset + take].copy_from_slice(&data[done..done + take]);
            self.state = BufferState::Dirty { track };
            done += take;
        }
        Ok(())
    }

    /// Overwrites whole tracks with `data` (the `Format` command). Identical to [`Self::write`]
    /// except every covered track must be aligned and whole; callers are expected to pass
    /// track-aligned, track-sized chunks.
    ///
    /// # Errors
    ///
    /// Same as [`Self::write`].
    pub fn format(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let track_bytes = self.track_bytes()?;
        if offset % track_bytes as u64 != 0 || data.len() % track_bytes != 0 {
            return Err(DeviceError::BadAddress);
        }
        self.write(offset, data)
    }

    /// Nominal head move: validates the offset but otherwise performs no work.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_range`].
    pub fn seek(&mut self, offset: u64) -> Result<(), DeviceError> {
        self.validate_range(offset, 0)
    }

    /// Discards the track buffer without writing back any pending modification.
    pub fn clear(&mut self) {
        self.state = BufferState::Idle;
        self.file_pos = -1;
        self.ignore_checksum_once = false;
    }

    /// Encodes `track` via MFM into `out`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoMedia`] if no medium is inserted, or [`DeviceError::BadAddress`]
    /// if `track` is out of range.
    pub fn raw_read(&mut self, track: u32, out: &mut [u8]) -> Result<usize, DeviceError> {
        let kind = self.drive_kind()?;
        if track >= kind.num_tracks() as u32 {
            return Err(DeviceError::BadAddress);
        }
        self.ensure_track_loaded(track)?;
        let buffer = self.buffer.clone();
        let medium = self.medium.as_mut().ok_or(DeviceError::NoMedia)?;
        let encoded = medium.mfm.encode(track, &buffer);
        let n = encoded.len().min(out.len());
        out[..n].copy_from_slice(&encoded[..n]);
        Ok(n)
    }
}
