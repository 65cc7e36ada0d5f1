//! Executes a single [`Request`] against a unit's [`UnitEngine`].
//!
//! [`Router::dispatch`] is the one place command arguments are translated into engine calls; it
//! is shared verbatim by the always-immediate path (run on the caller's context) and the worker
//! path (run on the unit's worker thread), so the two paths can never drift apart.

use crate::DeviceError;
use crate::unit::UnitEngine;

use super::{Command, Reply, ReplyValue, Request};

/// Stateless dispatcher: translates a [`Request`] into the matching [`UnitEngine`] call.
#[derive(Debug, Default, Clone, Copy)]
pub struct Router;

impl Router {
    /// Executes `request` against `engine`, returning its reply.
    #[allow(clippy::too_many_lines)]
    pub fn dispatch(engine: &mut UnitEngine, request: Request) -> Reply {
        if let Some(expected) = request.stale_check {
            if expected != engine.change_counter() {
                return Err(DeviceError::DiskChanged);
            }
        }

        match request.command {
            Command::Clear => {
                engine.clear();
                Ok(ReplyValue::Ok)
            }
            Command::Read { offset, len } => {
                let mut out = vec![0u8; len];
                engine.read(offset, &mut out)?;
                Ok(ReplyValue::Bytes(out))
            }
            Command::Write { offset, data } => {
                let len = data.len();
                engine.write(offset, &data)?;
                Ok(ReplyValue::Actual(len as u64))
            }
            Command::Update => {
                engine.update()?;
                Ok(ReplyValue::Ok)
            }
            Command::Format { offset, data } => {
                let len = data.len();
                engine.format(offset, &data)?;
                Ok(ReplyValue::Actual(len as u64))
            }
            Command::Seek { offset } => {
                engine.seek(offset)?;
                Ok(ReplyValue::Ok)
            }
            Command::Motor { on } => {
                let was_on = engine.set_motor(on);
                Ok(ReplyValue::Bool(was_on))
            }
            Command::Eject => {
                engine.eject()?;
                Ok(ReplyValue::Ok)
            }
            Command::ChangeState => Ok(ReplyValue::Bool(engine.change_state_absent())),
            Command::ChangeNum => Ok(ReplyValue::Actual(u64::from(engine.change_counter()))),
            Command::AddChangeInt(id, listener) => {
                // Reached only via the always-immediate/inline-fallback paths, where there is no
                // worker channel to park a reply on; the worker's queued path intercepts this
                // command before it ever reaches the router, so it can park instead.
                engine.add_change_listener(id, listener);
                Ok(ReplyValue::Ok)
            }
            Command::RemChangeInt(id) => {
                engine.remove_change_listener(id);
                Ok(ReplyValue::Ok)
            }
            Command::RemoveLegacy(listener) => {
                engine.set_legacy_listener(listener);
                Ok(ReplyValue::Ok)
            }
            Command::ProtStatus => Ok(ReplyValue::Bool(engine.is_write_protected())),
            Command::GetDriveType => Ok(ReplyValue::DriveType(engine.drive_kind()?)),
            Command::GetNumTracks => {
                let kind = engine.drive_kind()?;
                Ok(ReplyValue::Actual(kind.num_tracks() as u64))
            }
            Command::GetGeometry => Ok(ReplyValue::Geometry(engine.geometry()?)),
            Command::RawRead { track, len } => {
                let mut out = vec![0u8; len];
                let n = engine.raw_read(track, &mut out)?;
                out.truncate(n);
                Ok(ReplyValue::Bytes(out))
            }
            Command::DeviceQuery => Ok(ReplyValue::DriveType(engine.drive_kind().unwrap_or(
                crate::geometry::DriveKind::Dd,
            ))),
            Command::SetWriteProtect { protected } => {
                engine.set_write_protected(protected)?;
                Ok(ReplyValue::Ok)
            }
            Command::Start | Command::Stop => {
                // Intercepted by `DeviceSupervisor::dispatch` before reaching the router: only the
                // supervisor can start or stop a unit's worker thread. A request that somehow
                // reaches here anyway has no unit-level meaning.
                Err(DeviceError::NoCommand)
            }
        }
    }
}
