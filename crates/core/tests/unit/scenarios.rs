//! End-to-end scenarios driven entirely through [`DeviceSupervisor::dispatch`], exercising a
//! unit's full request surface the way an embedder actually calls it rather than any one
//! module's internals.

use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::TestContext;
use trackfile_core::command::{Command, ReplyValue};
use trackfile_core::config::Config;
use trackfile_core::geometry::DriveKind;
use trackfile_core::DeviceError;

#[rstest]
#[case::dd(DriveKind::Dd)]
#[case::hd(DriveKind::Hd)]
fn write_then_read_round_trips_for_every_drive_kind(#[case] kind: DriveKind) {
    let ctx = TestContext::default_config().with_unit(0, kind, false);

    let written = ctx.send(
        0,
        Command::Write {
            offset: 0,
            data: vec![0x5Au8; 512],
        },
    );
    assert_eq!(written, Ok(ReplyValue::Actual(512)));

    let read = ctx.send(0, Command::Read { offset: 0, len: 512 });
    assert_eq!(read, Ok(ReplyValue::Bytes(vec![0x5Au8; 512])));
}

#[rstest]
#[case::dd(DriveKind::Dd)]
#[case::hd(DriveKind::Hd)]
fn write_protected_medium_rejects_every_write_regardless_of_kind(#[case] kind: DriveKind) {
    let ctx = TestContext::default_config().with_unit(0, kind, true);

    let written = ctx.send(
        0,
        Command::Write {
            offset: 0,
            data: vec![1u8; 512],
        },
    );
    assert_eq!(written, Err(DeviceError::WriteProtected));
}

#[test]
fn set_write_protect_then_clear_fails_once_engaged() {
    let ctx = TestContext::default_config().with_unit(0, DriveKind::Dd, false);

    let engaged = ctx.send(0, Command::SetWriteProtect { protected: true });
    assert_eq!(engaged, Ok(ReplyValue::Ok));

    let write = ctx.send(
        0,
        Command::Write {
            offset: 0,
            data: vec![1u8; 512],
        },
    );
    assert_eq!(write, Err(DeviceError::WriteProtected));

    let cleared = ctx.send(0, Command::SetWriteProtect { protected: false });
    assert_eq!(cleared, Err(DeviceError::ReadOnlyVolume));
}

#[test]
fn eject_then_stale_request_reports_disk_changed() {
    let ctx = TestContext::default_config().with_unit(0, DriveKind::Dd, false);
    let stale = ctx
        .send(0, Command::ChangeNum)
        .map(|v| match v {
            ReplyValue::Actual(n) => n as u32,
            _ => unreachable!(),
        })
        .unwrap();

    ctx.send(0, Command::Eject).unwrap();

    let reply = ctx.supervisor.dispatch(
        0,
        trackfile_core::command::Request::new(Command::ChangeState).with_stale_check(stale),
    );
    assert_eq!(reply, Err(DeviceError::DiskChanged));
}

#[test]
fn add_change_int_parks_until_a_matching_rem_change_int_arrives() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use trackfile_core::unit::engine::ListenerId;

    let ctx = Arc::new(TestContext::default_config().with_unit(0, DriveKind::Dd, false));
    let fired = Arc::new(AtomicBool::new(false));
    let fired_in_listener = Arc::clone(&fired);
    let id = ListenerId::new(42);

    // A queued `AddChangeInt` never replies until a matching `RemChangeInt` arrives, so its
    // dispatch has to run on its own thread: this call blocks until this test's own
    // `RemChangeInt` below completes it.
    let waiting_ctx = Arc::clone(&ctx);
    let parked = thread::spawn(move || {
        waiting_ctx.send(
            0,
            Command::AddChangeInt(id, Box::new(move || fired_in_listener.store(true, Ordering::SeqCst))),
        )
    });

    // Give the worker a moment to actually park the request before probing it.
    thread::sleep(Duration::from_millis(50));
    assert!(!parked.is_finished(), "AddChangeInt must not reply before it is removed");

    ctx.send(0, Command::Eject).unwrap();
    assert!(fired.load(Ordering::SeqCst), "listener should fire on eject");

    let removed = ctx.send(0, Command::RemChangeInt(id));
    assert_eq!(removed, Ok(ReplyValue::Ok));

    let reply = parked.join().unwrap();
    assert_eq!(reply, Ok(ReplyValue::Ok));
}

fn config_with_cache_disabled() -> Config {
    let mut config = Config::default();
    config.cache.max_bytes = 0;
    config
}

#[test]
fn a_disabled_cache_still_serves_correct_reads() {
    let ctx = TestContext::new(config_with_cache_disabled()).with_unit(0, DriveKind::Dd, false);

    ctx.send(
        0,
        Command::Write {
            offset: 512,
            data: vec![0x77u8; 512],
        },
    )
    .unwrap();
    let read = ctx.send(0, Command::Read { offset: 512, len: 512 });
    assert_eq!(read, Ok(ReplyValue::Bytes(vec![0x77u8; 512])));
}
