//! The motor does not turn off the instant a `Motor { on: false }` request arrives — only once
//! the unit's periodic tick observes the pending off-request with no further activity in between.

use std::io::Write as _;
use std::thread::sleep;
use std::time::Duration;

use trackfile_core::backend::FileBackend;
use trackfile_core::command::{Command, Reply, ReplyValue, Request};
use trackfile_core::config::Config;
use trackfile_core::geometry::DriveKind;
use trackfile_core::DeviceSupervisor;

fn was_on(reply: Reply) -> bool {
    matches!(reply, Ok(ReplyValue::Bool(true)))
}

#[test]
fn motor_turns_off_only_after_the_timeout_tick_observes_no_activity() {
    let mut image = tempfile::NamedTempFile::new().unwrap();
    image.write_all(&vec![0u8; DriveKind::Dd.image_bytes()]).unwrap();
    image.flush().unwrap();

    let mut config = Config::default();
    config.unit.motor_timeout_ms = 80;

    let mut supervisor = DeviceSupervisor::new(config);
    supervisor.create_unit(0).unwrap();
    let backend = FileBackend::open(image.path(), false).unwrap();
    supervisor.insert_medium(0, Box::new(backend), false).unwrap();

    // A read turns the motor on.
    let reply = supervisor.dispatch(0, Request::new(Command::Read { offset: 0, len: 512 }));
    assert!(reply.is_ok());

    // Requesting off does not clear the motor flag on the spot: the previous state is still "on".
    let reply = supervisor.dispatch(0, Request::new(Command::Motor { on: false }));
    assert!(was_on(reply), "motor off-request should report the motor as still on");

    // Once the worker has gone a full tick period with no further requests, the timeout action
    // has had a chance to run and the motor should be off.
    sleep(Duration::from_millis(300));

    let reply = supervisor.dispatch(0, Request::new(Command::Motor { on: true }));
    assert!(
        !was_on(reply),
        "motor should have been turned off by the timeout tick by now"
    );

    supervisor.destroy_unit(0).unwrap();
}
