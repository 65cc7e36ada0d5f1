//! Engine behavior against a mocked backend, for failure modes a real file backend can't easily
//! be coaxed into (a flaky read, a write that succeeds once then starts failing).

use std::sync::Arc;

use mockall::predicate::always;

use crate::common::mocks::backend::MockBackend;
use trackfile_core::backend::BackendError;
use trackfile_core::cache::TrackCache;
use trackfile_core::config::UnitConfig;
use trackfile_core::geometry::DriveKind;
use trackfile_core::unit::UnitEngine;
use trackfile_core::DeviceError;

fn engine() -> UnitEngine {
    let cache = Arc::new(TrackCache::new(16 * DriveKind::Dd.track_bytes()));
    UnitEngine::new(0, UnitConfig::default(), cache)
}

fn dd_backend_mock() -> MockBackend {
    let mut backend = MockBackend::new();
    backend.expect_len().return_const(DriveKind::Dd.image_bytes() as u64);
    backend.expect_is_write_protected().return_const(false);
    backend
}

#[test]
fn unexpected_eof_on_read_surfaces_as_no_sector_header() {
    let mut engine = engine();
    let mut backend = dd_backend_mock();
    backend
        .expect_read_at()
        .with(always(), always())
        .returning(|_, _| Err(BackendError::Io(std::io::ErrorKind::UnexpectedEof)));
    engine.insert_medium(Box::new(backend), false).unwrap();

    let mut out = vec![0u8; 512];
    assert_eq!(engine.read(0, &mut out), Err(DeviceError::NoSectorHeader));
}

#[test]
fn invalid_data_on_read_surfaces_as_bad_sector_header() {
    let mut engine = engine();
    let mut backend = dd_backend_mock();
    backend
        .expect_read_at()
        .with(always(), always())
        .returning(|_, _| Err(BackendError::Io(std::io::ErrorKind::InvalidData)));
    engine.insert_medium(Box::new(backend), false).unwrap();

    let mut out = vec![0u8; 512];
    assert_eq!(engine.read(0, &mut out), Err(DeviceError::BadSectorHeader));
}

#[test]
fn a_write_that_starts_failing_write_protected_marks_the_medium_write_protected() {
    let mut engine = engine();
    let mut backend = dd_backend_mock();
    backend
        .expect_write_at()
        .with(always(), always())
        .returning(|_, _| Err(BackendError::WriteProtected));
    engine.insert_medium(Box::new(backend), false).unwrap();
    assert!(!engine.is_write_protected());

    let err = engine.write(0, &[0xAAu8; 512]);
    assert_eq!(err, Err(DeviceError::WriteProtected));
    assert!(engine.is_write_protected());
}

#[test]
fn a_write_that_reports_medium_removed_ejects_the_unit() {
    let mut engine = engine();
    let mut backend = dd_backend_mock();
    backend
        .expect_write_at()
        .with(always(), always())
        .returning(|_, _| Err(BackendError::MediumRemoved));
    engine.insert_medium(Box::new(backend), false).unwrap();

    let err = engine.write(0, &[0xAAu8; 512]);
    assert_eq!(err, Err(DeviceError::DiskChanged));
    assert!(!engine.has_medium());
}

#[test]
fn write_protected_flag_from_the_backend_itself_is_honored_on_insert() {
    let mut engine = engine();
    let mut backend = MockBackend::new();
    backend.expect_len().return_const(DriveKind::Dd.image_bytes() as u64);
    backend.expect_is_write_protected().return_const(true);
    engine.insert_medium(Box::new(backend), false).unwrap();

    assert!(engine.is_write_protected());
    assert_eq!(engine.set_write_protected(false), Err(DeviceError::ReadOnlyFile));
}
