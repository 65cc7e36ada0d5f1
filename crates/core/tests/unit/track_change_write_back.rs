//! Writing a track, then reading a different track without an explicit `Update`, must flush the
//! dirty track to the backing file before the buffer moves on — the backend never sees the old
//! contents of a track the engine is about to evict from its single track buffer.

use std::io::{Read as _, Seek as _, SeekFrom, Write as _};

use trackfile_core::backend::FileBackend;
use trackfile_core::command::{Command, Request};
use trackfile_core::config::Config;
use trackfile_core::geometry::DriveKind;
use trackfile_core::DeviceSupervisor;

#[test]
fn write_back_happens_when_the_buffer_moves_to_another_track() {
    let mut image = tempfile::NamedTempFile::new().unwrap();
    image.write_all(&vec![0u8; DriveKind::Dd.image_bytes()]).unwrap();
    image.flush().unwrap();

    let mut supervisor = DeviceSupervisor::new(Config::default());
    supervisor.create_unit(0).unwrap();
    let backend = FileBackend::open(image.path(), false).unwrap();
    supervisor.insert_medium(0, Box::new(backend), false).unwrap();

    let track_bytes = DriveKind::Dd.track_bytes();
    let pattern = vec![0x5Au8; track_bytes];
    let reply = supervisor.dispatch(
        0,
        Request::new(Command::Write {
            offset: 0,
            data: pattern.clone(),
        }),
    );
    assert!(reply.is_ok());

    // The write landed in the track buffer only so far; the file on disk is still untouched.
    let mut on_disk = vec![0u8; track_bytes];
    image.as_file_mut().seek(SeekFrom::Start(0)).unwrap();
    image.as_file_mut().read_exact(&mut on_disk).unwrap();
    assert_ne!(on_disk, pattern, "write-back must not happen eagerly");

    // Reading a different track forces the buffer to move, which must flush track 0 first.
    let reply = supervisor.dispatch(
        0,
        Request::new(Command::Read {
            offset: track_bytes as u64,
            len: 512,
        }),
    );
    assert!(reply.is_ok());

    let mut on_disk = vec![0u8; track_bytes];
    image.as_file_mut().seek(SeekFrom::Start(0)).unwrap();
    image.as_file_mut().read_exact(&mut on_disk).unwrap();
    assert_eq!(on_disk, pattern, "track 0 must be written back before track 1 loads");

    supervisor.destroy_unit(0).unwrap();
}
