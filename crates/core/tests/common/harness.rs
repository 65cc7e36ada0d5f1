//! A fluent builder over [`DeviceSupervisor`], for scenario tests that would otherwise repeat
//! the same create-unit/insert-medium boilerplate every time.

use std::io::Write as _;

use trackfile_core::backend::FileBackend;
use trackfile_core::command::{Command, Reply, Request};
use trackfile_core::config::Config;
use trackfile_core::geometry::DriveKind;
use trackfile_core::DeviceSupervisor;

/// Owns both the supervisor and the backing temp file, so the file outlives every unit that
/// might still hold it open.
pub struct TestContext {
    pub supervisor: DeviceSupervisor,
    _images: Vec<tempfile::NamedTempFile>,
}

impl TestContext {
    /// Builds a supervisor from `config`, with no units registered yet.
    pub fn new(config: Config) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("trackfile_core=debug")
            .try_init();
        let _ = env_logger::builder().is_test(true).try_init();

        Self {
            supervisor: DeviceSupervisor::new(config),
            _images: Vec::new(),
        }
    }

    /// Builds a supervisor with the default configuration.
    pub fn default_config() -> Self {
        Self::new(Config::default())
    }

    /// Creates unit `id` and inserts a freshly zeroed image of `kind`, write-protected or not.
    pub fn with_unit(mut self, id: u32, kind: DriveKind, write_protected: bool) -> Self {
        log::info!(
            "test harness: creating unit {id} ({kind:?}, write_protected={write_protected})"
        );
        self.supervisor.create_unit(id).unwrap();
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(&vec![0u8; kind.image_bytes()]).unwrap();
        image.flush().unwrap();
        let backend = FileBackend::open(image.path(), false).unwrap();
        self.supervisor
            .insert_medium(id, Box::new(backend), write_protected)
            .unwrap();
        self._images.push(image);
        self
    }

    /// Dispatches `command` to `id` as a plain (non-extended, non-quick) request.
    pub fn send(&self, id: u32, command: Command) -> Reply {
        self.supervisor.dispatch(id, Request::new(command))
    }
}
