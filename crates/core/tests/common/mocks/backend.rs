use mockall::mock;
use trackfile_core::backend::{BackendError, ImageBackend};

mock! {
    pub Backend {}
    impl ImageBackend for Backend {
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), BackendError>;
        fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), BackendError>;
        fn flush(&mut self) -> Result<(), BackendError>;
        fn len(&self) -> u64;
        fn is_write_protected(&self) -> bool;
    }
}
