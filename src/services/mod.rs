//! Core services

pub mod file_lock;
pub mod ingest;
pub mod mirror;
pub mod refresh;

pub use file_lock::FileLockGuard;
pub use ingest::IngestService;
pub use mirror::LogMirror;
pub use refresh::RefreshNotifier;
