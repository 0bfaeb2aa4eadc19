//! Agent Event Store
//!
//! Durable event log store for agent telemetry and approval workflows:
//! structured log lines and approval lifecycle events from many concurrent
//! agent processes, persisted to an embedded SQLite database and served
//! back as ordered, filtered views. A debounced, cross-process-locked
//! debug mirror can additionally write one human-readable text file per
//! calendar month.
//!
//! The embedding application (typically an HTTP layer) validates input and
//! calls the [`db::EventLogStore`] operations or the
//! [`services::IngestService`] facade.

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use config::StoreConfig;
pub use db::{init_pool, DbPool, EventLogStore, MemoryEventStore, SqliteEventStore};
pub use models::{ApprovalEvent, ApprovalEventFilter, ApprovalEventType, LogEntry};
pub use services::{IngestService, LogMirror};
pub use utils::{StoreError, StoreResult};
