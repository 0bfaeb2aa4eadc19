//! Ingest facade
//!
//! Entry point the HTTP layer calls with pre-validated fields. Log entries
//! go to the canonical store first and to the debug mirror second; a
//! mirror failure surfaces to the caller but the canonical write it
//! follows stands. Approval
//! events are written directly and idempotently, with no debouncing, because
//! each must be durably visible before the caller's notification step.

use std::sync::Arc;

use tracing::warn;

use crate::db::EventLogStore;
use crate::models::{ApprovalEvent, LogEntry};
use crate::services::mirror::LogMirror;
use crate::utils::StoreResult;

#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn EventLogStore>,
    mirror: Option<LogMirror>,
}

impl IngestService {
    pub fn new(store: Arc<dyn EventLogStore>, mirror: Option<LogMirror>) -> Self {
        Self { store, mirror }
    }

    pub fn store(&self) -> &Arc<dyn EventLogStore> {
        &self.store
    }

    /// Persist one log entry, then mirror it when the mirror is enabled.
    ///
    /// The canonical append happens first and is never undone. A mirror
    /// error can only come from a synchronous (threshold- or
    /// partition-change-triggered) flush and is reported to this caller;
    /// timer-triggered flush failures are handled inside the engine.
    pub async fn record_log_entry(&self, entry: &LogEntry) -> StoreResult<()> {
        self.store.append_log_entry(entry).await?;

        if let Some(ref mirror) = self.mirror {
            if let Err(e) = mirror.buffer_entry(entry).await {
                warn!(
                    instance_id = %entry.instance_id,
                    error = %e,
                    "Mirror flush failed after canonical append"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Idempotent approval event write; `true` iff a new row was created.
    /// The caller fires its own webhook only after this returns.
    pub async fn record_approval_event(&self, event: &ApprovalEvent) -> StoreResult<bool> {
        self.store.insert_approval_event(event).await
    }
}
