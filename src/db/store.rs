//! Event log store contract
//!
//! Every backend satisfies the same capability set: append-only log
//! persistence, idempotent event inserts, and indexed/filtered reads.
//! Callers hold a `dyn EventLogStore` so the canonical SQLite backend and
//! the in-memory test double are interchangeable.

use async_trait::async_trait;

use crate::models::{ApprovalEvent, ApprovalEventFilter, LogEntry};
use crate::utils::StoreResult;

#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Idempotent setup: create the schema if absent and apply additive
    /// migrations. Must run before any other operation; every operation
    /// on an uninitialized store fails with
    /// [`StoreError::NotInitialized`](crate::utils::StoreError::NotInitialized).
    async fn init(&self) -> StoreResult<()>;

    /// Durable single-row insert. No dedup.
    async fn append_log_entry(&self, entry: &LogEntry) -> StoreResult<()>;

    /// All entries for an instance, ordered by (`event_time` ascending,
    /// insertion sequence ascending) so ties share a stable total order.
    async fn list_log_entries(&self, instance_id: &str) -> StoreResult<Vec<LogEntry>>;

    /// Idempotent insert keyed on (org, agent, decision point, event type).
    /// Returns `true` iff a new row was created; a duplicate is a
    /// successful no-op, never an error.
    async fn insert_approval_event(&self, event: &ApprovalEvent) -> StoreResult<bool>;

    /// All events for one approval slot, ordered by `created_at` ascending.
    async fn approval_events_for_decision_point(
        &self,
        org_id: &str,
        agent_name: &str,
        decision_point_id: &str,
    ) -> StoreResult<Vec<ApprovalEvent>>;

    /// Payload of the earliest `approval_request` event for a slot, or
    /// `None` when no request exists or the stored payload is malformed.
    async fn approval_request_payload(
        &self,
        org_id: &str,
        agent_name: &str,
        decision_point_id: &str,
    ) -> StoreResult<Option<serde_json::Value>>;

    /// Filtered, paginated query over approval events. All supplied
    /// predicates are ANDed; results are ordered by (`created_at`
    /// ascending, `event_id` ascending) for deterministic pagination.
    async fn query_approval_events(
        &self,
        filter: &ApprovalEventFilter,
    ) -> StoreResult<Vec<ApprovalEvent>>;
}
