//! In-memory event log store
//!
//! Test double satisfying the same contract as the SQLite backend. Backs
//! the same ordering and idempotency semantics with plain vectors so unit
//! tests and embedding applications can run without a database file.

use std::collections::HashSet;

use tokio::sync::RwLock;

use crate::db::store::EventLogStore;
use crate::models::{ApprovalEvent, ApprovalEventFilter, LogEntry};
use crate::utils::{StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    initialized: bool,
    log_entries: Vec<LogEntry>,
    approval_events: Vec<ApprovalEvent>,
    idempotency_keys: HashSet<(String, String, String, &'static str)>,
}

#[derive(Default)]
pub struct MemoryEventStore {
    inner: RwLock<Inner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn ensure_init(&self) -> StoreResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }
}

#[async_trait::async_trait]
impl EventLogStore for MemoryEventStore {
    async fn init(&self) -> StoreResult<()> {
        self.inner.write().await.initialized = true;
        Ok(())
    }

    async fn append_log_entry(&self, entry: &LogEntry) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_init()?;
        inner.log_entries.push(entry.clone());
        Ok(())
    }

    async fn list_log_entries(&self, instance_id: &str) -> StoreResult<Vec<LogEntry>> {
        let inner = self.inner.read().await;
        inner.ensure_init()?;

        let mut entries: Vec<LogEntry> = inner
            .log_entries
            .iter()
            .filter(|e| e.instance_id == instance_id)
            .cloned()
            .collect();
        // Stable sort preserves insertion order for equal event times
        entries.sort_by_key(|e| e.event_time);
        Ok(entries)
    }

    async fn insert_approval_event(&self, event: &ApprovalEvent) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        inner.ensure_init()?;

        let key = (
            event.org_id.clone(),
            event.agent_name.clone(),
            event.decision_point_id.clone(),
            event.event_type.as_str(),
        );
        if !inner.idempotency_keys.insert(key) {
            return Ok(false);
        }
        inner.approval_events.push(event.clone());
        Ok(true)
    }

    async fn approval_events_for_decision_point(
        &self,
        org_id: &str,
        agent_name: &str,
        decision_point_id: &str,
    ) -> StoreResult<Vec<ApprovalEvent>> {
        let inner = self.inner.read().await;
        inner.ensure_init()?;

        let mut events: Vec<ApprovalEvent> = inner
            .approval_events
            .iter()
            .filter(|e| {
                e.org_id == org_id
                    && e.agent_name == agent_name
                    && e.decision_point_id == decision_point_id
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    async fn approval_request_payload(
        &self,
        org_id: &str,
        agent_name: &str,
        decision_point_id: &str,
    ) -> StoreResult<Option<serde_json::Value>> {
        let events = self
            .approval_events_for_decision_point(org_id, agent_name, decision_point_id)
            .await?;

        Ok(events
            .into_iter()
            .find(|e| e.event_type == crate::models::ApprovalEventType::ApprovalRequest)
            .map(|e| e.payload))
    }

    async fn query_approval_events(
        &self,
        filter: &ApprovalEventFilter,
    ) -> StoreResult<Vec<ApprovalEvent>> {
        let inner = self.inner.read().await;
        inner.ensure_init()?;

        let mut events: Vec<ApprovalEvent> = inner
            .approval_events
            .iter()
            .filter(|e| e.org_id == filter.org_id && e.agent_name == filter.agent_name)
            .filter(|e| filter.event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| {
                filter
                    .sim_run_id
                    .as_ref()
                    .map_or(true, |s| e.sim_run_id.as_ref() == Some(s))
            })
            .filter(|e| filter.start.map_or(true, |s| e.created_at >= s))
            .filter(|e| filter.end.map_or(true, |s| e.created_at <= s))
            .cloned()
            .collect();

        events.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });

        let offset = filter.offset.unwrap_or(0) as usize;
        let events = events.into_iter().skip(offset);
        Ok(match filter.limit {
            Some(limit) => events.take(limit as usize).collect(),
            None => events.collect(),
        })
    }
}
