//! Approval workflow models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of approval lifecycle fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalEventType {
    ApprovalRequest,
    ApprovalOutcome,
}

impl ApprovalEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalEventType::ApprovalRequest => "approval_request",
            ApprovalEventType::ApprovalOutcome => "approval_outcome",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approval_request" => Some(ApprovalEventType::ApprovalRequest),
            "approval_outcome" => Some(ApprovalEventType::ApprovalOutcome),
            _ => None,
        }
    }
}

/// One immutable fact in an approval workflow.
///
/// The idempotency key is (`org_id`, `agent_name`, `decision_point_id`,
/// `event_type`); a second write with the same key is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalEvent {
    /// Globally unique event identifier (primary key)
    pub event_id: String,
    pub org_id: String,
    pub agent_name: String,
    /// Identifies one approval slot
    pub decision_point_id: String,
    pub event_type: ApprovalEventType,
    pub created_at: DateTime<Utc>,
    /// Enrichment extracted from the payload; null when absent or unparseable
    pub sim_run_id: Option<String>,
    /// Opaque document, stored verbatim and round-tripped on read
    pub payload: serde_json::Value,
}

impl ApprovalEvent {
    pub fn new(
        event_id: &str,
        org_id: &str,
        agent_name: &str,
        decision_point_id: &str,
        event_type: ApprovalEventType,
        payload: serde_json::Value,
    ) -> Self {
        let sim_run_id = extract_sim_run_id(&payload);
        Self {
            event_id: event_id.to_string(),
            org_id: org_id.to_string(),
            agent_name: agent_name.to_string(),
            decision_point_id: decision_point_id.to_string(),
            event_type,
            created_at: Utc::now(),
            sim_run_id,
            payload,
        }
    }
}

/// Filter for `query_approval_events`; `org_id` and `agent_name` are
/// required, everything else narrows the result set.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApprovalEventFilter {
    pub org_id: String,
    pub agent_name: String,
    pub event_type: Option<ApprovalEventType>,
    pub sim_run_id: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ApprovalEventFilter {
    pub fn new(org_id: &str, agent_name: &str) -> Self {
        Self {
            org_id: org_id.to_string(),
            agent_name: agent_name.to_string(),
            ..Default::default()
        }
    }
}

/// Extract a `sim_run_id` field from an event payload.
///
/// Payloads arrive either as a structured document or as a JSON-encoded
/// string; a string payload is parsed first. The field itself may be a
/// string or a number. Every failure yields `None`; this is an
/// enrichment, never a required property.
pub fn extract_sim_run_id(payload: &serde_json::Value) -> Option<String> {
    let doc: serde_json::Value;
    let resolved = match payload {
        serde_json::Value::String(raw) => {
            doc = serde_json::from_str(raw).ok()?;
            &doc
        }
        other => other,
    };

    match resolved.get("sim_run_id")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
