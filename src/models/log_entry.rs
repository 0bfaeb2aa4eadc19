//! Log entry model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of operational narration tied to an agent instance.
///
/// Immutable once ingested; the store never updates or deletes entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Opaque tenant/run identifier
    pub instance_id: String,
    pub service: String,
    pub level: String,
    /// Single-line text; embedded newlines are collapsed on ingestion
    pub message: String,
    pub username: String,
    /// Caller-supplied timestamp when valid, else ingestion time
    pub event_time: DateTime<Utc>,
    /// Ingestion instant, always server-assigned
    pub created_at: DateTime<Utc>,
    /// Optional tenant partition; empty string when absent
    #[serde(default)]
    pub org_id: String,
}

impl LogEntry {
    /// Build an entry from caller-supplied fields at ingestion time.
    ///
    /// `event_time` is taken from the caller when it parses as RFC 3339,
    /// otherwise the ingestion instant is used. The message is flattened to
    /// a single line.
    pub fn ingest(
        instance_id: &str,
        service: &str,
        level: &str,
        message: &str,
        username: &str,
        event_time: Option<&str>,
        org_id: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        let event_time = event_time
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);

        Self {
            instance_id: instance_id.trim().to_string(),
            service: service.to_string(),
            level: level.to_string(),
            message: collapse_newlines(message),
            username: username.to_string(),
            event_time,
            created_at: now,
            org_id: org_id.unwrap_or("").to_string(),
        }
    }
}

/// Replace any run of line-break characters with a single space
pub fn collapse_newlines(message: &str) -> String {
    if !message.contains(['\n', '\r']) {
        return message.to_string();
    }

    let mut out = String::with_capacity(message.len());
    let mut in_break = false;
    for ch in message.chars() {
        if ch == '\n' || ch == '\r' {
            if !in_break {
                out.push(' ');
                in_break = true;
            }
        } else {
            out.push(ch);
            in_break = false;
        }
    }
    out
}
