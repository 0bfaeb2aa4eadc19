//! Configuration types
//!
//! Plain serde structs with defaults for every field. Loading them from a
//! file or the environment is the embedding application's concern, not
//! this crate's.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level store configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

/// Canonical SQLite store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Busy-wait bound for contended writers; past this the write fails
    /// rather than hanging the process
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

/// Partitioned debug-mirror configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mirror_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_mirror_prefix")]
    pub prefix: String,
    /// IANA zone used for calendar partitioning and display timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Delay before a timer-triggered flush; new arrivals do not reset it
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
    /// Buffer size that forces an immediate flush
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Refresh endpoint notified after a successful flush (fire-and-forget)
    #[serde(default)]
    pub refresh_url: Option<String>,
}

/// Cross-process partition lock configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_retries")]
    pub retries: u32,
    #[serde(default = "default_lock_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// A lockfile older than this is treated as abandoned and broken
    #[serde(default = "default_lock_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_database_url() -> String {
    "sqlite://data/agent-events.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_secs() -> u64 {
    5
}

fn default_mirror_directory() -> PathBuf {
    PathBuf::from("data/mirror")
}

fn default_mirror_prefix() -> String {
    "agent-log".to_string()
}

fn default_timezone() -> String {
    "America/Los_Angeles".to_string()
}

fn default_flush_delay_ms() -> u64 {
    1000
}

fn default_max_batch() -> usize {
    5
}

fn default_lock_retries() -> u32 {
    10
}

fn default_lock_retry_delay_ms() -> u64 {
    100
}

fn default_lock_stale_after_secs() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_mirror_directory(),
            prefix: default_mirror_prefix(),
            timezone: default_timezone(),
            flush_delay_ms: default_flush_delay_ms(),
            max_batch: default_max_batch(),
            refresh_url: None,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retries: default_lock_retries(),
            retry_delay_ms: default_lock_retry_delay_ms(),
            stale_after_secs: default_lock_stale_after_secs(),
        }
    }
}
