//! Partitioned debug-mirror with debounced flushing
//!
//! Secondary, non-canonical mirror of log entries: one human-readable text
//! file per calendar month. Writes are buffered per process and flushed as
//! one append when either the batch threshold is reached (synchronous, the
//! error surfaces to the triggering caller) or the debounce timer fires
//! (asynchronous, a failed batch is logged and dropped, an accepted loss for
//! a debug artifact; canonical writes never pass through here).
//!
//! State machine: Idle -> Armed on the first buffered line (timer set, NOT
//! reset by later arrivals) -> Flushing on threshold or timer expiry. The
//! buffer is swapped out before any I/O, so lines arriving during a flush
//! start a fresh Idle -> Armed cycle.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{LockConfig, MirrorConfig};
use crate::models::LogEntry;
use crate::services::file_lock;
use crate::services::refresh::RefreshNotifier;
use crate::utils::partition::{display_timestamp, month_partition, partition_file_name};
use crate::utils::{StoreError, StoreResult};

/// Pending write batch: the not-yet-flushed lines for one partition plus
/// the armed timer. Never persisted; lost on process crash.
#[derive(Default)]
struct BufferState {
    partition: Option<String>,
    lines: Vec<String>,
    timer: Option<JoinHandle<()>>,
}

struct MirrorInner {
    config: MirrorConfig,
    lock_config: LockConfig,
    tz: Tz,
    notifier: RefreshNotifier,
    state: Mutex<BufferState>,
}

/// Debounce/batch flush engine. One instance per process; cheap to clone
/// and share between request handlers.
#[derive(Clone)]
pub struct LogMirror {
    inner: Arc<MirrorInner>,
}

impl LogMirror {
    pub fn new(config: MirrorConfig, lock_config: LockConfig) -> Self {
        let tz = crate::utils::partition::resolve_timezone(&config.timezone);
        let notifier = RefreshNotifier::new(config.refresh_url.clone());
        Self {
            inner: Arc::new(MirrorInner {
                config,
                lock_config,
                tz,
                notifier,
                state: Mutex::new(BufferState::default()),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Buffer one entry for its calendar partition.
    ///
    /// A full buffer flushes synchronously and any failure is returned to
    /// this caller; an entry for a different partition than the buffered
    /// one first flushes the old buffer (one partition per flush cycle).
    pub async fn buffer_entry(&self, entry: &LogEntry) -> StoreResult<()> {
        if !self.inner.config.enabled {
            return Ok(());
        }

        let partition = month_partition(entry.event_time, self.inner.tz);
        let line = format_line(entry, self.inner.tz);

        let mut state = self.inner.state.lock().await;

        let partition_changed = state
            .partition
            .as_deref()
            .is_some_and(|buffered| buffered != partition);
        if partition_changed {
            // Old batch is flushed before the new line is buffered so a
            // flush never mixes partitions
            if let Some((old_partition, lines)) = take_batch(&mut state, true) {
                drop(state);
                self.flush(&old_partition, &lines).await?;
                state = self.inner.state.lock().await;
            }
        }

        state.partition = Some(partition);
        state.lines.push(line);

        if state.lines.len() >= self.inner.config.max_batch {
            let batch = take_batch(&mut state, true);
            drop(state);
            if let Some((partition, lines)) = batch {
                self.flush(&partition, &lines).await?;
            }
            return Ok(());
        }

        if state.lines.len() == 1 {
            // First line arms the debounce timer; later arrivals never
            // reset it
            let mirror = self.clone();
            let delay = Duration::from_millis(self.inner.config.flush_delay_ms);
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                mirror.timer_flush().await;
            }));
        }

        Ok(())
    }

    /// Force whatever is buffered out to disk. Used on shutdown.
    pub async fn flush_pending(&self) -> StoreResult<()> {
        let mut state = self.inner.state.lock().await;
        let batch = take_batch(&mut state, true);
        drop(state);
        if let Some((partition, lines)) = batch {
            self.flush(&partition, &lines).await?;
        }
        Ok(())
    }

    /// Timer expiry path: a failure here is terminal for the batch.
    async fn timer_flush(&self) {
        let mut state = self.inner.state.lock().await;
        // Clear our own handle without aborting the running task
        let batch = take_batch(&mut state, false);
        drop(state);

        if let Some((partition, lines)) = batch {
            if let Err(e) = self.flush(&partition, &lines).await {
                warn!(
                    partition = %partition,
                    dropped_lines = lines.len(),
                    error = %e,
                    "Timer flush failed, dropping batch"
                );
            }
        }
    }

    /// Append one batch to its partition file under the cross-process lock.
    async fn flush(&self, partition: &str, lines: &[String]) -> StoreResult<()> {
        let path = self.partition_path(partition);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let guard = file_lock::acquire(&path, &self.inner.lock_config).await?;

        let mut body = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            body.push_str(line);
            body.push('\n');
        }

        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(body.as_bytes()));
        drop(guard);

        result.map_err(|e| StoreError::MirrorWriteFailed(e.to_string()))?;

        debug!(partition, lines = lines.len(), path = %path.display(), "Flushed mirror batch");
        self.inner.notifier.notify(partition);
        Ok(())
    }

    pub fn partition_path(&self, partition: &str) -> PathBuf {
        self.inner
            .config
            .directory
            .join(partition_file_name(&self.inner.config.prefix, partition))
    }
}

/// Swap the buffer out, returning the batch to flush. `abort_timer` is
/// false only on the timer's own path, where aborting would cancel the
/// flush it is about to perform.
fn take_batch(state: &mut BufferState, abort_timer: bool) -> Option<(String, Vec<String>)> {
    if let Some(timer) = state.timer.take() {
        if abort_timer {
            timer.abort();
        }
    }
    if state.lines.is_empty() {
        state.partition = None;
        return None;
    }
    let lines = std::mem::take(&mut state.lines);
    state.partition.take().map(|partition| (partition, lines))
}

fn format_line(entry: &LogEntry, tz: Tz) -> String {
    format!(
        "[{}] [{}] [{}] {}: {}",
        display_timestamp(entry.event_time, tz),
        entry.level,
        entry.service,
        entry.username,
        entry.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry_at(ts: &str, message: &str) -> LogEntry {
        LogEntry::ingest("i1", "runner", "info", message, "alice", Some(ts), None)
    }

    fn mirror_in(dir: &std::path::Path) -> LogMirror {
        LogMirror::new(
            MirrorConfig {
                enabled: true,
                directory: dir.to_path_buf(),
                prefix: "agent-log".to_string(),
                timezone: "UTC".to_string(),
                flush_delay_ms: 1000,
                max_batch: 5,
                refresh_url: None,
            },
            LockConfig {
                retries: 3,
                retry_delay_ms: 10,
                stale_after_secs: 30,
            },
        )
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn read_lines(path: &std::path::Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_threshold_forces_immediate_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = mirror_in(dir.path());

        for i in 0..5 {
            mirror
                .buffer_entry(&entry_at("2026-01-12T22:10:15Z", &format!("line {i}")))
                .await
                .unwrap();
        }

        let path = mirror.partition_path("january-2026");
        let lines = read_lines(&path);
        assert_eq!(lines.len(), 5);
        assert!(lines[0].ends_with("line 0"));
        assert!(lines[4].ends_with("line 4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = mirror_in(dir.path());

        for i in 0..4 {
            mirror
                .buffer_entry(&entry_at("2026-01-12T22:10:15Z", &format!("line {i}")))
                .await
                .unwrap();
        }

        let path = mirror.partition_path("january-2026");
        assert!(read_lines(&path).is_empty());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        settle().await;

        assert_eq!(read_lines(&path).len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_arrivals_do_not_reset_timer() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = mirror_in(dir.path());

        mirror
            .buffer_entry(&entry_at("2026-01-12T22:10:15Z", "first"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;
        mirror
            .buffer_entry(&entry_at("2026-01-12T22:10:16Z", "second"))
            .await
            .unwrap();

        // 800 + 300 > 1000: the timer armed by the first line fires even
        // though the second line arrived 200ms before expiry
        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;

        let path = mirror.partition_path("january-2026");
        assert_eq!(read_lines(&path).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_returns_to_idle_for_next_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = mirror_in(dir.path());
        let path = mirror.partition_path("january-2026");

        for i in 0..5 {
            mirror
                .buffer_entry(&entry_at("2026-01-12T22:10:15Z", &format!("a{i}")))
                .await
                .unwrap();
        }
        assert_eq!(read_lines(&path).len(), 5);

        // Next line starts a fresh Armed cycle with its own timer
        mirror
            .buffer_entry(&entry_at("2026-01-12T23:00:00Z", "b0"))
            .await
            .unwrap();
        assert_eq!(read_lines(&path).len(), 5);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        settle().await;
        assert_eq!(read_lines(&path).len(), 6);
    }

    #[tokio::test]
    async fn test_partition_change_flushes_old_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = mirror_in(dir.path());

        mirror
            .buffer_entry(&entry_at("2026-01-31T12:00:00Z", "january line"))
            .await
            .unwrap();
        mirror
            .buffer_entry(&entry_at("2026-02-01T12:00:00Z", "february line"))
            .await
            .unwrap();

        // January was flushed when the February line arrived
        assert_eq!(read_lines(&mirror.partition_path("january-2026")).len(), 1);
        assert!(read_lines(&mirror.partition_path("february-2026")).is_empty());

        mirror.flush_pending().await.unwrap();
        assert_eq!(read_lines(&mirror.partition_path("february-2026")).len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_mirror_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut mirror = mirror_in(dir.path());
        mirror = LogMirror::new(
            MirrorConfig {
                enabled: false,
                ..mirror.inner.config.clone()
            },
            mirror.inner.lock_config.clone(),
        );

        for i in 0..10 {
            mirror
                .buffer_entry(&entry_at("2026-01-12T22:10:15Z", &format!("line {i}")))
                .await
                .unwrap();
        }
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_format_line() {
        let entry = LogEntry {
            instance_id: "i1".to_string(),
            service: "runner".to_string(),
            level: "info".to_string(),
            message: "state - active".to_string(),
            username: "alice".to_string(),
            event_time: Utc.with_ymd_and_hms(2026, 1, 12, 22, 10, 15).unwrap(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 12, 22, 10, 16).unwrap(),
            org_id: String::new(),
        };
        assert_eq!(
            format_line(&entry, chrono_tz::UTC),
            "[2026-01-12 22:10:15] [info] [runner] alice: state - active"
        );
    }
}
