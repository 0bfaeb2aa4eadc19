//! Cross-process partition file lock
//!
//! Advisory lockfile (`<target>.lock`) created with `create_new`, the one
//! true inter-process mutual exclusion primitive in the system. Acquisition
//! retries a bounded number of times; a lockfile older than the stale
//! timeout is treated as abandoned by a crashed holder and broken. The
//! guard removes the lockfile on drop, on every exit path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LockConfig;
use crate::utils::{StoreError, StoreResult};

/// Held lock on one partition file. Dropping it releases the lock.
#[derive(Debug)]
pub struct FileLockGuard {
    lock_path: PathBuf,
    owner: String,
}

impl FileLockGuard {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            // Nothing to do beyond log; the stale timeout will reap it
            warn!(path = %self.lock_path.display(), error = %e, "Failed to remove lockfile");
        }
    }
}

/// Acquire the lock for `target`, retrying per `config`.
pub async fn acquire(target: &Path, config: &LockConfig) -> StoreResult<FileLockGuard> {
    let lock_path = lock_path_for(target);
    let owner = format!("{}:{}", std::process::id(), Uuid::new_v4());
    let stale_after = Duration::from_secs(config.stale_after_secs);
    let mut retry_delay = Duration::from_millis(config.retry_delay_ms);

    // First try plus `retries` re-attempts
    for attempt in 0..=config.retries {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                // Owner token is diagnostics only; correctness comes from
                // the exclusive create
                let _ = file.write_all(owner.as_bytes());
                debug!(path = %lock_path.display(), attempt, "Acquired partition lock");
                return Ok(FileLockGuard { lock_path, owner });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if lock_is_stale(&lock_path, stale_after) {
                    warn!(path = %lock_path.display(), "Breaking stale lockfile");
                    // Another waiter may win the race to remove it; either
                    // way the next create_new attempt decides
                    let _ = fs::remove_file(&lock_path);
                    continue;
                }
                if attempt < config.retries {
                    tokio::time::sleep(retry_delay).await;
                    // Back off so a pile of waiters does not hammer the fs
                    retry_delay = (retry_delay * 2).min(Duration::from_secs(1));
                }
            }
            Err(e) => return Err(StoreError::MirrorWriteFailed(e.to_string())),
        }
    }

    Err(StoreError::LockTimeout(format!(
        "could not lock {} after {} attempts",
        lock_path.display(),
        config.retries + 1
    )))
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut os = target.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

fn lock_is_stale(lock_path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = fs::metadata(lock_path) else {
        return false;
    };
    match meta.modified().map(|m| m.elapsed()) {
        Ok(Ok(age)) => age > stale_after,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> LockConfig {
        LockConfig {
            retries: 3,
            retry_delay_ms: 10,
            stale_after_secs: 30,
        }
    }

    #[tokio::test]
    async fn test_acquire_creates_and_release_removes_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("agent-log-january-2026.txt");
        let lock_path = lock_path_for(&target);

        let guard = acquire(&target, &fast_config()).await.unwrap();
        assert!(lock_path.exists());
        assert!(guard.owner().contains(':'));

        drop(guard);
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn test_contended_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("partition.txt");

        let _held = acquire(&target, &fast_config()).await.unwrap();
        let err = acquire(&target, &fast_config()).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("partition.txt");
        let lock_path = lock_path_for(&target);

        // Crashed-holder leftovers: a lockfile nobody will ever remove
        fs::write(&lock_path, "999999:dead").unwrap();
        let config = LockConfig {
            stale_after_secs: 0,
            ..fast_config()
        };
        // Zero stale timeout means any existing lockfile is stale
        tokio::time::sleep(Duration::from_millis(20)).await;

        let guard = acquire(&target, &config).await.unwrap();
        assert!(lock_path.exists());
        drop(guard);
    }

    #[tokio::test]
    async fn test_lock_released_after_holder_drops() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("partition.txt");

        drop(acquire(&target, &fast_config()).await.unwrap());
        // Immediately acquirable again
        let second = acquire(&target, &fast_config()).await;
        assert!(second.is_ok());
    }
}
