//! Retention sweeper
//!
//! Periodically deletes aged uploads, aged results, and aged task records.
//! Deletion is best-effort: a file that is already gone is not an error,
//! other failures are logged and the sweep carries on.

use crate::services::task_store::TaskStore;
use chrono::{DateTime, Utc};
use ssep_common::time;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Age limits and sweep cadence
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Input files older than this are deleted
    pub upload_max_age: Duration,
    /// Output files older than this are deleted
    pub result_max_age: Duration,
    /// Task records whose `start_time` is older than this are dropped
    pub task_max_age: Duration,
    /// Time between sweeps
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            upload_max_age: Duration::from_secs(60 * 60),
            result_max_age: Duration::from_secs(24 * 60 * 60),
            task_max_age: Duration::from_secs(24 * 60 * 60),
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub uploads_removed: usize,
    pub results_removed: usize,
    pub tasks_removed: usize,
    pub errors: usize,
}

pub struct RetentionSweeper {
    store: TaskStore,
    upload_dir: PathBuf,
    result_dir: PathBuf,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(
        store: TaskStore,
        upload_dir: impl Into<PathBuf>,
        result_dir: impl Into<PathBuf>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            upload_dir: upload_dir.into(),
            result_dir: result_dir.into(),
            policy,
        }
    }

    /// Run one sweep as if the current time were `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let (removed, errors) =
            sweep_directory(&self.upload_dir, cutoff(now, self.policy.upload_max_age)).await;
        report.uploads_removed = removed;
        report.errors += errors;

        let (removed, errors) =
            sweep_directory(&self.result_dir, cutoff(now, self.policy.result_max_age)).await;
        report.results_removed = removed;
        report.errors += errors;

        let expired = self
            .store
            .remove_older_than(cutoff(now, self.policy.task_max_age))
            .await;
        for task in &expired {
            info!(task_id = %task.id, status = %task.status, "Expired task removed");
        }
        report.tasks_removed = expired.len();

        if report != SweepReport::default() {
            info!(
                uploads_removed = report.uploads_removed,
                results_removed = report.results_removed,
                tasks_removed = report.tasks_removed,
                errors = report.errors,
                "Retention sweep finished"
            );
        } else {
            debug!("Retention sweep found nothing to remove");
        }

        report
    }

    /// Sweep immediately, then every `policy.interval`, until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.policy.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!(interval_secs = self.policy.interval.as_secs(), "Retention sweeper started");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        self.sweep_at(time::now()).await;
                    }
                }
            }

            info!("Retention sweeper stopped");
        })
    }
}

fn cutoff(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Delete regular files in `dir` last modified before `cutoff`
///
/// Returns `(removed, errors)`.
async fn sweep_directory(dir: &Path, cutoff: DateTime<Utc>) -> (usize, usize) {
    let mut removed = 0;
    let mut errors = 0;

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (0, 0),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to read directory for cleanup");
            return (0, 1);
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to read directory entry");
                errors += 1;
                break;
            }
        };

        let path = entry.path();
        let modified = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => match metadata.modified() {
                Ok(modified) => time::from_system_time(modified),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "File modification time unavailable");
                    errors += 1;
                    continue;
                }
            },
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to stat file");
                errors += 1;
                continue;
            }
        };

        if modified >= cutoff {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Expired file removed");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove expired file");
                errors += 1;
            }
        }
    }

    (removed, errors)
}
