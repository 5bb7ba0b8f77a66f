//! Periodic cleanup of abandoned upload staging directories.

use std::sync::Arc;
use std::time::Duration;

use privfs_identity::{Identity, PrivilegeExecutor};
use privfs_ops::{UploadTracker, remove_staging};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Evict stale sessions and delete their staging directories as the service
/// identity. Returns how many directories were removed.
pub async fn sweep_once(tracker: &UploadTracker, executor: PrivilegeExecutor) -> usize {
    let mut removed: usize = 0;
    for session in tracker.sweep() {
        let staging = session.staging_dir.clone();
        match executor
            .run_async(&Identity::service(), move || remove_staging(&staging))
            .await
        {
            Ok(Ok(())) => {
                removed = removed.saturating_add(1);
                info!(
                    upload_id = %session.upload_id,
                    chunks = session.chunks.len(),
                    staging = %session.staging_dir.display(),
                    "removed abandoned upload"
                );
            },
            Ok(Err(e)) => warn!(
                upload_id = %session.upload_id,
                staging = %session.staging_dir.display(),
                error = %e,
                "could not remove abandoned upload"
            ),
            Err(e) => error!(upload_id = %session.upload_id, error = %e, "sweep execution failed"),
        }
    }
    removed
}

/// Sweep every `interval` until cancelled. The first sweep runs one
/// interval after start.
pub fn spawn_sweeper(
    tracker: Arc<UploadTracker>,
    executor: PrivilegeExecutor,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        debug!(?interval, "upload sweeper started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = sweep_once(&tracker, executor).await;
                    if removed > 0 {
                        info!(removed, live = tracker.len(), "upload sweep finished");
                    }
                },
            }
        }
        debug!("upload sweeper stopped");
    })
}
