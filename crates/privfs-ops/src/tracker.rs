//! In-memory upload sessions with explicit, clock-driven eviction.
//!
//! The external caller owns the upload protocol (it counts chunks and decides
//! when to assemble). The tracker only mirrors what the worker has seen so
//! abandoned staging directories can be found and cleaned up.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

/// Source of "now" for the tracker.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Start at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        let _ = self
            .millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |m| {
                Some(m.saturating_add(delta))
            });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Lifecycle of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Chunks are arriving.
    Receiving,
    /// An assemble job is running.
    Assembling,
    /// Assembled; terminal.
    Done,
    /// Staging was deleted by the caller; terminal.
    Cancelled,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Receiving => "receiving",
            Self::Assembling => "assembling",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What the tracker knows about one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Upload identifier.
    pub upload_id: String,
    /// Directory the assembled file lands in.
    pub destination_dir: PathBuf,
    /// Where chunks are staged.
    pub staging_dir: PathBuf,
    /// Chunk indexes received so far.
    pub chunks: BTreeSet<u32>,
    /// Current state.
    pub state: UploadState,
    /// Last chunk write or state change.
    pub last_activity: DateTime<Utc>,
}

/// Tracker errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// No session with this id.
    #[error("unknown upload {0:?}")]
    Unknown(String),

    /// The session is not in a state that allows the transition.
    #[error("upload {upload_id:?}: cannot go from {from} to {to}")]
    InvalidTransition {
        /// Upload identifier.
        upload_id: String,
        /// Current state.
        from: UploadState,
        /// Requested state.
        to: UploadState,
    },
}

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Upload sessions keyed by upload id.
#[derive(Debug)]
pub struct UploadTracker {
    sessions: DashMap<String, UploadSession>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl UploadTracker {
    /// Tracker on the system clock.
    #[must_use]
    pub fn new(stale_after: Duration) -> Self {
        Self::with_clock(stale_after, Arc::new(SystemClock))
    }

    /// Tracker on an injected clock.
    #[must_use]
    pub fn with_clock(stale_after: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            stale_after,
        }
    }

    /// Note a chunk write, opening the session on first sight.
    ///
    /// # Errors
    ///
    /// [`TrackerError::InvalidTransition`] if the session is past `Receiving`.
    pub fn record_chunk(
        &self,
        upload_id: &str,
        destination_dir: PathBuf,
        staging_dir: PathBuf,
        index: u32,
    ) -> TrackerResult<()> {
        let now = self.clock.now();
        let mut session = self
            .sessions
            .entry(upload_id.to_owned())
            .or_insert_with(|| UploadSession {
                upload_id: upload_id.to_owned(),
                destination_dir,
                staging_dir,
                chunks: BTreeSet::new(),
                state: UploadState::Receiving,
                last_activity: now,
            });

        if session.state != UploadState::Receiving {
            return Err(TrackerError::InvalidTransition {
                upload_id: upload_id.to_owned(),
                from: session.state,
                to: UploadState::Receiving,
            });
        }
        session.chunks.insert(index);
        session.last_activity = now;
        Ok(())
    }

    /// `Receiving → Assembling`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Unknown`] or [`TrackerError::InvalidTransition`].
    pub fn begin_assembly(&self, upload_id: &str) -> TrackerResult<()> {
        let mut session = self
            .sessions
            .get_mut(upload_id)
            .ok_or_else(|| TrackerError::Unknown(upload_id.to_owned()))?;
        transition(&mut session, UploadState::Receiving, UploadState::Assembling)?;
        session.last_activity = self.clock.now();
        Ok(())
    }

    /// `Assembling → Done`; the session is forgotten.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Unknown`] or [`TrackerError::InvalidTransition`].
    pub fn complete(&self, upload_id: &str) -> TrackerResult<UploadSession> {
        self.finish(upload_id, UploadState::Assembling, UploadState::Done)
    }

    /// `Receiving → Cancelled`; the session is forgotten.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Unknown`] or [`TrackerError::InvalidTransition`].
    pub fn cancel(&self, upload_id: &str) -> TrackerResult<UploadSession> {
        self.finish(upload_id, UploadState::Receiving, UploadState::Cancelled)
    }

    /// `Assembling → Receiving`, after a failed assembly attempt. The
    /// session becomes eligible for sweeping again.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Unknown`] or [`TrackerError::InvalidTransition`].
    pub fn reopen(&self, upload_id: &str) -> TrackerResult<()> {
        let mut session = self
            .sessions
            .get_mut(upload_id)
            .ok_or_else(|| TrackerError::Unknown(upload_id.to_owned()))?;
        transition(&mut session, UploadState::Assembling, UploadState::Receiving)?;
        session.last_activity = self.clock.now();
        Ok(())
    }

    /// Snapshot of one session.
    #[must_use]
    pub fn get(&self, upload_id: &str) -> Option<UploadSession> {
        self.sessions.get(upload_id).map(|s| s.value().clone())
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove `Receiving` sessions idle for longer than the TTL and return
    /// them. Deleting their staging directories is the caller's job.
    pub fn sweep(&self) -> Vec<UploadSession> {
        let Ok(ttl) = TimeDelta::from_std(self.stale_after) else {
            return Vec::new();
        };
        let Some(cutoff) = self.clock.now().checked_sub_signed(ttl) else {
            return Vec::new();
        };
        let is_stale =
            |s: &UploadSession| s.state == UploadState::Receiving && s.last_activity < cutoff;

        let stale_ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| is_stale(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let evicted: Vec<UploadSession> = stale_ids
            .into_iter()
            .filter_map(|id| self.sessions.remove_if(&id, |_, s| is_stale(s)))
            .map(|(_, session)| session)
            .collect();

        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicted stale uploads");
        }
        evicted
    }

    fn finish(
        &self,
        upload_id: &str,
        from: UploadState,
        to: UploadState,
    ) -> TrackerResult<UploadSession> {
        let mut session = self
            .sessions
            .remove(upload_id)
            .map(|(_, s)| s)
            .ok_or_else(|| TrackerError::Unknown(upload_id.to_owned()))?;

        if let Err(e) = transition(&mut session, from, to) {
            // Put it back untouched.
            self.sessions.insert(upload_id.to_owned(), session);
            return Err(e);
        }
        session.last_activity = self.clock.now();
        Ok(session)
    }
}

fn transition(
    session: &mut UploadSession,
    from: UploadState,
    to: UploadState,
) -> TrackerResult<()> {
    if session.state != from {
        return Err(TrackerError::InvalidTransition {
            upload_id: session.upload_id.clone(),
            from: session.state,
            to,
        });
    }
    session.state = to;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(6 * 60 * 60);

    fn tracker() -> (UploadTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let tracker = UploadTracker::with_clock(TTL, clock.clone());
        (tracker, clock)
    }

    fn record(tracker: &UploadTracker, id: &str, index: u32) -> TrackerResult<()> {
        tracker.record_chunk(
            id,
            PathBuf::from("/srv/share"),
            PathBuf::from(format!("/srv/share/.privfs-uploads-{id}")),
            index,
        )
    }

    #[test]
    fn happy_path_receiving_assembling_done() {
        let (tracker, _) = tracker();
        record(&tracker, "u1", 0).unwrap();
        record(&tracker, "u1", 1).unwrap();
        record(&tracker, "u1", 1).unwrap();

        let session = tracker.get("u1").unwrap();
        assert_eq!(session.state, UploadState::Receiving);
        assert_eq!(session.chunks.iter().copied().collect::<Vec<_>>(), [0, 1]);

        tracker.begin_assembly("u1").unwrap();
        assert_eq!(tracker.get("u1").unwrap().state, UploadState::Assembling);

        let done = tracker.complete("u1").unwrap();
        assert_eq!(done.state, UploadState::Done);
        assert!(tracker.get("u1").is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn cancel_only_from_receiving() {
        let (tracker, _) = tracker();
        record(&tracker, "u1", 0).unwrap();
        assert_eq!(tracker.cancel("u1").unwrap().state, UploadState::Cancelled);
        assert_eq!(
            tracker.cancel("u1").unwrap_err(),
            TrackerError::Unknown("u1".to_owned())
        );

        record(&tracker, "u2", 0).unwrap();
        tracker.begin_assembly("u2").unwrap();
        let err = tracker.cancel("u2").unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition { .. }));
        assert_eq!(tracker.get("u2").unwrap().state, UploadState::Assembling);
    }

    #[test]
    fn chunks_after_assembly_are_rejected() {
        let (tracker, _) = tracker();
        record(&tracker, "u1", 0).unwrap();
        tracker.begin_assembly("u1").unwrap();
        assert!(matches!(
            record(&tracker, "u1", 1).unwrap_err(),
            TrackerError::InvalidTransition {
                from: UploadState::Assembling,
                ..
            }
        ));
    }

    #[test]
    fn failed_assembly_can_be_reopened_and_swept() {
        let (tracker, clock) = tracker();
        record(&tracker, "u1", 0).unwrap();
        tracker.begin_assembly("u1").unwrap();
        tracker.reopen("u1").unwrap();
        assert_eq!(tracker.get("u1").unwrap().state, UploadState::Receiving);
        assert!(tracker.reopen("u1").is_err());

        clock.advance(TTL + Duration::from_secs(1));
        assert_eq!(tracker.sweep().len(), 1);
    }

    #[test]
    fn complete_requires_assembling() {
        let (tracker, _) = tracker();
        record(&tracker, "u1", 0).unwrap();
        assert!(tracker.complete("u1").is_err());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn sweep_evicts_only_idle_receiving_sessions() {
        let (tracker, clock) = tracker();
        record(&tracker, "idle", 0).unwrap();
        record(&tracker, "assembling", 0).unwrap();
        tracker.begin_assembly("assembling").unwrap();

        clock.advance(Duration::from_secs(5 * 60 * 60));
        record(&tracker, "fresh", 0).unwrap();
        assert!(tracker.sweep().is_empty());

        clock.advance(Duration::from_secs(2 * 60 * 60));
        let evicted = tracker.sweep();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].upload_id, "idle");
        assert!(tracker.get("idle").is_none());
        assert!(tracker.get("assembling").is_some());
        assert!(tracker.get("fresh").is_some());
    }

    #[test]
    fn activity_refreshes_ttl() {
        let (tracker, clock) = tracker();
        record(&tracker, "u1", 0).unwrap();
        clock.advance(Duration::from_secs(5 * 60 * 60));
        record(&tracker, "u1", 1).unwrap();
        clock.advance(Duration::from_secs(5 * 60 * 60));
        assert!(tracker.sweep().is_empty());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now().signed_duration_since(start).num_milliseconds(), 1500);
    }
}
