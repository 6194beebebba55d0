use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::watch;

/// Point-in-time view of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total_artifacts: usize,
    pub completed_artifacts: usize,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
}

impl ProgressSnapshot {
    /// Whole-number percentage, by bytes when sizes are known and by
    /// artifact count otherwise.
    pub fn percent(&self) -> u8 {
        let (done, total) = if self.total_bytes > 0 {
            (self.transferred_bytes.min(self.total_bytes), self.total_bytes)
        } else {
            (self.completed_artifacts as u64, self.total_artifacts as u64)
        };

        if total == 0 {
            return 100;
        }

        (done * 100 / total) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.completed_artifacts >= self.total_artifacts
    }
}

/// Shared counters updated by workers. Snapshots are derived from them and
/// pushed to subscribers whenever an artifact completes.
#[derive(Debug)]
pub struct ProgressTracker {
    total_artifacts: usize,
    total_bytes: u64,
    completed: AtomicUsize,
    transferred: AtomicU64,
    finished: AtomicBool,
    tx: watch::Sender<ProgressSnapshot>,
}

impl ProgressTracker {
    pub fn new(total_artifacts: usize, total_bytes: u64) -> Self {
        let (tx, _) = watch::channel(ProgressSnapshot {
            total_artifacts,
            total_bytes,
            ..Default::default()
        });

        Self {
            total_artifacts,
            total_bytes,
            completed: AtomicUsize::new(0),
            transferred: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            tx,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_artifacts: self.total_artifacts,
            completed_artifacts: self.completed.load(Ordering::SeqCst),
            total_bytes: self.total_bytes,
            transferred_bytes: self.transferred.load(Ordering::SeqCst),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    pub fn add_bytes(&self, n: u64) {
        self.transferred.fetch_add(n, Ordering::SeqCst);
    }

    /// Takes back bytes streamed by an attempt that was thrown away.
    pub fn discard_bytes(&self, n: u64) {
        let _ = self
            .transferred
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(n))
            });
    }

    /// Marks one artifact finished (verified or terminally failed) and
    /// publishes a fresh snapshot.
    pub fn complete_one(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.publish();
    }

    pub fn publish(&self) {
        self.tx.send_replace(self.snapshot());
    }

    /// Marks the session as over, whatever its outcome.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.publish();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Cooperative cancellation flag checked by workers between chunks.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A token paired with the sender that trips it.
    pub fn pair() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);

        (tx, Self::new(rx))
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_see_completions() {
        let tracker = ProgressTracker::new(2, 100);
        let rx = tracker.subscribe();

        tracker.add_bytes(60);
        tracker.complete_one();

        let seen = *rx.borrow();
        assert_eq!(seen.completed_artifacts, 1);
        assert_eq!(seen.transferred_bytes, 60);
        assert_eq!(seen.percent(), 60);
        assert!(!seen.is_complete());
    }

    #[test]
    fn discarded_bytes_never_underflow() {
        let tracker = ProgressTracker::new(1, 10);

        tracker.add_bytes(4);
        tracker.discard_bytes(9);

        assert_eq!(tracker.snapshot().transferred_bytes, 0);
    }

    #[test]
    fn percent_falls_back_to_counts() {
        let snapshot = ProgressSnapshot {
            total_artifacts: 4,
            completed_artifacts: 1,
            ..Default::default()
        };

        assert_eq!(snapshot.percent(), 25);
        assert_eq!(ProgressSnapshot::default().percent(), 100);
    }

    #[test]
    fn cancel_token_follows_sender() {
        let (tx, token) = CancelToken::pair();

        assert!(!token.is_cancelled());
        tx.send_replace(true);
        assert!(token.is_cancelled());
    }
}
