use crate::{
    config::EngineConfig,
    error::{Error, Result},
    hash::hash_file,
    planner::{ArtifactKind, DownloadPlan, PlannedArtifact},
    progress::{CancelToken, ProgressSnapshot, ProgressTracker},
    transport::{TransferError, Transport},
};
use rayon::{ThreadPoolBuilder, prelude::*};
use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tokio::sync::watch;

const CHUNK_SIZE: usize = 64 * 1024;
const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Verified,
    Failed { terminal: bool },
}

/// Per-artifact bookkeeping, owned by whichever worker holds the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferState {
    pub status: TransferStatus,
    pub bytes_transferred: u64,
    pub attempts: u32,
}

impl Default for TransferState {
    fn default() -> Self {
        Self {
            status: TransferStatus::Pending,
            bytes_transferred: 0,
            attempts: 0,
        }
    }
}

#[derive(Debug)]
pub struct FailedArtifact {
    pub artifact: PlannedArtifact,
    pub state: TransferState,
    /// The error from the last attempt.
    pub error: TransferError,
}

impl FailedArtifact {
    /// Whether the game cannot start without this file. Assets are optional.
    pub fn is_fatal(&self) -> bool {
        self.artifact.kind != ArtifactKind::Asset
    }
}

#[derive(Debug)]
pub enum Outcome {
    AllVerified,
    PartialFailure { failed: Vec<FailedArtifact> },
    /// Cancelled before every artifact was handled. Verified files stay on
    /// disk, so re-running the plan resumes.
    Cancelled {
        unfinished: usize,
        failed: Vec<FailedArtifact>,
    },
}

impl Outcome {
    pub fn failed(&self) -> &[FailedArtifact] {
        match self {
            Self::AllVerified => &[],
            Self::PartialFailure { failed } | Self::Cancelled { failed, .. } => failed,
        }
    }

    pub fn is_launchable(&self) -> bool {
        !matches!(self, Self::Cancelled { .. }) && !self.failed().iter().any(|f| f.is_fatal())
    }
}

enum Finished {
    Verified,
    Failed(FailedArtifact),
    Unfinished,
}

/// Runs download plans on a bounded worker pool.
pub struct DownloadEngine<T> {
    transport: Arc<T>,
    config: EngineConfig,
}

impl<T: Transport + 'static> DownloadEngine<T> {
    pub fn new(transport: Arc<T>, config: EngineConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts a session on a background thread.
    pub fn start(&self, plan: DownloadPlan, root: impl Into<PathBuf>) -> Session {
        let tracker = Arc::new(ProgressTracker::new(plan.len(), plan.total_bytes()));
        let (cancel_tx, cancel) = CancelToken::pair();
        let root = root.into();
        let worker = Worker {
            transport: self.transport.clone(),
            config: self.config.clone(),
            tracker: tracker.clone(),
            cancel,
        };

        let handle = thread::spawn(move || {
            let res = worker.run(&plan, &root);

            worker.tracker.finish();
            res
        });

        Session {
            tracker,
            cancel: cancel_tx,
            handle,
        }
    }

    /// Runs a plan to completion on the calling thread's behalf.
    pub fn execute(&self, plan: DownloadPlan, root: impl Into<PathBuf>) -> Result<Outcome> {
        self.start(plan, root).wait()
    }
}

/// Handle to a running session.
pub struct Session {
    tracker: Arc<ProgressTracker>,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<Result<Outcome>>,
}

impl Session {
    pub fn progress(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }

    /// Snapshots pushed each time an artifact completes.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tracker.subscribe()
    }

    pub fn tracker(&self) -> Arc<ProgressTracker> {
        self.tracker.clone()
    }

    /// Stops handing out new work. Transfers in flight stop at their next
    /// chunk boundary and their temporary files are removed.
    pub fn cancel(&self) {
        log::info!("Cancelling download session");
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn wait(self) -> Result<Outcome> {
        self.handle.join().map_err(|_| Error::WorkerPanicked)?
    }
}

struct Worker<T> {
    transport: Arc<T>,
    config: EngineConfig,
    tracker: Arc<ProgressTracker>,
    cancel: CancelToken,
}

impl<T: Transport> Worker<T> {
    fn run(&self, plan: &DownloadPlan, root: &Path) -> Result<Outcome> {
        fs::create_dir_all(root).map_err(|e| Error::io(root, e))?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.max_concurrent_transfers.max(1))
            .thread_name(|i| format!("download-{i}"))
            .build()?;

        let start = Instant::now();

        log::info!(
            "Starting download session: {} artifacts, {} bytes, {} workers",
            plan.len(),
            plan.total_bytes(),
            self.config.max_concurrent_transfers
        );

        let results: Vec<Finished> = pool.install(|| {
            plan.artifacts()
                .par_iter()
                .map(|artifact| self.process(artifact, root))
                .collect()
        });

        let mut verified = 0;
        let mut unfinished = 0;
        let mut failed = Vec::new();

        for res in results {
            match res {
                Finished::Verified => verified += 1,
                Finished::Failed(f) => failed.push(f),
                Finished::Unfinished => unfinished += 1,
            }
        }

        log::info!(
            "Download session finished in {:.2}s: {verified} verified, {} failed, {unfinished} unfinished",
            start.elapsed().as_secs_f64(),
            failed.len()
        );

        Ok(if unfinished > 0 {
            Outcome::Cancelled { unfinished, failed }
        } else if failed.is_empty() {
            Outcome::AllVerified
        } else {
            Outcome::PartialFailure { failed }
        })
    }

    fn process(&self, artifact: &PlannedArtifact, root: &Path) -> Finished {
        if self.cancel.is_cancelled() {
            return Finished::Unfinished;
        }

        let dest = root.join(&artifact.path);
        let mut state = TransferState::default();

        match self.existing(artifact, &dest) {
            Ok(true) => {
                log::debug!("Already present, skipping: {dest:?}");

                self.tracker.add_bytes(artifact.size.unwrap_or(0));
                self.tracker.complete_one();

                return Finished::Verified;
            }

            Ok(false) => {}

            Err(e) => log::warn!("Failed to check existing file {dest:?}: {e}"),
        }

        loop {
            state.attempts += 1;
            state.status = TransferStatus::InProgress;

            let err = match self.transfer(artifact, &dest, &mut state) {
                Ok(()) => {
                    state.status = TransferStatus::Verified;
                    self.tracker.complete_one();

                    log::debug!("Downloaded {} -> {dest:?}", artifact.url);

                    return Finished::Verified;
                }

                Err(e) => e,
            };

            if artifact.size.is_some() {
                self.tracker.discard_bytes(state.bytes_transferred);
            }

            state.bytes_transferred = 0;

            if !err.is_retryable() {
                state.status = TransferStatus::Pending;
                return Finished::Unfinished;
            }

            if state.attempts >= self.config.max_attempts_per_artifact {
                state.status = TransferStatus::Failed { terminal: true };
                self.tracker.complete_one();

                log::error!(
                    "Giving up on {} after {} attempts: {err}",
                    artifact.url,
                    state.attempts
                );

                return Finished::Failed(FailedArtifact {
                    artifact: artifact.clone(),
                    state,
                    error: err,
                });
            }

            state.status = TransferStatus::Failed { terminal: false };

            let delay = self.config.backoff_for(state.attempts);

            log::warn!(
                "Download failed (attempt {}/{}) for {}: {err}. Retrying in {delay:?}",
                state.attempts,
                self.config.max_attempts_per_artifact,
                artifact.url
            );

            if !self.backoff(delay) {
                return Finished::Unfinished;
            }

            state.status = TransferStatus::Pending;
        }
    }

    /// Whether a file already at `dest` can be trusted.
    fn existing(&self, artifact: &PlannedArtifact, dest: &Path) -> io::Result<bool> {
        let meta = match fs::metadata(dest) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        let size_ok = artifact.size.is_none_or(|size| size == meta.len());

        let Some(expected) = artifact.hash.as_ref().filter(|_| self.config.verify_existing)
        else {
            return Ok(size_ok);
        };

        let actual = hash_file(dest, expected.algorithm)?;

        if expected.matches(&actual) {
            Ok(true)
        } else {
            log::info!(
                "Existing file hash mismatches ({actual} != {}), re-downloading: {dest:?}",
                expected.digest
            );

            Ok(false)
        }
    }

    /// Streams into a `.part` file beside `dest` and renames it into place
    /// once the content checks out.
    fn transfer(
        &self,
        artifact: &PlannedArtifact,
        dest: &Path,
        state: &mut TransferState,
    ) -> std::result::Result<(), TransferError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = temp_path(dest);

        let res = self
            .stream_to(artifact, &tmp, state)
            .and_then(|()| fs::rename(&tmp, dest).map_err(TransferError::from));

        if res.is_err() {
            let _ = fs::remove_file(&tmp);
        }

        res
    }

    fn stream_to(
        &self,
        artifact: &PlannedArtifact,
        tmp: &Path,
        state: &mut TransferState,
    ) -> std::result::Result<(), TransferError> {
        let mut reader = self.transport.open(&artifact.url)?;
        let mut file = BufWriter::new(File::create(tmp)?);
        let mut hasher = artifact.hash.as_ref().map(|h| h.hasher());
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let read = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            file.write_all(&buf[..read])?;

            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&buf[..read]);
            }

            state.bytes_transferred += read as u64;

            // Files of unknown size are not part of the byte total.
            if artifact.size.is_some() {
                self.tracker.add_bytes(read as u64);
            }
        }

        file.into_inner()
            .map_err(io::IntoInnerError::into_error)?
            .sync_all()?;

        if let (Some(expected), Some(hasher)) = (&artifact.hash, hasher) {
            let actual = hasher.finalize_hex();

            if !expected.matches(&actual) {
                return Err(TransferError::HashMismatch {
                    expected: expected.digest.clone(),
                    actual,
                });
            }
        }

        if let Some(expected) = artifact.size {
            if expected != state.bytes_transferred {
                return Err(TransferError::SizeMismatch {
                    expected,
                    actual: state.bytes_transferred,
                });
            }
        }

        Ok(())
    }

    /// Sleeps in short slices so cancellation is noticed. Returns false if
    /// the session was cancelled meanwhile.
    fn backoff(&self, delay: Duration) -> bool {
        let until = Instant::now() + delay;

        while Instant::now() < until {
            if self.cancel.is_cancelled() {
                return false;
            }

            thread::sleep(CANCEL_POLL.min(until.saturating_duration_since(Instant::now())));
        }

        !self.cancel.is_cancelled()
    }
}

/// One temp file per destination; plan paths are unique so workers never
/// share one.
pub fn temp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".into());

    dest.with_file_name(format!("{name}.part"))
}
