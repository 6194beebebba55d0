use crate::meta::MOJANG_META_URL;
use std::time::Duration;

pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net";
pub const LIBRARIES_URL: &str = "https://libraries.minecraft.net";
pub const USER_AGENT: &str = concat!("mc-install/", env!("CARGO_PKG_VERSION"));

/// Tuning for a download session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_concurrent_transfers: usize,
    pub max_attempts_per_artifact: u32,
    /// Delay before retry `n` is entry `n - 1`; the last entry repeats.
    pub backoff_schedule: Vec<Duration>,
    /// Re-hash files already on disk instead of trusting their size.
    pub verify_existing: bool,
    pub transfer_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: 8,
            max_attempts_per_artifact: 3,
            backoff_schedule: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
            ],
            verify_existing: false,
            transfer_timeout: Duration::from_secs(120),
        }
    }
}

impl EngineConfig {
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.max_concurrent_transfers = n.max(1);
        self
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts_per_artifact = n.max(1);
        self
    }

    pub fn with_backoff(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff_schedule = schedule;
        self
    }

    pub fn with_verify_existing(mut self, verify: bool) -> Self {
        self.verify_existing = verify;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let idx = (attempt.max(1) - 1) as usize;

        self.backoff_schedule
            .get(idx)
            .or(self.backoff_schedule.last())
            .copied()
            .unwrap_or_default()
    }
}

/// Remote locations the store and planner pull from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub catalog_url: String,
    pub resources_url: String,
    pub libraries_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            catalog_url: MOJANG_META_URL.into(),
            resources_url: RESOURCES_URL.into(),
            libraries_url: LIBRARIES_URL.into(),
        }
    }
}
