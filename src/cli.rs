use crate::{
    config::{EngineConfig, Endpoints},
    download::{Outcome, Session},
    launcher::Launcher,
    meta::{MOJANG_META_URL, ReleaseType},
    platform::{Arch, OsFamily, PlatformDescriptor},
    store::HttpManifestStore,
    transport::HttpTransport,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::{path::PathBuf, thread, time::Duration};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// The game directory to install into.
    #[clap(short = 'd', long = "dir", default_value = ".minecraft", global = true)]
    pub target: PathBuf,

    /// Maximum number of concurrent downloads.
    #[clap(short = 'j', long = "jobs", default_value_t = 8, global = true)]
    pub jobs: usize,

    /// Attempts per file before giving up on it.
    #[clap(long = "attempts", default_value_t = 3, global = true)]
    pub attempts: u32,

    /// Re-hash files that are already present instead of trusting their size.
    #[clap(long = "verify", global = true)]
    pub verify: bool,

    /// Per-request timeout, in seconds.
    #[clap(long = "timeout", default_value_t = 120, global = true)]
    pub timeout: u64,

    /// The version catalog to resolve against.
    #[clap(long = "meta-url", default_value = MOJANG_META_URL, global = true)]
    pub meta_url: String,

    /// Plan for this OS instead of the current one.
    #[clap(long = "os", value_enum, global = true)]
    pub os: Option<OsFamily>,

    /// Plan for this architecture instead of the current one.
    #[clap(long = "arch", value_enum, global = true)]
    pub arch: Option<Arch>,

    /// OS version matched by `os.version` rules. Defaults to the host's
    /// when planning for the host OS.
    #[clap(long = "os-version", global = true)]
    pub os_version: Option<String>,

    /// Enable a rule feature flag (repeatable).
    #[clap(long = "feature", global = true)]
    pub features: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available versions.
    Versions {
        /// Include snapshots.
        #[clap(short = 's', long = "snapshots")]
        snapshots: bool,
    },

    /// Print a version with its inheritance chain merged, as JSON.
    Resolve { id: String },

    /// Show what installing a version would download.
    Plan { id: String },

    /// Download everything a version needs.
    Install { id: String },
}

impl Cli {
    pub fn exec() -> Result<()> {
        Self::parse().run()
    }

    fn config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_concurrency(self.jobs)
            .with_max_attempts(self.attempts)
            .with_verify_existing(self.verify)
            .with_timeout(Duration::from_secs(self.timeout))
    }

    fn platform(&self) -> PlatformDescriptor {
        let host = PlatformDescriptor::current();
        let mut platform =
            PlatformDescriptor::new(self.os.unwrap_or(host.os), self.arch.unwrap_or(host.arch));

        platform.os_version = match (&self.os_version, self.os) {
            (Some(version), _) => Some(version.clone()),
            (None, None) => host.os_version,
            (None, Some(_)) => None,
        };

        self.features
            .iter()
            .fold(platform, |p, f| p.with_feature(f.as_str()))
    }

    fn launcher(&self) -> Result<Launcher<HttpManifestStore, HttpTransport>> {
        let endpoints = Endpoints {
            catalog_url: self.meta_url.clone(),
            ..Default::default()
        };

        Ok(Launcher::http(
            &self.target,
            &endpoints,
            self.platform(),
            self.config(),
        )?)
    }

    pub fn run(self) -> Result<()> {
        let launcher = self.launcher()?;

        match self.command {
            Commands::Versions { snapshots } => {
                for v in launcher.catalog()?.into_iter().filter(|v| match v.kind {
                    ReleaseType::Release => true,
                    ReleaseType::Snapshot => snapshots,
                    ReleaseType::Other(_) => false,
                }) {
                    println!("{:<24} {:<10} {}", v.id, v.kind, v.release_time);
                }
            }

            Commands::Resolve { id } => {
                println!("{}", serde_json::to_string_pretty(&launcher.resolve(&id)?)?);
            }

            Commands::Plan { id } => {
                let (version, plan) = launcher.plan(&id)?;

                println!("{} ({})", version.id, version.chain.join(" -> "));

                for (kind, (count, bytes)) in plan.summary() {
                    println!("  {:<12} {count:>6} files {bytes:>14} bytes", kind.get());
                }

                println!(
                    "  {:<12} {:>6} files {:>14} bytes",
                    "total",
                    plan.len(),
                    plan.total_bytes()
                );
            }

            Commands::Install { id } => {
                let session = launcher.install(&id)?;
                let outcome = watch_session(session)?;

                report(&id, &outcome)?;
            }
        }

        Ok(())
    }
}

fn watch_session(session: Session) -> Result<Outcome> {
    let start = session.progress();
    let bar = ProgressBar::new(start.total_bytes);

    bar.set_style(
        ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
        )?
        .progress_chars("=> "),
    );

    while !session.is_finished() {
        let now = session.progress();

        bar.set_position(now.transferred_bytes);
        bar.set_message(format!(
            "{}/{} files",
            now.completed_artifacts, now.total_artifacts
        ));

        thread::sleep(POLL_INTERVAL);
    }

    let end = session.progress();

    bar.set_position(end.transferred_bytes);
    bar.finish_and_clear();

    Ok(session.wait()?)
}

fn report(id: &str, outcome: &Outcome) -> Result<()> {
    for failed in outcome
        .failed()
        .iter()
        .sorted_by_key(|f| (f.artifact.kind, &f.artifact.path))
    {
        println!(
            "FAILED {:<10} {} ({} attempts): {}",
            failed.artifact.kind.get(),
            failed.artifact.path.display(),
            failed.state.attempts,
            failed.error
        );
    }

    match outcome {
        Outcome::AllVerified => println!("Installed {id}."),

        Outcome::PartialFailure { failed } if outcome.is_launchable() => {
            println!("Installed {id}; {} optional assets failed.", failed.len())
        }

        Outcome::PartialFailure { failed } => {
            bail!("Failed to install {id}: {} files failed", failed.len())
        }

        Outcome::Cancelled { unfinished, .. } => {
            bail!("Install of {id} cancelled with {unfinished} files left")
        }
    }

    Ok(())
}

pub fn run() -> Result<()> {
    Cli::exec()
}
