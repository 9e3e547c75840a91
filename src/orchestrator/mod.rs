//! Fallback cascade
//!
//! The cascade runs a structured engine first and only falls back to the
//! heuristic signature search when the structured yield is too low:
//!
//! 1. The strict pass runs on a dedicated worker thread, streaming rows to
//!    `<stem>.rows.csv.partial`. The file is renamed to `<stem>.rows.csv` once
//!    the pass completes or is cancelled. A watchdog enforces an optional
//!    wall-clock timeout. On expiry the worker is cancelled and abandoned, its
//!    staging file and any earlier `<stem>.rows.csv` are removed, and the pass
//!    counts as zero yield.
//! 2. If the heuristic is forced, or the strict rows total fewer than the
//!    threshold, the signature pass writes `<stem>_signature.csv`.
//! 3. The effective yield is the larger of the two counts. A
//!    `<stem>_summary.json` records both passes.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rsdkit::orchestrator::{Cascade, CascadeOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rsdkit::Result<()> {
//! let report = Cascade::new(CascadeOptions::default())
//!     .run("/logs/Sonar000.RSD", "/tmp/recovered")
//!     .await?;
//! println!("{} rows -> {}", report.rows_total, report.summary_path.display());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::ParseConfig;
use crate::context::ScanContext;
use crate::engine::{EngineKind, EngineStats, RecordEngine, SignatureEngine, StructuredEngine};
use crate::output::{
    CsvRecordSink, HeuristicSummary, RecoverySummary, StrictStatus, StrictSummary,
    write_signature_csv,
};
use crate::rsd::RsdSource;
use crate::{Result, RsdError};

/// Strict yield below which the heuristic pass runs.
pub const DEFAULT_THRESHOLD: u64 = 10;
/// Default wall-clock limit for the strict pass.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOptions {
    /// Engine for the strict pass. [`EngineKind::Signature`] skips it.
    pub engine: EngineKind,
    pub force_heuristic: bool,
    pub threshold: u64,
    /// `None` runs the strict pass without a watchdog.
    pub timeout: Option<Duration>,
    pub config: ParseConfig,
}

impl Default for CascadeOptions {
    fn default() -> Self {
        Self {
            engine: EngineKind::Classic,
            force_heuristic: false,
            threshold: DEFAULT_THRESHOLD,
            timeout: Some(DEFAULT_TIMEOUT),
            config: ParseConfig::default(),
        }
    }
}

/// How the strict pass ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StrictOutcome {
    Completed { stats: EngineStats, csv: PathBuf, elapsed: Duration },
    /// Stopped by the caller's cancellation; partial rows were kept.
    Cancelled { stats: EngineStats, csv: PathBuf, elapsed: Duration },
    /// The watchdog fired and the worker was abandoned. Counts as zero yield
    /// and leaves no rows file behind.
    TimedOut { after: Duration },
    /// No structured engine was selected.
    Skipped,
}

impl StrictOutcome {
    /// Rows summed over every channel class; zero unless the pass finished.
    pub fn rows_total(&self) -> u64 {
        match self {
            StrictOutcome::Completed { stats, .. } | StrictOutcome::Cancelled { stats, .. } => {
                stats.rows_total()
            }
            StrictOutcome::TimedOut { .. } | StrictOutcome::Skipped => 0,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, StrictOutcome::TimedOut { .. })
    }

    fn summary(&self, engine: EngineKind) -> StrictSummary {
        let (status, stats, csv, elapsed) = match self {
            StrictOutcome::Completed { stats, csv, elapsed } => {
                (StrictStatus::Completed, Some(stats.clone()), Some(csv.clone()), *elapsed)
            }
            StrictOutcome::Cancelled { stats, csv, elapsed } => {
                (StrictStatus::Cancelled, Some(stats.clone()), Some(csv.clone()), *elapsed)
            }
            StrictOutcome::TimedOut { after } => (StrictStatus::TimedOut, None, None, *after),
            StrictOutcome::Skipped => (StrictStatus::Skipped, None, None, Duration::ZERO),
        };
        StrictSummary {
            engine,
            status,
            rows: self.rows_total(),
            elapsed_ms: elapsed.as_millis() as u64,
            csv,
            stats,
            worker_abandoned: self.is_timed_out(),
        }
    }
}

/// Result of one cascade run.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeReport {
    /// Effective yield.
    pub rows_total: u64,
    pub strict: StrictOutcome,
    pub heuristic: Option<HeuristicSummary>,
    pub summary: RecoverySummary,
    pub summary_path: PathBuf,
}

impl CascadeReport {
    pub fn heuristic_ran(&self) -> bool {
        self.heuristic.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cascade {
    options: CascadeOptions,
    ctx: ScanContext,
}

impl Cascade {
    pub fn new(options: CascadeOptions) -> Self {
        Self { options, ctx: ScanContext::new() }
    }

    /// Report progress and honour cancellation through `ctx`.
    pub fn with_context(mut self, ctx: ScanContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn options(&self) -> &CascadeOptions {
        &self.options
    }

    /// Recover `input` into `out_dir`.
    ///
    /// Only I/O failures are errors: opening or mapping the input, creating the
    /// output directory, and writing outputs.
    pub async fn run(
        &self,
        input: impl AsRef<Path>,
        out_dir: impl AsRef<Path>,
    ) -> Result<CascadeReport> {
        let out_dir = out_dir.as_ref();
        std::fs::create_dir_all(out_dir)
            .map_err(|e| RsdError::output_error(out_dir.to_path_buf(), e))?;
        let source = RsdSource::open(input)?;
        let stem = source.stem();
        info!("Recovering {} ({} bytes)", source.path().display(), source.len());

        let strict = match StructuredEngine::new(self.options.engine, &self.options.config) {
            Some(engine) => {
                let csv = out_dir.join(format!("{}.rows.csv", stem));
                self.run_strict(engine, source.clone(), csv).await?
            }
            None => StrictOutcome::Skipped,
        };
        let mut rows_total = strict.rows_total();

        let cancelled = self.ctx.is_cancelled();
        let escalate = self.options.force_heuristic || rows_total < self.options.threshold;
        let heuristic = if escalate && !cancelled {
            info!(
                "Strict yield {} (threshold {}, forced: {}); running signature scan",
                rows_total, self.options.threshold, self.options.force_heuristic
            );
            let csv = out_dir.join(format!("{}_signature.csv", stem));
            let summary = self.run_heuristic(source.clone(), csv).await?;
            rows_total = rows_total.max(summary.points);
            Some(summary)
        } else {
            if cancelled {
                warn!("Cancelled; skipping signature scan");
            }
            None
        };

        let summary = RecoverySummary {
            input: source.path().to_path_buf(),
            rows_total,
            strict_summary: strict.summary(self.options.engine),
            heuristic: heuristic.clone(),
        };
        let summary_path = out_dir.join(format!("{}_summary.json", stem));
        summary.write(&summary_path)?;
        info!("Done: rows_total={} -> {}", rows_total, out_dir.display());

        Ok(CascadeReport { rows_total, strict, heuristic, summary, summary_path })
    }

    async fn run_strict(
        &self,
        engine: StructuredEngine,
        source: RsdSource,
        csv: PathBuf,
    ) -> Result<StrictOutcome> {
        let ctx = self.ctx.child();
        let watchdog = ctx.cancellation_token().clone();
        let (tx, rx) = oneshot::channel();
        let started = Instant::now();

        let staging = staging_path(&csv);
        let worker_staging = staging.clone();
        std::thread::Builder::new()
            .name(format!("rsd-{}", engine.name()))
            .spawn(move || {
                let result = CsvRecordSink::create(&worker_staging)
                    .and_then(|mut sink| engine.run(source.as_slice(), &ctx, &mut sink));
                // The receiver is gone once the watchdog has fired.
                if tx.send(result).is_err() {
                    discard(&worker_staging);
                }
            })
            .map_err(|e| RsdError::worker_failed(format!("failed to spawn strict worker: {}", e)))?;

        let received = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    warn!("Strict pass exceeded {:?}; abandoning worker", limit);
                    watchdog.cancel();
                    discard(&staging);
                    discard(&csv);
                    return Ok(StrictOutcome::TimedOut { after: limit });
                }
            },
            None => rx.await,
        };

        let elapsed = started.elapsed();
        let stats = match received {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                discard(&staging);
                return Err(e);
            }
            Err(_) => {
                error!("Strict worker exited without a result");
                discard(&staging);
                return Err(RsdError::worker_failed("strict worker panicked"));
            }
        };
        std::fs::rename(&staging, &csv).map_err(|e| RsdError::output_error(csv.clone(), e))?;
        debug!("Strict pass took {:?}: {:?}", elapsed, stats);

        if stats.cancelled {
            Ok(StrictOutcome::Cancelled { stats, csv, elapsed })
        } else {
            Ok(StrictOutcome::Completed { stats, csv, elapsed })
        }
    }

    async fn run_heuristic(&self, source: RsdSource, csv: PathBuf) -> Result<HeuristicSummary> {
        let engine = SignatureEngine::new(&self.options.config);
        let ctx = self.ctx.clone();
        tokio::task::spawn_blocking(move || -> Result<HeuristicSummary> {
            let mut points = engine.iter_points(source.as_slice(), &ctx);
            let written = write_signature_csv(&csv, &mut points)?;
            Ok(HeuristicSummary { points: written, csv, stats: points.stats().clone() })
        })
        .await
        .map_err(|e| RsdError::worker_failed(format!("signature scan failed: {}", e)))?
    }
}

/// Sibling path the strict worker writes to before its rows are accepted.
fn staging_path(csv: &Path) -> PathBuf {
    let mut name = csv.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    csv.with_file_name(name)
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}
