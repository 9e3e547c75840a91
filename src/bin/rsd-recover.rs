//! Recover navigation and sonar records from a Garmin RSD log.
//!
//! # Usage
//!
//! ```bash
//! rsd-recover Sonar000.RSD --out recovered/ --engine nextgen --timeout 120
//! ```
//!
//! # Output Files
//!
//! - `<stem>.rows.csv`: structured records from the strict pass
//! - `<stem>_signature.csv`: heuristic coordinates (only when the strict yield is low)
//! - `<stem>_summary.json`: yield and statistics of both passes

use anyhow::{Context, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rsdkit::orchestrator::{DEFAULT_THRESHOLD, DEFAULT_TIMEOUT};
use rsdkit::{Cascade, CascadeOptions, EngineKind, ParseConfig, ScanContext};

#[derive(Parser, Debug)]
#[command(name = "rsd-recover")]
#[command(about = "Recover records from Garmin RSD sonar logs", version)]
struct Args {
    /// Input RSD file
    input: PathBuf,

    /// Output directory (defaults to the input's directory)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// JSON rules file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Engine for the strict pass: classic, nextgen or signature
    #[arg(short, long, default_value = "classic")]
    engine: EngineKind,

    /// Run the signature pass regardless of the strict yield
    #[arg(long)]
    force_heuristic: bool,

    /// Strict pass time limit in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs(), conflicts_with = "no_timeout")]
    timeout: u64,

    /// Let the strict pass run to completion
    #[arg(long)]
    no_timeout: bool,

    /// Strict yield below which the signature pass runs
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: u64,

    /// Stop after this many records
    #[arg(long)]
    max: Option<usize>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.input.is_file() {
        bail!("input {} is not a file", args.input.display());
    }
    let out_dir = match &args.out {
        Some(dir) => dir.clone(),
        None => args.input.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
    };

    let mut config = match &args.config {
        Some(path) => ParseConfig::load(path)
            .with_context(|| format!("loading rules from {}", path.display()))?,
        None => ParseConfig::default(),
    };
    if args.max.is_some() {
        config.max_records = args.max;
    }

    let options = CascadeOptions {
        engine: args.engine,
        force_heuristic: args.force_heuristic,
        threshold: args.threshold,
        timeout: (!args.no_timeout).then(|| Duration::from_secs(args.timeout)),
        config,
    };
    info!("Options: {:?}", options);

    let ctx = ScanContext::new().with_progress(|pct, msg| {
        tracing::debug!("{:5.1}% {}", pct, msg);
    });
    let report = Cascade::new(options)
        .with_context(ctx)
        .run(&args.input, &out_dir)
        .await
        .with_context(|| format!("recovering {}", args.input.display()))?;

    println!("rows_total={}", report.rows_total);
    if let Some(csv) = &report.summary.strict_summary.csv {
        println!("rows:      {}", csv.display());
    }
    if let Some(heuristic) = &report.heuristic {
        println!("signature: {} ({} points)", heuristic.csv.display(), heuristic.points);
    }
    println!("summary:   {}", report.summary_path.display());
    Ok(())
}
