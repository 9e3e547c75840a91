//! Record recovery for Garmin RSD sonar logs.
//!
//! RSD files are written by consumer fishfinders across many firmware
//! revisions. Field layouts drift, CRCs are sometimes stale, and captures are
//! often torn or truncated. rsdkit extracts as many position/depth/sonar
//! records as it can, trading strictness for yield in a predictable order.
//!
//! # Features
//!
//! - **Bounds-checked decoding**: every varint, varstruct and trailer read goes
//!   through a checked view and fails with a typed [`DecodeError`]
//! - **Three engines**: strict ([`engine::ClassicEngine`]), tolerant
//!   ([`engine::NextgenEngine`]) and heuristic ([`engine::SignatureEngine`])
//! - **Fallback cascade**: strict pass under a watchdog, heuristic pass when
//!   the yield is low ([`orchestrator::Cascade`])
//! - **Streaming output**: records go straight to CSV; large files are
//!   memory-mapped, never copied
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rsdkit::Rsd;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> rsdkit::Result<()> {
//!     let report = Rsd::recover("/logs/Sonar000.RSD", "/tmp/recovered").await?;
//!     println!("Recovered {} rows", report.rows_total);
//!     Ok(())
//! }
//! ```
//!
//! ## Iterating records directly
//!
//! ```rust,no_run
//! use rsdkit::engine::{EngineKind, RecordEngine, StructuredEngine};
//! use rsdkit::{ParseConfig, RsdSource, ScanContext};
//!
//! # fn main() -> rsdkit::Result<()> {
//! let source = RsdSource::open("/logs/Sonar000.RSD")?;
//! let config = ParseConfig::default();
//! let engine = StructuredEngine::new(EngineKind::Nextgen, &config).expect("structured");
//! let ctx = ScanContext::new();
//! for record in engine.iter_records(source.as_slice(), &ctx) {
//!     println!("{:#x}: {:?} {:?}", record.offset, record.lat_deg, record.lon_deg);
//! }
//! # Ok(())
//! # }
//! ```

// Core types and error handling
pub mod codec;
pub mod config;
pub mod context;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// File access and record engines
pub mod engine;
pub mod orchestrator;
pub mod output;
pub mod rsd;

// Core exports
pub use config::{ParseConfig, SignatureConfig};
pub use context::ScanContext;
pub use error::*;
pub use types::*;

// Main API exports
pub use engine::{EngineKind, EngineStats, RecordEngine, StructuredEngine};
pub use orchestrator::{Cascade, CascadeOptions, CascadeReport, StrictOutcome};
pub use output::{CsvRecordSink, RecordSink, RecoverySummary, VecSink};
pub use rsd::RsdSource;

use std::path::Path;

/// Unified entry point for RSD recovery.
///
/// # Examples
///
/// ```rust,no_run
/// use rsdkit::{CascadeOptions, EngineKind, Rsd};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> rsdkit::Result<()> {
/// let options = CascadeOptions { engine: EngineKind::Nextgen, ..CascadeOptions::default() };
/// let report = Rsd::recover_with("/logs/Sonar000.RSD", "/tmp/out", options).await?;
/// # Ok(())
/// # }
/// ```
pub struct Rsd;

impl Rsd {
    /// Run the default cascade: classic engine, 90 s watchdog, threshold 10.
    pub async fn recover(
        input: impl AsRef<Path>,
        out_dir: impl AsRef<Path>,
    ) -> Result<CascadeReport> {
        Self::recover_with(input, out_dir, CascadeOptions::default()).await
    }

    pub async fn recover_with(
        input: impl AsRef<Path>,
        out_dir: impl AsRef<Path>,
        options: CascadeOptions,
    ) -> Result<CascadeReport> {
        Cascade::new(options).run(input, out_dir).await
    }

    /// Decode every record of an in-memory log with the given engine.
    ///
    /// Returns `None` for [`EngineKind::Signature`].
    pub fn decode(data: &[u8], kind: EngineKind, config: &ParseConfig) -> Option<Vec<Record>> {
        let engine = StructuredEngine::new(kind, config)?;
        let ctx = ScanContext::new();
        Some(engine.iter_records(data, &ctx).collect())
    }
}
