//! Record iteration engines
//!
//! Three strategies trade strictness for yield:
//!
//! - [`ClassicEngine`] - strict: every varstruct CRC and the record trailer must
//!   check out. Advances by the trailer's chunk size.
//! - [`NextgenEngine`] - tolerant: pre-validates field counts and declared sizes,
//!   logs CRC mismatches instead of rejecting, advances by the declared body size.
//! - [`SignatureEngine`] - heuristic: brute-forces a plausible coordinate pair
//!   near every header magic. Produces [`SignaturePoint`]s, not records.
//!
//! The two structured engines share the [`RecordEngine`] trait and are selected
//! at runtime through [`StructuredEngine`]. All of them poll the
//! [`ScanContext`] for cancellation and report progress every
//! [`PROGRESS_RECORD_INTERVAL`] records.
//!
//! ## Usage Example
//!
//! ```rust
//! use rsdkit::engine::{EngineKind, RecordEngine, RecordIter, StructuredEngine};
//! use rsdkit::{ParseConfig, ScanContext};
//!
//! let engine = StructuredEngine::new(EngineKind::Classic, &ParseConfig::default())
//!     .expect("classic is structured");
//! let ctx = ScanContext::new();
//! let data = vec![0u8; 128];
//! let mut records = engine.iter_records(&data, &ctx);
//! assert!(records.next().is_none());
//! assert_eq!(records.stats().records, 0);
//! ```

pub mod classic;
pub mod nextgen;
pub mod signature;

pub use classic::ClassicEngine;
pub use nextgen::NextgenEngine;
pub use signature::{SignatureEngine, SignaturePoint};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::ParseConfig;
use crate::context::ScanContext;
use crate::output::RecordSink;
use crate::rsd::MagicScanner;
use crate::rsd::format::PAD_PAIR;
use crate::types::Record;
use crate::{DecodeError, Result};

/// Records between progress and cancellation checks.
pub const PROGRESS_RECORD_INTERVAL: u64 = 250;

/// Counters kept by every engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Header magics examined.
    pub candidates: u64,
    pub records: u64,
    /// Varstructs accepted despite a CRC mismatch.
    pub crc_tolerated: u64,
    /// Rejected candidates by [`DecodeError::kind`].
    pub rejections: BTreeMap<String, u64>,
    /// Records per channel id; `"none"` when the record carries no channel.
    pub rows_by_channel: BTreeMap<String, u64>,
    pub cancelled: bool,
}

impl EngineStats {
    pub fn reject(&mut self, error: &DecodeError) {
        *self.rejections.entry(error.kind().to_string()).or_default() += 1;
    }

    pub fn rejected(&self) -> u64 {
        self.rejections.values().sum()
    }

    fn emitted(&mut self, record: &Record) {
        self.records += 1;
        let channel = record.nav.channel_id.map_or_else(|| "none".to_string(), |c| c.to_string());
        *self.rows_by_channel.entry(channel).or_default() += 1;
    }

    /// Total rows across every channel class.
    pub fn rows_total(&self) -> u64 {
        self.rows_by_channel.values().sum()
    }
}

/// Iterator over recovered records that also exposes running statistics.
pub trait RecordIter: Iterator<Item = Record> {
    fn stats(&self) -> &EngineStats;
}

/// A structured record engine.
pub trait RecordEngine {
    type Iter<'a>: RecordIter
    where
        Self: 'a;

    fn name(&self) -> &'static str;

    /// Lazily iterate the records of `data`. Offsets strictly increase.
    fn iter_records<'a>(&'a self, data: &'a [u8], ctx: &'a ScanContext) -> Self::Iter<'a>;

    /// Stream every record into `sink`.
    fn run<S: RecordSink + ?Sized>(
        &self,
        data: &[u8],
        ctx: &ScanContext,
        sink: &mut S,
    ) -> Result<EngineStats> {
        let mut records = self.iter_records(data, ctx);
        for record in &mut records {
            sink.write_record(&record)?;
        }
        sink.flush()?;
        Ok(records.stats().clone())
    }
}

/// Engine selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Classic,
    Nextgen,
    Signature,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Classic => "classic",
            EngineKind::Nextgen => "nextgen",
            EngineKind::Signature => "signature",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" | "strict" => Ok(EngineKind::Classic),
            "nextgen" | "tolerant" => Ok(EngineKind::Nextgen),
            "signature" | "heuristic" => Ok(EngineKind::Signature),
            other => Err(format!(
                "unknown engine '{}' (expected classic, nextgen or signature)",
                other
            )),
        }
    }
}

/// Runtime-selected structured engine.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredEngine {
    Classic(ClassicEngine),
    Nextgen(NextgenEngine),
}

impl StructuredEngine {
    /// `None` for [`EngineKind::Signature`], which yields points rather than records.
    pub fn new(kind: EngineKind, config: &ParseConfig) -> Option<Self> {
        match kind {
            EngineKind::Classic => Some(StructuredEngine::Classic(ClassicEngine::new(config))),
            EngineKind::Nextgen => Some(StructuredEngine::Nextgen(NextgenEngine::new(config))),
            EngineKind::Signature => None,
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            StructuredEngine::Classic(_) => EngineKind::Classic,
            StructuredEngine::Nextgen(_) => EngineKind::Nextgen,
        }
    }
}

pub enum StructuredRecords<'a> {
    Classic(classic::ClassicRecords<'a>),
    Nextgen(nextgen::NextgenRecords<'a>),
}

impl Iterator for StructuredRecords<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        match self {
            StructuredRecords::Classic(records) => records.next(),
            StructuredRecords::Nextgen(records) => records.next(),
        }
    }
}

impl RecordIter for StructuredRecords<'_> {
    fn stats(&self) -> &EngineStats {
        match self {
            StructuredRecords::Classic(records) => records.stats(),
            StructuredRecords::Nextgen(records) => records.stats(),
        }
    }
}

impl RecordEngine for StructuredEngine {
    type Iter<'a> = StructuredRecords<'a>;

    fn name(&self) -> &'static str {
        match self {
            StructuredEngine::Classic(engine) => engine.name(),
            StructuredEngine::Nextgen(engine) => engine.name(),
        }
    }

    fn iter_records<'a>(&'a self, data: &'a [u8], ctx: &'a ScanContext) -> Self::Iter<'a> {
        match self {
            StructuredEngine::Classic(engine) => {
                StructuredRecords::Classic(engine.iter_records(data, ctx))
            }
            StructuredEngine::Nextgen(engine) => {
                StructuredRecords::Nextgen(engine.iter_records(data, ctx))
            }
        }
    }
}

/// Cursor shared by the structured engines: finds header candidates, skips
/// padding, enforces the record cap and reports progress.
#[derive(Debug)]
pub(crate) struct Cursor<'a> {
    pub data: &'a [u8],
    pub ctx: &'a ScanContext,
    pub pos: usize,
    pub stats: EngineStats,
    scanner: MagicScanner,
    header_magic: u32,
    pad_skip: bool,
    max_records: Option<usize>,
    finished: bool,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8], ctx: &'a ScanContext, config: &ParseConfig) -> Self {
        Self {
            data,
            ctx,
            pos: 0,
            stats: EngineStats::default(),
            scanner: MagicScanner::new().with_step(config.scan_step),
            header_magic: config.header_magic,
            pad_skip: config.pad_skip,
            max_records: config.max_records,
            finished: false,
        }
    }

    /// Next header magic at or after the current position.
    pub fn next_candidate(&mut self) -> Option<usize> {
        if self.finished {
            return None;
        }
        if self.ctx.is_cancelled() {
            debug!("Scan cancelled at {:#x}", self.pos);
            self.stats.cancelled = true;
            return self.finish();
        }
        if self.max_records.is_some_and(|max| self.stats.records >= max as u64) {
            debug!("Record cap of {} reached", self.stats.records);
            return self.finish();
        }
        match self.scanner.find(self.data, self.header_magic, self.pos, self.data.len(), self.ctx)
        {
            Some(offset) => {
                self.stats.candidates += 1;
                Some(offset)
            }
            None => {
                if self.ctx.is_cancelled() {
                    self.stats.cancelled = true;
                }
                self.finish()
            }
        }
    }

    /// Record a rejected candidate and resume at `resume`.
    pub fn reject(&mut self, candidate: usize, error: DecodeError, resume: usize) {
        debug!("Rejected record at {:#x}: {}", candidate, error);
        self.stats.reject(&error);
        self.pos = resume.max(candidate + 1);
    }

    pub fn skip_to(&mut self, pos: usize) {
        self.pos = pos.max(self.pos);
    }

    /// Account for an emitted record and move past it.
    pub fn emit(&mut self, record: &Record, next: usize) {
        self.stats.emitted(record);
        self.pos = self.skip_padding(next.max(record.offset + 1));
        if self.stats.records % PROGRESS_RECORD_INTERVAL == 0 {
            let pct = self.pos as f64 / self.data.len().max(1) as f64 * 100.0;
            self.ctx.report(pct, &format!("Parsed {} records", self.stats.records));
        }
    }

    fn skip_padding(&self, mut pos: usize) -> usize {
        if !self.pad_skip {
            return pos;
        }
        let swapped = [PAD_PAIR[1], PAD_PAIR[0]];
        while let Some(pair) = self.data.get(pos..pos + 2) {
            if pair != PAD_PAIR && pair != swapped {
                break;
            }
            pos += 2;
        }
        pos
    }

    fn finish(&mut self) -> Option<usize> {
        self.finished = true;
        None
    }
}
