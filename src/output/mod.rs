//! Output artifacts
//!
//! Structured engines stream [`Record`]s into a [`RecordSink`]; the CSV sink is
//! the production one, [`VecSink`] collects rows in memory. The heuristic pass
//! writes its own two-column CSV, and every cascade run ends with a JSON
//! [`RecoverySummary`].

pub mod rows;
pub mod signature;
pub mod summary;

pub use rows::{CSV_COLUMNS, CsvRecordSink};
pub use signature::write_signature_csv;
pub use summary::{HeuristicSummary, RecoverySummary, StrictStatus, StrictSummary};

use crate::Result;
use crate::types::Record;

/// Destination for recovered records.
pub trait RecordSink {
    fn write_record(&mut self, record: &Record) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub records: Vec<Record>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl RecordSink for VecSink {
    fn write_record(&mut self, record: &Record) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write_record(&mut self, record: &Record) -> Result<()> {
        (**self).write_record(record)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}
