//! Record CSV

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::RecordSink;
use crate::types::Record;
use crate::{Result, RsdError};

/// Column order of the record CSV.
pub const CSV_COLUMNS: [&str; 19] = [
    "offset",
    "channel_id",
    "sequence",
    "time_ms",
    "data_size",
    "lat_deg",
    "lon_deg",
    "depth_m",
    "sample_count",
    "sonar_offset",
    "sonar_size",
    "beam_deg",
    "pitch_deg",
    "roll_deg",
    "heave_m",
    "tx_offset_m",
    "rx_offset_m",
    "color_id",
    "extras_json",
];

/// Row shape; field order must follow [`CSV_COLUMNS`].
#[derive(Serialize)]
struct CsvRow {
    offset: usize,
    channel_id: Option<u32>,
    sequence: Option<u32>,
    time_ms: Option<u32>,
    data_size: u32,
    lat_deg: Option<f64>,
    lon_deg: Option<f64>,
    depth_m: Option<f64>,
    sample_count: Option<u32>,
    sonar_offset: Option<usize>,
    sonar_size: Option<usize>,
    beam_deg: Option<f64>,
    pitch_deg: Option<f64>,
    roll_deg: Option<f64>,
    heave_m: Option<f64>,
    tx_offset_m: Option<f64>,
    rx_offset_m: Option<f64>,
    color_id: Option<u32>,
    extras_json: Option<String>,
}

impl From<&Record> for CsvRow {
    fn from(record: &Record) -> Self {
        Self {
            offset: record.offset,
            channel_id: record.nav.channel_id,
            sequence: record.sequence,
            time_ms: record.time_ms,
            data_size: record.data_size,
            lat_deg: record.lat_deg,
            lon_deg: record.lon_deg,
            depth_m: record.depth_m,
            sample_count: record.sample_count,
            sonar_offset: record.sonar.map(|s| s.offset),
            sonar_size: record.sonar.map(|s| s.size),
            beam_deg: record.nav.beam_deg,
            pitch_deg: record.nav.pitch_deg,
            roll_deg: record.nav.roll_deg,
            heave_m: record.nav.heave_m,
            tx_offset_m: record.nav.tx_offset_m,
            rx_offset_m: record.nav.rx_offset_m,
            color_id: record.nav.color_id,
            extras_json: record.extras_json(),
        }
    }
}

/// Streams records to CSV. Missing optionals are written as empty cells.
pub struct CsvRecordSink<W: Write> {
    writer: csv::Writer<W>,
    path: Option<PathBuf>,
    rows: u64,
}

impl CsvRecordSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| RsdError::output_error(path.clone(), e))?;
        let mut sink = Self::from_writer(BufWriter::new(file))?;
        sink.path = Some(path);
        Ok(sink)
    }
}

impl<W: Write> CsvRecordSink<W> {
    /// Wrap `writer` and emit the header row.
    pub fn from_writer(writer: W) -> Result<Self> {
        // Headers are written by hand so an empty run still produces one.
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        writer.write_record(CSV_COLUMNS)?;
        Ok(Self { writer, path: None, rows: 0 })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        let path = self.output_path();
        self.writer.into_inner().map_err(|e| RsdError::output_error(path, e.into_error()))
    }

    fn output_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from("<writer>"))
    }
}

impl<W: Write> RecordSink for CsvRecordSink<W> {
    fn write_record(&mut self, record: &Record) -> Result<()> {
        self.writer.serialize(CsvRow::from(record))?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| RsdError::output_error(self.output_path(), e))
    }
}
