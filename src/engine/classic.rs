//! Strict record engine.
//!
//! A record is emitted only when the header varstruct, the body varstruct and
//! the trailer all validate. Any failure resynchronises four bytes past the
//! header magic, so a corrupt record costs exactly that record.

use tracing::{info, trace};

use super::{Cursor, EngineStats, RecordEngine, RecordIter};
use crate::DecodeError;
use crate::codec::{Varstruct, VarstructDecoder};
use crate::config::ParseConfig;
use crate::context::ScanContext;
use crate::rsd::format::{BodyLayout, RecordHeader, Trailer};
use crate::types::{CrcMode, Record};

#[derive(Debug, Clone, PartialEq)]
pub struct ClassicEngine {
    config: ParseConfig,
    layout: BodyLayout,
}

impl ClassicEngine {
    pub fn new(config: &ParseConfig) -> Self {
        Self { config: config.clone(), layout: BodyLayout::CLASSIC }
    }

    pub fn crc_mode(&self) -> CrcMode {
        self.config.crc_mode
    }
}

impl RecordEngine for ClassicEngine {
    type Iter<'a> = ClassicRecords<'a>;

    fn name(&self) -> &'static str {
        "classic"
    }

    fn iter_records<'a>(&'a self, data: &'a [u8], ctx: &'a ScanContext) -> ClassicRecords<'a> {
        info!("Classic scan of {} bytes (CRC {})", data.len(), self.config.crc_mode);
        let decoder = VarstructDecoder::new(self.config.crc_mode);
        ClassicRecords {
            engine: self,
            cursor: Cursor::new(data, ctx, &self.config),
            header_decoder: decoder.with_magic(self.config.header_magic),
            body_decoder: decoder,
            logged_finish: false,
        }
    }
}

pub struct ClassicRecords<'a> {
    engine: &'a ClassicEngine,
    cursor: Cursor<'a>,
    header_decoder: VarstructDecoder,
    body_decoder: VarstructDecoder,
    logged_finish: bool,
}

impl ClassicRecords<'_> {
    /// Decode the record whose header magic sits at `offset`.
    ///
    /// Returns the record and the offset of the next record.
    fn decode_at(&mut self, offset: usize) -> Result<(Record, usize), DecodeError> {
        let data = self.cursor.data;

        let header = self.header_decoder.parse(data, offset, data.len())?;
        self.note_crc(&header);
        let header = RecordHeader::from_fields(offset, header.end, &header.fields);
        header.validate_magic(self.engine.config.header_magic)?;
        let body_end = header.body_end(data.len())?;

        let body = self.body_decoder.parse(data, header.body_start, body_end)?;
        self.note_crc(&body);

        let trailer = Trailer::read(data, body_end)?;
        trailer.validate(self.engine.config.trailer_magic)?;

        let layout = &self.engine.layout;
        let mut record = Record::new(offset, header.data_size.unwrap_or_default());
        record.sequence = header.sequence;
        record.time_ms = header.time_ms;
        layout.apply(&body.fields, &mut record);
        record.sonar = layout.sonar_span(body.end, body_end, record.sample_count, data.len());

        Ok((record, offset.saturating_add(trailer.chunk_size as usize)))
    }

    fn note_crc(&mut self, decoded: &Varstruct<'_>) {
        if !decoded.crc_matches() {
            self.cursor.stats.crc_tolerated += 1;
        }
    }
}

impl Iterator for ClassicRecords<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        while let Some(offset) = self.cursor.next_candidate() {
            trace!("Header candidate at {:#x}", offset);
            match self.decode_at(offset) {
                Ok((record, next)) => {
                    self.cursor.emit(&record, next);
                    return Some(record);
                }
                Err(error) => self.cursor.reject(offset, error, offset + 4),
            }
        }
        if !self.logged_finish {
            self.logged_finish = true;
            let stats = &self.cursor.stats;
            info!(
                "Classic scan finished: {} records, {} rejected, {} candidates",
                stats.records,
                stats.rejected(),
                stats.candidates
            );
        }
        None
    }
}

impl RecordIter for ClassicRecords<'_> {
    fn stats(&self) -> &EngineStats {
        &self.cursor.stats
    }
}
