//! Tolerant record engine.
//!
//! Built for firmware that writes stale or missing CRCs. Field counts and the
//! declared body size are sanity-checked before anything is trusted, CRC
//! mismatches are logged and counted, and the scan always advances by the
//! declared body size once a header has been accepted.

use tracing::{info, trace};

use super::{Cursor, EngineStats, RecordEngine, RecordIter};
use crate::DecodeError;
use crate::codec::view::u32_le_at;
use crate::codec::{Varstruct, VarstructDecoder};
use crate::config::ParseConfig;
use crate::context::ScanContext;
use crate::rsd::format::{BodyLayout, RecordHeader};
use crate::types::{CrcMode, Record};

/// Smallest declared body size accepted.
pub const MIN_DATA_SIZE: u32 = 32;
/// Largest declared body size accepted.
pub const MAX_DATA_SIZE: u32 = 65_535;

#[derive(Debug, Clone, PartialEq)]
pub struct NextgenEngine {
    config: ParseConfig,
    layout: BodyLayout,
}

impl NextgenEngine {
    pub fn new(config: &ParseConfig) -> Self {
        Self { config: config.clone(), layout: BodyLayout::NEXTGEN }
    }
}

impl RecordEngine for NextgenEngine {
    type Iter<'a> = NextgenRecords<'a>;

    fn name(&self) -> &'static str {
        "nextgen"
    }

    fn iter_records<'a>(&'a self, data: &'a [u8], ctx: &'a ScanContext) -> NextgenRecords<'a> {
        info!("Nextgen scan of {} bytes", data.len());
        let decoder = VarstructDecoder::new(CrcMode::Warn);
        NextgenRecords {
            engine: self,
            cursor: Cursor::new(data, ctx, &self.config),
            header_decoder: decoder.with_magic(self.config.header_magic),
            body_decoder: decoder,
            logged_finish: false,
        }
    }
}

/// Where to resume after a failed candidate.
enum Resume {
    /// Header rejected: try four bytes past the magic.
    AfterMagic,
    /// Header accepted, body rejected: skip the declared body.
    At(usize),
}

pub struct NextgenRecords<'a> {
    engine: &'a NextgenEngine,
    cursor: Cursor<'a>,
    header_decoder: VarstructDecoder,
    body_decoder: VarstructDecoder,
    logged_finish: bool,
}

impl NextgenRecords<'_> {
    fn decode_at(&mut self, offset: usize) -> Result<(Record, usize), (DecodeError, Resume)> {
        let data = self.cursor.data;
        let header_failed = |e: DecodeError| (e, Resume::AfterMagic);

        self.header_decoder.peek_field_count(data, offset, data.len()).map_err(header_failed)?;
        let header = self.header_decoder.parse(data, offset, data.len()).map_err(header_failed)?;
        self.note_crc(&header);
        let header = RecordHeader::from_fields(offset, header.end, &header.fields);
        header.validate_magic(self.engine.config.header_magic).map_err(header_failed)?;

        let data_size = match header.data_size {
            Some(size) if (MIN_DATA_SIZE..=MAX_DATA_SIZE).contains(&size) => size,
            size => {
                return Err(header_failed(DecodeError::DeclaredSizeImplausible { offset, size }));
            }
        };
        let body_end = header.body_end(data.len()).map_err(header_failed)?;
        let skip_body = |e: DecodeError| (e, Resume::At(body_end));

        self.body_decoder
            .peek_field_count(data, header.body_start, body_end)
            .map_err(skip_body)?;
        let body = self.body_decoder.parse(data, header.body_start, body_end).map_err(skip_body)?;
        if body.fields.is_empty() {
            return Err(skip_body(DecodeError::DeclaredSizeImplausible {
                offset: header.body_start,
                size: Some(data_size),
            }));
        }
        self.note_crc(&body);

        let layout = &self.engine.layout;
        let mut record = Record::new(offset, data_size);
        record.sequence = header.sequence;
        record.time_ms = header.time_ms;
        layout.apply(&body.fields, &mut record);
        record.sonar = layout.sonar_span(body.end, body_end, record.sample_count, data.len());

        Ok((record, body_end))
    }

    /// A header magic immediately followed by another one.
    fn is_false_header(&self, offset: usize) -> bool {
        u32_le_at(self.cursor.data, offset + 4) == Some(self.engine.config.header_magic)
    }

    fn note_crc(&mut self, decoded: &Varstruct<'_>) {
        if !decoded.crc_matches() {
            self.cursor.stats.crc_tolerated += 1;
        }
    }
}

impl Iterator for NextgenRecords<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        while let Some(offset) = self.cursor.next_candidate() {
            trace!("Header candidate at {:#x}", offset);
            if self.is_false_header(offset) {
                trace!("Skipping false header at {:#x}", offset);
                self.cursor.skip_to(offset + 4);
                continue;
            }
            match self.decode_at(offset) {
                Ok((record, next)) => {
                    self.cursor.emit(&record, next);
                    return Some(record);
                }
                Err((error, Resume::AfterMagic)) => self.cursor.reject(offset, error, offset + 4),
                Err((error, Resume::At(next))) => self.cursor.reject(offset, error, next),
            }
        }
        if !self.logged_finish {
            self.logged_finish = true;
            let stats = &self.cursor.stats;
            info!(
                "Nextgen scan finished: {} records, {} rejected, {} CRC mismatches tolerated",
                stats.records,
                stats.rejected(),
                stats.crc_tolerated
            );
        }
        None
    }
}

impl RecordIter for NextgenRecords<'_> {
    fn stats(&self) -> &EngineStats {
        &self.cursor.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ClassicEngine;
    use crate::rsd::format::RECORD_HEADER_MAGIC;
    use crate::test_utils::{RecordSpec, RsdBuilder};

    fn records(data: &[u8]) -> (Vec<Record>, EngineStats) {
        let engine = NextgenEngine::new(&ParseConfig::default());
        let ctx = ScanContext::new();
        let mut iter = engine.iter_records(data, &ctx);
        let records: Vec<_> = iter.by_ref().collect();
        (records, iter.stats().clone())
    }

    #[test]
    fn accepts_bad_crc_record() {
        let log = RsdBuilder::nextgen()
            .record(RecordSpec::at(44.5, -85.0))
            .record(RecordSpec::at(44.6, -85.1).corrupt_body_crc())
            .record(RecordSpec::at(44.7, -85.2))
            .build();
        let (recs, stats) = records(&log.bytes);

        assert_eq!(recs.len(), 3);
        assert_eq!(stats.crc_tolerated, 1);
        for (rec, built) in recs.iter().zip(&log.records) {
            assert_eq!(rec.offset, built.offset);
            assert!((rec.lat_deg.unwrap() - built.lat).abs() < 1e-4);
            assert!((rec.lon_deg.unwrap() - built.lon).abs() < 1e-4);
        }
    }

    #[test]
    fn keeps_the_record_the_strict_engine_drops() {
        let log = RsdBuilder::nextgen()
            .record(RecordSpec::at(44.5, -85.0))
            .record(RecordSpec::at(44.6, -85.1).corrupt_body_crc())
            .record(RecordSpec::at(44.7, -85.2))
            .build();
        let ctx = ScanContext::new();
        let classic = ClassicEngine::new(&ParseConfig::default());
        let mut strict = classic.iter_records(&log.bytes, &ctx);
        let strict_offsets: Vec<_> = strict.by_ref().map(|r| r.offset).collect();
        assert_eq!(strict_offsets, vec![log.records[0].offset, log.records[2].offset]);
        assert_eq!(strict.stats().rejections.get("checksum_mismatch"), Some(&1));

        let (recs, stats) = records(&log.bytes);
        let tolerant_offsets: Vec<_> = recs.iter().map(|r| r.offset).collect();
        let all: Vec<_> = log.records.iter().map(|r| r.offset).collect();
        assert_eq!(tolerant_offsets, all);
        assert_eq!(stats.crc_tolerated, 1);
    }

    #[test]
    fn header_without_magic_echo_is_rejected() {
        let log = RsdBuilder::nextgen()
            .record(RecordSpec::at(44.5, -85.0))
            .record(RecordSpec::at(44.6, -85.1).without_magic_echo())
            .record(RecordSpec::at(44.7, -85.2))
            .build();
        let (recs, stats) = records(&log.bytes);

        let offsets: Vec<_> = recs.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![log.records[0].offset, log.records[2].offset]);
        assert_eq!(stats.rejections.get("header_magic_mismatch"), Some(&1));
        assert_eq!(stats.crc_tolerated, 0);
    }

    #[test]
    fn sonar_payload_trails_the_body() {
        let log = RsdBuilder::nextgen()
            .record(RecordSpec::at(44.5, -85.0).samples(24).channel(1).color(3))
            .build();
        let (recs, _) = records(&log.bytes);
        let rec = &recs[0];
        let sonar = rec.sonar.expect("sample payload");
        assert_eq!(sonar.size, 48);
        assert_eq!(sonar.end(), log.records[0].body_start + rec.data_size as usize);
        assert_eq!(rec.sample_count, Some(24));
        assert_eq!(rec.nav.channel_id, Some(1));
        assert_eq!(rec.nav.color_id, Some(3));
    }

    #[test]
    fn false_header_is_skipped() {
        let mut bytes = RECORD_HEADER_MAGIC.to_le_bytes().to_vec();
        let log = RsdBuilder::nextgen().record(RecordSpec::at(44.5, -85.0)).build();
        bytes.extend_from_slice(&log.bytes);

        let (recs, stats) = records(&bytes);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].offset, 4);
        assert_eq!(stats.candidates, 2);
        assert_eq!(stats.rejected(), 0);
    }

    #[test]
    fn implausible_sizes_are_rejected() {
        let log = RsdBuilder::nextgen()
            .record(RecordSpec::at(44.5, -85.0).samples(0).declared_size(16))
            .record(RecordSpec::at(44.6, -85.1))
            .build();
        let (recs, stats) = records(&log.bytes);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].offset, log.records[1].offset);
        assert_eq!(stats.rejections.get("declared_size_implausible"), Some(&1));
    }

    #[test]
    fn body_failure_skips_declared_size() {
        let log = RsdBuilder::nextgen()
            .record(RecordSpec::at(44.5, -85.0).corrupt_body_field_count())
            .record(RecordSpec::at(44.6, -85.1))
            .build();
        let (recs, stats) = records(&log.bytes);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].offset, log.records[1].offset);
        assert_eq!(stats.rejections.get("field_count_out_of_range"), Some(&1));
    }

    #[test]
    fn offsets_strictly_increase() {
        let log = RsdBuilder::nextgen()
            .garbage(11)
            .record(RecordSpec::at(44.5, -85.0))
            .padding(2)
            .record(RecordSpec::at(44.6, -85.1))
            .garbage(3)
            .record(RecordSpec::at(44.7, -85.2))
            .build();
        let (recs, _) = records(&log.bytes);
        assert_eq!(recs.len(), 3);
        assert!(recs.windows(2).all(|w| w[0].offset < w[1].offset));
    }
}
