//! Synthetic RSD logs for tests and benchmarks
//!
//! [`RsdBuilder`] lays out records the way firmware writes them (header
//! varstruct, body varstruct, sonar samples, trailer) and can splice in the
//! damage seen in real captures: bad CRCs, garbage gaps, padding runs and
//! implausible sizes. Every built record's offsets are returned so tests can
//! assert on exact positions.

#![cfg(any(test, feature = "benchmark"))]

use std::path::{Path, PathBuf};

use crate::codec::{VarstructWriter, crc32};
use crate::rsd::format::{PAD_PAIR, RECORD_HEADER_MAGIC, RECORD_TRAILER_MAGIC, header_field};
use crate::types::degrees_to_map_units;

const GARBAGE_BYTE: u8 = 0x5A;
const SAMPLE_BYTE: u8 = 0x11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Classic,
    Nextgen,
}

/// One record to synthesise.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSpec {
    pub lat: f64,
    pub lon: f64,
    pub channel: Option<u32>,
    pub color: Option<u32>,
    pub depth: Option<f64>,
    pub sequence: Option<u32>,
    pub time_ms: u32,
    pub samples: u32,
    pub declared_size: Option<u16>,
    pub extras: Vec<(u32, Vec<u8>)>,
    corrupt_body_crc: bool,
    corrupt_body_field_count: bool,
    omit_magic_echo: bool,
}

impl RecordSpec {
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            channel: None,
            color: None,
            depth: None,
            sequence: None,
            time_ms: 0,
            samples: 16,
            declared_size: None,
            extras: Vec::new(),
            corrupt_body_crc: false,
            corrupt_body_field_count: false,
            omit_magic_echo: false,
        }
    }

    pub fn channel(mut self, channel: u32) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn depth(mut self, depth_m: f64) -> Self {
        self.depth = Some(depth_m);
        self
    }

    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn time_ms(mut self, time_ms: u32) -> Self {
        self.time_ms = time_ms;
        self
    }

    pub fn samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    /// Write `size` into the header instead of the real body size.
    pub fn declared_size(mut self, size: u16) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn extra(mut self, id: u32, value: Vec<u8>) -> Self {
        self.extras.push((id, value));
        self
    }

    /// Flip a bit in the body varstruct's stored CRC.
    pub fn corrupt_body_crc(mut self) -> Self {
        self.corrupt_body_crc = true;
        self
    }

    /// Leave header field 0 (the magic echo) out.
    pub fn without_magic_echo(mut self) -> Self {
        self.omit_magic_echo = true;
        self
    }

    /// Replace the body field count with an out-of-range value.
    pub fn corrupt_body_field_count(mut self) -> Self {
        self.corrupt_body_field_count = true;
        self
    }
}

/// Positions of one synthesised record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuiltRecord {
    /// Header magic offset.
    pub offset: usize,
    pub body_start: usize,
    pub body_end: usize,
    /// Offset just past the trailer.
    pub end: usize,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticLog {
    pub bytes: Vec<u8>,
    pub records: Vec<BuiltRecord>,
}

impl SyntheticLog {
    /// Write the log to `dir/name` and return the path.
    pub fn write_to(&self, dir: &Path, name: &str) -> std::io::Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

#[derive(Debug, Clone)]
pub struct RsdBuilder {
    family: Family,
    trailer_magic: u32,
    bytes: Vec<u8>,
    records: Vec<BuiltRecord>,
    next_sequence: u32,
}

impl RsdBuilder {
    /// Records laid out for the strict engine: map-unit coordinates, trailers.
    pub fn classic() -> Self {
        Self::new(Family::Classic)
    }

    /// Records laid out for the tolerant engine: f32 coordinates, trailing samples.
    pub fn nextgen() -> Self {
        Self::new(Family::Nextgen)
    }

    fn new(family: Family) -> Self {
        Self {
            family,
            trailer_magic: RECORD_TRAILER_MAGIC,
            bytes: Vec::new(),
            records: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn trailer_magic(mut self, magic: u32) -> Self {
        self.trailer_magic = magic;
        self
    }

    /// Append `count` records along a short diagonal track.
    pub fn track(mut self, count: usize) -> Self {
        for i in 0..count {
            let step = i as f64 * 0.001;
            self = self.record(RecordSpec::at(44.5 + step, -85.0 - step));
        }
        self
    }

    /// Bytes that contain no marker or padding pair.
    pub fn garbage(mut self, len: usize) -> Self {
        self.bytes.resize(self.bytes.len() + len, GARBAGE_BYTE);
        self
    }

    /// `pairs` padding pairs, alternating byte order.
    pub fn padding(mut self, pairs: usize) -> Self {
        for i in 0..pairs {
            if i % 2 == 0 {
                self.bytes.extend_from_slice(&PAD_PAIR);
            } else {
                self.bytes.extend_from_slice(&[PAD_PAIR[1], PAD_PAIR[0]]);
            }
        }
        self
    }

    /// A header magic with no decodable structure and a map-unit coordinate
    /// pair 64 bytes in. Only the signature engine recovers these.
    pub fn signature_blob(mut self, lat: f64, lon: f64) -> Self {
        let start = self.bytes.len();
        self.bytes.extend_from_slice(&RECORD_HEADER_MAGIC.to_le_bytes());
        self.bytes.resize(start + 64, 0);
        self.bytes.extend_from_slice(&degrees_to_map_units(lat).to_le_bytes());
        self.bytes.extend_from_slice(&degrees_to_map_units(lon).to_le_bytes());
        self.bytes.resize(start + 80, 0);
        self
    }

    pub fn record(mut self, entry: RecordSpec) -> Self {
        let sequence = entry.sequence.unwrap_or(self.next_sequence);
        self.next_sequence = sequence.wrapping_add(1);

        let (mut body, sonar) = match self.family {
            Family::Classic => classic_body(&entry),
            Family::Nextgen => nextgen_body(&entry),
        };
        if entry.corrupt_body_crc {
            if let Some(last) = body.last_mut() {
                *last ^= 0x01;
            }
        }
        if entry.corrupt_body_field_count {
            body[0] = 51;
        }
        let data_size = body.len() + sonar.len();
        let declared = entry.declared_size.unwrap_or(data_size as u16);

        let mut header = VarstructWriter::new().with_magic(RECORD_HEADER_MAGIC);
        if !entry.omit_magic_echo {
            header = header.field(header_field::MAGIC, RECORD_HEADER_MAGIC.to_le_bytes());
        }
        let header = header
            .field(header_field::SEQUENCE, sequence.to_le_bytes())
            .field(header_field::DATA_SIZE, declared.to_le_bytes())
            .field(header_field::TIME_MS, entry.time_ms.to_le_bytes())
            .to_bytes();

        let offset = self.bytes.len();
        let body_start = offset + header.len();
        let body_end = body_start + data_size;
        let chunk_size = (body_end + 12 - offset) as u32;

        self.bytes.extend_from_slice(&header);
        self.bytes.extend_from_slice(&body);
        self.bytes.extend_from_slice(&sonar);
        let crc = crc32(&self.bytes[offset..]);
        self.bytes.extend_from_slice(&self.trailer_magic.to_le_bytes());
        self.bytes.extend_from_slice(&chunk_size.to_le_bytes());
        self.bytes.extend_from_slice(&crc.to_le_bytes());

        self.records.push(BuiltRecord {
            offset,
            body_start,
            body_end,
            end: self.bytes.len(),
            lat: entry.lat,
            lon: entry.lon,
        });
        self
    }

    pub fn build(self) -> SyntheticLog {
        SyntheticLog { bytes: self.bytes, records: self.records }
    }
}

fn with_extras(mut writer: VarstructWriter, entry: &RecordSpec) -> VarstructWriter {
    for (id, value) in &entry.extras {
        writer = writer.field(*id, value.clone());
    }
    writer
}

fn classic_body(entry: &RecordSpec) -> (Vec<u8>, Vec<u8>) {
    let mut writer = VarstructWriter::new();
    if let Some(channel) = entry.channel {
        writer = writer.field(0, channel.to_le_bytes());
    }
    if let Some(depth) = entry.depth {
        writer = writer.field_varint(1, (depth * 1000.0).round() as i32);
    }
    writer = writer
        .field(7, entry.samples.to_le_bytes())
        .field(9, degrees_to_map_units(entry.lat).to_le_bytes())
        .field(10, degrees_to_map_units(entry.lon).to_le_bytes());
    if let Some(color) = entry.color {
        writer = writer.field(17, [color as u8]);
    }
    let body = with_extras(writer, entry).to_bytes();
    (body, vec![SAMPLE_BYTE; entry.samples as usize])
}

fn nextgen_body(entry: &RecordSpec) -> (Vec<u8>, Vec<u8>) {
    let mut writer = VarstructWriter::new()
        .field(6, (entry.lat as f32).to_le_bytes())
        .field(7, (entry.lon as f32).to_le_bytes());
    if let Some(depth) = entry.depth {
        writer = writer.field(8, (depth as f32).to_le_bytes());
    }
    if let Some(channel) = entry.channel {
        writer = writer.field(15, (channel as u16).to_le_bytes());
    }
    if let Some(color) = entry.color {
        writer = writer.field(16, (color as u16).to_le_bytes());
    }
    writer = writer.field(17, (entry.samples as u16).to_le_bytes());
    let body = with_extras(writer, entry).to_bytes();
    (body, vec![SAMPLE_BYTE; entry.samples as usize * 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_contiguous_with_trailers() {
        let log = RsdBuilder::classic().track(3).build();
        assert_eq!(log.records.len(), 3);
        assert_eq!(log.records[0].offset, 0);
        for pair in log.records.windows(2) {
            assert_eq!(pair[0].end, pair[1].offset);
        }
        let last = log.records[2];
        assert_eq!(last.end, log.bytes.len());
        assert_eq!(last.end - last.body_end, 12);
    }

    #[test]
    fn garbage_and_padding_shift_offsets() {
        let log = RsdBuilder::nextgen()
            .garbage(7)
            .record(RecordSpec::at(44.5, -85.0))
            .padding(2)
            .signature_blob(44.5, -85.0)
            .build();
        assert_eq!(log.records[0].offset, 7);
        let blob = log.records[0].end + 4;
        assert_eq!(&log.bytes[log.records[0].end..blob], &[0xA1, 0xB2, 0xB2, 0xA1]);
        assert_eq!(log.bytes.len(), blob + 80);
    }
}
