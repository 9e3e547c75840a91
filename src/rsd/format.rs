//! RSD record layout
//!
//! An RSD log is a stream of records, each laid out as:
//!
//! 1. **Header varstruct** - opens with [`RECORD_HEADER_MAGIC`], carries the sequence
//!    number, timestamp and declared body size.
//! 2. **Body** - `data_size` bytes: a body varstruct with navigation fields,
//!    followed by raw sonar samples.
//! 3. **Trailer** (12 bytes) - trailer magic, total chunk size, checksum.
//! 4. Optional `A1 B2` padding pairs.
//!
//! Field ids inside the body differ between firmware families; [`BodyLayout`]
//! captures one family's assignment.

use crate::DecodeError;
use crate::codec::FieldMap;
use crate::codec::varint::read_varint;
use crate::codec::view::u32_le_at;
use crate::types::{
    ExtrasFormat, NavFields, Record, SonarPayload, is_valid_latitude, is_valid_longitude,
    map_units_to_degrees,
};

/// Record header magic, little-endian on disk.
pub const RECORD_HEADER_MAGIC: u32 = 0xB7E9_DA86;
/// Trailer magic written by the firmware family the classic engine targets.
pub const RECORD_TRAILER_MAGIC: u32 = 0xD926_4B7C;
/// Trailer magic observed in later captures.
pub const RECORD_TRAILER_MAGIC_ALT: u32 = 0xF98E_ACBC;
/// Trailer length: magic, chunk size and checksum.
pub const TRAILER_LEN: usize = 12;
/// Inter-record padding pair.
pub const PAD_PAIR: [u8; 2] = [0xA1, 0xB2];

/// Header field ids.
pub mod header_field {
    pub const MAGIC: u32 = 0;
    pub const SEQUENCE: u32 = 2;
    pub const DATA_SIZE: u32 = 4;
    pub const TIME_MS: u32 = 5;
}

/// Little-endian u32 from exactly the first four bytes.
pub fn le_u32(bytes: &[u8]) -> Option<u32> {
    u32_le_at(bytes, 0)
}

/// Little-endian u32 from up to four bytes, zero-extended. `None` if empty.
pub fn le_u32_padded(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    Some(bytes.iter().take(4).rev().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
}

pub fn le_u16(bytes: &[u8]) -> Option<u16> {
    bytes.get(..2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

pub fn le_i16(bytes: &[u8]) -> Option<i16> {
    le_u16(bytes).map(|v| v as i16)
}

pub fn le_f32(bytes: &[u8]) -> Option<f32> {
    le_u32(bytes).map(f32::from_bits)
}

/// Decoded record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    /// Offset of the header magic.
    pub offset: usize,
    /// Offset just past the header varstruct.
    pub body_start: usize,
    /// Header magic repeated in field 0.
    pub magic_echo: Option<u32>,
    pub sequence: Option<u32>,
    pub time_ms: Option<u32>,
    pub data_size: Option<u32>,
}

impl RecordHeader {
    pub fn from_fields(offset: usize, body_start: usize, fields: &FieldMap<'_>) -> Self {
        Self {
            offset,
            body_start,
            magic_echo: fields.get(header_field::MAGIC).and_then(le_u32),
            sequence: fields.get(header_field::SEQUENCE).and_then(le_u32),
            time_ms: fields.get(header_field::TIME_MS).and_then(le_u32),
            data_size: fields.get(header_field::DATA_SIZE).and_then(le_u16).map(u32::from),
        }
    }

    /// Field 0 must repeat the header magic; a missing echo fails too.
    pub fn validate_magic(&self, expected: u32) -> Result<(), DecodeError> {
        match self.magic_echo {
            Some(found) if found == expected => Ok(()),
            found => Err(DecodeError::HeaderMagicMismatch { offset: self.offset, found, expected }),
        }
    }

    /// End of the declared body, checked against `file_len`.
    pub fn body_end(&self, file_len: usize) -> Result<usize, DecodeError> {
        let size = self.data_size.ok_or(DecodeError::DeclaredSizeImplausible {
            offset: self.offset,
            size: None,
        })? as usize;
        match self.body_start.checked_add(size) {
            Some(end) if end <= file_len => Ok(end),
            _ => Err(DecodeError::BufferOverrun {
                offset: self.body_start,
                needed: size,
                limit: file_len,
            }),
        }
    }
}

/// Record trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub offset: usize,
    pub magic: u32,
    /// Distance from the header magic to the next record.
    pub chunk_size: u32,
    pub crc: u32,
}

impl Trailer {
    pub fn read(data: &[u8], offset: usize) -> Result<Self, DecodeError> {
        let overrun =
            || DecodeError::BufferOverrun { offset, needed: TRAILER_LEN, limit: data.len() };
        let magic = u32_le_at(data, offset).ok_or_else(overrun)?;
        let chunk_size = u32_le_at(data, offset + 4).ok_or_else(overrun)?;
        let crc = u32_le_at(data, offset + 8).ok_or_else(overrun)?;
        Ok(Self { offset, magic, chunk_size, crc })
    }

    /// Require `expected` magic and a positive chunk size.
    pub fn validate(&self, expected: u32) -> Result<(), DecodeError> {
        // Chunk sizes are read as i32 by the firmware; anything with the top bit
        // set is as invalid as zero.
        if self.magic != expected || self.chunk_size == 0 || self.chunk_size > i32::MAX as u32 {
            return Err(DecodeError::TrailerMismatch {
                offset: self.offset,
                magic: self.magic,
                chunk_size: self.chunk_size,
            });
        }
        Ok(())
    }
}

/// Encoding of a real-valued body field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealEncoding {
    /// Signed 32-bit map unit, converted to degrees.
    MapUnit,
    /// Little-endian IEEE-754 single.
    F32,
    /// Signed 16-bit thousandths.
    I16Milli,
    /// Zig-zag varint thousandths (millimetres to metres).
    ZigZagMilli,
}

impl RealEncoding {
    pub fn decode(self, bytes: &[u8]) -> Option<f64> {
        let value = match self {
            RealEncoding::MapUnit => map_units_to_degrees(le_u32(bytes)? as i32),
            RealEncoding::F32 => f64::from(le_f32(bytes)?),
            RealEncoding::I16Milli => f64::from(le_i16(bytes)?) / 1000.0,
            RealEncoding::ZigZagMilli => {
                f64::from(read_varint(bytes, 0, bytes.len()).ok()?.0) / 1000.0
            }
        };
        value.is_finite().then_some(value)
    }
}

/// Encoding of an integer body field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntEncoding {
    /// Up to four little-endian bytes, zero-extended.
    U32Padded,
    U16,
    U8,
}

impl IntEncoding {
    pub fn decode(self, bytes: &[u8]) -> Option<u32> {
        match self {
            IntEncoding::U32Padded => le_u32_padded(bytes),
            IntEncoding::U16 => le_u16(bytes).map(u32::from),
            IntEncoding::U8 => bytes.first().copied().map(u32::from),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealField {
    pub id: u32,
    pub encoding: RealEncoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntField {
    pub id: u32,
    pub encoding: IntEncoding,
}

const fn real(id: u32, encoding: RealEncoding) -> RealField {
    RealField { id, encoding }
}

const fn int(id: u32, encoding: IntEncoding) -> IntField {
    IntField { id, encoding }
}

/// Where the sonar samples sit relative to the body varstruct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SonarPlacement {
    /// Everything between the end of the body varstruct and the end of the body.
    AfterVarstruct,
    /// `sample_count * bytes_per_sample` bytes ending at the end of the body.
    TrailingSamples { bytes_per_sample: usize },
}

/// Body field-id assignment for one firmware family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLayout {
    pub channel_id: IntField,
    pub depth_m: RealField,
    pub sample_count: IntField,
    pub latitude: RealField,
    pub longitude: RealField,
    pub beam_deg: RealField,
    pub pitch_deg: RealField,
    pub roll_deg: RealField,
    pub heave_m: RealField,
    pub tx_offset_m: RealField,
    pub rx_offset_m: RealField,
    pub color_id: IntField,
    pub sonar: SonarPlacement,
    pub extras: ExtrasFormat,
}

impl BodyLayout {
    /// Layout of the firmware family read by the strict engine.
    pub const CLASSIC: BodyLayout = BodyLayout {
        channel_id: int(0, IntEncoding::U32Padded),
        depth_m: real(1, RealEncoding::ZigZagMilli),
        sample_count: int(7, IntEncoding::U32Padded),
        latitude: real(9, RealEncoding::MapUnit),
        longitude: real(10, RealEncoding::MapUnit),
        beam_deg: real(11, RealEncoding::I16Milli),
        pitch_deg: real(12, RealEncoding::I16Milli),
        roll_deg: real(13, RealEncoding::I16Milli),
        heave_m: real(14, RealEncoding::I16Milli),
        tx_offset_m: real(15, RealEncoding::F32),
        rx_offset_m: real(16, RealEncoding::F32),
        color_id: int(17, IntEncoding::U8),
        sonar: SonarPlacement::AfterVarstruct,
        extras: ExtrasFormat::LeInteger,
    };

    /// Layout of the firmware family read by the tolerant engine.
    pub const NEXTGEN: BodyLayout = BodyLayout {
        latitude: real(6, RealEncoding::F32),
        longitude: real(7, RealEncoding::F32),
        depth_m: real(8, RealEncoding::F32),
        beam_deg: real(9, RealEncoding::F32),
        pitch_deg: real(10, RealEncoding::F32),
        roll_deg: real(11, RealEncoding::F32),
        heave_m: real(12, RealEncoding::F32),
        tx_offset_m: real(13, RealEncoding::F32),
        rx_offset_m: real(14, RealEncoding::F32),
        channel_id: int(15, IntEncoding::U16),
        color_id: int(16, IntEncoding::U16),
        sample_count: int(17, IntEncoding::U16),
        sonar: SonarPlacement::TrailingSamples { bytes_per_sample: 2 },
        extras: ExtrasFormat::Float32,
    };

    fn known_ids(&self) -> [u32; 12] {
        [
            self.channel_id.id,
            self.depth_m.id,
            self.sample_count.id,
            self.latitude.id,
            self.longitude.id,
            self.beam_deg.id,
            self.pitch_deg.id,
            self.roll_deg.id,
            self.heave_m.id,
            self.tx_offset_m.id,
            self.rx_offset_m.id,
            self.color_id.id,
        ]
    }

    /// Fill `record` from decoded body fields. Unknown ids land in `extras`.
    pub fn apply(&self, fields: &FieldMap<'_>, record: &mut Record) {
        let real_value = |f: RealField| fields.get(f.id).and_then(|b| f.encoding.decode(b));
        let int_value = |f: IntField| fields.get(f.id).and_then(|b| f.encoding.decode(b));

        record.lat_deg = real_value(self.latitude).filter(|v| is_valid_latitude(*v));
        record.lon_deg = real_value(self.longitude).filter(|v| is_valid_longitude(*v));
        record.depth_m = real_value(self.depth_m);
        record.sample_count = int_value(self.sample_count);
        record.nav = NavFields {
            channel_id: int_value(self.channel_id),
            beam_deg: real_value(self.beam_deg),
            pitch_deg: real_value(self.pitch_deg),
            roll_deg: real_value(self.roll_deg),
            heave_m: real_value(self.heave_m),
            tx_offset_m: real_value(self.tx_offset_m),
            rx_offset_m: real_value(self.rx_offset_m),
            color_id: int_value(self.color_id),
        };

        record.extras_format = self.extras;
        let known = self.known_ids();
        record.extras = fields
            .iter()
            .filter(|(id, _)| !known.contains(id))
            .map(|(id, bytes)| (id, bytes.to_vec()))
            .collect();
    }

    /// Sonar payload span for a body occupying `[body_start, body_end)` whose
    /// varstruct ends at `varstruct_end`.
    pub fn sonar_span(
        &self,
        varstruct_end: usize,
        body_end: usize,
        sample_count: Option<u32>,
        file_len: usize,
    ) -> Option<SonarPayload> {
        match self.sonar {
            SonarPlacement::AfterVarstruct => {
                SonarPayload::within(varstruct_end, body_end.checked_sub(varstruct_end)?, file_len)
            }
            SonarPlacement::TrailingSamples { bytes_per_sample } => {
                let size = (sample_count? as usize).checked_mul(bytes_per_sample)?;
                let offset = body_end.checked_sub(size)?;
                if offset < varstruct_end {
                    return None;
                }
                SonarPayload::within(offset, size, file_len)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::VarstructWriter;
    use crate::codec::varstruct::VarstructDecoder;
    use crate::types::{CrcMode, degrees_to_map_units};

    #[test]
    fn scalar_readers() {
        assert_eq!(le_u32(&[1, 0, 0]), None);
        assert_eq!(le_u32(&[1, 0, 0, 0, 9]), Some(1));
        assert_eq!(le_u32_padded(&[0x34, 0x12]), Some(0x1234));
        assert_eq!(le_u32_padded(&[]), None);
        assert_eq!(le_u32_padded(&[1, 0, 0, 0, 0xFF]), Some(1));
        assert_eq!(le_i16(&(-1500i16).to_le_bytes()), Some(-1500));
        assert_eq!(le_f32(&2.5f32.to_le_bytes()), Some(2.5));
    }

    #[test]
    fn real_encodings() {
        assert_eq!(RealEncoding::I16Milli.decode(&(-1500i16).to_le_bytes()), Some(-1.5));
        let mut depth = Vec::new();
        crate::codec::write_varint(-12_345, &mut depth);
        assert_eq!(RealEncoding::ZigZagMilli.decode(&depth), Some(-12.345));
        assert_eq!(RealEncoding::F32.decode(&f32::NAN.to_le_bytes()), None);
        assert_eq!(RealEncoding::MapUnit.decode(&[0, 0]), None);
        assert_eq!(RealEncoding::MapUnit.decode(&(1i32 << 30).to_le_bytes()), Some(90.0));
    }

    #[test]
    fn header_from_fields() {
        let bytes = VarstructWriter::new()
            .with_magic(RECORD_HEADER_MAGIC)
            .field(header_field::MAGIC, RECORD_HEADER_MAGIC.to_le_bytes())
            .field(header_field::SEQUENCE, 7u32.to_le_bytes())
            .field(header_field::DATA_SIZE, 300u16.to_le_bytes())
            .to_bytes();
        let decoded = VarstructDecoder::new(CrcMode::Strict)
            .with_magic(RECORD_HEADER_MAGIC)
            .parse(&bytes, 0, bytes.len())
            .unwrap();
        let header = RecordHeader::from_fields(0, decoded.end, &decoded.fields);
        assert_eq!(header.magic_echo, Some(RECORD_HEADER_MAGIC));
        assert_eq!(header.validate_magic(RECORD_HEADER_MAGIC), Ok(()));
        assert_eq!(header.sequence, Some(7));
        assert_eq!(header.time_ms, None);
        assert_eq!(header.data_size, Some(300));
        assert!(matches!(header.body_end(bytes.len()), Err(DecodeError::BufferOverrun { .. })));
        assert_eq!(header.body_end(decoded.end + 300), Ok(decoded.end + 300));
    }

    #[test]
    fn header_without_magic_echo_fails_validation() {
        let bytes = VarstructWriter::new()
            .with_magic(RECORD_HEADER_MAGIC)
            .field(header_field::DATA_SIZE, 40u16.to_le_bytes())
            .to_bytes();
        let decoded = VarstructDecoder::new(CrcMode::Strict)
            .with_magic(RECORD_HEADER_MAGIC)
            .parse(&bytes, 0, bytes.len())
            .unwrap();
        let header = RecordHeader::from_fields(0x80, decoded.end, &decoded.fields);
        assert_eq!(
            header.validate_magic(RECORD_HEADER_MAGIC),
            Err(DecodeError::HeaderMagicMismatch {
                offset: 0x80,
                found: None,
                expected: RECORD_HEADER_MAGIC
            })
        );

        let wrong = RecordHeader { magic_echo: Some(0x1234_5678), ..header };
        assert!(matches!(
            wrong.validate_magic(RECORD_HEADER_MAGIC),
            Err(DecodeError::HeaderMagicMismatch { found: Some(0x1234_5678), .. })
        ));
    }

    #[test]
    fn trailer_validation() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&RECORD_TRAILER_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&96u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let trailer = Trailer::read(&bytes, 0).unwrap();
        assert_eq!(trailer.chunk_size, 96);
        assert!(trailer.validate(RECORD_TRAILER_MAGIC).is_ok());
        assert!(matches!(
            trailer.validate(RECORD_TRAILER_MAGIC_ALT),
            Err(DecodeError::TrailerMismatch { .. })
        ));
        assert!(matches!(Trailer::read(&bytes, 1), Err(DecodeError::BufferOverrun { .. })));

        let zero = Trailer { chunk_size: 0, ..trailer };
        assert!(zero.validate(RECORD_TRAILER_MAGIC).is_err());
        let negative = Trailer { chunk_size: 0x8000_0000, ..trailer };
        assert!(negative.validate(RECORD_TRAILER_MAGIC).is_err());
    }

    #[test]
    fn classic_layout_fills_record() {
        let bytes = VarstructWriter::new()
            .field(0, [4u8])
            .field_varint(1, 12_500)
            .field(7, 256u32.to_le_bytes())
            .field(9, degrees_to_map_units(44.5).to_le_bytes())
            .field(10, degrees_to_map_units(-85.0).to_le_bytes())
            .field(11, 1_500i16.to_le_bytes())
            .field(15, 0.25f32.to_le_bytes())
            .field(17, [3u8])
            .field(30, [9u8, 9, 9, 9, 9])
            .to_bytes();
        let decoded = VarstructDecoder::new(CrcMode::Strict).parse(&bytes, 0, bytes.len()).unwrap();

        let mut record = Record::new(0, 64);
        BodyLayout::CLASSIC.apply(&decoded.fields, &mut record);
        assert_eq!(record.nav.channel_id, Some(4));
        assert_eq!(record.depth_m, Some(12.5));
        assert_eq!(record.sample_count, Some(256));
        assert!((record.lat_deg.unwrap() - 44.5).abs() < 1e-6);
        assert!((record.lon_deg.unwrap() + 85.0).abs() < 1e-6);
        assert_eq!(record.nav.beam_deg, Some(1.5));
        assert_eq!(record.nav.pitch_deg, None);
        assert_eq!(record.nav.tx_offset_m, Some(0.25));
        assert_eq!(record.nav.color_id, Some(3));
        assert_eq!(record.extras.len(), 1);
        assert_eq!(record.extras.get(&30), Some(&vec![9u8; 5]));
        assert_eq!(record.extras_format, ExtrasFormat::LeInteger);
    }

    #[test]
    fn nextgen_layout_rejects_implausible_coordinates() {
        let bytes = VarstructWriter::new()
            .field(6, 123.0f32.to_le_bytes())
            .field(7, (-85.0f32).to_le_bytes())
            .field(17, 10u16.to_le_bytes())
            .to_bytes();
        let decoded = VarstructDecoder::new(CrcMode::Strict).parse(&bytes, 0, bytes.len()).unwrap();

        let mut record = Record::new(0, 64);
        BodyLayout::NEXTGEN.apply(&decoded.fields, &mut record);
        assert_eq!(record.lat_deg, None);
        assert_eq!(record.lon_deg, Some(-85.0));
        assert_eq!(record.sample_count, Some(10));
        assert!(record.extras.is_empty());
        assert_eq!(record.extras_format, ExtrasFormat::Float32);
    }

    #[test]
    fn sonar_spans() {
        let classic = BodyLayout::CLASSIC;
        assert_eq!(
            classic.sonar_span(120, 200, None, 1_000),
            Some(SonarPayload { offset: 120, size: 80 })
        );
        assert_eq!(classic.sonar_span(200, 200, None, 1_000), None);

        let nextgen = BodyLayout::NEXTGEN;
        assert_eq!(
            nextgen.sonar_span(120, 200, Some(10), 1_000),
            Some(SonarPayload { offset: 180, size: 20 })
        );
        assert_eq!(nextgen.sonar_span(120, 200, Some(50), 1_000), None);
        assert_eq!(nextgen.sonar_span(120, 200, None, 1_000), None);
        assert_eq!(nextgen.sonar_span(120, 200, Some(10), 190), None);
    }
}
