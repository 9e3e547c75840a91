//! Self-describing tagged-field records ("varstructs").
//!
//! ## Layout
//!
//! ```text
//! [magic: u32 LE]?  field_count: varuint
//! field_count x { key: varuint = field_id << 3 | length_code,
//!                 [length: varuint if length_code == 7],
//!                 value: length bytes }
//! crc: u32 LE  over every byte from the start (magic included)
//! ```
//!
//! Length codes 0 through 6 are literal byte lengths; 7 means an explicit varuint
//! length follows the key. Header records open with the record magic; body
//! records do not.

use tracing::warn;

use super::checksum::crc32;
use super::varint::write_varuint;
use super::view::ByteView;
use crate::DecodeError;
use crate::rsd::format::RECORD_HEADER_MAGIC;
use crate::types::CrcMode;

/// Upper bound on the field count of one varstruct.
pub const MAX_FIELD_COUNT: u32 = 50;

const EXPLICIT_LENGTH: u32 = 7;

/// Ordered `(field_id, bytes)` pairs.
///
/// Insertion order is kept; inserting an id that is already present replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap<'a> {
    fields: Vec<(u32, &'a [u8])>,
}

impl<'a> FieldMap<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u32, value: &'a [u8]) {
        match self.fields.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((id, value)),
        }
    }

    pub fn get(&self, id: u32) -> Option<&'a [u8]> {
        self.fields.iter().find(|(existing, _)| *existing == id).map(|(_, value)| *value)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &'a [u8])> + '_ {
        self.fields.iter().copied()
    }
}

/// A decoded varstruct and where it sits in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Varstruct<'a> {
    /// Offset of the first byte (the magic, when present).
    pub start: usize,
    /// Offset just past the trailing CRC.
    pub end: usize,
    pub fields: FieldMap<'a>,
    pub stored_crc: u32,
    pub computed_crc: u32,
}

impl Varstruct<'_> {
    pub fn crc_matches(&self) -> bool {
        self.stored_crc == self.computed_crc
    }
}

/// Varstruct parser configured with an optional leading magic and a CRC policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarstructDecoder {
    magic: Option<u32>,
    crc_mode: CrcMode,
}

impl VarstructDecoder {
    /// Decoder for body records: no leading magic.
    pub fn new(crc_mode: CrcMode) -> Self {
        Self { magic: None, crc_mode }
    }

    /// Consume `magic` when it is present at the start position.
    pub fn with_magic(mut self, magic: u32) -> Self {
        self.magic = Some(magic);
        self
    }

    pub fn crc_mode(&self) -> CrcMode {
        self.crc_mode
    }

    /// Read and range-check the field count without decoding any fields.
    ///
    /// Returns the count and the position of the first field key.
    pub fn peek_field_count(
        &self,
        buf: &[u8],
        pos: usize,
        limit: usize,
    ) -> Result<(u32, usize), DecodeError> {
        let mut view = ByteView::new(buf, pos, limit);
        self.skip_magic(&mut view)?;
        let count_offset = view.position();
        let count = view.read_varuint()?;
        if count > MAX_FIELD_COUNT {
            return Err(DecodeError::FieldCountOutOfRange {
                offset: count_offset,
                count,
                max: MAX_FIELD_COUNT,
            });
        }
        Ok((count, view.position()))
    }

    /// Decode one varstruct from `buf[pos..limit]`.
    pub fn parse<'a>(
        &self,
        buf: &'a [u8],
        pos: usize,
        limit: usize,
    ) -> Result<Varstruct<'a>, DecodeError> {
        let (count, fields_start) = self.peek_field_count(buf, pos, limit)?;
        let mut view = ByteView::new(buf, fields_start, limit);

        let mut fields = FieldMap::new();
        for _ in 0..count {
            let key = view.read_varuint()?;
            let id = key >> 3;
            let length = match key & 7 {
                EXPLICIT_LENGTH => view.read_varuint()?,
                literal => literal,
            };
            let value = view.take(length as usize)?;
            fields.insert(id, value);
        }

        let crc_offset = view.position();
        let stored_crc = view.read_u32_le()?;
        let computed_crc = crc32(&buf[pos..crc_offset]);

        if stored_crc != computed_crc {
            match self.crc_mode {
                CrcMode::Strict => {
                    return Err(DecodeError::ChecksumMismatch {
                        offset: pos,
                        computed: computed_crc,
                        stored: stored_crc,
                    });
                }
                CrcMode::Warn => {
                    warn!(
                        "CRC mismatch at {:#x}: computed {:#010x}, stored {:#010x}",
                        pos, computed_crc, stored_crc
                    );
                }
            }
        }

        Ok(Varstruct { start: pos, end: view.position(), fields, stored_crc, computed_crc })
    }

    fn skip_magic(&self, view: &mut ByteView<'_>) -> Result<(), DecodeError> {
        if let Some(magic) = self.magic {
            if view.peek_u32_le() == Some(magic) {
                view.skip(4)?;
            }
        }
        Ok(())
    }
}

/// Parse a varstruct that may open with the record header magic.
///
/// Returns the field map and the position just past the CRC.
pub fn parse(
    buf: &[u8],
    pos: usize,
    limit: usize,
    crc_mode: CrcMode,
) -> Result<(FieldMap<'_>, usize), DecodeError> {
    let decoded = VarstructDecoder::new(crc_mode)
        .with_magic(RECORD_HEADER_MAGIC)
        .parse(buf, pos, limit)?;
    Ok((decoded.fields, decoded.end))
}

/// Encoder producing varstructs with a valid trailing CRC.
///
/// Used for synthesising logs and for probing parsers against known input.
#[derive(Debug, Clone, Default)]
pub struct VarstructWriter {
    magic: Option<u32>,
    fields: Vec<(u32, Vec<u8>)>,
}

impl VarstructWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_magic(mut self, magic: u32) -> Self {
        self.magic = Some(magic);
        self
    }

    pub fn field(mut self, id: u32, value: impl Into<Vec<u8>>) -> Self {
        self.fields.push((id, value.into()));
        self
    }

    pub fn field_varint(self, id: u32, value: i32) -> Self {
        let mut bytes = Vec::new();
        super::varint::write_varint(value, &mut bytes);
        self.field(id, bytes)
    }

    /// Encode, appending to `out`. Returns the encoded length.
    pub fn write_into(&self, out: &mut Vec<u8>) -> usize {
        let start = out.len();
        if let Some(magic) = self.magic {
            out.extend_from_slice(&magic.to_le_bytes());
        }
        write_varuint(self.fields.len() as u32, out);
        for (id, value) in &self.fields {
            let len = value.len() as u32;
            if len < EXPLICIT_LENGTH {
                write_varuint((id << 3) | len, out);
            } else {
                write_varuint((id << 3) | EXPLICIT_LENGTH, out);
                write_varuint(len, out);
            }
            out.extend_from_slice(value);
        }
        let crc = crc32(&out[start..]);
        out.extend_from_slice(&crc.to_le_bytes());
        out.len() - start
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_into(&mut out);
        out
    }
}
