//! Recovered record types

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Navigation and transducer fields carried by a record body.
///
/// Every field is optional; firmware revisions populate different subsets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavFields {
    pub channel_id: Option<u32>,
    pub beam_deg: Option<f64>,
    pub pitch_deg: Option<f64>,
    pub roll_deg: Option<f64>,
    pub heave_m: Option<f64>,
    pub tx_offset_m: Option<f64>,
    pub rx_offset_m: Option<f64>,
    pub color_id: Option<u32>,
}

/// Location of the raw sonar samples belonging to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SonarPayload {
    /// Absolute file offset of the first sample byte.
    pub offset: usize,
    /// Payload length in bytes; never zero.
    pub size: usize,
}

impl SonarPayload {
    /// Build a payload span if it is non-empty and ends within `file_len`.
    pub fn within(offset: usize, size: usize, file_len: usize) -> Option<Self> {
        let end = offset.checked_add(size)?;
        (size > 0 && end <= file_len).then_some(Self { offset, size })
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// How unrecognised body fields are rendered into the extras column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtrasFormat {
    /// Up to four bytes as a little-endian integer, otherwise hex.
    #[default]
    LeInteger,
    /// Four-byte values with ids from [`CUSTOM_FIELD_ID_MIN`] up are tried as `f32`
    /// first; everything else falls back to [`ExtrasFormat::LeInteger`].
    Float32,
}

/// Lowest body field id used for firmware-specific custom values.
pub const CUSTOM_FIELD_ID_MIN: u32 = 20;

const CUSTOM_FLOAT_LIMIT: f32 = 1e6;

/// One recovered sonar ping.
///
/// Produced by the structured engines one at a time and streamed straight to a
/// [`RecordSink`](crate::output::RecordSink). `None` means the field was absent or
/// failed its plausibility check, never "decoded as zero".
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// File offset of the record header magic.
    pub offset: usize,
    pub sequence: Option<u32>,
    pub time_ms: Option<u32>,
    /// Declared body size from the header.
    pub data_size: u32,
    pub lat_deg: Option<f64>,
    pub lon_deg: Option<f64>,
    pub depth_m: Option<f64>,
    pub sample_count: Option<u32>,
    pub sonar: Option<SonarPayload>,
    pub nav: NavFields,
    /// Body fields with ids the engine does not recognise.
    pub extras: BTreeMap<u32, Vec<u8>>,
    pub extras_format: ExtrasFormat,
}

impl Record {
    /// Empty record at `offset` with only the declared size known.
    pub fn new(offset: usize, data_size: u32) -> Self {
        Self {
            offset,
            sequence: None,
            time_ms: None,
            data_size,
            lat_deg: None,
            lon_deg: None,
            depth_m: None,
            sample_count: None,
            sonar: None,
            nav: NavFields::default(),
            extras: BTreeMap::new(),
            extras_format: ExtrasFormat::default(),
        }
    }

    pub fn has_position(&self) -> bool {
        self.lat_deg.is_some() && self.lon_deg.is_some()
    }

    /// Render `extras` as a JSON object, or `None` when there are none.
    ///
    /// Values of up to four bytes become `"field_<id>": <little-endian integer>`;
    /// longer values become `"field_<id>_hex": "<hex>"`. Under
    /// [`ExtrasFormat::Float32`], four-byte custom fields within ±1e6 are written
    /// as `"field_<id>": <float>` instead.
    pub fn extras_json(&self) -> Option<String> {
        if self.extras.is_empty() {
            return None;
        }
        let mut map = Map::new();
        for (&id, bytes) in &self.extras {
            if let Some(value) = self.custom_float(id, bytes) {
                map.insert(format!("field_{id}"), Value::from(value));
            } else if bytes.len() <= 4 {
                let value = bytes.iter().rev().fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
                map.insert(format!("field_{id}"), Value::from(value));
            } else {
                map.insert(format!("field_{id}_hex"), Value::from(hex::encode(bytes)));
            }
        }
        Some(Value::Object(map).to_string())
    }

    fn custom_float(&self, id: u32, bytes: &[u8]) -> Option<f32> {
        if self.extras_format != ExtrasFormat::Float32 || id < CUSTOM_FIELD_ID_MIN {
            return None;
        }
        let raw: [u8; 4] = bytes.try_into().ok()?;
        let value = f32::from_le_bytes(raw);
        (-CUSTOM_FLOAT_LIMIT..=CUSTOM_FLOAT_LIMIT).contains(&value).then_some(value)
    }
}
