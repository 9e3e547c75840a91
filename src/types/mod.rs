//! Core value types for recovered RSD data.
//!
//! - [`Record`] is one decoded sonar ping with its navigation fields.
//! - [`NavFields`] groups the transducer attitude and channel fields.
//! - [`SonarPayload`] locates the raw sample bytes inside the file.
//! - [`CrcMode`] selects how varstruct checksum mismatches are handled.
//! - [`GeoBox`] and the map-unit helpers convert firmware coordinates to degrees.
//!
//! ## Usage Example
//!
//! ```rust
//! use rsdkit::types::{map_units_to_degrees, GeoBox, Record};
//!
//! let mut record = Record::new(0x200, 1_024);
//! record.lat_deg = Some(map_units_to_degrees(530_905_680));
//! record.lon_deg = Some(map_units_to_degrees(-1_014_089_500));
//!
//! assert!(record.has_position());
//! assert!(GeoBox::default().contains(record.lat_deg.unwrap(), record.lon_deg.unwrap()));
//! ```

mod crc_mode;
mod geo;
mod record;

pub use crc_mode::CrcMode;
pub use geo::{
    DEGREES_PER_MAP_UNIT, GeoBox, degrees_to_map_units, is_valid_latitude, is_valid_longitude,
    map_units_to_degrees,
};
pub use record::{CUSTOM_FIELD_ID_MIN, ExtrasFormat, NavFields, Record, SonarPayload};
