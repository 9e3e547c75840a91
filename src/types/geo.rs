//! Map-unit coordinate helpers

use serde::{Deserialize, Serialize};

/// Degrees per map unit: a full turn spread over the 32-bit integer range.
pub const DEGREES_PER_MAP_UNIT: f64 = 360.0 / 4_294_967_296.0;

/// Convert a signed 32-bit map unit to degrees.
#[inline]
pub fn map_units_to_degrees(units: i32) -> f64 {
    f64::from(units) * DEGREES_PER_MAP_UNIT
}

/// Convert degrees to the nearest map unit, saturating at the i32 range.
#[inline]
pub fn degrees_to_map_units(degrees: f64) -> i32 {
    (degrees / DEGREES_PER_MAP_UNIT).round() as i32
}

#[inline]
pub fn is_valid_latitude(lat: f64) -> bool {
    lat.is_finite() && (-90.0..=90.0).contains(&lat)
}

#[inline]
pub fn is_valid_longitude(lon: f64) -> bool {
    lon.is_finite() && (-180.0..=180.0).contains(&lon)
}

/// Inclusive latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Default for GeoBox {
    /// Continental North America, where most field captures originate.
    fn default() -> Self {
        Self { lat_min: 30.0, lat_max: 60.0, lon_min: -110.0, lon_max: -50.0 }
    }
}

impl GeoBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&lat) && (self.lon_min..=self.lon_max).contains(&lon)
    }
}
