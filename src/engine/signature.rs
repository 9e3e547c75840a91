//! Heuristic coordinate search.
//!
//! Ignores record structure entirely. After every header magic, a window of raw
//! bytes is walked in 4-byte strides looking for two consecutive little-endian
//! map units that decode inside a plausible latitude/longitude box. The first
//! hit per header becomes one [`SignaturePoint`].

use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use super::PROGRESS_RECORD_INTERVAL;
use crate::codec::view::i32_le_at;
use crate::config::{ParseConfig, SignatureConfig};
use crate::context::ScanContext;
use crate::rsd::MagicScanner;
use crate::types::map_units_to_degrees;

/// One coordinate pair found near a header magic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignaturePoint {
    /// Header magic the search started from.
    pub header_offset: usize,
    /// Offset of the latitude word.
    pub offset: usize,
    pub lat_deg: f64,
    pub lon_deg: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureStats {
    pub headers: u64,
    pub points: u64,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureEngine {
    settings: SignatureConfig,
    header_magic: u32,
}

impl SignatureEngine {
    pub fn new(config: &ParseConfig) -> Self {
        Self { settings: config.signature, header_magic: config.header_magic }
    }

    pub fn name(&self) -> &'static str {
        "signature"
    }

    pub fn iter_points<'a>(&'a self, data: &'a [u8], ctx: &'a ScanContext) -> SignaturePoints<'a> {
        info!("Signature scan of {} bytes", data.len());
        SignaturePoints {
            engine: self,
            data,
            ctx,
            scanner: MagicScanner::new(),
            pos: 0,
            stats: SignatureStats::default(),
            finished: false,
        }
    }

    /// First plausible pair in the window after the header at `header`.
    fn search_window(&self, data: &[u8], header: usize) -> Option<SignaturePoint> {
        let start = header.saturating_add(self.settings.window_start);
        let end = start.saturating_add(self.settings.window_len).min(data.len());
        let bounds = &self.settings.bounds;

        let mut offset = start;
        while offset.saturating_add(8) <= end {
            if let (Some(lat), Some(lon)) = (i32_le_at(data, offset), i32_le_at(data, offset + 4)) {
                let (lat_deg, lon_deg) = (map_units_to_degrees(lat), map_units_to_degrees(lon));
                if bounds.contains(lat_deg, lon_deg) {
                    return Some(SignaturePoint { header_offset: header, offset, lat_deg, lon_deg });
                }
            }
            offset += 4;
        }
        None
    }
}

pub struct SignaturePoints<'a> {
    engine: &'a SignatureEngine,
    data: &'a [u8],
    ctx: &'a ScanContext,
    scanner: MagicScanner,
    pos: usize,
    stats: SignatureStats,
    finished: bool,
}

impl SignaturePoints<'_> {
    pub fn stats(&self) -> &SignatureStats {
        &self.stats
    }
}

impl Iterator for SignaturePoints<'_> {
    type Item = SignaturePoint;

    fn next(&mut self) -> Option<SignaturePoint> {
        while !self.finished {
            if self.ctx.is_cancelled() {
                self.stats.cancelled = true;
                break;
            }
            let magic = self.engine.header_magic;
            let end = self.data.len();
            let Some(header) = self.scanner.find(self.data, magic, self.pos, end, self.ctx) else {
                break;
            };
            self.pos = header + 1;
            self.stats.headers += 1;
            if self.stats.headers % PROGRESS_RECORD_INTERVAL == 0 {
                let pct = header as f64 / self.data.len().max(1) as f64 * 100.0;
                self.ctx.report(pct, &format!("Signature scan: {} headers", self.stats.headers));
            }

            if let Some(point) = self.engine.search_window(self.data, header) {
                trace!(
                    "Signature point at {:#x}: {:.6}, {:.6}",
                    point.offset, point.lat_deg, point.lon_deg
                );
                self.stats.points += 1;
                return Some(point);
            }
        }
        if !self.finished {
            self.finished = true;
            info!(
                "Signature scan finished: {} points from {} headers",
                self.stats.points, self.stats.headers
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsd::format::RECORD_HEADER_MAGIC;
    use crate::types::{GeoBox, degrees_to_map_units};

    fn embed(data: &mut [u8], at: usize, lat: f64, lon: f64) {
        data[at..at + 4].copy_from_slice(&degrees_to_map_units(lat).to_le_bytes());
        data[at + 4..at + 8].copy_from_slice(&degrees_to_map_units(lon).to_le_bytes());
    }

    fn points(data: &[u8], config: &ParseConfig) -> Vec<SignaturePoint> {
        let engine = SignatureEngine::new(config);
        let ctx = ScanContext::new();
        engine.iter_points(data, &ctx).collect()
    }

    #[test]
    fn finds_embedded_coordinate_pair() {
        let mut data = vec![0u8; 1024];
        data[100..104].copy_from_slice(&RECORD_HEADER_MAGIC.to_le_bytes());
        embed(&mut data, 100 + 64 + 40, 44.5, -85.0);

        let found = points(&data, &ParseConfig::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].header_offset, 100);
        assert_eq!(found[0].offset, 204);
        assert!((found[0].lat_deg - 44.5).abs() < 1e-6);
        assert!((found[0].lon_deg + 85.0).abs() < 1e-6);
    }

    #[test]
    fn pairs_outside_window_or_box_are_ignored() {
        let mut data = vec![0u8; 2048];
        data[0..4].copy_from_slice(&RECORD_HEADER_MAGIC.to_le_bytes());
        // Before the window opens.
        embed(&mut data, 32, 44.5, -85.0);
        // Past the window end.
        embed(&mut data, 520, 44.5, -85.0);
        // Inside the window, outside the box.
        embed(&mut data, 128, 10.0, -85.0);
        assert!(points(&data, &ParseConfig::default()).is_empty());

        let mut config = ParseConfig::default();
        config.signature.bounds = GeoBox { lat_min: 0.0, lat_max: 20.0, ..GeoBox::default() };
        let found = points(&data, &config);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].offset, 128);
    }

    #[test]
    fn one_point_per_header() {
        let mut data = vec![0u8; 2048];
        for header in [0usize, 600, 1200] {
            data[header..header + 4].copy_from_slice(&RECORD_HEADER_MAGIC.to_le_bytes());
            embed(&mut data, header + 64, 45.0, -80.0);
            embed(&mut data, header + 72, 46.0, -81.0);
        }
        let engine = SignatureEngine::new(&ParseConfig::default());
        let ctx = ScanContext::new();
        let mut iter = engine.iter_points(&data, &ctx);
        let found: Vec<_> = iter.by_ref().collect();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|p| (p.lat_deg - 45.0).abs() < 1e-6));
        assert_eq!(iter.stats().headers, 3);
        assert_eq!(iter.stats().points, 3);
    }

    #[test]
    fn window_clamps_at_end_of_file() {
        let mut data = vec![0u8; 80];
        data[0..4].copy_from_slice(&RECORD_HEADER_MAGIC.to_le_bytes());
        embed(&mut data, 72, 44.5, -85.0);
        assert_eq!(points(&data, &ParseConfig::default()).len(), 1);
        assert!(points(&data[..79], &ParseConfig::default()).is_empty());
    }
}
