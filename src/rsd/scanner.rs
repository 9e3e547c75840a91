//! Chunked magic-marker search.
//!
//! Large logs are searched in fixed-size chunks so progress can be reported and
//! cancellation honoured between chunks. Consecutive chunk windows overlap by
//! three bytes, so a marker straddling a chunk boundary is still found.
//!
//! ## Usage Example
//!
//! ```rust
//! use rsdkit::ScanContext;
//! use rsdkit::rsd::MagicScanner;
//!
//! let data = [0u8, 0x86, 0xDA, 0xE9, 0xB7, 0];
//! let scanner = MagicScanner::new();
//! let ctx = ScanContext::new();
//! assert_eq!(scanner.find(&data, 0xB7E9_DA86, 0, data.len(), &ctx), Some(1));
//! ```

use memchr::memmem;
use tracing::debug;

use crate::context::ScanContext;

/// Default search chunk: 32 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024 * 1024;

const MAGIC_LEN: usize = 4;

/// Finds little-endian u32 markers in a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicScanner {
    chunk_size: usize,
    step: usize,
}

impl Default for MagicScanner {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, step: 1 }
    }
}

impl MagicScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the chunk size. Values below the marker length are raised to it.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(MAGIC_LEN);
        self
    }

    /// Only consider offsets `start + k * step`. A step of zero is treated as one.
    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step.max(1);
        self
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Lowest offset in `[start, end)` at which the four bytes of `magic` begin
    /// and end within `end`, or `None`.
    ///
    /// Returns `None` early if `ctx` is cancelled at a chunk boundary.
    pub fn find(
        &self,
        data: &[u8],
        magic: u32,
        start: usize,
        end: usize,
        ctx: &ScanContext,
    ) -> Option<usize> {
        let end = end.min(data.len());
        if start >= end || end - start < MAGIC_LEN {
            return None;
        }
        let pattern = magic.to_le_bytes();
        let finder = memmem::Finder::new(&pattern);
        let total = end - start;

        if total <= self.chunk_size {
            return self.find_in(data, &finder, start, end, start);
        }

        let mut chunk_start = start;
        while chunk_start < end {
            if ctx.is_cancelled() {
                debug!("Marker search cancelled at {:#x}", chunk_start);
                return None;
            }
            let chunk_end = chunk_start.saturating_add(self.chunk_size).min(end);
            // A match found here must begin before chunk_end: starting at
            // chunk_end would need four bytes inside a three-byte overhang.
            let window_end = chunk_end.saturating_add(MAGIC_LEN - 1).min(end);
            let found = self.find_in(data, &finder, chunk_start, window_end, start);

            let done = chunk_end - start;
            ctx.report(
                done as f64 / total as f64 * 100.0,
                &format!("Scanning... {} / {} MiB", done >> 20, total >> 20),
            );

            if found.is_some() {
                return found;
            }
            chunk_start = chunk_end;
        }
        None
    }

    /// Every occurrence of `magic` in `data`, in ascending order.
    pub fn find_all(&self, data: &[u8], magic: u32, ctx: &ScanContext) -> Vec<usize> {
        let mut found = Vec::new();
        let mut pos = 0;
        while let Some(hit) = self.find(data, magic, pos, data.len(), ctx) {
            found.push(hit);
            pos = hit + self.step;
        }
        found
    }

    fn find_in(
        &self,
        data: &[u8],
        finder: &memmem::Finder<'_>,
        from: usize,
        to: usize,
        origin: usize,
    ) -> Option<usize> {
        if to < from.saturating_add(MAGIC_LEN) {
            return None;
        }
        if self.step == 1 {
            return finder.find(&data[from..to]).map(|i| from + i);
        }

        let pattern = finder.needle();
        let misalign = (from - origin) % self.step;
        let mut pos = if misalign == 0 { from } else { from + (self.step - misalign) };
        while pos + MAGIC_LEN <= to {
            if &data[pos..pos + MAGIC_LEN] == pattern {
                return Some(pos);
            }
            pos += self.step;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsd::format::RECORD_HEADER_MAGIC;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn with_marker_at(len: usize, at: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[at..at + 4].copy_from_slice(&RECORD_HEADER_MAGIC.to_le_bytes());
        data
    }

    #[test]
    fn finds_first_marker() {
        let mut data = with_marker_at(64, 10);
        data[40..44].copy_from_slice(&RECORD_HEADER_MAGIC.to_le_bytes());
        let ctx = ScanContext::new();
        let scanner = MagicScanner::new();

        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 0, 64, &ctx), Some(10));
        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 11, 64, &ctx), Some(40));
        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 41, 64, &ctx), None);
        assert_eq!(scanner.find_all(&data, RECORD_HEADER_MAGIC, &ctx), vec![10, 40]);
    }

    #[test]
    fn marker_must_end_before_end() {
        let data = with_marker_at(32, 20);
        let ctx = ScanContext::new();
        let scanner = MagicScanner::new();
        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 0, 23, &ctx), None);
        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 0, 24, &ctx), Some(20));
        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 30, 10, &ctx), None);
        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 0, 10_000, &ctx), Some(20));
    }

    #[test]
    fn finds_marker_straddling_chunk_boundary() {
        let ctx = ScanContext::new();
        let scanner = MagicScanner::new().with_chunk_size(16);
        for at in 13..=16 {
            let data = with_marker_at(64, at);
            assert_eq!(
                scanner.find(&data, RECORD_HEADER_MAGIC, 0, data.len(), &ctx),
                Some(at),
                "marker at {at}"
            );
        }
    }

    #[test]
    fn step_restricts_candidates() {
        let data = with_marker_at(64, 13);
        let ctx = ScanContext::new();
        let scanner = MagicScanner::new().with_step(4);
        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 0, 64, &ctx), None);
        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 1, 64, &ctx), Some(13));
        let chunked = scanner.with_chunk_size(8);
        assert_eq!(chunked.find(&data, RECORD_HEADER_MAGIC, 1, 64, &ctx), Some(13));
    }

    #[test]
    fn reports_progress_per_chunk() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ctx = ScanContext::new().with_progress(move |pct, _msg| {
            sink.lock().unwrap().push(pct);
        });
        let data = vec![0u8; 64];
        let scanner = MagicScanner::new().with_chunk_size(16);
        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 0, 64, &ctx), None);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn cancellation_stops_search() {
        let data = with_marker_at(64, 60);
        let ctx = ScanContext::new();
        ctx.cancel();
        let scanner = MagicScanner::new().with_chunk_size(16);
        assert_eq!(scanner.find(&data, RECORD_HEADER_MAGIC, 0, 64, &ctx), None);
    }

    proptest! {
        #[test]
        fn chunked_search_matches_single_pass(
            at in 0usize..252,
            chunk in 4usize..64,
            start in 0usize..256,
        ) {
            let data = with_marker_at(256, at);
            let ctx = ScanContext::new();
            let whole = MagicScanner::new().find(&data, RECORD_HEADER_MAGIC, start, 256, &ctx);
            let chunked = MagicScanner::new()
                .with_chunk_size(chunk)
                .find(&data, RECORD_HEADER_MAGIC, start, 256, &ctx);
            prop_assert_eq!(whole, chunked);
            prop_assert_eq!(whole, (at >= start).then_some(at));
        }

        #[test]
        fn find_all_matches_bytewise_search(
            mut data in proptest::collection::vec(any::<u8>(), 0..512),
            markers in proptest::collection::vec(0usize..508, 0..6),
            chunk in 4usize..96,
        ) {
            for at in markers {
                if at + 4 <= data.len() {
                    data[at..at + 4].copy_from_slice(&RECORD_HEADER_MAGIC.to_le_bytes());
                }
            }
            let pattern = RECORD_HEADER_MAGIC.to_le_bytes();
            let expected: Vec<usize> = (0..data.len().saturating_sub(3))
                .filter(|&pos| data[pos..pos + 4] == pattern)
                .collect();
            let ctx = ScanContext::new();
            let scanner = MagicScanner::new().with_chunk_size(chunk);
            prop_assert_eq!(scanner.find_all(&data, RECORD_HEADER_MAGIC, &ctx), expected);
        }
    }
}
