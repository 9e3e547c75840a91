//! RSD file access (cross-platform)
//!
//! This module provides the on-disk layout of Garmin RSD sonar logs, a read-only
//! byte source over the file, and the chunked magic scanner the engines use to
//! find record boundaries.

pub mod format;
pub mod scanner;
pub mod source;

pub use format::{BodyLayout, RecordHeader, Trailer};
pub use scanner::MagicScanner;
pub use source::RsdSource;
