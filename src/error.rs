//! Error types for RSD record recovery.
//!
//! Two layers of errors exist, mirroring how failures propagate through the engines:
//!
//! - [`DecodeError`] describes why a single candidate record could not be decoded.
//!   These are always **local**: engines catch them, log the byte offset and resume
//!   scanning. They never escape an engine's record iterator.
//! - [`RsdError`] covers the **fatal** conditions: opening or mapping the input file,
//!   loading configuration, and writing outputs.
//!
//! A strict pass that runs out of time is neither; it is reported through
//! [`crate::orchestrator::StrictOutcome::TimedOut`] so callers can decide on fallback.
//!
//! ## Recovery guidance
//!
//! ```rust
//! use rsdkit::RsdError;
//! use std::path::PathBuf;
//!
//! let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
//! let error = RsdError::file_error(PathBuf::from("/logs/Sonar000.RSD"), io_err);
//! if !error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fallible recovery operations.
pub type Result<T, E = RsdError> = std::result::Result<T, E>;

/// Why one candidate record was rejected.
///
/// Every variant carries the absolute byte offset at which the problem was detected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("varuint at {offset:#x} exceeds 32 bits")]
    VarintOverflow { offset: usize },

    #[error("varuint at {offset:#x} is truncated")]
    VarintTruncated { offset: usize },

    #[error("field count {count} at {offset:#x} outside 0..={max}")]
    FieldCountOutOfRange { offset: usize, count: u32, max: u32 },

    #[error("{needed} bytes at {offset:#x} overrun limit {limit:#x}")]
    BufferOverrun { offset: usize, needed: usize, limit: usize },

    #[error("checksum mismatch at {offset:#x}: computed {computed:#010x}, stored {stored:#010x}")]
    ChecksumMismatch { offset: usize, computed: u32, stored: u32 },

    #[error("trailer mismatch at {offset:#x}: magic {magic:#010x}, chunk size {chunk_size}")]
    TrailerMismatch { offset: usize, magic: u32, chunk_size: u32 },

    #[error("declared body size {size:?} at {offset:#x} is implausible")]
    DeclaredSizeImplausible { offset: usize, size: Option<u32> },

    #[error("header at {offset:#x} echoes magic {found:?}, expected {expected:#010x}")]
    HeaderMagicMismatch { offset: usize, found: Option<u32>, expected: u32 },
}

impl DecodeError {
    /// Stable label used when counting rejections.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::VarintOverflow { .. } => "varint_overflow",
            DecodeError::VarintTruncated { .. } => "varint_truncated",
            DecodeError::FieldCountOutOfRange { .. } => "field_count_out_of_range",
            DecodeError::BufferOverrun { .. } => "buffer_overrun",
            DecodeError::ChecksumMismatch { .. } => "checksum_mismatch",
            DecodeError::TrailerMismatch { .. } => "trailer_mismatch",
            DecodeError::DeclaredSizeImplausible { .. } => "declared_size_implausible",
            DecodeError::HeaderMagicMismatch { .. } => "header_magic_mismatch",
        }
    }

    /// Byte offset at which the failure was detected.
    pub fn offset(&self) -> usize {
        match *self {
            DecodeError::VarintOverflow { offset }
            | DecodeError::VarintTruncated { offset }
            | DecodeError::FieldCountOutOfRange { offset, .. }
            | DecodeError::BufferOverrun { offset, .. }
            | DecodeError::ChecksumMismatch { offset, .. }
            | DecodeError::TrailerMismatch { offset, .. }
            | DecodeError::DeclaredSizeImplausible { offset, .. }
            | DecodeError::HeaderMagicMismatch { offset, .. } => offset,
        }
    }
}

/// Fatal errors surfaced to callers of the engines and the cascade.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RsdError {
    #[error("RSD file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error in {path}: {details}")]
    Config { path: PathBuf, details: String },

    #[error("Failed to write output {path}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV output error")]
    Csv(#[from] csv::Error),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    #[error("Strict worker failed: {reason}")]
    Worker { reason: String },
}

impl RsdError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RsdError::File { source, .. } | RsdError::Output { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            RsdError::Worker { .. } => true,
            RsdError::Config { .. } => false,
            RsdError::Csv(_) => false,
            RsdError::Json(_) => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RsdError::File { .. } => vec![
                "Check file exists and is readable",
                "Copy the log off cloud-synced folders before scanning",
                "Close other applications holding the file open",
            ],
            RsdError::Config { .. } => vec![
                "Validate the configuration file as JSON",
                "Write magic overrides as \"0x...\" strings or integers",
                "Use \"strict\" or \"warn\" for CRC_MODE",
            ],
            RsdError::Output { .. } => vec![
                "Check the output directory is writable",
                "Ensure sufficient disk space",
            ],
            RsdError::Csv(_) | RsdError::Json(_) => vec![
                "Ensure sufficient disk space",
                "Check the output directory is writable",
            ],
            RsdError::Worker { .. } => vec![
                "Retry the scan",
                "Run with a longer timeout or force the heuristic pass",
            ],
        }
    }

    /// Helper constructor for input file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        RsdError::File { path, source }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        RsdError::Config { path: path.into(), details: details.into() }
    }

    /// Helper constructor for output write errors.
    pub fn output_error(path: PathBuf, source: std::io::Error) -> Self {
        RsdError::Output { path, source }
    }

    /// Helper constructor for strict worker failures.
    pub fn worker_failed(reason: impl Into<String>) -> Self {
        RsdError::Worker { reason: reason.into() }
    }
}

impl From<std::io::Error> for RsdError {
    fn from(err: std::io::Error) -> Self {
        RsdError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
