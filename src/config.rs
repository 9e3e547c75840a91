//! Parser configuration.
//!
//! Rules files are JSON and every key is optional:
//!
//! ```json
//! {
//!   "pad_skip": true,
//!   "scan_step": 1,
//!   "magic": { "record_header": "0xB7E9DA86", "record_trailer": "0xF98EACBC" },
//!   "CRC_MODE": "warn",
//!   "heuristics": { "pad_skip": false, "scan_step": 2 },
//!   "max_records": 100000,
//!   "signature": { "lat_min": 30.0, "lat_max": 60.0, "window_start": 64, "window_len": 448 }
//! }
//! ```
//!
//! Values inside `heuristics` override their top-level counterparts. Magic values
//! may be integers, decimal strings or `0x`-prefixed hex strings.
//!
//! ## Usage Example
//!
//! ```rust
//! use rsdkit::{CrcMode, ParseConfig};
//!
//! let config = ParseConfig::from_json_str(r#"{"CRC_MODE": "warn", "scan_step": 4}"#)?;
//! assert_eq!(config.crc_mode, CrcMode::Warn);
//! assert_eq!(config.scan_step, 4);
//! assert!(config.pad_skip);
//! # Ok::<(), rsdkit::RsdError>(())
//! ```

use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::rsd::format::{RECORD_HEADER_MAGIC, RECORD_TRAILER_MAGIC};
use crate::types::{CrcMode, GeoBox};
use crate::{Result, RsdError};

/// Settings shared by the engines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct ParseConfig {
    /// Skip `A1 B2` / `B2 A1` padding pairs after each record.
    pub pad_skip: bool,
    /// Header candidates must sit at `start + k * scan_step`. Always at least 1.
    pub scan_step: usize,
    pub header_magic: u32,
    pub trailer_magic: u32,
    /// CRC policy of the classic engine.
    pub crc_mode: CrcMode,
    /// Stop after this many records.
    pub max_records: Option<usize>,
    pub signature: SignatureConfig,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            pad_skip: true,
            scan_step: 1,
            header_magic: RECORD_HEADER_MAGIC,
            trailer_magic: RECORD_TRAILER_MAGIC,
            crc_mode: CrcMode::Strict,
            max_records: None,
            signature: SignatureConfig::default(),
        }
    }
}

impl ParseConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RsdError::config_error("<inline>", e.to_string()))
    }

    /// Read a rules file. Unreadable or invalid files are configuration errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RsdError::config_error(path, e.to_string()))?;
        let config: Self =
            serde_json::from_str(&text).map_err(|e| RsdError::config_error(path, e.to_string()))?;
        debug!("Loaded parser configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }
}

/// Heuristic coordinate search settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    #[serde(flatten)]
    pub bounds: GeoBox,
    /// Distance past the header magic at which the search window opens.
    pub window_start: usize,
    pub window_len: usize,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self { bounds: GeoBox::default(), window_start: 64, window_len: 448 }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    pad_skip: Option<bool>,
    scan_step: Option<usize>,
    magic: RawMagic,
    #[serde(rename = "CRC_MODE", alias = "crc_mode")]
    crc_mode: Option<CrcMode>,
    heuristics: Option<RawHeuristics>,
    max_records: Option<usize>,
    signature: SignatureConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMagic {
    record_header: Option<MagicValue>,
    record_trailer: Option<MagicValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHeuristics {
    pad_skip: Option<bool>,
    scan_step: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MagicValue {
    Int(u64),
    Text(String),
}

impl MagicValue {
    fn resolve(&self) -> std::result::Result<u32, String> {
        let wide = match self {
            MagicValue::Int(value) => *value,
            MagicValue::Text(text) => {
                let text = text.trim();
                let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => text.parse::<u64>(),
                };
                parsed.map_err(|e| format!("invalid magic '{}': {}", text, e))?
            }
        };
        u32::try_from(wide).map_err(|_| format!("magic {:#x} does not fit in 32 bits", wide))
    }
}

impl TryFrom<RawConfig> for ParseConfig {
    type Error = String;

    fn try_from(raw: RawConfig) -> std::result::Result<Self, Self::Error> {
        let defaults = ParseConfig::default();
        let heuristics = raw.heuristics.unwrap_or_default();

        let pad_skip = heuristics.pad_skip.or(raw.pad_skip).unwrap_or(defaults.pad_skip);
        let scan_step =
            heuristics.scan_step.or(raw.scan_step).unwrap_or(defaults.scan_step).max(1);
        let header_magic = match &raw.magic.record_header {
            Some(value) => value.resolve()?,
            None => defaults.header_magic,
        };
        let trailer_magic = match &raw.magic.record_trailer {
            Some(value) => value.resolve()?,
            None => defaults.trailer_magic,
        };

        Ok(Self {
            pad_skip,
            scan_step,
            header_magic,
            trailer_magic,
            crc_mode: raw.crc_mode.unwrap_or(defaults.crc_mode),
            max_records: raw.max_records,
            signature: raw.signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsd::format::RECORD_TRAILER_MAGIC_ALT;
    use std::io::Write;

    #[test]
    fn empty_object_gives_defaults() -> anyhow::Result<()> {
        let config = ParseConfig::from_json_str("{}")?;
        assert_eq!(config, ParseConfig::default());
        assert!(config.pad_skip);
        assert_eq!(config.scan_step, 1);
        assert_eq!(config.header_magic, 0xB7E9_DA86);
        assert_eq!(config.trailer_magic, 0xD926_4B7C);
        assert_eq!(config.crc_mode, CrcMode::Strict);
        assert_eq!(config.signature.window_start, 64);
        assert_eq!(config.signature.window_len, 448);
        Ok(())
    }

    #[test]
    fn magic_accepts_hex_decimal_and_integers() -> anyhow::Result<()> {
        let hex = ParseConfig::from_json_str(r#"{"magic": {"record_trailer": "0xF98EACBC"}}"#)?;
        assert_eq!(hex.trailer_magic, RECORD_TRAILER_MAGIC_ALT);

        let int = ParseConfig::from_json_str(r#"{"magic": {"record_trailer": 4186876092}}"#)?;
        assert_eq!(int.trailer_magic, RECORD_TRAILER_MAGIC_ALT);

        let text = ParseConfig::from_json_str(r#"{"magic": {"record_header": "3085556358"}}"#)?;
        assert_eq!(text.header_magic, RECORD_HEADER_MAGIC);
        Ok(())
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for json in [
            r#"{"magic": {"record_header": "0xZZ"}}"#,
            r#"{"magic": {"record_header": 4294967296}}"#,
            r#"{"CRC_MODE": "lenient"}"#,
            r#"{"scan_step": -1}"#,
            "not json",
        ] {
            match ParseConfig::from_json_str(json) {
                Err(RsdError::Config { details, .. }) => assert!(!details.is_empty()),
                other => panic!("{json}: expected Config error, got {:?}", other),
            }
        }
    }

    #[test]
    fn heuristics_block_overrides_top_level() -> anyhow::Result<()> {
        let config = ParseConfig::from_json_str(
            r#"{"pad_skip": true, "scan_step": 2, "heuristics": {"pad_skip": false}}"#,
        )?;
        assert!(!config.pad_skip);
        assert_eq!(config.scan_step, 2);

        let config = ParseConfig::from_json_str(r#"{"heuristics": {"scan_step": 0}}"#)?;
        assert_eq!(config.scan_step, 1);
        Ok(())
    }

    #[test]
    fn crc_mode_and_signature_box() -> anyhow::Result<()> {
        let config = ParseConfig::from_json_str(
            r#"{"CRC_MODE": "WARN", "signature": {"lat_min": 40.0, "window_len": 128}}"#,
        )?;
        assert_eq!(config.crc_mode, CrcMode::Warn);
        assert_eq!(config.signature.bounds.lat_min, 40.0);
        assert_eq!(config.signature.bounds.lat_max, 60.0);
        assert_eq!(config.signature.window_len, 128);
        assert_eq!(config.signature.window_start, 64);
        Ok(())
    }

    #[test]
    fn load_reads_rules_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, r#"{{"max_records": 25, "pad_skip": false}}"#)?;
        let config = ParseConfig::load(file.path())?;
        assert_eq!(config.max_records, Some(25));
        assert!(!config.pad_skip);

        match ParseConfig::load("/no/such/rules.json") {
            Err(RsdError::Config { path, .. }) => assert!(path.ends_with("rules.json")),
            other => panic!("Expected Config error, got {:?}", other),
        }
        Ok(())
    }
}
