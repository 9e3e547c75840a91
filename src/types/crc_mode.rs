//! Checksum policy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a varstruct decoder does when the stored CRC disagrees with the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum CrcMode {
    /// Reject the varstruct.
    #[default]
    Strict,
    /// Log the mismatch and keep the decoded fields.
    Warn,
}

impl CrcMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrcMode::Strict => "strict",
            CrcMode::Warn => "warn",
        }
    }
}

impl fmt::Display for CrcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrcMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(CrcMode::Strict),
            "warn" => Ok(CrcMode::Warn),
            other => Err(format!("unknown CRC mode '{}' (expected strict or warn)", other)),
        }
    }
}

impl TryFrom<String> for CrcMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
