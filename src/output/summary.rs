//! Run summary JSON

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::engine::signature::SignatureStats;
use crate::engine::{EngineKind, EngineStats};
use crate::{Result, RsdError};

/// How the strict pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrictStatus {
    Completed,
    Cancelled,
    TimedOut,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrictSummary {
    pub engine: EngineKind,
    pub status: StrictStatus,
    /// Structured rows, summed over every channel class.
    pub rows: u64,
    pub elapsed_ms: u64,
    pub csv: Option<PathBuf>,
    pub stats: Option<EngineStats>,
    /// The watchdog gave up on a worker that was still running.
    #[serde(default)]
    pub worker_abandoned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicSummary {
    pub points: u64,
    pub csv: PathBuf,
    pub stats: SignatureStats,
}

/// Everything a caller needs to locate and judge the outputs of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub input: PathBuf,
    /// Effective yield: the larger of the strict rows and heuristic points.
    pub rows_total: u64,
    pub strict_summary: StrictSummary,
    pub heuristic: Option<HeuristicSummary>,
}

impl RecoverySummary {
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| RsdError::output_error(path.to_path_buf(), e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(|e| RsdError::output_error(path.to_path_buf(), e))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RsdError::file_error(path.to_path_buf(), e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_has_stable_keys() -> anyhow::Result<()> {
        let summary = RecoverySummary {
            input: PathBuf::from("Sonar000.RSD"),
            rows_total: 12,
            strict_summary: StrictSummary {
                engine: EngineKind::Classic,
                status: StrictStatus::TimedOut,
                rows: 0,
                elapsed_ms: 90_000,
                csv: None,
                stats: None,
                worker_abandoned: true,
            },
            heuristic: Some(HeuristicSummary {
                points: 12,
                csv: PathBuf::from("Sonar000_signature.csv"),
                stats: SignatureStats { headers: 40, points: 12, cancelled: false },
            }),
        };

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Sonar000_summary.json");
        summary.write(&path)?;

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(value["rows_total"], 12);
        assert_eq!(value["strict_summary"]["status"], "timed_out");
        assert_eq!(value["strict_summary"]["engine"], "classic");
        assert_eq!(value["strict_summary"]["worker_abandoned"], true);
        assert_eq!(value["heuristic"]["points"], 12);
        assert_eq!(RecoverySummary::load(&path)?, summary);
        Ok(())
    }
}
