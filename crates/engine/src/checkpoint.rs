//! Incremental checkpoint snapshots of scan results.
//!
//! Long scans persist their results periodically so an interrupted run
//! leaves behind the classification of everything it had finished. Each
//! snapshot is written to a temporary file and renamed into place, so a
//! checkpoint on disk is always complete valid JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::record::{FileRecord, ResultStore, StatusCounts};

/// Error type for checkpoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialized checkpoint contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointSnapshot {
    /// Wall-clock write time, milliseconds since the Unix epoch.
    pub written_at_ms: u64,
    /// Per-status summary of the records below.
    pub totals: StatusCounts,
    /// Every completed record at the time of the snapshot.
    pub files: Vec<FileRecord>,
}

/// Writes checkpoint files with monotonically increasing sequence numbers.
#[derive(Debug)]
pub struct CheckpointWriter {
    output_dir: PathBuf,
    sequence: u64,
}

impl CheckpointWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            sequence: 0,
        }
    }

    /// Snapshots the store to a new checkpoint file and returns its path.
    pub fn write(&mut self, store: &ResultStore) -> Result<PathBuf, CheckpointError> {
        fs::create_dir_all(&self.output_dir)?;

        self.sequence += 1;
        let path = self.output_dir.join(format!(
            "scan_checkpoint_{}_{:04}.json",
            epoch_seconds(),
            self.sequence
        ));

        let snapshot = CheckpointSnapshot {
            written_at_ms: epoch_millis(),
            totals: store.counts(),
            files: store.snapshot(),
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, json)?;
        fs::rename(&temp, &path)?;

        Ok(path)
    }
}

/// Reads a checkpoint file back, for resuming tooling and tests.
pub fn read_snapshot(path: &Path) -> Result<CheckpointSnapshot, CheckpointError> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
