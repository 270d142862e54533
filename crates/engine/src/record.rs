//! Classification records and the shared result store.
//!
//! Every candidate file ends the scan with exactly one `FileRecord` in the
//! `ResultStore`. Records are written once by the orchestrator; the only
//! later mutation is the quarantine separator's path update after a
//! successful move.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::discover::ScanCandidate;

/// Media kind of a candidate file, derived from its extension at discovery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Health classification of a file.
///
/// Starts `Unknown` and is set exactly once by a verifier; never reverted.
/// `Skipped` means the necessary decoder or tool was unavailable; `Error`
/// means the verification routine itself failed unexpectedly, which is
/// distinct from a positive corruption finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Corrupt,
    Suspicious,
    Skipped,
    Error,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Unknown => write!(f, "unknown"),
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Corrupt => write!(f, "corrupt"),
            HealthStatus::Suspicious => write!(f, "suspicious"),
            HealthStatus::Skipped => write!(f, "skipped"),
            HealthStatus::Error => write!(f, "error"),
        }
    }
}

impl HealthStatus {
    /// A terminal status never transitions again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HealthStatus::Unknown)
    }

    /// Whether a file with this status should be relocated by the separator.
    pub fn needs_quarantine(&self, include_suspicious: bool) -> bool {
        match self {
            HealthStatus::Corrupt => true,
            HealthStatus::Suspicious => include_suspicious,
            _ => false,
        }
    }
}

/// Outcome of a single verification: the classification plus a
/// human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: HealthStatus,
    pub details: String,
}

impl Verdict {
    pub fn new(status: HealthStatus, details: impl Into<String>) -> Self {
        Self {
            status,
            details: details.into(),
        }
    }

    pub fn healthy(details: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, details)
    }

    pub fn corrupt(details: impl Into<String>) -> Self {
        Self::new(HealthStatus::Corrupt, details)
    }

    pub fn suspicious(details: impl Into<String>) -> Self {
        Self::new(HealthStatus::Suspicious, details)
    }

    pub fn skipped(details: impl Into<String>) -> Self {
        Self::new(HealthStatus::Skipped, details)
    }
}

/// Classification record for one discovered candidate file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    /// Current absolute path; updated by the separator after a successful move.
    pub path: PathBuf,
    /// File name component of `path`.
    pub name: String,
    /// Size in bytes at discovery time.
    pub size: u64,
    /// Image or video, from the extension at discovery.
    pub kind: MediaKind,
    /// Terminal classification.
    pub status: HealthStatus,
    /// Human-readable reason for the classification.
    pub details: String,
    /// Wall-clock duration of the verification in seconds.
    pub check_duration_secs: f64,
    /// Populated only for `Error` status.
    pub error_message: Option<String>,
}

impl FileRecord {
    /// Builds a record from a completed verification.
    pub fn classified(candidate: &ScanCandidate, verdict: Verdict, duration_secs: f64) -> Self {
        Self {
            path: candidate.path.clone(),
            name: candidate.name.clone(),
            size: candidate.size,
            kind: candidate.kind,
            status: verdict.status,
            details: verdict.details,
            check_duration_secs: duration_secs,
            error_message: None,
        }
    }

    /// Builds a record for a verification task that failed unexpectedly.
    pub fn errored(candidate: &ScanCandidate, duration_secs: f64, message: String) -> Self {
        Self {
            path: candidate.path.clone(),
            name: candidate.name.clone(),
            size: candidate.size,
            kind: candidate.kind,
            status: HealthStatus::Error,
            details: "verification task failed unexpectedly".to_string(),
            check_duration_secs: duration_secs,
            error_message: Some(message),
        }
    }
}

/// Per-status record counts for reports and checkpoint summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub healthy: usize,
    pub corrupt: usize,
    pub suspicious: usize,
    pub skipped: usize,
    pub error: usize,
}

impl StatusCounts {
    fn tally(&mut self, status: HealthStatus) {
        self.total += 1;
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Corrupt => self.corrupt += 1,
            HealthStatus::Suspicious => self.suspicious += 1,
            HealthStatus::Skipped => self.skipped += 1,
            HealthStatus::Error => self.error += 1,
            HealthStatus::Unknown => {}
        }
    }
}

/// Shared, append-only registry of classification records keyed by path.
///
/// A single mutex guards the map; verification tasks never touch it
/// directly, completions are appended by the orchestrator's sink loop.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    inner: Arc<Mutex<BTreeMap<PathBuf, FileRecord>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed record. Each candidate is inserted exactly once.
    pub fn insert(&self, record: FileRecord) {
        let mut map = self.inner.lock().expect("result store lock poisoned");
        map.insert(record.path.clone(), record);
    }

    /// Looks up a record by its current path.
    pub fn get(&self, path: &Path) -> Option<FileRecord> {
        let map = self.inner.lock().expect("result store lock poisoned");
        map.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        let map = self.inner.lock().expect("result store lock poisoned");
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cloned snapshot of all records, for checkpoints, reports and separation.
    pub fn snapshot(&self) -> Vec<FileRecord> {
        let map = self.inner.lock().expect("result store lock poisoned");
        map.values().cloned().collect()
    }

    /// Per-status counts over the current contents.
    pub fn counts(&self) -> StatusCounts {
        let map = self.inner.lock().expect("result store lock poisoned");
        let mut counts = StatusCounts::default();
        for record in map.values() {
            counts.tally(record.status);
        }
        counts
    }

    /// Re-keys a record after the separator moved the file.
    ///
    /// Returns false when no record exists under `old_path`.
    pub fn update_path(&self, old_path: &Path, new_path: &Path) -> bool {
        let mut map = self.inner.lock().expect("result store lock poisoned");
        match map.remove(old_path) {
            Some(mut record) => {
                record.path = new_path.to_path_buf();
                if let Some(name) = new_path.file_name().and_then(|n| n.to_str()) {
                    record.name = name.to_string();
                }
                map.insert(record.path.clone(), record);
                true
            }
            None => false,
        }
    }
}
