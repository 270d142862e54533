//! Candidate discovery for the media triage scanner.
//!
//! Recursively walks the scan root and collects files that pass the
//! extension and size filters. Files outside the filters are excluded
//! from the candidate set entirely; they are never classified.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use mediatriage_config::{normalize_extension, FilesConfig};

use crate::record::MediaKind;

/// Error type for candidate discovery. A missing root is fatal and aborts
/// the scan before any verification runs.
#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("scan root does not exist or is not a directory: {0}")]
    RootNotFound(PathBuf),
}

/// A file that passed the extension and size filters and is eligible for
/// corruption classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCandidate {
    /// Full path to the file.
    pub path: PathBuf,
    /// File name component of `path`.
    pub name: String,
    /// File size in bytes at discovery time.
    pub size: u64,
    /// Media kind derived from the extension.
    pub kind: MediaKind,
}

/// Normalized extension sets used to classify candidates.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    images: BTreeSet<String>,
    videos: BTreeSet<String>,
}

impl ExtensionFilter {
    pub fn from_config(files: &FilesConfig) -> Self {
        Self {
            images: files.image_extension_set(),
            videos: files.video_extension_set(),
        }
    }

    /// Classifies a path by its extension. Image extensions win over video
    /// extensions if an extension is listed in both sets.
    pub fn classify(&self, path: &Path) -> Option<MediaKind> {
        let ext = extension_key(path)?;
        if self.images.contains(&ext) {
            Some(MediaKind::Image)
        } else if self.videos.contains(&ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// Lowercase dotted extension of a path (`".jpg"`), if it has one.
pub fn extension_key(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
}

/// Recursively enumerates candidate files under `root`.
///
/// Walk errors on individual entries (permission problems, races with
/// concurrent deletion) skip that entry; only a missing root is fatal.
pub fn discover_candidates(
    root: &Path,
    filter: &ExtensionFilter,
    min_size_bytes: u64,
    max_size_bytes: u64,
) -> Result<Vec<ScanCandidate>, DiscoverError> {
    if !root.is_dir() {
        return Err(DiscoverError::RootNotFound(root.to_path_buf()));
    }

    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let kind = match filter.classify(path) {
            Some(kind) => kind,
            None => continue,
        };

        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(_) => continue,
        };

        if size < min_size_bytes || size > max_size_bytes {
            debug!(path = %path.display(), size, "excluded by size filter");
            continue;
        }

        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        candidates.push(ScanCandidate {
            path: path.to_path_buf(),
            name,
            size,
            kind,
        });
    }

    Ok(candidates)
}
