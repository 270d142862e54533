//! Moves damaged files out of the library into a quarantine tree.
//!
//! Relative paths under the scan root are preserved inside the quarantine
//! so a file can be traced back to where it lived. Moves never overwrite:
//! a name collision gets a numeric suffix instead. A single failed move is
//! recorded and the separation continues.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::record::{FileRecord, MediaKind, ResultStore};

/// Error type for quarantine separation. Only failures that prevent the
/// separation from running at all are fatal; per-file failures accumulate
/// in the report instead.
#[derive(Debug, Error)]
pub enum SeparateError {
    #[error("cannot create quarantine directory {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Options controlling which records move and how the tree is laid out.
#[derive(Debug, Clone)]
pub struct SeparateOptions {
    /// Move suspicious files too, not just corrupt ones.
    pub include_suspicious: bool,
    /// Split the quarantine into `images/` and `videos/` subtrees.
    pub create_subfolders: bool,
}

/// One file that could not be moved.
#[derive(Debug)]
pub struct MoveFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a separation pass.
#[derive(Debug, Default)]
pub struct SeparationReport {
    /// Number of files successfully moved.
    pub moved: usize,
    /// Files that should have moved but could not.
    pub failures: Vec<MoveFailure>,
}

/// Moves every quarantine-eligible record's file under `quarantine_root`.
///
/// Successfully moved files are re-keyed in the store under their new
/// path. Files already gone from disk count as failures, not panics.
pub fn separate(
    store: &ResultStore,
    scan_root: &Path,
    quarantine_root: &Path,
    options: &SeparateOptions,
) -> Result<SeparationReport, SeparateError> {
    fs::create_dir_all(quarantine_root).map_err(|source| SeparateError::CreateRoot {
        path: quarantine_root.to_path_buf(),
        source,
    })?;

    let mut report = SeparationReport::default();

    for record in store.snapshot() {
        if !record.status.needs_quarantine(options.include_suspicious) {
            continue;
        }

        let destination = destination_for(&record, scan_root, quarantine_root, options);
        match move_file(&record.path, &destination) {
            Ok(final_path) => {
                info!(
                    from = %record.path.display(),
                    to = %final_path.display(),
                    status = %record.status,
                    "quarantined file"
                );
                store.update_path(&record.path, &final_path);
                report.moved += 1;
            }
            Err(err) => {
                warn!(
                    path = %record.path.display(),
                    error = %err,
                    "failed to quarantine file"
                );
                report.failures.push(MoveFailure {
                    path: record.path.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    Ok(report)
}

/// Computes where a record's file belongs inside the quarantine tree.
fn destination_for(
    record: &FileRecord,
    scan_root: &Path,
    quarantine_root: &Path,
    options: &SeparateOptions,
) -> PathBuf {
    let mut base = quarantine_root.to_path_buf();
    if options.create_subfolders {
        base = base.join(match record.kind {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
        });
    }

    // Files outside the scan root keep only their name.
    match record.path.strip_prefix(scan_root) {
        Ok(relative) => base.join(relative),
        Err(_) => base.join(&record.name),
    }
}

/// Moves `source` to `wanted`, resolving collisions and crossing
/// filesystems when a plain rename is not possible.
fn move_file(source: &Path, wanted: &Path) -> std::io::Result<PathBuf> {
    if let Some(parent) = wanted.parent() {
        fs::create_dir_all(parent)?;
    }

    let destination = unique_destination(wanted)?;

    match fs::rename(source, &destination) {
        Ok(()) => Ok(destination),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            fs::copy(source, &destination)?;
            fs::remove_file(source)?;
            Ok(destination)
        }
        Err(err) => Err(err),
    }
}

/// Returns `wanted` if free, otherwise the first `stem_N.ext` that is.
fn unique_destination(wanted: &Path) -> std::io::Result<PathBuf> {
    if !wanted.exists() {
        return Ok(wanted.to_path_buf());
    }

    let stem = wanted
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let extension = wanted.extension().and_then(|e| e.to_str());

    for n in 1..10_000u32 {
        let name = match extension {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = wanted.with_file_name(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free quarantine name for {}", wanted.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::ScanCandidate;
    use crate::record::Verdict;
    use tempfile::TempDir;

    fn options() -> SeparateOptions {
        SeparateOptions {
            include_suspicious: true,
            create_subfolders: true,
        }
    }

    fn add_record(
        store: &ResultStore,
        path: &Path,
        kind: MediaKind,
        verdict: Verdict,
        contents: &[u8],
    ) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
        let candidate = ScanCandidate {
            path: path.to_path_buf(),
            name: path.file_name().unwrap().to_str().unwrap().to_string(),
            size: contents.len() as u64,
            kind,
        };
        store.insert(FileRecord::classified(&candidate, verdict, 0.1));
    }

    #[test]
    fn test_preserves_relative_structure() {
        let library = TempDir::new().unwrap();
        let quarantine = TempDir::new().unwrap();
        let store = ResultStore::new();

        let source = library.path().join("albums").join("2024").join("bad.jpg");
        add_record(
            &store,
            &source,
            MediaKind::Image,
            Verdict::corrupt("broken"),
            b"payload",
        );

        let report = separate(&store, library.path(), quarantine.path(), &options()).unwrap();
        assert_eq!(report.moved, 1);
        assert!(report.failures.is_empty());

        let expected = quarantine
            .path()
            .join("images")
            .join("albums")
            .join("2024")
            .join("bad.jpg");
        assert!(expected.exists());
        assert!(!source.exists());
        assert_eq!(fs::read(&expected).unwrap(), b"payload");
    }

    #[test]
    fn test_videos_go_to_their_subfolder() {
        let library = TempDir::new().unwrap();
        let quarantine = TempDir::new().unwrap();
        let store = ResultStore::new();

        let source = library.path().join("bad.mp4");
        add_record(
            &store,
            &source,
            MediaKind::Video,
            Verdict::corrupt("broken"),
            b"vv",
        );

        separate(&store, library.path(), quarantine.path(), &options()).unwrap();
        assert!(quarantine.path().join("videos").join("bad.mp4").exists());
    }

    #[test]
    fn test_flat_layout_without_subfolders() {
        let library = TempDir::new().unwrap();
        let quarantine = TempDir::new().unwrap();
        let store = ResultStore::new();

        let source = library.path().join("bad.jpg");
        add_record(
            &store,
            &source,
            MediaKind::Image,
            Verdict::corrupt("broken"),
            b"x",
        );

        let opts = SeparateOptions {
            include_suspicious: true,
            create_subfolders: false,
        };
        separate(&store, library.path(), quarantine.path(), &opts).unwrap();
        assert!(quarantine.path().join("bad.jpg").exists());
    }

    #[test]
    fn test_healthy_and_skipped_stay_in_place() {
        let library = TempDir::new().unwrap();
        let quarantine = TempDir::new().unwrap();
        let store = ResultStore::new();

        let healthy = library.path().join("fine.jpg");
        add_record(
            &store,
            &healthy,
            MediaKind::Image,
            Verdict::healthy("ok"),
            b"a",
        );
        let skipped = library.path().join("clip.mp4");
        add_record(
            &store,
            &skipped,
            MediaKind::Video,
            Verdict::skipped("no tools"),
            b"b",
        );

        let report = separate(&store, library.path(), quarantine.path(), &options()).unwrap();
        assert_eq!(report.moved, 0);
        assert!(healthy.exists());
        assert!(skipped.exists());
    }

    #[test]
    fn test_suspicious_respects_option() {
        let library = TempDir::new().unwrap();
        let quarantine = TempDir::new().unwrap();
        let store = ResultStore::new();

        let source = library.path().join("odd.jpg");
        add_record(
            &store,
            &source,
            MediaKind::Image,
            Verdict::suspicious("maybe"),
            b"s",
        );

        let keep = SeparateOptions {
            include_suspicious: false,
            create_subfolders: true,
        };
        let report = separate(&store, library.path(), quarantine.path(), &keep).unwrap();
        assert_eq!(report.moved, 0);
        assert!(source.exists());

        let report = separate(&store, library.path(), quarantine.path(), &options()).unwrap();
        assert_eq!(report.moved, 1);
        assert!(!source.exists());
    }

    #[test]
    fn test_collision_gets_numeric_suffix() {
        let library = TempDir::new().unwrap();
        let quarantine = TempDir::new().unwrap();
        let store = ResultStore::new();

        // Two same-named files from different directories collide when
        // quarantined under the same destination name.
        let first = library.path().join("a").join("dup.jpg");
        let second = library.path().join("b").join("dup.jpg");
        add_record(
            &store,
            &first,
            MediaKind::Image,
            Verdict::corrupt("x"),
            b"first",
        );
        add_record(
            &store,
            &second,
            MediaKind::Image,
            Verdict::corrupt("y"),
            b"second",
        );

        // Pre-place colliding destinations by separating outside the root
        // so both fall back to basename handling.
        let report = separate(&store, Path::new("/elsewhere"), quarantine.path(), &options())
            .unwrap();
        assert_eq!(report.moved, 2);

        let images = quarantine.path().join("images");
        let original = images.join("dup.jpg");
        let suffixed = images.join("dup_1.jpg");
        assert!(original.exists());
        assert!(suffixed.exists());

        // Both payloads survive intact under distinct names.
        let mut contents = vec![
            fs::read(&original).unwrap(),
            fs::read(&suffixed).unwrap(),
        ];
        contents.sort();
        assert_eq!(contents, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn test_store_rekeyed_after_move() {
        let library = TempDir::new().unwrap();
        let quarantine = TempDir::new().unwrap();
        let store = ResultStore::new();

        let source = library.path().join("bad.jpg");
        add_record(
            &store,
            &source,
            MediaKind::Image,
            Verdict::corrupt("broken"),
            b"x",
        );

        separate(&store, library.path(), quarantine.path(), &options()).unwrap();

        let records = store.snapshot();
        assert_eq!(records.len(), 1);
        let expected = quarantine.path().join("images").join("bad.jpg");
        assert_eq!(records[0].path, expected);
        assert!(store.get(&expected).is_some());
        assert!(store.get(&source).is_none());
    }

    #[test]
    fn test_missing_source_counts_as_failure() {
        let library = TempDir::new().unwrap();
        let quarantine = TempDir::new().unwrap();
        let store = ResultStore::new();

        let vanished = library.path().join("gone.jpg");
        add_record(
            &store,
            &vanished,
            MediaKind::Image,
            Verdict::corrupt("broken"),
            b"x",
        );
        fs::remove_file(&vanished).unwrap();

        let there = library.path().join("still.jpg");
        add_record(
            &store,
            &there,
            MediaKind::Image,
            Verdict::corrupt("broken"),
            b"y",
        );

        let report = separate(&store, library.path(), quarantine.path(), &options()).unwrap();
        assert_eq!(report.moved, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, vanished);
    }
}
