//! Scan orchestration.
//!
//! Discovers candidates, runs bounded concurrent verification over them in
//! batches and collects results into the shared store. Verification is
//! blocking subprocess and decode work, so each check runs on the blocking
//! thread pool under a semaphore permit. One verification failure never
//! aborts the scan; the affected file gets an error record and the scan
//! continues.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use mediatriage_config::Config;

use crate::checkpoint::CheckpointWriter;
use crate::discover::{discover_candidates, DiscoverError, ExtensionFilter, ScanCandidate};
use crate::record::{FileRecord, ResultStore};
use crate::verify::Verifier;

/// How often the collection loop wakes to look for stalled checks.
const STALL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Error type for scan orchestration. Per-file verification failures are
/// not errors at this level; only conditions that prevent the scan from
/// running at all appear here.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Discover(#[from] DiscoverError),
}

/// Checks currently executing, keyed by path with their start instant.
type InFlightMap = Arc<Mutex<HashMap<PathBuf, Instant>>>;

/// Runs a full scan of `root` and returns the populated result store.
///
/// # Arguments
///
/// * `root` - Directory to scan recursively.
/// * `config` - Scan configuration (filters, concurrency, checkpointing).
/// * `verifier` - Classification backend, shared across workers.
/// * `output_dir` - Where checkpoint files are written.
pub async fn run_scan(
    root: &Path,
    config: &Config,
    verifier: Arc<dyn Verifier>,
    output_dir: &Path,
) -> Result<ResultStore, ScanError> {
    let filter = ExtensionFilter::from_config(&config.files);
    let candidates = discover_candidates(
        root,
        &filter,
        config.files.min_file_size_bytes,
        config.files.max_file_size_bytes(),
    )?;

    let workers = effective_worker_count(config.scan.thread_count);
    info!(
        candidates = candidates.len(),
        workers,
        batch_size = config.scan.batch_size,
        "starting scan"
    );

    let store = ResultStore::new();
    let mut checkpoints = CheckpointWriter::new(output_dir);
    let mut since_checkpoint: usize = 0;

    let semaphore = Arc::new(Semaphore::new(workers));
    let in_flight: InFlightMap = Arc::new(Mutex::new(HashMap::new()));
    let mut warned_stalled: HashSet<PathBuf> = HashSet::new();
    let stall_after = Duration::from_secs(config.scan.timeout_seconds);

    let batch_size = config.scan.batch_size.max(1);
    for (batch_index, batch) in candidates.chunks(batch_size).enumerate() {
        debug!(batch = batch_index, files = batch.len(), "starting batch");

        let (tx, mut rx) = mpsc::channel::<FileRecord>(batch.len().max(1));

        for candidate in batch.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let verifier = Arc::clone(&verifier);
            let in_flight = Arc::clone(&in_flight);
            let tx = tx.clone();

            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore should not be closed");

                in_flight
                    .lock()
                    .expect("in-flight map lock poisoned")
                    .insert(candidate.path.clone(), Instant::now());
                let started = Instant::now();

                let task_candidate = candidate.clone();
                let handle =
                    tokio::task::spawn_blocking(move || verifier.verify(&task_candidate));
                let outcome = handle.await;

                let elapsed = started.elapsed().as_secs_f64();
                in_flight
                    .lock()
                    .expect("in-flight map lock poisoned")
                    .remove(&candidate.path);

                let record = match outcome {
                    Ok(verdict) => FileRecord::classified(&candidate, verdict, elapsed),
                    Err(join_err) => {
                        warn!(
                            path = %candidate.path.display(),
                            error = %join_err,
                            "verification task failed"
                        );
                        FileRecord::errored(&candidate, elapsed, join_err.to_string())
                    }
                };

                let _ = tx.send(record).await;
            });
        }
        drop(tx);

        // Collect this batch's results, watching in-flight checks for
        // stalls while we wait.
        loop {
            match tokio::time::timeout(STALL_POLL_INTERVAL, rx.recv()).await {
                Ok(Some(record)) => {
                    warned_stalled.remove(&record.path);
                    store.insert(record);
                    since_checkpoint += 1;

                    if since_checkpoint >= config.scan.checkpoint_interval {
                        since_checkpoint = 0;
                        match checkpoints.write(&store) {
                            Ok(path) => {
                                debug!(path = %path.display(), "checkpoint written")
                            }
                            Err(err) => warn!(error = %err, "checkpoint write failed"),
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn_stalled_checks(&in_flight, stall_after, &mut warned_stalled);
                }
            }
        }
    }

    let counts = store.counts();
    info!(
        total = counts.total,
        healthy = counts.healthy,
        corrupt = counts.corrupt,
        suspicious = counts.suspicious,
        skipped = counts.skipped,
        error = counts.error,
        "scan complete"
    );

    Ok(store)
}

/// Logs one warning per check that has been running past the stall window.
fn warn_stalled_checks(
    in_flight: &InFlightMap,
    stall_after: Duration,
    warned: &mut HashSet<PathBuf>,
) {
    let map = in_flight.lock().expect("in-flight map lock poisoned");
    for (path, started) in map.iter() {
        if started.elapsed() > stall_after && !warned.contains(path) {
            warn!(
                path = %path.display(),
                elapsed_secs = started.elapsed().as_secs(),
                "verification is taking unusually long"
            );
            warned.insert(path.clone());
        }
    }
}

/// Resolves the configured worker count. Zero means derive from the CPU
/// count, clamped so one scan cannot saturate a large host.
pub fn effective_worker_count(configured: u32) -> usize {
    if configured > 0 {
        return configured as usize;
    }
    num_cpus::get().clamp(4, 8)
}
