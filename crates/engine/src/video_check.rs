//! Video verification through ffprobe metadata and ffmpeg frame sampling.
//!
//! The primary path probes the container with ffprobe, then decodes a
//! small sample of frames with ffmpeg and compares how many came back.
//! When ffprobe is missing but ffmpeg is present, the whole stream is
//! decoded instead. Every subprocess runs under a hard timeout and is
//! killed when it expires, so a pathological file can never wedge a
//! worker.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use mediatriage_config::ThresholdsConfig;

use crate::capability::Capabilities;
use crate::discover::ScanCandidate;
use crate::record::Verdict;

/// Maximum number of frames sampled from the head of a stream.
const MAX_SAMPLED_FRAMES: u64 = 10;

/// Poll interval while waiting for a subprocess under timeout.
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe exited unsuccessfully.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),
}

/// Error type for external tool invocations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The binary is not installed or not on PATH.
    #[error("tool is not installed")]
    Missing,

    /// The tool exceeded its deadline and was killed.
    #[error("tool timed out")]
    TimedOut,

    /// IO error while running the tool.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured output of a tool run that finished within its deadline.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Metadata for one video stream from ffprobe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoStreamInfo {
    /// Codec name (e.g., "hevc", "h264", "av1").
    pub codec_name: String,
    /// Video width in pixels.
    pub width: u32,
    /// Video height in pixels.
    pub height: u32,
    /// Total frame count when the container records it.
    pub frame_count: Option<u64>,
}

/// Result of probing a video file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoProbe {
    /// Video streams found in the file.
    pub streams: Vec<VideoStreamInfo>,
    /// Container duration in seconds.
    pub duration_secs: f64,
    /// File size in bytes as reported by the container.
    pub size_bytes: u64,
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub nb_frames: Option<String>,
        pub avg_frame_rate: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
        pub size: Option<String>,
    }
}

/// Runs a command with a hard deadline, killing it on expiry.
///
/// stdout and stderr are drained on reader threads while the child runs,
/// so a chatty subprocess cannot deadlock on a full pipe.
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<ToolOutput, ToolError> {
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ToolError::Missing
        } else {
            ToolError::Io(err)
        }
    })?;

    let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");

    let stdout_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::TimedOut);
                }
                std::thread::sleep(CHILD_POLL_INTERVAL);
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}

/// Probes a video file using ffprobe to collect stream and format metadata.
///
/// Runs `ffprobe -v quiet -print_format json -show_streams -show_format <path>`
/// and parses the JSON output.
pub fn probe_file(path: &Path, timeout: Duration) -> Result<VideoProbe, VideoToolFailure> {
    let mut command = Command::new("ffprobe");
    command
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path);

    let output = run_with_timeout(command, timeout)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VideoToolFailure::Probe(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        ))));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout).map_err(VideoToolFailure::Probe)
}

/// Either a tool-level failure or a probe parsing failure.
#[derive(Debug, Error)]
pub enum VideoToolFailure {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Probe(ProbeError),
}

/// Parses ffprobe JSON output into a VideoProbe.
pub fn parse_probe_output(json_str: &str) -> Result<VideoProbe, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let raw_streams = ffprobe.streams.unwrap_or_default();
    let format = ffprobe.format.ok_or_else(|| {
        ProbeError::ParseError("missing format information in ffprobe output".to_string())
    })?;

    let duration_secs = format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size_bytes = format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let mut streams = Vec::new();
    for stream in raw_streams {
        if stream.codec_type.as_deref() != Some("video") {
            continue;
        }

        let frame_count = stream
            .nb_frames
            .as_ref()
            .and_then(|n| n.parse::<u64>().ok())
            .or_else(|| estimate_frame_count(stream.avg_frame_rate.as_deref(), duration_secs));

        streams.push(VideoStreamInfo {
            codec_name: stream.codec_name.clone().unwrap_or_default(),
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
            frame_count,
        });
    }

    Ok(VideoProbe {
        streams,
        duration_secs,
        size_bytes,
    })
}

/// Estimates total frames from an `avg_frame_rate` fraction ("num/den")
/// and the container duration, when `nb_frames` is absent.
fn estimate_frame_count(avg_frame_rate: Option<&str>, duration_secs: f64) -> Option<u64> {
    let rate = avg_frame_rate?;
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den <= 0.0 || num <= 0.0 || duration_secs <= 0.0 {
        return None;
    }
    Some((num / den * duration_secs).round() as u64)
}

/// Number of frames to sample given the known (or unknown) stream total.
pub fn frames_to_sample(frame_count: Option<u64>) -> u64 {
    match frame_count {
        Some(count) if count > 0 => count.min(MAX_SAMPLED_FRAMES),
        _ => MAX_SAMPLED_FRAMES,
    }
}

/// Decodes up to `frames` frames of the first video stream and reports how
/// many ffmpeg actually produced.
///
/// Uses `-progress pipe:1` so the decoded frame counter is machine readable
/// even when decode errors land on stderr.
pub fn sample_frames(path: &Path, frames: u64, timeout: Duration) -> Result<u64, ToolError> {
    let mut command = Command::new("ffmpeg");
    command
        .args(["-v", "error", "-progress", "pipe:1", "-i"])
        .arg(path)
        .args(["-map", "0:v:0", "-frames:v"])
        .arg(frames.to_string())
        .args(["-f", "null", "-"]);

    let output = run_with_timeout(command, timeout)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_progress_frames(&stdout))
}

/// Extracts the final `frame=` counter from ffmpeg `-progress` output.
pub fn parse_progress_frames(progress: &str) -> u64 {
    progress
        .lines()
        .filter_map(|line| line.trim().strip_prefix("frame="))
        .filter_map(|value| value.trim().parse::<u64>().ok())
        .last()
        .unwrap_or(0)
}

/// Classifies a video from probe metadata and the frame sampling outcome.
///
/// `decoded` is `None` when frame sampling could not run, in which case
/// only the metadata checks apply.
pub fn assess_video(
    probe: &VideoProbe,
    decoded: Option<u64>,
    sampled: u64,
    file_size: u64,
    thresholds: &ThresholdsConfig,
) -> Verdict {
    if probe.streams.is_empty() {
        return Verdict::corrupt("no video streams found");
    }

    let stream = &probe.streams[0];
    if stream.width == 0 || stream.height == 0 {
        return Verdict::corrupt(format!(
            "invalid video dimensions ({}x{})",
            stream.width, stream.height
        ));
    }

    if let Some(decoded) = decoded {
        if decoded == 0 {
            return Verdict::corrupt("no frames decoded");
        }
        let expected = sampled as f64 * thresholds.suspicious_frame_fraction;
        if stream.frame_count.is_some() && (decoded as f64) < expected {
            return Verdict::suspicious(format!(
                "only {decoded} of {sampled} sampled frames decoded"
            ));
        }
    }

    if probe.duration_secs > 0.0 {
        let bytes_per_second = file_size as f64 / probe.duration_secs;
        if bytes_per_second < thresholds.min_video_bytes_per_second {
            return Verdict::suspicious(format!(
                "implausibly low bitrate ({bytes_per_second:.0} bytes/sec)"
            ));
        }
    }

    Verdict::healthy("video stream validated")
}

/// Which validation path the verifier runs, picked from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoMode {
    /// ffprobe metadata plus ffmpeg frame sampling.
    Full,
    /// ffprobe metadata only; decoded-frame checks are skipped.
    ProbeOnly,
    /// Full-stream ffmpeg decode; no metadata available.
    DecodeOnly,
    /// No tools available; every video is skipped.
    Unavailable,
}

/// Verifies video files with the best path the environment supports.
#[derive(Debug, Clone)]
pub struct VideoVerifier {
    mode: VideoMode,
    timeout: Duration,
    thresholds: ThresholdsConfig,
}

impl VideoVerifier {
    pub fn from_capabilities(
        caps: &Capabilities,
        timeout: Duration,
        thresholds: ThresholdsConfig,
    ) -> Self {
        let mode = match (caps.ffprobe, caps.ffmpeg) {
            (true, true) => VideoMode::Full,
            (true, false) => VideoMode::ProbeOnly,
            (false, true) => VideoMode::DecodeOnly,
            (false, false) => VideoMode::Unavailable,
        };
        Self {
            mode,
            timeout,
            thresholds,
        }
    }

    /// A verifier that skips every video regardless of the environment.
    pub fn unavailable() -> Self {
        Self {
            mode: VideoMode::Unavailable,
            timeout: Duration::from_secs(0),
            thresholds: ThresholdsConfig::default(),
        }
    }

    /// Classifies a single video file.
    pub fn verify(&self, candidate: &ScanCandidate) -> Verdict {
        match self.mode {
            VideoMode::Unavailable => {
                Verdict::skipped("no video validation tools are installed")
            }
            VideoMode::DecodeOnly => self.full_decode(candidate),
            VideoMode::ProbeOnly | VideoMode::Full => self.probe_and_sample(candidate),
        }
    }

    fn probe_and_sample(&self, candidate: &ScanCandidate) -> Verdict {
        debug!(path = %candidate.path.display(), "probing video");
        let probe = match probe_file(&candidate.path, self.timeout) {
            Ok(probe) => probe,
            Err(VideoToolFailure::Tool(ToolError::Missing)) => {
                return Verdict::skipped("ffprobe is not installed")
            }
            Err(VideoToolFailure::Tool(ToolError::TimedOut)) => {
                return Verdict::suspicious(format!(
                    "probe timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            }
            Err(err) => return Verdict::corrupt(format!("cannot probe video: {err}")),
        };

        if self.mode == VideoMode::ProbeOnly {
            return assess_video(&probe, None, 0, candidate.size, &self.thresholds);
        }

        let frame_count = probe.streams.first().and_then(|s| s.frame_count);
        let sampled = frames_to_sample(frame_count);

        let decoded = match sample_frames(&candidate.path, sampled, self.timeout) {
            Ok(decoded) => Some(decoded),
            Err(ToolError::Missing) => None,
            Err(ToolError::TimedOut) => {
                return Verdict::suspicious(format!(
                    "frame sampling timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            }
            Err(err) => return Verdict::corrupt(format!("frame sampling failed: {err}")),
        };

        assess_video(&probe, decoded, sampled, candidate.size, &self.thresholds)
    }

    /// Fallback used when ffprobe is absent: decode the entire stream and
    /// treat any decoder diagnostics as corruption.
    fn full_decode(&self, candidate: &ScanCandidate) -> Verdict {
        debug!(path = %candidate.path.display(), "full-stream decode fallback");
        let mut command = Command::new("ffmpeg");
        command
            .args(["-v", "error", "-i"])
            .arg(&candidate.path)
            .args(["-f", "null", "-"]);

        match run_with_timeout(command, self.timeout) {
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    let first_line = stderr.lines().next().unwrap_or(stderr);
                    Verdict::corrupt(format!("decoder reported errors: {first_line}"))
                } else if output.status.success() {
                    Verdict::healthy("full stream decoded without errors")
                } else {
                    Verdict::corrupt(format!(
                        "decoder exited with status {}",
                        output.status
                    ))
                }
            }
            Err(ToolError::Missing) => Verdict::skipped("ffmpeg is not installed"),
            Err(ToolError::TimedOut) => Verdict::suspicious(format!(
                "decode timed out after {} seconds",
                self.timeout.as_secs()
            )),
            Err(err) => Verdict::corrupt(format!("decoder could not be run: {err}")),
        }
    }
}
