//! Runtime detection of the external tools the verifiers depend on.
//!
//! Capability probing happens once at startup. A missing tool downgrades
//! the affected verifier so its files are classified as skipped instead of
//! aborting the whole scan.

use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Which verification backends are usable in this environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// In-process image decoding is compiled in and always available.
    pub image_decode: bool,
    /// `ffprobe` responds to `-version`.
    pub ffprobe: bool,
    /// `ffmpeg` responds to `-version`.
    pub ffmpeg: bool,
}

impl Capabilities {
    /// True when at least one video validation path can run.
    pub fn video_any(&self) -> bool {
        self.ffprobe || self.ffmpeg
    }
}

/// Probes the environment for the tools the verifiers need.
pub fn detect_capabilities() -> Capabilities {
    let caps = Capabilities {
        image_decode: true,
        ffprobe: tool_available("ffprobe"),
        ffmpeg: tool_available("ffmpeg"),
    };

    info!(
        ffprobe = caps.ffprobe,
        ffmpeg = caps.ffmpeg,
        "detected verification capabilities"
    );
    if !caps.video_any() {
        warn!("neither ffprobe nor ffmpeg found, video files will be skipped");
    }

    caps
}

/// Checks whether `program -version` runs successfully.
pub fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
