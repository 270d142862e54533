//! Verifier dispatch.
//!
//! The orchestrator only knows the [`Verifier`] trait; the concrete image
//! and video paths hang off [`VerifierSet`], which routes by media kind.

use std::time::Duration;

use mediatriage_config::Config;

use crate::capability::Capabilities;
use crate::discover::ScanCandidate;
use crate::image_check::ImageVerifier;
use crate::record::{MediaKind, Verdict};
use crate::video_check::VideoVerifier;

/// A synchronous, thread-safe corruption check for one candidate file.
pub trait Verifier: Send + Sync {
    fn verify(&self, candidate: &ScanCandidate) -> Verdict;
}

/// Routes candidates to the image or video verifier by media kind.
#[derive(Debug, Clone)]
pub struct VerifierSet {
    image: ImageVerifier,
    video: VideoVerifier,
}

impl VerifierSet {
    pub fn new(image: ImageVerifier, video: VideoVerifier) -> Self {
        Self { image, video }
    }

    /// Builds the verifier set from detected capabilities and configuration.
    pub fn from_environment(caps: &Capabilities, config: &Config) -> Self {
        let timeout = Duration::from_secs(config.scan.timeout_seconds);
        Self {
            image: ImageVerifier::new(caps.image_decode),
            video: VideoVerifier::from_capabilities(caps, timeout, config.thresholds.clone()),
        }
    }
}

impl Verifier for VerifierSet {
    fn verify(&self, candidate: &ScanCandidate) -> Verdict {
        match candidate.kind {
            MediaKind::Image => self.image.verify(candidate),
            MediaKind::Video => self.video.verify(candidate),
        }
    }
}
