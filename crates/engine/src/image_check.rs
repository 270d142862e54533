//! Image verification through full in-process decoding.
//!
//! An image is healthy only when it both decodes completely and carries
//! the trailer marker its format defines. Decoders tolerate a surprising
//! amount of truncation, so the trailer check catches files a decode
//! alone would wave through.

use std::path::Path;

use image::ImageReader;
use tracing::debug;

use crate::discover::{extension_key, ScanCandidate};
use crate::record::Verdict;
use crate::trailer::validate_trailer;

/// Verifies image files by fully decoding them.
#[derive(Debug, Clone, Copy)]
pub struct ImageVerifier {
    available: bool,
}

impl ImageVerifier {
    pub fn new(available: bool) -> Self {
        Self { available }
    }

    /// Classifies a single image file.
    pub fn verify(&self, candidate: &ScanCandidate) -> Verdict {
        if !self.available {
            return Verdict::skipped("image verification is unavailable");
        }
        debug!(path = %candidate.path.display(), "verifying image");
        decode_and_check(&candidate.path)
    }
}

fn decode_and_check(path: &Path) -> Verdict {
    let reader = match ImageReader::open(path) {
        Ok(reader) => reader,
        Err(err) => return Verdict::corrupt(format!("cannot open image: {err}")),
    };

    let reader = match reader.with_guessed_format() {
        Ok(reader) => reader,
        Err(err) => return Verdict::corrupt(format!("cannot read image header: {err}")),
    };

    if reader.format().is_none() {
        return Verdict::corrupt("image format not recognized");
    }

    let decoded = match reader.decode() {
        Ok(decoded) => decoded,
        Err(err) => return Verdict::corrupt(decode_failure_details(&err)),
    };

    if decoded.width() == 0 || decoded.height() == 0 {
        return Verdict::corrupt("invalid image dimensions");
    }

    if let Some(ext) = extension_key(path) {
        let trailer = validate_trailer(path, &ext);
        if !trailer.ok {
            return Verdict::corrupt(trailer.reason);
        }
    }

    Verdict::healthy("image decoded cleanly")
}

/// Folds decoder errors into a stable detail string, flagging truncation
/// separately because it is the most common real-world failure.
fn decode_failure_details(err: &image::ImageError) -> String {
    let text = err.to_string();
    let lowered = text.to_lowercase();
    if lowered.contains("truncat")
        || lowered.contains("unexpected end")
        || lowered.contains("end of file")
        || lowered.contains("eof")
    {
        format!("image data is truncated: {text}")
    } else {
        format!("image decode failed: {text}")
    }
}
