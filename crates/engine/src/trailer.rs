//! Trailer validation for image formats with a defined end-of-stream marker.
//!
//! A decodable image whose trailer marker is missing was usually truncated
//! mid-write and then partially repaired by a tolerant decoder, so the
//! trailer check runs in addition to the full decode.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use memchr::memmem;

/// How far back from the end of the file each marker is searched for.
const JPEG_TAIL_WINDOW: u64 = 64 * 1024;
const PNG_TAIL_WINDOW: u64 = 64 * 1024;
const GIF_TAIL_WINDOW: u64 = 16 * 1024;

/// Outcome of a trailer check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailerCheck {
    pub ok: bool,
    /// Failure reason when `ok` is false, empty otherwise.
    pub reason: String,
}

impl TrailerCheck {
    fn pass() -> Self {
        Self {
            ok: true,
            reason: String::new(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
        }
    }
}

/// Outcome of scanning a file's tail window for a marker.
enum TailScan {
    Found,
    NotFound,
    /// The whole file is shorter than the marker itself.
    TooSmall,
}

/// Validates the end-of-stream marker for formats that define one.
///
/// Extensions without a defined trailer pass unconditionally. Any I/O
/// failure while reading the tail fails closed.
///
/// # Arguments
///
/// * `path` - File to check.
/// * `extension` - Normalized lowercase dotted extension (`".jpg"`).
pub fn validate_trailer(path: &Path, extension: &str) -> TrailerCheck {
    let (window, marker, missing_reason) = match extension {
        ".jpg" | ".jpeg" => (
            JPEG_TAIL_WINDOW,
            &[0xFF, 0xD9][..],
            "JPEG end-of-image (FFD9) marker not found",
        ),
        ".png" => (PNG_TAIL_WINDOW, &b"IEND"[..], "PNG IEND chunk not found"),
        ".gif" => (
            GIF_TAIL_WINDOW,
            &[0x3B][..],
            "GIF trailer (0x3B) byte not found",
        ),
        _ => return TrailerCheck::pass(),
    };

    match check_tail(path, window, marker) {
        Ok(TailScan::Found) => TrailerCheck::pass(),
        Ok(TailScan::NotFound) => TrailerCheck::fail(missing_reason),
        Ok(TailScan::TooSmall) => TrailerCheck::fail("file too small to contain a trailer"),
        Err(err) => TrailerCheck::fail(format!("trailer check failed: {err}")),
    }
}

/// Reads the last `window` bytes of the file and searches for `marker`.
fn check_tail(path: &Path, window: u64, marker: &[u8]) -> std::io::Result<TailScan> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    if len < marker.len() as u64 {
        return Ok(TailScan::TooSmall);
    }

    let start = len.saturating_sub(window);
    file.seek(SeekFrom::Start(start))?;

    let mut tail = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut tail)?;

    if memmem::find(&tail, marker).is_some() {
        Ok(TailScan::Found)
    } else {
        Ok(TailScan::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_bytes(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_jpeg_with_eoi_passes() {
        let temp = TempDir::new().unwrap();
        let mut data = vec![0xFF, 0xD8];
        data.extend(vec![0u8; 128]);
        data.extend([0xFF, 0xD9]);
        let path = write_bytes(&temp, "ok.jpg", &data);

        assert!(validate_trailer(&path, ".jpg").ok);
    }

    #[test]
    fn test_jpeg_without_eoi_fails() {
        let temp = TempDir::new().unwrap();
        let mut data = vec![0xFF, 0xD8];
        data.extend(vec![0u8; 128]);
        let path = write_bytes(&temp, "cut.jpg", &data);

        let check = validate_trailer(&path, ".jpg");
        assert!(!check.ok);
        assert!(check.reason.contains("FFD9"));
    }

    #[test]
    fn test_jpeg_marker_outside_window_fails() {
        let temp = TempDir::new().unwrap();
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xD9];
        // Push the marker more than 64 KiB away from the end.
        data.extend(vec![0u8; (JPEG_TAIL_WINDOW as usize) + 1024]);
        let path = write_bytes(&temp, "buried.jpg", &data);

        assert!(!validate_trailer(&path, ".jpg").ok);
    }

    #[test]
    fn test_png_iend_chunk() {
        let temp = TempDir::new().unwrap();
        let mut data = vec![0x89, b'P', b'N', b'G'];
        data.extend(vec![0u8; 64]);
        data.extend(b"IEND");
        data.extend([0xAE, 0x42, 0x60, 0x82]);
        let path = write_bytes(&temp, "ok.png", &data);
        assert!(validate_trailer(&path, ".png").ok);

        let truncated = write_bytes(&temp, "cut.png", &data[..data.len() - 10]);
        let check = validate_trailer(&truncated, ".png");
        assert!(!check.ok);
        assert!(check.reason.contains("IEND"));
    }

    #[test]
    fn test_gif_trailer_byte() {
        let temp = TempDir::new().unwrap();
        let mut data = b"GIF89a".to_vec();
        data.extend(vec![0u8; 32]);
        data.push(0x3B);
        let path = write_bytes(&temp, "ok.gif", &data);
        assert!(validate_trailer(&path, ".gif").ok);

        let without = write_bytes(&temp, "cut.gif", &data[..data.len() - 1]);
        // All-zero body contains no 0x3B anywhere.
        assert!(!validate_trailer(&without, ".gif").ok);
    }

    #[test]
    fn test_unknown_extension_passes() {
        let temp = TempDir::new().unwrap();
        let path = write_bytes(&temp, "any.bmp", &[0u8; 16]);
        assert!(validate_trailer(&path, ".bmp").ok);
        assert!(validate_trailer(&path, ".webp").ok);
    }

    #[test]
    fn test_io_error_fails_closed() {
        let check = validate_trailer(Path::new("/nonexistent/x.jpg"), ".jpg");
        assert!(!check.ok);
        assert!(check.reason.contains("trailer check failed"));
    }

    #[test]
    fn test_file_smaller_than_marker_gets_distinct_reason() {
        let temp = TempDir::new().unwrap();
        let jpeg = write_bytes(&temp, "stub.jpg", &[0xFF]);
        let check = validate_trailer(&jpeg, ".jpg");
        assert!(!check.ok);
        assert!(check.reason.contains("too small"));

        let png = write_bytes(&temp, "stub.png", b"IEN");
        let check = validate_trailer(&png, ".png");
        assert!(!check.ok);
        assert!(check.reason.contains("too small"));

        let empty = write_bytes(&temp, "empty.gif", &[]);
        assert!(validate_trailer(&empty, ".gif").reason.contains("too small"));
    }

    #[test]
    fn test_file_smaller_than_window() {
        let temp = TempDir::new().unwrap();
        let path = write_bytes(&temp, "small.jpg", &[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(validate_trailer(&path, ".jpg").ok);
    }
}
