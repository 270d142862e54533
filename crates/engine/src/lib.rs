//! Media Triage
//!
//! Corruption classification engine for media libraries: discovers image
//! and video files, verifies each one, and separates the damaged ones
//! into a quarantine tree.

pub mod capability;
pub mod checkpoint;
pub mod discover;
pub mod image_check;
pub mod orchestrator;
pub mod quarantine;
pub mod record;
pub mod report;
pub mod trailer;
pub mod verify;
pub mod video_check;

pub use mediatriage_config as config;
pub use mediatriage_config::Config;

pub use capability::{detect_capabilities, Capabilities};
pub use checkpoint::{CheckpointError, CheckpointSnapshot, CheckpointWriter};
pub use discover::{discover_candidates, DiscoverError, ExtensionFilter, ScanCandidate};
pub use image_check::ImageVerifier;
pub use orchestrator::{run_scan, ScanError};
pub use quarantine::{separate, SeparateError, SeparateOptions, SeparationReport};
pub use record::{FileRecord, HealthStatus, MediaKind, ResultStore, StatusCounts, Verdict};
pub use report::{write_reports, ReportError, ReportPaths};
pub use trailer::{validate_trailer, TrailerCheck};
pub use verify::{Verifier, VerifierSet};
pub use video_check::{VideoProbe, VideoVerifier};
