//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Normalizes a single extension to lowercase with a leading dot.
///
/// Accepts both `"jpg"` and `".JPG"` forms; returns `".jpg"`.
pub fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

/// Parses a comma-separated extension list (`".jpg,.png"` or `"jpg, png"`)
/// into normalized extensions. Empty items are dropped.
pub fn parse_extension_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(normalize_extension)
        .collect()
}

fn default_image_extensions() -> Vec<String> {
    [
        ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".webp", ".heic", ".dng", ".raw",
        ".svg", ".ico",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_video_extensions() -> Vec<String> {
    [
        ".mp4", ".avi", ".mkv", ".mov", ".wmv", ".flv", ".webm", ".mpeg", ".mpg", ".ts",
        ".m4v", ".3gp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_file_size_bytes() -> u64 {
    100
}

fn default_max_file_size_mb() -> u64 {
    10_000
}

/// File selection configuration: which extensions are candidates and
/// which size range is eligible for verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilesConfig {
    /// Image extensions treated as candidates (normalized on use).
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    /// Video extensions treated as candidates (normalized on use).
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    /// Files smaller than this are excluded from the candidate set entirely.
    #[serde(default = "default_min_file_size_bytes")]
    pub min_file_size_bytes: u64,
    /// Files larger than this (in MiB) are excluded from the candidate set entirely.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            video_extensions: default_video_extensions(),
            min_file_size_bytes: default_min_file_size_bytes(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

impl FilesConfig {
    /// Maximum candidate size in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Normalized image extension set.
    pub fn image_extension_set(&self) -> BTreeSet<String> {
        self.image_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .collect()
    }

    /// Normalized video extension set.
    pub fn video_extension_set(&self) -> BTreeSet<String> {
        self.video_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .collect()
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_batch_size() -> usize {
    1000
}

fn default_checkpoint_interval() -> usize {
    100
}

/// Scan orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Worker count for the verification pool (0 = auto-derive from CPU count).
    #[serde(default)]
    pub thread_count: u32,
    /// Per-file duration hint in seconds; longer-running checks get one stall warning.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Candidates processed per sequential batch; bounds peak in-flight work.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Completed classifications between checkpoint snapshots.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            thread_count: 0,
            timeout_seconds: default_timeout_seconds(),
            batch_size: default_batch_size(),
            checkpoint_interval: default_checkpoint_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_folder_name() -> String {
    "corrupted_files".to_string()
}

/// Quarantine separation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuarantineConfig {
    /// Treat suspicious files like corrupt ones when quarantining.
    #[serde(default = "default_true")]
    pub include_suspicious: bool,
    /// Create per-media-kind subfolders (images/, videos/) under the quarantine root.
    #[serde(default = "default_true")]
    pub create_subfolders: bool,
    /// Quarantine tree name created under the output directory.
    #[serde(default = "default_folder_name")]
    pub folder_name: String,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            include_suspicious: default_true(),
            create_subfolders: default_true(),
            folder_name: default_folder_name(),
        }
    }
}

fn default_suspicious_frame_fraction() -> f64 {
    0.5
}

fn default_min_video_bytes_per_second() -> f64 {
    1000.0
}

/// Heuristic thresholds for the suspicion classification.
///
/// These are tuning knobs without a derived origin; kept configurable so
/// they can be adjusted per corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdsConfig {
    /// A video is suspicious when fewer than this fraction of sampled frames decode.
    #[serde(default = "default_suspicious_frame_fraction")]
    pub suspicious_frame_fraction: f64,
    /// A video is suspicious below this average byte rate.
    #[serde(default = "default_min_video_bytes_per_second")]
    pub min_video_bytes_per_second: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            suspicious_frame_fraction: default_suspicious_frame_fraction(),
            min_video_bytes_per_second: default_min_video_bytes_per_second(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub quarantine: QuarantineConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
}

fn parse_env_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - IMAGE_EXTENSIONS / VIDEO_EXTENSIONS -> files.* (comma-separated lists)
    /// - MIN_FILE_SIZE_BYTES / MAX_FILE_SIZE_MB -> files.*
    /// - THREAD_COUNT / TIMEOUT_SECONDS / BATCH_SIZE / CHECKPOINT_INTERVAL -> scan.*
    /// - QUARANTINE_SUSPICIOUS / CREATE_SUBFOLDERS -> quarantine.*
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("IMAGE_EXTENSIONS") {
            let parsed = parse_extension_list(&val);
            if !parsed.is_empty() {
                self.files.image_extensions = parsed;
            }
        }

        if let Ok(val) = env::var("VIDEO_EXTENSIONS") {
            let parsed = parse_extension_list(&val);
            if !parsed.is_empty() {
                self.files.video_extensions = parsed;
            }
        }

        if let Ok(val) = env::var("MIN_FILE_SIZE_BYTES") {
            if let Ok(bytes) = val.parse::<u64>() {
                self.files.min_file_size_bytes = bytes;
            }
        }

        if let Ok(val) = env::var("MAX_FILE_SIZE_MB") {
            if let Ok(mb) = val.parse::<u64>() {
                self.files.max_file_size_mb = mb;
            }
        }

        if let Ok(val) = env::var("THREAD_COUNT") {
            if let Ok(threads) = val.parse::<u32>() {
                self.scan.thread_count = threads;
            }
        }

        if let Ok(val) = env::var("TIMEOUT_SECONDS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.scan.timeout_seconds = secs;
            }
        }

        if let Ok(val) = env::var("BATCH_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                self.scan.batch_size = size;
            }
        }

        if let Ok(val) = env::var("CHECKPOINT_INTERVAL") {
            if let Ok(interval) = val.parse::<usize>() {
                self.scan.checkpoint_interval = interval;
            }
        }

        if let Ok(val) = env::var("QUARANTINE_SUSPICIOUS") {
            if let Some(flag) = parse_env_bool(&val) {
                self.quarantine.include_suspicious = flag;
            }
        }

        if let Ok(val) = env::var("CREATE_SUBFOLDERS") {
            if let Some(flag) = parse_env_bool(&val) {
                self.quarantine.create_subfolders = flag;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("IMAGE_EXTENSIONS");
        env::remove_var("VIDEO_EXTENSIONS");
        env::remove_var("MIN_FILE_SIZE_BYTES");
        env::remove_var("MAX_FILE_SIZE_MB");
        env::remove_var("THREAD_COUNT");
        env::remove_var("TIMEOUT_SECONDS");
        env::remove_var("BATCH_SIZE");
        env::remove_var("CHECKPOINT_INTERVAL");
        env::remove_var("QUARANTINE_SUSPICIOUS");
        env::remove_var("CREATE_SUBFOLDERS");
    }

    // **Feature: mediatriage, Property 1: Configuration Parsing and Environment Override**
    //
    // *For any* valid TOML configuration string, the loaded configuration SHALL parse
    // all sections (files, scan, quarantine, thresholds), and environment variables
    // SHALL override the corresponding parsed values.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            min_bytes in 0u64..1_000_000,
            max_mb in 1u64..100_000,
            threads in 0u32..64,
            timeout in 1u64..600,
            batch in 1usize..100_000,
            interval in 1usize..10_000,
            include_suspicious in proptest::bool::ANY,
            subfolders in proptest::bool::ANY,
        ) {
            let toml_str = format!(
                r#"
[files]
min_file_size_bytes = {}
max_file_size_mb = {}

[scan]
thread_count = {}
timeout_seconds = {}
batch_size = {}
checkpoint_interval = {}

[quarantine]
include_suspicious = {}
create_subfolders = {}
"#,
                min_bytes, max_mb, threads, timeout, batch, interval, include_suspicious, subfolders
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.files.min_file_size_bytes, min_bytes);
            prop_assert_eq!(config.files.max_file_size_mb, max_mb);
            prop_assert_eq!(config.scan.thread_count, threads);
            prop_assert_eq!(config.scan.timeout_seconds, timeout);
            prop_assert_eq!(config.scan.batch_size, batch);
            prop_assert_eq!(config.scan.checkpoint_interval, interval);
            prop_assert_eq!(config.quarantine.include_suspicious, include_suspicious);
            prop_assert_eq!(config.quarantine.create_subfolders, subfolders);

            // Extension lists fall back to defaults when the section omits them
            prop_assert!(!config.files.image_extensions.is_empty());
            prop_assert!(!config.files.video_extensions.is_empty());
        }

        // **Feature: mediatriage, Property 2: Extension Normalization**
        //
        // *For any* extension written with or without a leading dot and in any case,
        // normalization SHALL produce the lowercase dotted form.
        #[test]
        fn prop_extension_normalization(
            stem in "[a-zA-Z0-9]{1,8}",
            dotted in proptest::bool::ANY,
        ) {
            let raw = if dotted {
                format!(".{}", stem)
            } else {
                stem.clone()
            };
            let normalized = normalize_extension(&raw);

            prop_assert!(normalized.starts_with('.'));
            prop_assert_eq!(normalized, format!(".{}", stem.to_lowercase()));
        }

        #[test]
        fn prop_env_overrides_thread_count(
            initial in 0u32..32,
            override_threads in 0u32..64,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[scan]
thread_count = {}
"#,
                initial
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("THREAD_COUNT", override_threads.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.scan.thread_count, override_threads);
        }

        #[test]
        fn prop_env_overrides_quarantine_suspicious(
            initial in proptest::bool::ANY,
            override_flag in proptest::bool::ANY,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[quarantine]
include_suspicious = {}
"#,
                initial
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("QUARANTINE_SUSPICIOUS", override_flag.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.quarantine.include_suspicious, override_flag);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert!(config.files.image_extensions.contains(&".jpg".to_string()));
        assert!(config.files.video_extensions.contains(&".mkv".to_string()));
        assert_eq!(config.files.min_file_size_bytes, 100);
        assert_eq!(config.files.max_file_size_mb, 10_000);
        assert_eq!(config.scan.thread_count, 0);
        assert_eq!(config.scan.timeout_seconds, 30);
        assert_eq!(config.scan.batch_size, 1000);
        assert_eq!(config.scan.checkpoint_interval, 100);
        assert!(config.quarantine.include_suspicious);
        assert!(config.quarantine.create_subfolders);
        assert_eq!(config.quarantine.folder_name, "corrupted_files");
        assert!((config.thresholds.suspicious_frame_fraction - 0.5).abs() < 1e-9);
        assert!((config.thresholds.min_video_bytes_per_second - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[files]
min_file_size_bytes = 512
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.files.min_file_size_bytes, 512);
        assert_eq!(config.files.max_file_size_mb, 10_000); // default
        assert_eq!(config.scan.batch_size, 1000); // default
        assert!(config.quarantine.include_suspicious); // default
    }

    #[test]
    fn test_parse_extension_list_mixed_forms() {
        let parsed = parse_extension_list(" .JPG, png ,, gif ");
        assert_eq!(parsed, vec![".jpg", ".png", ".gif"]);
    }

    #[test]
    fn test_extension_sets_are_normalized() {
        let files = FilesConfig {
            image_extensions: vec!["JPG".to_string(), ".Png".to_string()],
            video_extensions: vec!["MKV".to_string()],
            ..Default::default()
        };

        let images = files.image_extension_set();
        assert!(images.contains(".jpg"));
        assert!(images.contains(".png"));

        let videos = files.video_extension_set();
        assert!(videos.contains(".mkv"));
    }

    #[test]
    fn test_max_file_size_bytes() {
        let files = FilesConfig {
            max_file_size_mb: 2,
            ..Default::default()
        };
        assert_eq!(files.max_file_size_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_env_extension_list_override() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("IMAGE_EXTENSIONS", "jpg,png");
        env::set_var("VIDEO_EXTENSIONS", ".mp4");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.files.image_extensions, vec![".jpg", ".png"]);
        assert_eq!(config.files.video_extensions, vec![".mp4"]);
    }

    #[test]
    fn test_env_empty_extension_list_keeps_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("IMAGE_EXTENSIONS", " , ");
        config.apply_env_overrides();
        clear_env_vars();

        assert!(config.files.image_extensions.contains(&".jpg".to_string()));
    }
}
