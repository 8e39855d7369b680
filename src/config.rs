//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `--config <path>` (command line; errors are fatal)
//! 2. `$CUCKOOLYSE_CONFIG` (environment variable)
//! 3. `~/.config/cuckoolyse/config.toml` (Linux/macOS)
//!    `%APPDATA%\cuckoolyse\config.toml` (Windows)
//! 4. Built-in defaults
//!
//! The configuration is read once at startup and then only borrowed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CuckooError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where and how to talk to the sandbox.
    pub sandbox: SandboxConfig,
    /// Which MIME parts count as attachments and how they are classified.
    pub filter: FilterConfig,
    /// Archive expansion.
    pub unpack: UnpackConfig,
    /// Log level and destinations.
    pub logging: LoggingConfig,
}

/// Sandbox connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Base URL of the Cuckoo REST API, e.g. `http://cuckoo:8090`.
    pub url: String,
    /// Marker prepended to every submitted filename.
    pub prefix: String,
    /// Timeout for each HTTP request, in seconds.
    pub timeout_secs: u64,
    /// Bearer token for APIs started with authentication enabled.
    pub api_token: Option<String>,
    /// Honor `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` from the environment.
    pub use_proxy: bool,
}

/// Attachment selection and classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Content types that are never attachments. Everything else is.
    pub excluded_types: Vec<String>,
    /// Filename suffixes that select the sandbox's office analysis mode.
    pub office_extensions: Vec<String>,
}

/// Archive expansion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpackConfig {
    /// Replace recognized archives by their members.
    pub enabled: bool,
    /// Maximum number of file entries taken from one archive.
    pub max_entries: usize,
    /// Maximum decompressed bytes taken from one archive.
    pub max_total_size: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: String,
    /// Also log to stderr.
    pub stderr: bool,
    /// Log file. Defaults to the cache directory.
    pub file: Option<PathBuf>,
}

// ── Default implementations ─────────────────────────────────────

/// Structural and text wrapper types that never carry a file.
pub const DEFAULT_EXCLUDED_TYPES: &[&str] = &[
    "multipart/mixed",
    "multipart/alternative",
    "multipart/report",
    "multipart/html",
    "multipart/related",
    "message/rfc822",
    "message/delivery-status",
    "text/plain",
    "text/rfc822-headers",
    "text/html",
];

/// Suffixes analysed in the sandbox's office mode.
pub const DEFAULT_OFFICE_EXTENSIONS: &[&str] = &[
    ".doc", ".docx", ".docm", ".xls", ".xlsm", ".xlt", ".xltm", ".ppt", ".pptx",
];

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8090".to_string(),
            prefix: "CUCKOOLYSE-".to_string(),
            timeout_secs: 60,
            api_token: None,
            use_proxy: true,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            excluded_types: DEFAULT_EXCLUDED_TYPES.iter().map(|s| s.to_string()).collect(),
            office_extensions: DEFAULT_OFFICE_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for UnpackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            max_total_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            stderr: true,
            file: None,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration from an explicitly requested file.
///
/// Unlike [`load_config`], a missing or malformed file is an error: the
/// operator asked for this file, so silently using defaults would submit to
/// the wrong sandbox.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| CuckooError::io(path, e))?;
    toml::from_str::<Config>(&contents).map_err(|e| CuckooError::InvalidConfig {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Where the active configuration came from.
///
/// Config is loaded before logging is set up, so the outcome is kept and
/// reported with [`ConfigSource::log`] once a subscriber exists.
#[derive(Debug)]
pub enum ConfigSource {
    /// Loaded from this file.
    File(PathBuf),
    /// No config file was found.
    Defaults,
    /// A config file exists but could not be used; defaults are active.
    Rejected { path: PathBuf, error: CuckooError },
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => {
                tracing::info!(path = %path.display(), "Loaded config");
            }
            ConfigSource::Defaults => tracing::debug!("No config file, using defaults"),
            ConfigSource::Rejected { path, error } => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "Failed to load config, using defaults"
                );
            }
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Falls back to the default configuration if no file is found or on parse
/// error; the returned [`ConfigSource`] says which happened.
pub fn load_config() -> (Config, ConfigSource) {
    load_config_or_default(config_file_path())
}

fn load_config_or_default(path: Option<PathBuf>) -> (Config, ConfigSource) {
    let Some(path) = path.filter(|p| p.exists()) else {
        return (Config::default(), ConfigSource::Defaults);
    };
    match load_config_from(&path) {
        Ok(cfg) => (cfg, ConfigSource::File(path)),
        Err(error) => (Config::default(), ConfigSource::Rejected { path, error }),
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    // 1. Environment variable override
    if let Ok(env_path) = std::env::var("CUCKOOLYSE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 2. Standard config directory
    dirs::config_dir().map(|d| d.join("cuckoolyse").join("config.toml"))
}

/// Return the cache directory used for the default log file.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cuckoolyse")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    match config.logging.file {
        Some(ref file) => file.clone(),
        None => cache_dir().join("cuckoolyse.log"),
    }
}
