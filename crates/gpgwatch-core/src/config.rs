//! Configuration module for gpgwatch.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, `~` expansion, validation, destination resolution and a builder
//! for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::destination::{CloudBackend, Destination, DEFAULT_MAX_COLLISION_ATTEMPTS};
use crate::domain::newtypes::{DriveFolderId, DropboxPath};

/// Directory name used under the platform config directory.
pub const APP_DIR_NAME: &str = "gpgwatch";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Google Drive and Dropbox cannot both be enabled; choose one destination")]
    MultipleDestinations,

    #[error("Missing required setting: {0}")]
    MissingField(String),

    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for gpgwatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gpg: GpgConfig,
    pub watch: WatchConfig,
    pub destination: DestinationConfig,
    pub google_drive: GoogleDriveConfig,
    pub dropbox: DropboxConfig,
    pub logging: LoggingConfig,
}

/// GPG settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpgConfig {
    /// Recipient: user ID substring, key ID or fingerprint.
    pub key_id: String,
    /// GnuPG home directory; `None` uses gpg's default.
    pub home: Option<PathBuf>,
    /// gpg executable name or path.
    pub binary: String,
}

/// Watched directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory watched (non-recursively) for new files.
    pub directory: PathBuf,
    /// Allowed extensions such as `.csv`; `None` accepts every file.
    pub file_extensions: Option<Vec<String>>,
    /// Milliseconds to wait after a file appears before reading it.
    pub settle_delay_ms: u64,
    /// Delete the plaintext once the destination step was attempted.
    pub delete_original: bool,
}

/// Local destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// Directory receiving artifacts when no cloud backend is enabled.
    pub directory: PathBuf,
    /// Maximum `<name>.N.gpg` candidates tried on collision.
    pub max_collision_attempts: u32,
}

/// Where OAuth tokens are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    #[default]
    File,
    Keyring,
}

/// Google Drive settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleDriveConfig {
    pub enabled: bool,
    /// Target folder; `None` uploads to the root of "My Drive".
    pub folder_id: Option<DriveFolderId>,
    /// OAuth client secrets JSON downloaded from the Google console.
    pub credentials_file: Option<PathBuf>,
    /// Token cache; defaults to `<config dir>/gpgwatch/gdrive_token.json`.
    pub token_file: Option<PathBuf>,
    pub token_storage: TokenStorage,
}

/// Dropbox settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DropboxConfig {
    pub enabled: bool,
    pub access_token: Option<String>,
    pub folder_path: DropboxPath,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error` (case-insensitive).
    pub level: String,
    /// Optional log file, written at DEBUG level without colors.
    pub file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for GpgConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            home: None,
            binary: "gpg".to_string(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            file_extensions: None,
            settle_delay_ms: 500,
            delete_original: true,
        }
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            max_collision_attempts: DEFAULT_MAX_COLLISION_ATTEMPTS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl GoogleDriveConfig {
    /// Token file path, falling back to the default location.
    pub fn token_path(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("~/.config"))
                .join(APP_DIR_NAME)
                .join("gdrive_token.json")
        })
    }
}

impl LoggingConfig {
    /// Canonical tracing level name, or `None` if the configured level is unknown.
    ///
    /// Accepts `warning` and `critical` as aliases for `warn` and `error`.
    pub fn normalized_level(&self) -> Option<&'static str> {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" => Some("trace"),
            "debug" => Some("debug"),
            "info" => Some("info"),
            "warn" | "warning" => Some("warn"),
            "error" | "critical" => Some("error"),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    ///
    /// `~` is expanded in every path setting and file extensions are
    /// normalized to lowercase with a leading dot.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path = expand_tilde(path);
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/gpgwatch/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join(APP_DIR_NAME)
            .join("config.yaml")
    }

    /// Expand `~` in paths and normalize extension spellings.
    pub fn normalize(&mut self) {
        self.gpg.home = self.gpg.home.as_deref().map(expand_tilde);
        self.watch.directory = expand_tilde(&self.watch.directory);
        self.destination.directory = expand_tilde(&self.destination.directory);
        self.google_drive.credentials_file =
            self.google_drive.credentials_file.as_deref().map(expand_tilde);
        self.google_drive.token_file = self.google_drive.token_file.as_deref().map(expand_tilde);
        self.logging.file = self.logging.file.as_deref().map(expand_tilde);

        if let Some(extensions) = self.watch.file_extensions.as_mut() {
            *extensions = extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .filter(|ext| ext.len() > 1)
                .collect();
        }
    }

    /// Enable exactly one cloud backend, disabling the other.
    pub fn select_backend(&mut self, backend: CloudBackend) {
        match backend {
            CloudBackend::GoogleDrive => {
                self.google_drive.enabled = true;
                self.dropbox.enabled = false;
            }
            CloudBackend::Dropbox => {
                self.dropbox.enabled = true;
                self.google_drive.enabled = false;
            }
        }
    }

    /// Resolve the single destination for this run.
    ///
    /// No enabled backend means the local directory.
    pub fn destination(&self) -> Result<Destination, ConfigError> {
        match (self.google_drive.enabled, self.dropbox.enabled) {
            (true, true) => Err(ConfigError::MultipleDestinations),
            (true, false) => {
                if self.google_drive.credentials_file.is_none() {
                    return Err(ConfigError::MissingField(
                        "google_drive.credentials_file".into(),
                    ));
                }
                Ok(Destination::GoogleDrive {
                    folder: self.google_drive.folder_id.clone(),
                })
            }
            (false, true) => {
                let has_token = self
                    .dropbox
                    .access_token
                    .as_deref()
                    .is_some_and(|t| !t.trim().is_empty());
                if !has_token {
                    return Err(ConfigError::MissingField("dropbox.access_token".into()));
                }
                Ok(Destination::Dropbox {
                    folder: self.dropbox.folder_path.clone(),
                })
            }
            (false, false) => {
                if self.destination.directory.as_os_str().is_empty() {
                    return Err(ConfigError::MissingField("destination.directory".into()));
                }
                Ok(Destination::Local {
                    directory: self.destination.directory.clone(),
                    max_collision_attempts: self.destination.max_collision_attempts,
                })
            }
        }
    }

    /// Validate and resolve in one step, failing with every problem found.
    pub fn validated_destination(&self) -> Result<Destination, ConfigError> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        self.destination()
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// `CSV` -> `.csv`, `.Txt` -> `.txt`
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"watch.directory"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn check_directory(errors: &mut Vec<ValidationError>, field: &str, dir: &Path) {
    if dir.as_os_str().is_empty() {
        errors.push(ValidationError {
            field: field.into(),
            message: "is required".into(),
        });
    } else if !dir.exists() {
        errors.push(ValidationError {
            field: field.into(),
            message: format!("directory does not exist: {}", dir.display()),
        });
    } else if !dir.is_dir() {
        errors.push(ValidationError {
            field: field.into(),
            message: format!("path is not a directory: {}", dir.display()),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- gpg ---
        if self.gpg.key_id.trim().is_empty() {
            errors.push(ValidationError {
                field: "gpg.key_id".into(),
                message: "is required".into(),
            });
        }
        if self.gpg.binary.trim().is_empty() {
            errors.push(ValidationError {
                field: "gpg.binary".into(),
                message: "must not be empty".into(),
            });
        }
        if let Some(home) = &self.gpg.home {
            if !home.exists() {
                errors.push(ValidationError {
                    field: "gpg.home".into(),
                    message: format!("GPG home directory does not exist: {}", home.display()),
                });
            }
        }

        // --- watch ---
        check_directory(&mut errors, "watch.directory", &self.watch.directory);
        if let Some(extensions) = &self.watch.file_extensions {
            if extensions.iter().any(|ext| ext.trim_start_matches('.').is_empty()) {
                errors.push(ValidationError {
                    field: "watch.file_extensions".into(),
                    message: "entries must not be empty".into(),
                });
            }
        }

        // --- destination ---
        let local = !self.google_drive.enabled && !self.dropbox.enabled;
        if local || !self.destination.directory.as_os_str().is_empty() {
            check_directory(&mut errors, "destination.directory", &self.destination.directory);
        }
        if self.destination.max_collision_attempts == 0 {
            errors.push(ValidationError {
                field: "destination.max_collision_attempts".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- cloud backends ---
        if self.google_drive.enabled && self.dropbox.enabled {
            errors.push(ValidationError {
                field: "google_drive.enabled".into(),
                message: "cannot be enabled together with dropbox.enabled".into(),
            });
        }
        if self.google_drive.enabled {
            match &self.google_drive.credentials_file {
                None => errors.push(ValidationError {
                    field: "google_drive.credentials_file".into(),
                    message: "is required when Google Drive is enabled".into(),
                }),
                Some(file) if !file.is_file() => errors.push(ValidationError {
                    field: "google_drive.credentials_file".into(),
                    message: format!("file does not exist: {}", file.display()),
                }),
                Some(_) => {}
            }
        }
        if self.dropbox.enabled
            && self
                .dropbox
                .access_token
                .as_deref()
                .map_or(true, |t| t.trim().is_empty())
        {
            errors.push(ValidationError {
                field: "dropbox.access_token".into(),
                message: "is required when Dropbox is enabled".into(),
            });
        }

        // --- logging ---
        if self.logging.normalized_level().is_none() {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use gpgwatch_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .gpg_key_id("alice@example.com")
///     .watch_directory(PathBuf::from("/home/alice/Inbox"))
///     .destination_directory(PathBuf::from("/home/alice/Encrypted"))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- gpg ---

    pub fn gpg_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.config.gpg.key_id = key_id.into();
        self
    }

    pub fn gpg_home(mut self, home: PathBuf) -> Self {
        self.config.gpg.home = Some(home);
        self
    }

    pub fn gpg_binary(mut self, binary: impl Into<String>) -> Self {
        self.config.gpg.binary = binary.into();
        self
    }

    // --- watch ---

    pub fn watch_directory(mut self, directory: PathBuf) -> Self {
        self.config.watch.directory = directory;
        self
    }

    pub fn file_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.watch.file_extensions = Some(
            extensions
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .collect(),
        );
        self
    }

    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.config.watch.settle_delay_ms = ms;
        self
    }

    pub fn delete_original(mut self, delete: bool) -> Self {
        self.config.watch.delete_original = delete;
        self
    }

    // --- destination ---

    pub fn destination_directory(mut self, directory: PathBuf) -> Self {
        self.config.destination.directory = directory;
        self
    }

    pub fn max_collision_attempts(mut self, n: u32) -> Self {
        self.config.destination.max_collision_attempts = n;
        self
    }

    // --- google_drive ---

    pub fn google_drive(mut self, credentials_file: PathBuf, folder_id: Option<DriveFolderId>) -> Self {
        self.config.google_drive.enabled = true;
        self.config.google_drive.credentials_file = Some(credentials_file);
        self.config.google_drive.folder_id = folder_id;
        self
    }

    pub fn google_drive_token_storage(mut self, storage: TokenStorage) -> Self {
        self.config.google_drive.token_storage = storage;
        self
    }

    // --- dropbox ---

    pub fn dropbox(mut self, access_token: impl Into<String>, folder_path: DropboxPath) -> Self {
        self.config.dropbox.enabled = true;
        self.config.dropbox.access_token = Some(access_token.into());
        self.config.dropbox.folder_path = folder_path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = Some(file);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
