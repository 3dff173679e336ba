//! Watched entries and encrypted artifacts
//!
//! An artifact is always written beside its source as `<name>.gpg`; the local
//! mover may later rename it to `<name>.<N>.gpg` to avoid collisions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Suffix appended to every encrypted artifact
pub const ARTIFACT_SUFFIX: &str = ".gpg";

/// A filesystem entry reported by the watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEntry {
    path: PathBuf,
    extension: Option<String>,
}

impl WatchedEntry {
    /// Builds an entry, capturing the lowercase final suffix (with its dot)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()));
        Self { path, extension }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final suffix such as `.csv`, lowercased; `None` when the name has no dot
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }
}

/// A `.gpg` file produced by the encryptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedArtifact {
    path: PathBuf,
    source_name: String,
}

impl EncryptedArtifact {
    /// Describes the artifact that encrypting `source` produces
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidPath`] when `source` has no UTF-8 file name
    pub fn for_source(source: &Path) -> Result<Self, DomainError> {
        let source_name = source_file_name(source)?;
        Ok(Self {
            path: artifact_path_for(source),
            source_name,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the plaintext this artifact was produced from
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Artifact file name as created (`<sourceName>.gpg`)
    pub fn file_name(&self) -> String {
        artifact_file_name(&self.source_name)
    }
}

/// Returns the UTF-8 file name of `path`
///
/// # Errors
/// Returns [`DomainError::InvalidPath`] if the path has no file name component
/// or it is not valid UTF-8
pub fn source_file_name(path: &Path) -> Result<String, DomainError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| DomainError::InvalidPath(path.display().to_string()))
}

/// `report.csv` -> `report.csv.gpg` beside the source
pub fn artifact_path_for(source: &Path) -> PathBuf {
    let mut raw = source.as_os_str().to_os_string();
    raw.push(ARTIFACT_SUFFIX);
    PathBuf::from(raw)
}

/// `report.csv` -> `report.csv.gpg`
pub fn artifact_file_name(source_name: &str) -> String {
    format!("{source_name}{ARTIFACT_SUFFIX}")
}

/// `report.csv`, 2 -> `report.csv.2.gpg`
pub fn numbered_artifact_name(source_name: &str, n: u32) -> String {
    format!("{source_name}.{n}{ARTIFACT_SUFFIX}")
}
