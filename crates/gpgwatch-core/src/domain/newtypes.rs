//! Type-safe wrappers for remote folder references
//!
//! - [`DropboxPath`] - a normalized POSIX-like folder path (`/`, `/Encrypted`)
//! - [`DriveFolderId`] - an opaque Google Drive folder identifier
//! - [`FolderRef`] - the destination folder handed to a cloud uploader
//! - [`RemoteLocator`] - what a backend reports back after a successful upload

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// DropboxPath
// ============================================================================

/// A Dropbox folder path
///
/// Always starts with `/` and never ends with `/` unless it is the root.
/// Construction normalizes rather than rejects: `"Encrypted/"` becomes
/// `"/Encrypted"` and an empty string becomes the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DropboxPath(String);

impl DropboxPath {
    /// Normalizes and validates a folder path
    ///
    /// # Errors
    /// Returns error if the path contains empty segments (`//`) or `..`
    pub fn new(path: impl AsRef<str>) -> Result<Self, DomainError> {
        let raw = path.as_ref().trim();

        let mut normalized = if raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/{raw}")
        };

        while normalized.len() > 1 && normalized.ends_with('/') {
            normalized.pop();
        }

        if normalized.len() > 1 && normalized.contains("//") {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path contains empty segments: {raw}"
            )));
        }

        if normalized.split('/').any(|segment| segment == "..") {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path contains invalid traversal: {raw}"
            )));
        }

        Ok(Self(normalized))
    }

    /// The root folder `/`
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns true for `/`
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds the full path of a file named `name` inside this folder
    ///
    /// # Errors
    /// Returns error if `name` is empty or contains a `/`
    pub fn join(&self, name: &str) -> Result<String, DomainError> {
        if name.is_empty() || name.contains('/') || name == ".." {
            return Err(DomainError::InvalidRemotePath(format!(
                "Invalid path component: {name}"
            )));
        }

        if self.is_root() {
            Ok(format!("/{name}"))
        } else {
            Ok(format!("{}/{name}", self.0))
        }
    }
}

impl Default for DropboxPath {
    fn default() -> Self {
        Self::root()
    }
}

impl Display for DropboxPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DropboxPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DropboxPath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DropboxPath> for String {
    fn from(path: DropboxPath) -> Self {
        path.0
    }
}

// ============================================================================
// DriveFolderId
// ============================================================================

/// Opaque Google Drive folder identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DriveFolderId(String);

impl DriveFolderId {
    /// # Errors
    /// Returns error if the ID is empty or contains `/` or whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidFolderId(
                "Folder ID cannot be empty".to_string(),
            ));
        }
        if id.contains('/') || id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidFolderId(format!(
                "Folder ID contains invalid characters: {id}"
            )));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DriveFolderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DriveFolderId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DriveFolderId> for String {
    fn from(id: DriveFolderId) -> Self {
        id.0
    }
}

// ============================================================================
// FolderRef / RemoteLocator
// ============================================================================

/// Destination folder on a cloud backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderRef {
    /// Google Drive folder; `None` means "My Drive" root
    Drive(Option<DriveFolderId>),
    /// Dropbox folder path
    Dropbox(DropboxPath),
}

impl FolderRef {
    /// Returns true when the reference points to the backend's root
    #[must_use]
    pub fn is_root(&self) -> bool {
        match self {
            FolderRef::Drive(id) => id.is_none(),
            FolderRef::Dropbox(path) => path.is_root(),
        }
    }
}

impl Display for FolderRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FolderRef::Drive(Some(id)) => write!(f, "drive:{id}"),
            FolderRef::Drive(None) => write!(f, "drive:root"),
            FolderRef::Dropbox(path) => write!(f, "dropbox:{path}"),
        }
    }
}

/// Identifies an object after a confirmed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLocator {
    /// Backend-specific identifier (Drive file ID, Dropbox path)
    pub id: String,
    /// Human-friendly location (web link, display path), if the backend returned one
    pub display: Option<String>,
}

impl Display for RemoteLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.display {
            Some(display) => write!(f, "{} ({})", self.id, display),
            None => write!(f, "{}", self.id),
        }
    }
}
