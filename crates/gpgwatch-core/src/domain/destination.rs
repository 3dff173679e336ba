//! Destination selection
//!
//! A run routes every artifact to exactly one [`Destination`], resolved once
//! from configuration before the watcher starts.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::newtypes::{DriveFolderId, DropboxPath, FolderRef};

/// Default cap on `<name>.N.gpg` candidates tried by the local mover
pub const DEFAULT_MAX_COLLISION_ATTEMPTS: u32 = 10_000;

/// Cloud storage backends an artifact can be uploaded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudBackend {
    GoogleDrive,
    Dropbox,
}

impl CloudBackend {
    /// Human-readable backend name
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            CloudBackend::GoogleDrive => "Google Drive",
            CloudBackend::Dropbox => "Dropbox",
        }
    }
}

impl fmt::Display for CloudBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Where encrypted artifacts end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Move into a local directory, resolving name collisions
    Local {
        directory: PathBuf,
        max_collision_attempts: u32,
    },
    /// Upload to Google Drive; `None` uploads to the root of "My Drive"
    GoogleDrive { folder: Option<DriveFolderId> },
    /// Upload to a Dropbox folder
    Dropbox { folder: DropboxPath },
}

impl Destination {
    /// Cloud backend for this destination, `None` for local
    #[must_use]
    pub fn backend(&self) -> Option<CloudBackend> {
        match self {
            Destination::Local { .. } => None,
            Destination::GoogleDrive { .. } => Some(CloudBackend::GoogleDrive),
            Destination::Dropbox { .. } => Some(CloudBackend::Dropbox),
        }
    }

    /// Remote folder reference handed to the uploader, `None` for local
    #[must_use]
    pub fn folder_ref(&self) -> Option<FolderRef> {
        match self {
            Destination::Local { .. } => None,
            Destination::GoogleDrive { folder } => Some(FolderRef::Drive(folder.clone())),
            Destination::Dropbox { folder } => Some(FolderRef::Dropbox(folder.clone())),
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Destination::Local { .. })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Local { directory, .. } => write!(f, "local:{}", directory.display()),
            Destination::GoogleDrive { folder: Some(id) } => write!(f, "Google Drive folder {id}"),
            Destination::GoogleDrive { folder: None } => write!(f, "Google Drive root"),
            Destination::Dropbox { folder } => write!(f, "Dropbox {folder}"),
        }
    }
}
