//! Cloud uploader port (driven/secondary port)
//!
//! Google Drive and Dropbox implement the same contract: authenticate once,
//! make sure the target folder exists, then upload artifacts into it.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific; the pipeline turns any upload error into
//!   "upload failed, kept locally".
//! - Remote objects with the same name are overwritten.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::destination::CloudBackend;
use crate::domain::newtypes::{FolderRef, RemoteLocator};

/// Account the uploader authenticated as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Email address, when the backend reports one
    pub email: Option<String>,
    /// Display name
    pub display_name: String,
}

impl std::fmt::Display for AccountInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} <{}>", self.display_name, email),
            None => write!(f, "{}", self.display_name),
        }
    }
}

/// Uploads encrypted artifacts to a cloud backend
#[async_trait]
pub trait ICloudUploader: Send + Sync {
    /// Which backend this uploader talks to
    fn backend(&self) -> CloudBackend;

    /// Establishes (or restores) a session; must succeed before any upload
    async fn authenticate(&self) -> anyhow::Result<AccountInfo>;

    /// Returns true if `folder` is usable as an upload target
    ///
    /// Backends that address folders by path create a missing folder here.
    async fn verify_or_create_folder(&self, folder: &FolderRef) -> anyhow::Result<bool>;

    /// Uploads the file at `local_path` into `folder`, keeping its file name
    async fn upload(&self, local_path: &Path, folder: &FolderRef)
        -> anyhow::Result<RemoteLocator>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_display_includes_email() {
        let account = AccountInfo {
            email: Some("alice@example.com".to_string()),
            display_name: "Alice".to_string(),
        };
        assert_eq!(account.to_string(), "Alice <alice@example.com>");
    }
}
