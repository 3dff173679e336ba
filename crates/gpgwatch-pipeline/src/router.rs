//! Dispatches artifacts to the one destination chosen at startup

use std::path::PathBuf;
use std::sync::Arc;

use gpgwatch_core::domain::{CloudBackend, Destination, EncryptedArtifact, FolderRef, RemoteLocator};
use gpgwatch_core::ports::ICloudUploader;
use tracing::{error, info};

use crate::mover::{LocalMover, MoveError};

/// What happened to one artifact at its destination
#[derive(Debug)]
pub enum RouteResult {
    Moved(PathBuf),
    Uploaded {
        backend: CloudBackend,
        locator: RemoteLocator,
    },
    MoveFailed(MoveError),
    UploadFailed {
        backend: CloudBackend,
        error: anyhow::Error,
    },
}

enum Route {
    Local(LocalMover),
    Cloud {
        uploader: Arc<dyn ICloudUploader>,
        folder: FolderRef,
    },
}

/// Holds no per-file state; cheap to share behind an `Arc`
pub struct DestinationRouter {
    route: Route,
}

impl DestinationRouter {
    pub fn local(mover: LocalMover) -> Self {
        Self {
            route: Route::Local(mover),
        }
    }

    pub fn cloud(uploader: Arc<dyn ICloudUploader>, folder: FolderRef) -> Self {
        Self {
            route: Route::Cloud { uploader, folder },
        }
    }

    /// Builds the router for `destination`
    ///
    /// Cloud destinations need the uploader for their backend.
    pub fn for_destination(
        destination: &Destination,
        uploader: Option<Arc<dyn ICloudUploader>>,
    ) -> anyhow::Result<Self> {
        match (destination, destination.folder_ref(), uploader) {
            (
                Destination::Local {
                    directory,
                    max_collision_attempts,
                },
                _,
                _,
            ) => Ok(Self::local(LocalMover::with_max_attempts(
                directory.clone(),
                *max_collision_attempts,
            ))),
            (_, Some(folder), Some(uploader)) => {
                if Some(uploader.backend()) != destination.backend() {
                    anyhow::bail!(
                        "uploader for {} cannot serve destination {}",
                        uploader.backend(),
                        destination
                    );
                }
                Ok(Self::cloud(uploader, folder))
            }
            (_, _, None) => anyhow::bail!("destination {destination} needs a cloud uploader"),
            (_, None, Some(_)) => anyhow::bail!("destination {destination} has no remote folder"),
        }
    }

    pub fn backend(&self) -> Option<CloudBackend> {
        match &self.route {
            Route::Local(_) => None,
            Route::Cloud { uploader, .. } => Some(uploader.backend()),
        }
    }

    pub fn describe(&self) -> String {
        match &self.route {
            Route::Local(mover) => format!("local:{}", mover.directory().display()),
            Route::Cloud { uploader, folder } => format!("{} {}", uploader.backend(), folder),
        }
    }

    pub async fn route(&self, artifact: &EncryptedArtifact) -> RouteResult {
        match &self.route {
            Route::Local(mover) => match mover.move_artifact(artifact).await {
                Ok(path) => RouteResult::Moved(path),
                Err(e) => {
                    error!(artifact = %artifact.path().display(), error = %e, "Failed to move encrypted file to destination");
                    RouteResult::MoveFailed(e)
                }
            },
            Route::Cloud { uploader, folder } => {
                let backend = uploader.backend();
                info!(file = %artifact.file_name(), %backend, "Uploading encrypted file");
                match uploader.upload(artifact.path(), folder).await {
                    Ok(locator) => RouteResult::Uploaded { backend, locator },
                    Err(error) => {
                        let detail = format!("{error:#}");
                        error!(artifact = %artifact.path().display(), %backend, error = %detail, "Upload failed");
                        RouteResult::UploadFailed { backend, error }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gpgwatch_core::domain::{DriveFolderId, DropboxPath};
    use gpgwatch_core::ports::AccountInfo;
    use std::path::Path;

    struct FixedUploader(CloudBackend, bool);

    #[async_trait]
    impl ICloudUploader for FixedUploader {
        fn backend(&self) -> CloudBackend {
            self.0
        }

        async fn authenticate(&self) -> anyhow::Result<AccountInfo> {
            Ok(AccountInfo {
                email: None,
                display_name: "t".into(),
            })
        }

        async fn verify_or_create_folder(&self, _: &FolderRef) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn upload(&self, local_path: &Path, _: &FolderRef) -> anyhow::Result<RemoteLocator> {
            if self.1 {
                Ok(RemoteLocator {
                    id: local_path.display().to_string(),
                    display: None,
                })
            } else {
                anyhow::bail!("network down")
            }
        }
    }

    fn dropbox() -> Destination {
        Destination::Dropbox {
            folder: DropboxPath::root(),
        }
    }

    #[test]
    fn cloud_destination_requires_uploader() {
        assert!(DestinationRouter::for_destination(&dropbox(), None).is_err());
    }

    #[test]
    fn uploader_backend_must_match() {
        let drive = Arc::new(FixedUploader(CloudBackend::GoogleDrive, true));
        assert!(DestinationRouter::for_destination(&dropbox(), Some(drive.clone())).is_err());

        let dest = Destination::GoogleDrive {
            folder: Some(DriveFolderId::new("abc").unwrap()),
        };
        let router = DestinationRouter::for_destination(&dest, Some(drive)).unwrap();
        assert_eq!(router.backend(), Some(CloudBackend::GoogleDrive));
        assert_eq!(router.describe(), "Google Drive drive:abc");
    }

    #[tokio::test]
    async fn local_route_moves() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let artifact = EncryptedArtifact::for_source(&src.path().join("a.txt")).unwrap();
        std::fs::write(artifact.path(), b"c").unwrap();

        let destination = Destination::Local {
            directory: dest.path().to_path_buf(),
            max_collision_attempts: 5,
        };
        let router = DestinationRouter::for_destination(&destination, None).unwrap();
        assert!(router.backend().is_none());

        match router.route(&artifact).await {
            RouteResult::Moved(path) => assert_eq!(path, dest.path().join("a.txt.gpg")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_failure_is_reported_not_raised() {
        let router = DestinationRouter::cloud(
            Arc::new(FixedUploader(CloudBackend::Dropbox, false)),
            FolderRef::Dropbox(DropboxPath::root()),
        );
        let artifact = EncryptedArtifact::for_source(Path::new("/in/a.txt")).unwrap();

        match router.route(&artifact).await {
            RouteResult::UploadFailed { backend, error } => {
                assert_eq!(backend, CloudBackend::Dropbox);
                assert!(error.to_string().contains("network down"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
