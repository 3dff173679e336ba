//! Local destination: move artifacts into a directory without overwriting
//!
//! The artifact keeps its `<name>.gpg` name unless that is taken, in which
//! case `<name>.1.gpg`, `<name>.2.gpg`, ... are tried in order up to a cap.
//!
//! Placement never replaces an existing file: the artifact is hard-linked (or
//! copied with `create_new`) to its target before the old name is removed.
//! A name claimed after it was resolved sends the move back to resolution.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use gpgwatch_core::domain::{
    artifact_file_name, numbered_artifact_name, EncryptedArtifact, DEFAULT_MAX_COLLISION_ATTEMPTS,
};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("No free name for {name} in {directory} after {attempts} numbered candidates")]
    CollisionsExhausted {
        name: String,
        directory: PathBuf,
        attempts: u32,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct LocalMover {
    directory: PathBuf,
    max_attempts: u32,
}

impl LocalMover {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_max_attempts(directory, DEFAULT_MAX_COLLISION_ATTEMPTS)
    }

    pub fn with_max_attempts(directory: impl Into<PathBuf>, max_attempts: u32) -> Self {
        Self {
            directory: directory.into(),
            max_attempts,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// First free name for `source_name` in the destination directory
    pub async fn resolve_target(&self, source_name: &str) -> Result<PathBuf, MoveError> {
        let primary = self.directory.join(artifact_file_name(source_name));
        if !self.is_taken(&primary).await {
            return Ok(primary);
        }

        for n in 1..=self.max_attempts {
            let candidate = self.directory.join(numbered_artifact_name(source_name, n));
            if !self.is_taken(&candidate).await {
                warn!(target = %candidate.display(), "File exists at destination, using numbered name");
                return Ok(candidate);
            }
        }

        Err(MoveError::CollisionsExhausted {
            name: artifact_file_name(source_name),
            directory: self.directory.clone(),
            attempts: self.max_attempts,
        })
    }

    /// Moves `artifact` into the destination directory and returns its new path
    ///
    /// On failure the artifact is left where it was.
    pub async fn move_artifact(&self, artifact: &EncryptedArtifact) -> Result<PathBuf, MoveError> {
        let from = artifact.path();

        for _ in 0..=self.max_attempts {
            let target = self.resolve_target(artifact.source_name()).await?;
            match place(from, &target).await {
                Ok(()) => {
                    info!(path = %target.display(), "Moved encrypted file to destination");
                    return Ok(target);
                }
                Err(MoveError::Io { source, .. }) if source.kind() == ErrorKind::AlreadyExists => {
                    debug!(target = %target.display(), "Destination name was taken, resolving again");
                }
                Err(e) => return Err(e),
            }
        }

        Err(MoveError::CollisionsExhausted {
            name: artifact_file_name(artifact.source_name()),
            directory: self.directory.clone(),
            attempts: self.max_attempts,
        })
    }

    /// Treats stat errors other than "not found" as taken, so they are never
    /// overwritten
    async fn is_taken(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(true)
    }
}

/// Gives `from` the new name `to`, failing with `AlreadyExists` if `to` exists
///
/// Uses a hard link when the filesystem allows it and falls back to copying
/// otherwise (other devices, filesystems without links).
async fn place(from: &Path, to: &Path) -> Result<(), MoveError> {
    let io_err = |source| MoveError::Io {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match tokio::fs::hard_link(from, to).await {
        Ok(()) => {
            if let Err(e) = tokio::fs::remove_file(from).await {
                let _ = tokio::fs::remove_file(to).await;
                return Err(io_err(e));
            }
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(io_err(e)),
        Err(e) => {
            debug!(from = %from.display(), to = %to.display(), error = %e, "Hard link unavailable, copying");
            copy_then_remove(from, to).await
        }
    }
}

/// Copies into a newly created `to`, then removes `from`
///
/// `to` is opened with `create_new`, so an existing file is never replaced.
/// A failed copy removes the partial target and keeps `from`.
async fn copy_then_remove(from: &Path, to: &Path) -> Result<(), MoveError> {
    let io_err = |source| MoveError::Io {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let data = tokio::fs::read(from).await.map_err(io_err)?;
    let written = async {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(to)
            .await?;
        file.write_all(&data).await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        if e.kind() != ErrorKind::AlreadyExists {
            let _ = tokio::fs::remove_file(to).await;
        }
        return Err(io_err(e));
    }

    tokio::fs::remove_file(from).await.map_err(io_err)
}
