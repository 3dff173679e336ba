//! Source file -> `.gpg` artifact beside it

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gpgwatch_core::domain::{DomainError, EncryptedArtifact};
use gpgwatch_core::ports::IEncryptionEngine;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum EncryptionFailure {
    /// The engine ran but refused to encrypt
    #[error("GPG encryption failed: {status}")]
    Rejected { status: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine could not be run at all
    #[error("Encryption engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    InvalidSource(#[from] DomainError),
}

/// Encrypts whole files for one recipient with always-trust semantics
#[derive(Clone)]
pub struct Encryptor {
    engine: Arc<dyn IEncryptionEngine>,
    recipient: String,
}

impl Encryptor {
    pub fn new(engine: Arc<dyn IEncryptionEngine>, recipient: impl Into<String>) -> Self {
        Self {
            engine,
            recipient: recipient.into(),
        }
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Reads `source`, encrypts it, and writes `<source>.gpg`
    ///
    /// Nothing is written unless the engine reports success. A failed write
    /// removes whatever part of the artifact reached the disk.
    pub async fn encrypt(&self, source: &Path) -> Result<EncryptedArtifact, EncryptionFailure> {
        let artifact = EncryptedArtifact::for_source(source)?;
        info!(path = %source.display(), "Encrypting file");

        let plaintext = tokio::fs::read(source).await.map_err(|e| EncryptionFailure::Io {
            path: source.to_path_buf(),
            source: e,
        })?;

        let output = self
            .engine
            .encrypt(&plaintext, &self.recipient, true)
            .await
            .map_err(|e| EncryptionFailure::Engine(format!("{e:#}")))?;

        if !output.ok {
            return Err(EncryptionFailure::Rejected {
                status: output.status,
            });
        }

        if let Err(e) = tokio::fs::write(artifact.path(), &output.data).await {
            if let Err(cleanup) = tokio::fs::remove_file(artifact.path()).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %artifact.path().display(), error = %cleanup, "Failed to remove partial artifact");
                }
            }
            return Err(EncryptionFailure::Io {
                path: artifact.path().to_path_buf(),
                source: e,
            });
        }

        info!(path = %artifact.path().display(), bytes = output.data.len(), "File encrypted successfully");
        Ok(artifact)
    }
}
