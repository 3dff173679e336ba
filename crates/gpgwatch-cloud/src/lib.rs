//! gpgwatch Cloud - Google Drive and Dropbox upload clients
//!
//! Provides async clients for:
//! - Google Drive v3 (OAuth2 installed-app flow with PKCE, multipart and
//!   resumable uploads, folder verification)
//! - Dropbox v2 (single-call uploads and chunked upload sessions, folder
//!   verification with auto-create)
//!
//! ## Modules
//!
//! - [`auth`] - Google OAuth2 flow components and token storage
//! - [`gdrive`] - Google Drive uploader
//! - [`dropbox`] - Dropbox uploader and upload-session planner

pub mod auth;
pub mod dropbox;
pub mod gdrive;

use std::sync::Arc;

use anyhow::Context;
use gpgwatch_core::config::Config;
use gpgwatch_core::domain::CloudBackend;
use gpgwatch_core::ports::ICloudUploader;
use reqwest::StatusCode;
use thiserror::Error;

pub use dropbox::DropboxClient;
pub use gdrive::GoogleDriveClient;

/// Errors returned by the cloud storage HTTP APIs
#[derive(Debug, Error)]
pub enum CloudError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request conflicts with remote state (Dropbox path errors)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded
    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Any other unexpected HTTP status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A chunked upload session ended at the wrong offset
    #[error("Upload session offset mismatch: sent {sent} of {expected} bytes")]
    OffsetMismatch { sent: u64, expected: u64 },

    /// No session established; `authenticate` must run first
    #[error("Not authenticated")]
    NotAuthenticated,
}

impl CloudError {
    /// Classifies a non-success HTTP response
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => CloudError::Unauthorized(body),
            StatusCode::FORBIDDEN => CloudError::Forbidden(body),
            StatusCode::NOT_FOUND => CloudError::NotFound(body),
            StatusCode::CONFLICT => CloudError::Conflict(body),
            StatusCode::TOO_MANY_REQUESTS => CloudError::TooManyRequests(body),
            s if s.is_server_error() => CloudError::ServerError(body),
            s => CloudError::Http {
                status: s.as_u16(),
                body,
            },
        }
    }

    /// Reads the body of a failed response and classifies it
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_string());
        Self::from_status(status, body)
    }
}

/// Builds the uploader for `backend` from configuration
///
/// The returned uploader is not yet authenticated.
pub fn uploader_for(backend: CloudBackend, config: &Config) -> anyhow::Result<Arc<dyn ICloudUploader>> {
    match backend {
        CloudBackend::GoogleDrive => {
            let credentials = config
                .google_drive
                .credentials_file
                .as_deref()
                .context("google_drive.credentials_file is not set")?;
            let secrets = auth::ClientSecrets::from_file(credentials)?;
            let store = auth::TokenStore::from_config(&config.google_drive);
            let authenticator = auth::GoogleAuthenticator::new(secrets, store);
            Ok(Arc::new(GoogleDriveClient::new(authenticator)))
        }
        CloudBackend::Dropbox => {
            let token = config
                .dropbox
                .access_token
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .context("dropbox.access_token is not set")?;
            Ok(Arc::new(DropboxClient::new(token)))
        }
    }
}
