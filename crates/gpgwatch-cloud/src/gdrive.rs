//! Google Drive v3 uploader
//!
//! Uploads replace an existing file of the same name in the target folder
//! (looked up with a `files.list` query), so re-encrypting a source keeps one
//! remote copy. Payloads up to [`MULTIPART_LIMIT`] are sent in a single
//! `multipart/related` request; larger payloads use a resumable session
//! with chunks that are multiples of 256 KiB.
//!
//! ## Google Drive API References
//!
//! - [Upload file data](https://developers.google.com/drive/api/guides/manage-uploads)
//! - [files.list search](https://developers.google.com/drive/api/guides/search-files)

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use gpgwatch_core::domain::{source_file_name, CloudBackend, DriveFolderId, FolderRef, RemoteLocator};
use gpgwatch_core::ports::{AccountInfo, ICloudUploader};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::{GoogleAuthenticator, Tokens, REFRESH_MARGIN_SECS};
use crate::CloudError;

/// Metadata API base
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Media upload API base
pub const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Largest payload sent as one multipart request: 5 MiB
pub const MULTIPART_LIMIT: u64 = 5 * 1024 * 1024;

/// Resumable chunks must be multiples of this size
pub const CHUNK_GRANULARITY: u64 = 256 * 1024;

/// Default resumable chunk size: 8 MiB
pub const RESUMABLE_CHUNK_SIZE: u64 = 32 * CHUNK_GRANULARITY;

const ARTIFACT_MIME_TYPE: &str = "application/pgp-encrypted";
const MULTIPART_BOUNDARY: &str = "gpgwatch_upload_boundary";
const FILE_FIELDS: &str = "id,name,webViewLink";

// ============================================================================
// Drive API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveUser {
    display_name: String,
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct About {
    user: DriveUser,
}

/// File resource fields requested by this client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub trashed: bool,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Escapes a value for use inside a single-quoted `files.list` query string
fn quote_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Builds the query finding a live file called `name` under `parent`
pub fn name_query(name: &str, parent: Option<&DriveFolderId>) -> String {
    let parent = parent.map(DriveFolderId::as_str).unwrap_or("root");
    format!(
        "name = '{}' and '{}' in parents and trashed = false",
        quote_query_value(name),
        quote_query_value(parent)
    )
}

/// Rounds `chunk_size` down to a non-zero multiple of [`CHUNK_GRANULARITY`]
pub fn aligned_chunk_size(chunk_size: u64) -> u64 {
    (chunk_size / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY
}

/// `Content-Range` value for bytes `offset..offset + len` of `total`
pub fn content_range(offset: u64, len: u64, total: u64) -> String {
    if len == 0 {
        format!("bytes */{total}")
    } else {
        format!("bytes {}-{}/{}", offset, offset + len - 1, total)
    }
}

/// Next offset acknowledged by a `308 Resume Incomplete` `Range` header
///
/// A missing header means the server holds no bytes yet.
fn acknowledged_offset(range: Option<&str>) -> Result<u64, CloudError> {
    let Some(range) = range else {
        return Ok(0);
    };
    range
        .trim()
        .strip_prefix("bytes=")
        .and_then(|r| r.split('-').nth(1))
        .and_then(|end| end.parse::<u64>().ok())
        .map(|end| end + 1)
        .ok_or_else(|| CloudError::InvalidResponse(format!("malformed Range header: {range}")))
}

fn multipart_body(metadata: &serde_json::Value, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
             --{MULTIPART_BOUNDARY}\r\nContent-Type: {ARTIFACT_MIME_TYPE}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

// ============================================================================
// GoogleDriveClient
// ============================================================================

/// Google Drive uploader using an OAuth2 bearer token
pub struct GoogleDriveClient {
    client: Client,
    api_base: String,
    upload_base: String,
    authenticator: Option<GoogleAuthenticator>,
    /// Fixed token used instead of the OAuth flow
    static_token: Option<String>,
    /// Tokens from `authenticate`, renewed when they near expiry
    session: RwLock<Option<Tokens>>,
    refresh_margin: Duration,
    multipart_limit: u64,
    chunk_size: u64,
}

impl GoogleDriveClient {
    pub fn new(authenticator: GoogleAuthenticator) -> Self {
        Self::build(Some(authenticator), None)
    }

    /// Creates a client that authenticates with a pre-issued access token
    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self::build(None, Some(token.into()))
    }

    fn build(authenticator: Option<GoogleAuthenticator>, static_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            authenticator,
            static_token,
            session: RwLock::new(None),
            refresh_margin: Duration::seconds(REFRESH_MARGIN_SECS),
            multipart_limit: MULTIPART_LIMIT,
            chunk_size: RESUMABLE_CHUNK_SIZE,
        }
    }

    /// Points the client at custom endpoints (useful for testing)
    pub fn with_base_urls(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    /// Overrides the multipart limit and the resumable chunk size
    ///
    /// The chunk size is rounded down to a multiple of 256 KiB.
    pub fn with_limits(mut self, multipart_limit: u64, chunk_size: u64) -> Self {
        self.multipart_limit = multipart_limit;
        self.chunk_size = aligned_chunk_size(chunk_size);
        self
    }

    /// How long before expiry the access token is renewed
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Current access token, refreshed first if it expires within the margin
    ///
    /// Pre-issued tokens are never refreshed.
    async fn token(&self) -> Result<String, CloudError> {
        {
            let session = self.session.read().await;
            let tokens = session.as_ref().ok_or(CloudError::NotAuthenticated)?;
            if self.authenticator.is_none() || !tokens.expires_within(self.refresh_margin) {
                return Ok(tokens.access_token.clone());
            }
        }

        let mut session = self.session.write().await;
        let current = session.as_ref().ok_or(CloudError::NotAuthenticated)?;
        // another upload may have refreshed while we waited for the lock
        if !current.expires_within(self.refresh_margin) {
            return Ok(current.access_token.clone());
        }
        let Some(authenticator) = &self.authenticator else {
            return Ok(current.access_token.clone());
        };

        let fresh = authenticator
            .refresh(current)
            .await
            .map_err(|e| CloudError::Unauthorized(format!("token refresh failed: {e:#}")))?;
        debug!(expires_at = %fresh.expires_at, "Refreshed Google Drive access token");
        let token = fresh.access_token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    async fn about(&self, token: &str) -> Result<About, CloudError> {
        let response = self
            .client
            .get(format!("{}/about", self.api_base))
            .bearer_auth(token)
            .query(&[("fields", "user")])
            .send()
            .await?;
        json_or_error(response).await
    }

    /// Fetches folder metadata; `Ok(None)` when the ID does not exist
    pub async fn get_file(&self, id: &DriveFolderId) -> Result<Option<DriveFile>, CloudError> {
        let token = self.token().await?;
        let response = self
            .client
            .get(format!("{}/files/{}", self.api_base, id.as_str()))
            .bearer_auth(&token)
            .query(&[("fields", "id,name,mimeType,trashed")])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        json_or_error(response).await.map(Some)
    }

    /// Finds a live file called `name` directly under `parent`
    pub async fn find_by_name(
        &self,
        name: &str,
        parent: Option<&DriveFolderId>,
    ) -> Result<Option<DriveFile>, CloudError> {
        let token = self.token().await?;
        let query = name_query(name, parent);
        let response = self
            .client
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("spaces", "drive"),
            ])
            .send()
            .await?;
        let list: FileList = json_or_error(response).await?;
        Ok(list.files.into_iter().next())
    }

    /// Target URL for a create (`existing == None`) or an update
    fn media_url(&self, existing: Option<&str>) -> String {
        match existing {
            Some(id) => format!("{}/files/{}", self.upload_base, id),
            None => format!("{}/files", self.upload_base),
        }
    }

    fn metadata(name: &str, parent: Option<&DriveFolderId>, existing: Option<&str>) -> serde_json::Value {
        match (existing, parent) {
            (Some(_), _) => json!({ "name": name }),
            (None, Some(parent)) => json!({ "name": name, "parents": [parent.as_str()] }),
            (None, None) => json!({ "name": name }),
        }
    }

    async fn upload_multipart(
        &self,
        token: &str,
        data: Vec<u8>,
        metadata: &serde_json::Value,
        existing: Option<&str>,
    ) -> Result<DriveFile, CloudError> {
        let url = self.media_url(existing);
        let request = match existing {
            Some(_) => self.client.patch(url),
            None => self.client.post(url),
        };
        let response = request
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(multipart_body(metadata, &data))
            .send()
            .await?;
        json_or_error(response).await
    }

    async fn start_resumable(
        &self,
        token: &str,
        total: u64,
        metadata: &serde_json::Value,
        existing: Option<&str>,
    ) -> Result<String, CloudError> {
        let url = self.media_url(existing);
        let request = match existing {
            Some(_) => self.client.patch(url),
            None => self.client.post(url),
        };
        let response = request
            .bearer_auth(token)
            .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
            .header("X-Upload-Content-Type", ARTIFACT_MIME_TYPE)
            .header("X-Upload-Content-Length", total.to_string())
            .json(metadata)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CloudError::from_response(response).await);
        }
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| CloudError::InvalidResponse("resumable session has no Location header".into()))
    }

    /// Sends `file` to a resumable session in aligned chunks
    async fn upload_resumable(
        &self,
        token: &str,
        file: &mut tokio::fs::File,
        total: u64,
        metadata: &serde_json::Value,
        existing: Option<&str>,
    ) -> Result<DriveFile> {
        let session_url = self.start_resumable(token, total, metadata, existing).await?;
        info!(total, chunk_size = self.chunk_size, "Started Google Drive resumable upload");

        let mut offset = 0u64;
        loop {
            let len = self.chunk_size.min(total - offset);
            let chunk = read_chunk(file, len).await?;
            let response = self
                .client
                .put(&session_url)
                .bearer_auth(token)
                .header(header::CONTENT_RANGE, content_range(offset, len, total))
                .body(chunk)
                .send()
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    return Ok(json_or_error(response).await?);
                }
                StatusCode::PERMANENT_REDIRECT => {
                    let acknowledged = acknowledged_offset(
                        response
                            .headers()
                            .get(header::RANGE)
                            .and_then(|v| v.to_str().ok()),
                    )?;
                    if acknowledged != offset + len {
                        return Err(CloudError::OffsetMismatch {
                            sent: offset + len,
                            expected: acknowledged,
                        }
                        .into());
                    }
                    if acknowledged >= total {
                        return Err(CloudError::InvalidResponse(
                            "server still incomplete after the last chunk".into(),
                        )
                        .into());
                    }
                    debug!(acknowledged, total, "Resumable chunk accepted");
                    offset = acknowledged;
                }
                _ => return Err(CloudError::from_response(response).await.into()),
            }
        }
    }
}

async fn json_or_error<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, CloudError> {
    if !response.status().is_success() {
        return Err(CloudError::from_response(response).await);
    }
    response
        .json()
        .await
        .map_err(|e| CloudError::InvalidResponse(e.to_string()))
}

async fn read_chunk(file: &mut tokio::fs::File, len: u64) -> Result<Vec<u8>> {
    let len = usize::try_from(len).context("chunk size does not fit in memory")?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)
        .await
        .context("Failed to read chunk from artifact")?;
    Ok(buf)
}

#[async_trait]
impl ICloudUploader for GoogleDriveClient {
    fn backend(&self) -> CloudBackend {
        CloudBackend::GoogleDrive
    }

    async fn authenticate(&self) -> Result<AccountInfo> {
        info!("Authenticating with Google Drive");
        let tokens = match (&self.static_token, &self.authenticator) {
            (Some(token), _) => Tokens {
                access_token: token.clone(),
                refresh_token: None,
                expires_at: chrono::Utc::now() + Duration::hours(1),
            },
            (None, Some(authenticator)) => authenticator.tokens().await?,
            (None, None) => anyhow::bail!("Google Drive client has no credentials"),
        };

        let about = self
            .about(&tokens.access_token)
            .await
            .context("Google Drive authentication failed")?;
        *self.session.write().await = Some(tokens);

        let info = AccountInfo {
            email: about.user.email_address,
            display_name: about.user.display_name,
        };
        info!(account = %info, "Authenticated with Google Drive");
        Ok(info)
    }

    async fn verify_or_create_folder(&self, folder: &FolderRef) -> Result<bool> {
        let FolderRef::Drive(id) = folder else {
            anyhow::bail!("Google Drive cannot use folder reference {folder}");
        };
        let Some(id) = id else {
            return Ok(true);
        };

        match self.get_file(id).await? {
            Some(file) if file.mime_type.as_deref() == Some(FOLDER_MIME_TYPE) && !file.trashed => {
                info!(folder = %file.name, id = %file.id, "Verified Google Drive folder");
                Ok(true)
            }
            Some(file) => {
                info!(id = %file.id, mime_type = ?file.mime_type, "Google Drive ID is not a usable folder");
                Ok(false)
            }
            None => {
                info!(id = %id, "Google Drive folder not found");
                Ok(false)
            }
        }
    }

    async fn upload(&self, artifact: &Path, folder: &FolderRef) -> Result<RemoteLocator> {
        let FolderRef::Drive(parent) = folder else {
            anyhow::bail!("Google Drive cannot use folder reference {folder}");
        };
        let token = self.token().await?;
        let name = source_file_name(artifact)?;

        let existing = self.find_by_name(&name, parent.as_ref()).await?;
        let existing_id = existing.as_ref().map(|f| f.id.as_str());
        if let Some(id) = existing_id {
            debug!(name, id, "Replacing existing Google Drive file");
        }
        let metadata = Self::metadata(&name, parent.as_ref(), existing_id);

        let mut file = tokio::fs::File::open(artifact)
            .await
            .with_context(|| format!("Failed to open {}", artifact.display()))?;
        let total = file.metadata().await?.len();

        let uploaded = if total <= self.multipart_limit {
            let mut data = Vec::with_capacity(total as usize);
            file.read_to_end(&mut data).await?;
            self.upload_multipart(&token, data, &metadata, existing_id).await?
        } else {
            self.upload_resumable(&token, &mut file, total, &metadata, existing_id)
                .await?
        };

        info!(name = %uploaded.name, id = %uploaded.id, size = total, "Uploaded to Google Drive");
        Ok(RemoteLocator {
            id: uploaded.id,
            display: uploaded.web_view_link,
        })
    }
}
