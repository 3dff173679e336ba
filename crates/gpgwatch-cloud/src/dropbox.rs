//! Dropbox v2 uploader
//!
//! - Payloads up to [`SINGLE_UPLOAD_LIMIT`] go through one `files/upload` call
//! - Larger payloads use an upload session: `upload_session/start` with the
//!   first chunk, `append_v2` for each following chunk, and `finish` with the
//!   last chunk plus the commit metadata
//! - Folders are verified with `files/get_metadata` and created on demand
//!
//! Every write uses `overwrite` mode, so re-uploading a name replaces the
//! remote file.
//!
//! ## Dropbox API References
//!
//! - [files/upload](https://www.dropbox.com/developers/documentation/http/documentation#files-upload)
//! - [upload sessions](https://www.dropbox.com/developers/documentation/http/documentation#files-upload_session-start)

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gpgwatch_core::domain::{source_file_name, CloudBackend, FolderRef, RemoteLocator};
use gpgwatch_core::ports::{AccountInfo, ICloudUploader};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::CloudError;

/// RPC endpoint base
pub const DEFAULT_API_BASE: &str = "https://api.dropboxapi.com/2";

/// Content-upload endpoint base
pub const DEFAULT_CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

/// Largest payload sent with a single `files/upload` call: 150 MiB
pub const SINGLE_UPLOAD_LIMIT: u64 = 150 * 1024 * 1024;

/// Upload session chunk size: 4 MiB
pub const SESSION_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

// ============================================================================
// Upload session planning
// ============================================================================

/// One request of a chunked upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStep {
    /// `upload_session/start` carrying the first chunk
    Start { offset: u64, len: u64 },
    /// `upload_session/append_v2` at `offset`
    Append { offset: u64, len: u64 },
    /// `upload_session/finish` with the last chunk and the commit
    Finish { offset: u64, len: u64 },
}

impl ChunkStep {
    pub fn offset(&self) -> u64 {
        match *self {
            ChunkStep::Start { offset, .. }
            | ChunkStep::Append { offset, .. }
            | ChunkStep::Finish { offset, .. } => offset,
        }
    }

    pub fn len(&self) -> u64 {
        match *self {
            ChunkStep::Start { len, .. } | ChunkStep::Append { len, .. } | ChunkStep::Finish { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits `total` bytes into session steps of at most `chunk_size` bytes
///
/// The steps cover `0..total` contiguously. A payload that fits in one chunk
/// is started in full and finished with an empty chunk.
pub fn plan_session(total: u64, chunk_size: u64) -> Vec<ChunkStep> {
    let chunk_size = chunk_size.max(1);
    let first = total.min(chunk_size);
    let mut steps = vec![ChunkStep::Start {
        offset: 0,
        len: first,
    }];

    let mut offset = first;
    loop {
        let remaining = total - offset;
        if remaining <= chunk_size {
            steps.push(ChunkStep::Finish {
                offset,
                len: remaining,
            });
            break;
        }
        steps.push(ChunkStep::Append {
            offset,
            len: chunk_size,
        });
        offset += chunk_size;
    }

    steps
}

/// Server-side session state: id plus bytes acknowledged so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub session_id: String,
    pub offset: u64,
}

impl UploadSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            offset: 0,
        }
    }

    /// Records `len` more bytes as uploaded
    pub fn advance(&mut self, len: u64) {
        self.offset += len;
    }

    /// Fails unless the session sits exactly at `offset`
    pub fn expect_offset(&self, offset: u64) -> Result<(), CloudError> {
        if self.offset == offset {
            Ok(())
        } else {
            Err(CloudError::OffsetMismatch {
                sent: self.offset,
                expected: offset,
            })
        }
    }

    fn cursor(&self) -> serde_json::Value {
        json!({ "session_id": self.session_id, "offset": self.offset })
    }
}

// ============================================================================
// Dropbox API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AccountName {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct FullAccount {
    name: AccountName,
    email: Option<String>,
}

/// Metadata returned for uploaded files and `get_metadata`
#[derive(Debug, Clone, Deserialize)]
pub struct EntryMetadata {
    #[serde(rename = ".tag")]
    pub tag: Option<String>,
    pub name: String,
    pub path_display: Option<String>,
    pub id: Option<String>,
    pub rev: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SessionStartResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_summary: String,
}

#[derive(Debug, Serialize)]
struct CommitInfo<'a> {
    path: &'a str,
    mode: &'static str,
    autorename: bool,
    mute: bool,
}

impl<'a> CommitInfo<'a> {
    fn overwrite(path: &'a str) -> Self {
        Self {
            path,
            mode: "overwrite",
            autorename: false,
            mute: false,
        }
    }
}

/// Serializes `value` for the `Dropbox-API-Arg` header
///
/// Header values must be ASCII, so non-ASCII characters are written as
/// `\uXXXX` escapes.
pub fn header_safe_json(value: &serde_json::Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

// ============================================================================
// DropboxClient
// ============================================================================

/// Dropbox uploader authenticated with a long-lived access token
pub struct DropboxClient {
    client: Client,
    api_base: String,
    content_base: String,
    access_token: String,
    /// Set once `authenticate` confirmed the token
    session_token: RwLock<Option<String>>,
    single_upload_limit: u64,
    chunk_size: u64,
}

impl DropboxClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_urls(access_token, DEFAULT_API_BASE, DEFAULT_CONTENT_BASE)
    }

    /// Creates a client with custom endpoints (useful for testing)
    pub fn with_base_urls(
        access_token: impl Into<String>,
        api_base: impl Into<String>,
        content_base: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
            content_base: content_base.into(),
            access_token: access_token.into(),
            session_token: RwLock::new(None),
            single_upload_limit: SINGLE_UPLOAD_LIMIT,
            chunk_size: SESSION_CHUNK_SIZE,
        }
    }

    /// Overrides the single-upload limit and session chunk size
    pub fn with_limits(mut self, single_upload_limit: u64, chunk_size: u64) -> Self {
        self.single_upload_limit = single_upload_limit;
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn token(&self) -> Result<String, CloudError> {
        self.session_token
            .read()
            .await
            .clone()
            .ok_or(CloudError::NotAuthenticated)
    }

    fn rpc(&self, token: &str, endpoint: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/{}", self.api_base, endpoint))
            .bearer_auth(token)
    }

    fn content(&self, token: &str, endpoint: &str, arg: &serde_json::Value) -> RequestBuilder {
        self.client
            .post(format!("{}/{}", self.content_base, endpoint))
            .bearer_auth(token)
            .header("Dropbox-API-Arg", header_safe_json(arg))
            .header("Content-Type", "application/octet-stream")
    }

    async fn current_account(&self, token: &str) -> Result<FullAccount, CloudError> {
        let response = self
            .rpc(token, "users/get_current_account")
            .json(&serde_json::Value::Null)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CloudError::from_response(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| CloudError::InvalidResponse(e.to_string()))
    }

    /// Fetches metadata for `path`; `Ok(None)` when the path does not exist
    pub async fn get_metadata(&self, path: &str) -> Result<Option<EntryMetadata>, CloudError> {
        let token = self.token().await?;
        let response = self
            .rpc(&token, "files/get_metadata")
            .json(&json!({ "path": path }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let meta = response
                .json()
                .await
                .map_err(|e| CloudError::InvalidResponse(e.to_string()))?;
            return Ok(Some(meta));
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT && error_summary(&body).starts_with("path/not_found") {
            return Ok(None);
        }
        Err(CloudError::from_status(status, body))
    }

    /// Creates `path`; an existing folder counts as success
    pub async fn create_folder(&self, path: &str) -> Result<(), CloudError> {
        let token = self.token().await?;
        let response = self
            .rpc(&token, "files/create_folder_v2")
            .json(&json!({ "path": path, "autorename": false }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(path, "Created Dropbox folder");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT && error_summary(&body).starts_with("path/conflict") {
            debug!(path, "Dropbox folder already exists");
            return Ok(());
        }
        Err(CloudError::from_status(status, body))
    }

    async fn upload_single(&self, token: &str, data: Vec<u8>, path: &str) -> Result<EntryMetadata, CloudError> {
        let arg = serde_json::to_value(CommitInfo::overwrite(path))
            .map_err(|e| CloudError::InvalidResponse(e.to_string()))?;
        let response = self
            .content(token, "files/upload", &arg)
            .body(data)
            .send()
            .await?;
        parse_metadata(response).await
    }

    async fn session_start(&self, token: &str, chunk: Vec<u8>) -> Result<UploadSession, CloudError> {
        let response = self
            .content(token, "files/upload_session/start", &json!({ "close": false }))
            .body(chunk)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CloudError::from_response(response).await);
        }
        let started: SessionStartResponse = response
            .json()
            .await
            .map_err(|e| CloudError::InvalidResponse(e.to_string()))?;
        debug!(session_id = %started.session_id, "Dropbox upload session started");
        Ok(UploadSession::new(started.session_id))
    }

    async fn session_append(&self, token: &str, session: &UploadSession, chunk: Vec<u8>) -> Result<(), CloudError> {
        let arg = json!({ "cursor": session.cursor(), "close": false });
        let response = self
            .content(token, "files/upload_session/append_v2", &arg)
            .body(chunk)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CloudError::from_response(response).await);
        }
        Ok(())
    }

    async fn session_finish(
        &self,
        token: &str,
        session: &UploadSession,
        chunk: Vec<u8>,
        path: &str,
    ) -> Result<EntryMetadata, CloudError> {
        let arg = json!({ "cursor": session.cursor(), "commit": CommitInfo::overwrite(path) });
        let response = self
            .content(token, "files/upload_session/finish", &arg)
            .body(chunk)
            .send()
            .await?;
        parse_metadata(response).await
    }

    /// Runs a chunked session for `file`, committing to `path`
    async fn upload_chunked(
        &self,
        token: &str,
        file: &mut tokio::fs::File,
        total: u64,
        path: &str,
    ) -> Result<EntryMetadata> {
        let steps = plan_session(total, self.chunk_size);
        info!(path, total, chunks = steps.len(), "Starting Dropbox upload session");

        let mut session: Option<UploadSession> = None;
        for step in steps {
            let chunk = read_chunk(file, step.len()).await?;
            match step {
                ChunkStep::Start { len, .. } => {
                    let mut started = self.session_start(token, chunk).await?;
                    started.advance(len);
                    session = Some(started);
                }
                ChunkStep::Append { offset, len } => {
                    let current = session.as_mut().ok_or_else(no_session)?;
                    current.expect_offset(offset)?;
                    self.session_append(token, current, chunk)
                        .await
                        .with_context(|| format!("append at offset {offset}/{total} failed"))?;
                    current.advance(len);
                }
                ChunkStep::Finish { offset, len } => {
                    let current = session.as_mut().ok_or_else(no_session)?;
                    current.expect_offset(offset)?;
                    if offset + len != total {
                        return Err(CloudError::OffsetMismatch {
                            sent: offset + len,
                            expected: total,
                        }
                        .into());
                    }
                    let meta = self.session_finish(token, current, chunk, path).await?;
                    current.advance(len);
                    return Ok(meta);
                }
            }
        }

        Err(CloudError::InvalidResponse("upload session ended without a finish step".into()).into())
    }
}

fn no_session() -> CloudError {
    CloudError::InvalidResponse("upload session was not started".into())
}

fn error_summary(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|e| e.error_summary)
        .unwrap_or_default()
}

async fn parse_metadata(response: reqwest::Response) -> Result<EntryMetadata, CloudError> {
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
impl ICloudUploader for DropboxClient {
    fn backend(&self) -> CloudBackend {
        CloudBackend::Dropbox
    }

    async fn authenticate(&self) -> Result<AccountInfo> {
        info!("Authenticating with Dropbox");
        let account = self
            .current_account(&self.access_token)
            .await
            .context("Dropbox authentication failed; check that the access token is valid")?;

        *self.session_token.write().await = Some(self.access_token.clone());

        let info = AccountInfo {
            email: account.email,
            display_name: account.name.display_name,
        };
        info!(account = %info, "Authenticated with Dropbox");
        Ok(info)
    }

    async fn verify_or_create_folder(&self, folder: &FolderRef) -> Result<bool> {
        let FolderRef::Dropbox(path) = folder else {
            anyhow::bail!("Dropbox cannot use folder reference {folder}");
        };
        if path.is_root() {
            return Ok(true);
        }

        match self.get_metadata(path.as_str()).await? {
            Some(meta) if meta.tag.as_deref() == Some("folder") => {
                info!(path = %path, "Verified access to Dropbox folder");
                Ok(true)
            }
            Some(meta) => {
                warn!(path = %path, tag = ?meta.tag, "Dropbox path is not a folder");
                Ok(false)
            }
            None => {
                info!(path = %path, "Dropbox folder not found, creating it");
                self.create_folder(path.as_str()).await?;
                Ok(true)
            }
        }
    }

    async fn upload(&self, local_path: &Path, folder: &FolderRef) -> Result<RemoteLocator> {
        let FolderRef::Dropbox(folder_path) = folder else {
            anyhow::bail!("Dropbox cannot use folder reference {folder}");
        };
        let token = self.token().await?;
        let name = source_file_name(local_path)?;
        let remote_path = folder_path.join(&name)?;

        let mut file = tokio::fs::File::open(local_path)
            .await
            .with_context(|| format!("Failed to open {}", local_path.display()))?;
        let total = file.metadata().await?.len();

        let meta = if total <= self.single_upload_limit {
            debug!(path = %remote_path, bytes = total, "Uploading to Dropbox in one request");
            let mut data = Vec::with_capacity(usize::try_from(total).unwrap_or_default());
            file.read_to_end(&mut data).await?;
            self.upload_single(&token, data, &remote_path).await?
        } else {
            self.upload_chunked(&token, &mut file, total, &remote_path).await?
        };

        let remote = meta.path_display.clone().unwrap_or(remote_path);
        info!(path = %remote, rev = ?meta.rev, "Uploaded to Dropbox");
        Ok(RemoteLocator {
            id: remote,
            display: meta.rev.map(|rev| format!("rev {rev}")),
        })
    }
}
