//! Shared test helpers for the cloud integration tests
//!
//! Each helper mounts the account endpoint of one backend and returns a
//! client pointing at the mock server.

use std::path::PathBuf;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gpgwatch_cloud::{DropboxClient, GoogleDriveClient};

/// Starts a mock server answering `users/get_current_account`
///
/// Both the RPC and content endpoints live on the same server, under
/// `/rpc` and `/content`.
pub async fn setup_dropbox_mock() -> (MockServer, DropboxClient) {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc/users/get_current_account"))
        .and(header("authorization", "Bearer sl.test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "account_id": "dbid:test",
            "name": { "display_name": "Test User" },
            "email": "test@example.com"
        })))
        .mount(&server)
        .await;

    let client = DropboxClient::with_base_urls(
        "sl.test-token",
        format!("{}/rpc", server.uri()),
        format!("{}/content", server.uri()),
    );

    (server, client)
}

/// Starts a mock server answering `about?fields=user`
///
/// Metadata calls live under `/drive/v3`, media uploads under
/// `/upload/drive/v3`.
pub async fn setup_gdrive_mock() -> (MockServer, GoogleDriveClient) {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/about"))
        .and(header("authorization", "Bearer ya29.test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user": {
                "displayName": "Test User",
                "emailAddress": "test@example.com"
            }
        })))
        .mount(&server)
        .await;

    let client = GoogleDriveClient::with_access_token("ya29.test-token").with_base_urls(
        format!("{}/drive/v3", server.uri()),
        format!("{}/upload/drive/v3", server.uri()),
    );

    (server, client)
}

/// Writes `len` bytes of a repeating pattern into a fresh temp dir
pub fn artifact(name: &str, len: usize) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).expect("write artifact");
    (dir, path)
}
