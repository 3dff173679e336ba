//! Integration tests for the Google Drive uploader
//!
//! Verifies folder verification by MIME type, multipart create and update,
//! the resumable `308 Resume Incomplete` protocol, and access-token refresh.

use chrono::{Duration, Utc};
use gpgwatch_cloud::auth::{ClientSecrets, GoogleAuthenticator, TokenStore, Tokens};
use gpgwatch_cloud::gdrive::FOLDER_MIME_TYPE;
use gpgwatch_cloud::GoogleDriveClient;
use gpgwatch_core::domain::{DriveFolderId, FolderRef};
use gpgwatch_core::ports::ICloudUploader;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn folder(id: &str) -> FolderRef {
    FolderRef::Drive(Some(DriveFolderId::new(id).unwrap()))
}

async fn mount_empty_listing(server: &wiremock::MockServer) {
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_authenticate_returns_account() {
    let (_server, client) = common::setup_gdrive_mock().await;

    let account = client.authenticate().await.expect("authenticate failed");

    assert_eq!(account.display_name, "Test User");
    assert_eq!(account.to_string(), "Test User <test@example.com>");
}

#[tokio::test]
async fn test_verify_folder_checks_mime_type() {
    let (server, client) = common::setup_gdrive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/folder-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "folder-1", "name": "Backups", "mimeType": FOLDER_MIME_TYPE
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/doc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "doc-1", "name": "notes", "mimeType": "application/vnd.google-apps.document"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    client.authenticate().await.unwrap();
    assert!(client.verify_or_create_folder(&folder("folder-1")).await.unwrap());
    assert!(!client.verify_or_create_folder(&folder("doc-1")).await.unwrap());
    assert!(!client.verify_or_create_folder(&folder("missing")).await.unwrap());
    assert!(client.verify_or_create_folder(&FolderRef::Drive(None)).await.unwrap());
}

#[tokio::test]
async fn test_multipart_upload_creates_in_parent() {
    let (server, client) = common::setup_gdrive_mock().await;
    mount_empty_listing(&server).await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains(r#""parents":["folder-1"]"#))
        .and(body_string_contains("report.txt.gpg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "file-1", "name": "report.txt.gpg",
            "webViewLink": "https://drive.google.com/file/d/file-1/view"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, artifact) = common::artifact("report.txt.gpg", 32);
    client.authenticate().await.unwrap();
    let locator = client.upload(&artifact, &folder("folder-1")).await.unwrap();

    assert_eq!(locator.id, "file-1");
    assert_eq!(
        locator.display.as_deref(),
        Some("https://drive.google.com/file/d/file-1/view")
    );
}

#[tokio::test]
async fn test_upload_replaces_existing_file_of_same_name() {
    let (server, client) = common::setup_gdrive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param(
            "q",
            "name = 'report.txt.gpg' and 'root' in parents and trashed = false",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [{ "id": "existing-1", "name": "report.txt.gpg" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/existing-1"))
        .and(query_param("uploadType", "multipart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "existing-1", "name": "report.txt.gpg"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, artifact) = common::artifact("report.txt.gpg", 8);
    client.authenticate().await.unwrap();
    let locator = client.upload(&artifact, &FolderRef::Drive(None)).await.unwrap();

    assert_eq!(locator.id, "existing-1");
}

#[tokio::test]
async fn test_resumable_upload_follows_308_ranges() {
    const CHUNK: u64 = 256 * 1024;
    let total = 2 * CHUNK + 1000;

    let (server, client) = common::setup_gdrive_mock().await;
    let client = client.with_limits(1024, CHUNK);
    mount_empty_listing(&server).await;

    let session_url = format!("{}/session/abc", server.uri());
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "resumable"))
        .and(header("X-Upload-Content-Length", total.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", session_url.as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("Content-Range", format!("bytes 0-{}/{}", CHUNK - 1, total).as_str()))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", format!("bytes=0-{}", CHUNK - 1).as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header(
            "Content-Range",
            format!("bytes {}-{}/{}", CHUNK, 2 * CHUNK - 1, total).as_str(),
        ))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", format!("bytes=0-{}", 2 * CHUNK - 1).as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header(
            "Content-Range",
            format!("bytes {}-{}/{}", 2 * CHUNK, total - 1, total).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "big-1", "name": "big.bin.gpg"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, artifact) = common::artifact("big.bin.gpg", total as usize);
    client.authenticate().await.unwrap();
    let locator = client.upload(&artifact, &FolderRef::Drive(None)).await.unwrap();

    assert_eq!(locator.id, "big-1");
}

#[tokio::test]
async fn test_resumable_upload_aborts_on_short_acknowledgement() {
    const CHUNK: u64 = 256 * 1024;
    let total = 2 * CHUNK;

    let (server, client) = common::setup_gdrive_mock().await;
    let client = client.with_limits(1024, CHUNK);
    mount_empty_listing(&server).await;

    let session_url = format!("{}/session/short", server.uri());
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", session_url.as_str()))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/short"))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-99"))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, artifact) = common::artifact("big.bin.gpg", total as usize);
    client.authenticate().await.unwrap();
    let err = client.upload(&artifact, &FolderRef::Drive(None)).await.unwrap_err();

    assert!(err.to_string().contains("offset mismatch"));
}

/// Drive client backed by a stored token that expires in 90 s
///
/// The refresh margin of 120 s makes the first API call after
/// `authenticate` renew the token against `/token` on the mock server.
async fn expiring_token_client(server: &MockServer, store: TokenStore) -> GoogleDriveClient {
    store
        .store(&Tokens {
            access_token: "ya29.old".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: Utc::now() + Duration::seconds(90),
        })
        .unwrap();

    let secrets = ClientSecrets::from_json(
        &serde_json::json!({
            "installed": {
                "client_id": "test-client.apps.googleusercontent.com",
                "client_secret": "test-secret",
                "token_uri": format!("{}/token", server.uri())
            }
        })
        .to_string(),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/drive/v3/about"))
        .and(header("authorization", "Bearer ya29.old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user": { "displayName": "Test User", "emailAddress": "test@example.com" }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", "Bearer ya29.old"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .mount(server)
        .await;

    GoogleDriveClient::new(GoogleAuthenticator::new(secrets, store))
        .with_base_urls(
            format!("{}/drive/v3", server.uri()),
            format!("{}/upload/drive/v3", server.uri()),
        )
        .with_refresh_margin(Duration::seconds(120))
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_before_upload() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::File(dir.path().join("gdrive_token.json"));
    let client = expiring_token_client(&server, store.clone()).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.new",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", "Bearer ya29.new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(header("authorization", "Bearer ya29.new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "file-2", "name": "report.txt.gpg"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_artifact_dir, artifact) = common::artifact("report.txt.gpg", 16);
    client.authenticate().await.unwrap();
    let locator = client.upload(&artifact, &FolderRef::Drive(None)).await.unwrap();

    assert_eq!(locator.id, "file-2");
    let stored = store.load().unwrap().unwrap();
    assert_eq!(stored.access_token, "ya29.new");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));
}

#[tokio::test]
async fn test_rejected_refresh_fails_upload_without_login() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let client = expiring_token_client(&server, TokenStore::File(dir.path().join("t.json"))).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_artifact_dir, artifact) = common::artifact("report.txt.gpg", 16);
    client.authenticate().await.unwrap();
    let err = client.upload(&artifact, &FolderRef::Drive(None)).await.unwrap_err();

    assert!(format!("{err:#}").contains("token refresh failed"));
}
