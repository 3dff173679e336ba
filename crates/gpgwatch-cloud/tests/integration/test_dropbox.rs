//! Integration tests for the Dropbox uploader
//!
//! Verifies authentication, folder verification with auto-create, single
//! uploads, and the start/append/finish session protocol.

use gpgwatch_cloud::CloudError;
use gpgwatch_core::domain::{DropboxPath, FolderRef};
use gpgwatch_core::ports::ICloudUploader;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, Request, ResponseTemplate};

use crate::common;

fn api_arg(req: &Request) -> serde_json::Value {
    req.headers
        .get("Dropbox-API-Arg")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| serde_json::from_str(v).ok())
        .unwrap_or(serde_json::Value::Null)
}

fn folder(path: &str) -> FolderRef {
    FolderRef::Dropbox(DropboxPath::new(path).unwrap())
}

fn uploaded(path: &str) -> serde_json::Value {
    serde_json::json!({
        ".tag": "file",
        "name": path.rsplit('/').next().unwrap(),
        "path_display": path,
        "id": "id:abc",
        "rev": "015f",
        "size": 10
    })
}

#[tokio::test]
async fn test_authenticate_returns_account() {
    let (_server, client) = common::setup_dropbox_mock().await;

    let account = client.authenticate().await.expect("authenticate failed");

    assert_eq!(account.display_name, "Test User");
    assert_eq!(account.email.as_deref(), Some("test@example.com"));
}

#[tokio::test]
async fn test_authenticate_rejects_bad_token() {
    let (server, _client) = common::setup_dropbox_mock().await;
    let client = gpgwatch_cloud::DropboxClient::with_base_urls(
        "wrong",
        format!("{}/rpc", server.uri()),
        format!("{}/content", server.uri()),
    );

    assert!(client.authenticate().await.is_err());
}

#[tokio::test]
async fn test_verify_existing_folder() {
    let (server, client) = common::setup_dropbox_mock().await;
    Mock::given(method("POST"))
        .and(path("/rpc/files/get_metadata"))
        .and(body_json(serde_json::json!({ "path": "/Backups" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            ".tag": "folder", "name": "Backups", "path_display": "/Backups", "id": "id:f"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rpc/files/create_folder_v2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    client.authenticate().await.unwrap();
    assert!(client.verify_or_create_folder(&folder("/Backups/")).await.unwrap());
}

#[tokio::test]
async fn test_verify_creates_missing_folder() {
    let (server, client) = common::setup_dropbox_mock().await;
    Mock::given(method("POST"))
        .and(path("/rpc/files/get_metadata"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error_summary": "path/not_found/...",
            "error": { ".tag": "path", "path": { ".tag": "not_found" } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rpc/files/create_folder_v2"))
        .and(body_json(serde_json::json!({ "path": "/Backups", "autorename": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": { "name": "Backups", "path_display": "/Backups", "id": "id:f" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    client.authenticate().await.unwrap();
    assert!(client.verify_or_create_folder(&folder("Backups")).await.unwrap());
}

#[tokio::test]
async fn test_create_folder_conflict_counts_as_success() {
    let (server, client) = common::setup_dropbox_mock().await;
    Mock::given(method("POST"))
        .and(path("/rpc/files/create_folder_v2"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error_summary": "path/conflict/folder/..",
            "error": { ".tag": "path" }
        })))
        .mount(&server)
        .await;

    client.authenticate().await.unwrap();
    client.create_folder("/Backups").await.expect("conflict should be ok");
}

#[tokio::test]
async fn test_verify_rejects_file_at_folder_path() {
    let (server, client) = common::setup_dropbox_mock().await;
    Mock::given(method("POST"))
        .and(path("/rpc/files/get_metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            ".tag": "file", "name": "Backups", "path_display": "/Backups"
        })))
        .mount(&server)
        .await;

    client.authenticate().await.unwrap();
    assert!(!client.verify_or_create_folder(&folder("/Backups")).await.unwrap());
}

#[tokio::test]
async fn test_single_upload_overwrites_by_path() {
    let (server, client) = common::setup_dropbox_mock().await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload"))
        .and(|req: &Request| {
            let arg = api_arg(req);
            arg["path"] == "/Backups/report.txt.gpg"
                && arg["mode"] == "overwrite"
                && arg["autorename"] == false
                && req.body.len() == 10
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(uploaded("/Backups/report.txt.gpg")))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, artifact) = common::artifact("report.txt.gpg", 10);
    client.authenticate().await.unwrap();
    let locator = client.upload(&artifact, &folder("/Backups")).await.unwrap();

    assert_eq!(locator.id, "/Backups/report.txt.gpg");
    assert_eq!(locator.display.as_deref(), Some("rev 015f"));
}

#[tokio::test]
async fn test_session_upload_start_append_finish() {
    let (server, client) = common::setup_dropbox_mock().await;
    let client = client.with_limits(4, 4);

    Mock::given(method("POST"))
        .and(path("/content/files/upload_session/start"))
        .and(|req: &Request| req.body.len() == 4)
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "session_id": "sess-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload_session/append_v2"))
        .and(|req: &Request| {
            let arg = api_arg(req);
            arg["cursor"]["session_id"] == "sess-1" && arg["cursor"]["offset"] == 4 && req.body.len() == 4
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::Value::Null))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload_session/finish"))
        .and(|req: &Request| {
            let arg = api_arg(req);
            arg["cursor"]["offset"] == 8
                && arg["commit"]["path"] == "/big.bin.gpg"
                && arg["commit"]["mode"] == "overwrite"
                && req.body.len() == 2
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(uploaded("/big.bin.gpg")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, artifact) = common::artifact("big.bin.gpg", 10);
    client.authenticate().await.unwrap();
    let locator = client.upload(&artifact, &folder("/")).await.unwrap();

    assert_eq!(locator.id, "/big.bin.gpg");
}

#[tokio::test]
async fn test_payload_at_single_upload_limit_uses_files_upload() {
    let (server, client) = common::setup_dropbox_mock().await;
    let client = client.with_limits(16, 8);

    Mock::given(method("POST"))
        .and(path("/content/files/upload"))
        .and(|req: &Request| req.body.len() == 16)
        .respond_with(ResponseTemplate::new(200).set_body_json(uploaded("/edge.bin.gpg")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload_session/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "session_id": "unused" })))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, artifact) = common::artifact("edge.bin.gpg", 16);
    client.authenticate().await.unwrap();
    let locator = client.upload(&artifact, &folder("/")).await.unwrap();

    assert_eq!(locator.id, "/edge.bin.gpg");
}

#[tokio::test]
async fn test_payload_one_past_limit_uses_upload_session() {
    let (server, client) = common::setup_dropbox_mock().await;
    let client = client.with_limits(16, 8);

    Mock::given(method("POST"))
        .and(path("/content/files/upload_session/start"))
        .and(|req: &Request| req.body.len() == 8)
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "session_id": "sess-17" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload_session/append_v2"))
        .and(|req: &Request| {
            let arg = api_arg(req);
            arg["cursor"]["session_id"] == "sess-17" && arg["cursor"]["offset"] == 8 && req.body.len() == 8
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::Value::Null))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload_session/finish"))
        .and(|req: &Request| {
            let arg = api_arg(req);
            arg["cursor"]["offset"] == 16 && arg["commit"]["path"] == "/edge.bin.gpg" && req.body.len() == 1
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(uploaded("/edge.bin.gpg")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, artifact) = common::artifact("edge.bin.gpg", 17);
    client.authenticate().await.unwrap();
    let locator = client.upload(&artifact, &folder("/")).await.unwrap();

    assert_eq!(locator.id, "/edge.bin.gpg");
}

#[tokio::test]
async fn test_session_append_failure_aborts_without_commit() {
    let (server, client) = common::setup_dropbox_mock().await;
    let client = client.with_limits(4, 4);

    Mock::given(method("POST"))
        .and(path("/content/files/upload_session/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "session_id": "sess-2" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload_session/append_v2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload_session/finish"))
        .respond_with(ResponseTemplate::new(200).set_body_json(uploaded("/big.bin.gpg")))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, artifact) = common::artifact("big.bin.gpg", 10);
    client.authenticate().await.unwrap();
    let err = client.upload(&artifact, &folder("/")).await.unwrap_err();

    assert!(err
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<CloudError>(), Some(CloudError::ServerError(_)))));
}

#[tokio::test]
async fn test_upload_error_status_is_reported() {
    let (server, client) = common::setup_dropbox_mock().await;
    Mock::given(method("POST"))
        .and(path("/content/files/upload"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let (_dir, artifact) = common::artifact("a.gpg", 3);
    client.authenticate().await.unwrap();
    let err = client.upload(&artifact, &folder("/")).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CloudError>(),
        Some(CloudError::TooManyRequests(_))
    ));
}
