//! Mock ports shared by the pipeline integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gpgwatch_core::domain::{CloudBackend, FolderRef, RemoteLocator};
use gpgwatch_core::ports::{
    AccountInfo, EncryptionOutput, ICloudUploader, IEncryptionEngine, INotifier, KeyInfo, Notice,
    NoticeLevel,
};

/// Engine that returns a fixed reply and records every call
pub struct MockEngine {
    reply: EncryptionOutput,
    pub calls: Mutex<Vec<(Vec<u8>, String)>>,
}

impl MockEngine {
    pub fn ok(ciphertext: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            reply: EncryptionOutput::success(ciphertext.to_vec()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(status: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: EncryptionOutput::failure(status),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl IEncryptionEngine for MockEngine {
    async fn encrypt(&self, plaintext: &[u8], recipient: &str, _always_trust: bool) -> anyhow::Result<EncryptionOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((plaintext.to_vec(), recipient.to_string()));
        Ok(self.reply.clone())
    }

    async fn list_keys(&self) -> anyhow::Result<Vec<KeyInfo>> {
        Ok(Vec::new())
    }
}

/// Uploader that either accepts every file or fails every upload
pub struct MockUploader {
    backend: CloudBackend,
    succeed: bool,
    pub uploads: Mutex<Vec<PathBuf>>,
}

impl MockUploader {
    pub fn new(backend: CloudBackend, succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            backend,
            succeed,
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ICloudUploader for MockUploader {
    fn backend(&self) -> CloudBackend {
        self.backend
    }

    async fn authenticate(&self) -> anyhow::Result<AccountInfo> {
        Ok(AccountInfo {
            email: Some("test@example.com".into()),
            display_name: "Test".into(),
        })
    }

    async fn verify_or_create_folder(&self, _folder: &FolderRef) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn upload(&self, local_path: &Path, _folder: &FolderRef) -> anyhow::Result<RemoteLocator> {
        self.uploads.lock().unwrap().push(local_path.to_path_buf());
        if self.succeed {
            Ok(RemoteLocator {
                id: format!("/{}", local_path.file_name().unwrap().to_string_lossy()),
                display: None,
            })
        } else {
            anyhow::bail!("503 Service Unavailable")
        }
    }
}

/// Notifier that keeps every notice
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn levels(&self) -> Vec<NoticeLevel> {
        self.notices.lock().unwrap().iter().map(|n| n.level).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }
}

impl INotifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}
