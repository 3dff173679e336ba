//! Encryption engine port (driven/secondary port)
//!
//! The encryptor hands plaintext bytes and a recipient to an engine and gets
//! back ciphertext plus the engine's status text. The production engine shells
//! out to `gpg`; tests substitute an in-memory mock.
//!
//! ## Design Notes
//!
//! - A rejected encryption is *not* an `Err`: the engine returns
//!   `EncryptionOutput { ok: false, .. }` with its status line. `Err` is
//!   reserved for failures to run the engine at all.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of one encryption call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionOutput {
    /// True when the engine produced ciphertext
    pub ok: bool,
    /// Engine status text (e.g. `"encryption ok"`, `"invalid recipient"`)
    pub status: String,
    /// Ciphertext; empty unless `ok`
    pub data: Vec<u8>,
}

impl EncryptionOutput {
    pub fn success(data: Vec<u8>) -> Self {
        Self {
            ok: true,
            status: "encryption ok".to_string(),
            data,
        }
    }

    pub fn failure(status: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: status.into(),
            data: Vec::new(),
        }
    }
}

/// A public key known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Long key ID (16 hex digits)
    pub key_id: String,
    /// Full fingerprint
    pub fingerprint: String,
    /// User IDs, e.g. `Alice <alice@example.com>`
    pub uids: Vec<String>,
}

impl KeyInfo {
    /// First user ID, or the key ID when the key has none
    pub fn primary_uid(&self) -> &str {
        self.uids
            .first()
            .map(String::as_str)
            .unwrap_or(self.key_id.as_str())
    }
}

/// Asymmetric encryption primitive
#[async_trait]
pub trait IEncryptionEngine: Send + Sync {
    /// Encrypts `plaintext` for `recipient`
    ///
    /// `always_trust` skips the web-of-trust check on the recipient key.
    async fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &str,
        always_trust: bool,
    ) -> anyhow::Result<EncryptionOutput>;

    /// Lists public keys available to the engine
    async fn list_keys(&self) -> anyhow::Result<Vec<KeyInfo>>;
}
