//! `gpg` command-line encryption engine
//!
//! Runs `gpg --batch` as a child process, feeding plaintext on stdin and
//! collecting ciphertext from stdout. Machine-readable status lines are
//! requested on stderr (`--status-fd 2`) and condensed into a short status
//! string such as `"encryption ok"` or `"invalid recipient"`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gpgwatch_core::config::GpgConfig;
use gpgwatch_core::ports::{EncryptionOutput, IEncryptionEngine, KeyInfo};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::keys::parse_colon_listing;

const STATUS_PREFIX: &str = "[GNUPG:] ";

/// Encryption engine backed by the `gpg` binary
#[derive(Debug, Clone)]
pub struct GpgEngine {
    binary: PathBuf,
    home: Option<PathBuf>,
}

impl GpgEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            home: None,
        }
    }

    /// Use `home` as `--homedir`
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn from_config(config: &GpgConfig) -> Self {
        let engine = Self::new(&config.binary);
        match &config.home {
            Some(home) => engine.with_home(home),
            None => engine,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--batch".to_string(),
            "--yes".to_string(),
            "--no-tty".to_string(),
        ];
        if let Some(home) = &self.home {
            args.push("--homedir".to_string());
            args.push(home.display().to_string());
        }
        args
    }

    /// Arguments for encrypting stdin to stdout
    pub fn encrypt_args(&self, recipient: &str, always_trust: bool) -> Vec<String> {
        let mut args = self.base_args();
        if always_trust {
            args.push("--trust-model".to_string());
            args.push("always".to_string());
        }
        args.extend(
            [
                "--status-fd",
                "2",
                "--encrypt",
                "--recipient",
                recipient,
                "--output",
                "-",
            ]
            .map(String::from),
        );
        args
    }

    /// Arguments for listing public keys in colon format
    pub fn list_keys_args(&self) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(["--with-colons", "--fixed-list-mode", "--list-keys"].map(String::from));
        args
    }
}

/// Condenses gpg status lines into a short status string
///
/// Unknown failures fall back to the last non-status stderr line.
pub fn summarize_status(stderr: &str, exit_ok: bool) -> String {
    let mut fallback: Option<&str> = None;
    let mut error: Option<String> = None;
    let mut ended = false;

    for line in stderr.lines() {
        let Some(status) = line.strip_prefix(STATUS_PREFIX) else {
            if !line.trim().is_empty() {
                fallback = Some(line.trim());
            }
            continue;
        };

        let mut parts = status.split_whitespace();
        let found = match parts.next().unwrap_or_default() {
            "INV_RECP" => Some("invalid recipient".to_string()),
            "NO_RECP" => Some("no valid recipients".to_string()),
            "KEYEXPIRED" | "EXPKEYSIG" => Some("key expired".to_string()),
            "KEYREVOKED" | "REVKEYSIG" => Some("key revoked".to_string()),
            "FAILURE" => Some(format!("failure: {}", parts.collect::<Vec<_>>().join(" "))),
            "END_ENCRYPTION" => {
                ended = true;
                None
            }
            _ => None,
        };
        // first error wins
        if error.is_none() {
            error = found;
        }
    }

    match error {
        Some(error) => error,
        None if ended || exit_ok => "encryption ok".to_string(),
        None => fallback.unwrap_or("gpg failed").to_string(),
    }
}

#[async_trait]
impl IEncryptionEngine for GpgEngine {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &str,
        always_trust: bool,
    ) -> Result<EncryptionOutput> {
        let args = self.encrypt_args(recipient, always_trust);
        debug!(binary = %self.binary.display(), recipient, bytes = plaintext.len(), "Running gpg encrypt");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Missing gpg stdin pipe"))?;
        let input = plaintext.to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for gpg")?;

        // gpg may exit before reading all input when the recipient is rejected
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if output.status.success() => {
                return Err(anyhow::Error::new(e).context("Failed to write plaintext to gpg"));
            }
            Ok(Err(e)) => debug!(error = %e, "gpg closed stdin early"),
            Err(e) => return Err(anyhow::anyhow!("gpg stdin writer panicked: {e}")),
        }

        if output.status.success() && !output.stdout.is_empty() {
            Ok(EncryptionOutput::success(output.stdout))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let status = summarize_status(&stderr, false);
            warn!(recipient, %status, code = ?output.status.code(), "gpg encryption failed");
            Ok(EncryptionOutput::failure(status))
        }
    }

    async fn list_keys(&self) -> Result<Vec<KeyInfo>> {
        let output = Command::new(&self.binary)
            .args(self.list_keys_args())
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to execute {}. Is GnuPG installed?", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("gpg --list-keys failed: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_colon_listing(&stdout))
    }
}
