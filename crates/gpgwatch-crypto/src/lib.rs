//! gpgwatch Crypto - GnuPG adapter
//!
//! Implements [`IEncryptionEngine`] on top of the `gpg` command-line tool and
//! resolves the configured recipient to exactly one key in the keyring.

pub mod gpg;
pub mod keys;

pub use gpg::GpgEngine;
pub use keys::{describe_key, key_matches, parse_colon_listing, resolve_key, KeyLookupError};

use anyhow::Context;
use gpgwatch_core::ports::{IEncryptionEngine, KeyInfo};
use tracing::info;

/// Lists the engine's keys and resolves `query` to exactly one of them
pub async fn verify_recipient(
    engine: &dyn IEncryptionEngine,
    query: &str,
) -> anyhow::Result<KeyInfo> {
    let keys = engine
        .list_keys()
        .await
        .context("Failed to list GPG keys")?;
    let key = resolve_key(&keys, query)?.clone();
    info!(key = %describe_key(&key), "Found GPG key");
    Ok(key)
}
