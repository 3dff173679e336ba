//! Key listing parser and recipient lookup
//!
//! Parses `gpg --with-colons --fixed-list-mode --list-keys` output and
//! resolves a configured recipient to exactly one public key.

use gpgwatch_core::ports::KeyInfo;
use thiserror::Error;

/// Errors resolving a recipient to a key
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyLookupError {
    /// No key matched; `available` lists every known identity
    #[error("GPG key not found: {query}{}", format_list("Available keys", .available))]
    NotFound {
        query: String,
        available: Vec<String>,
    },

    /// More than one key matched
    #[error("GPG key identifier '{query}' is ambiguous{}", format_list("Matching keys", .matches))]
    Ambiguous { query: String, matches: Vec<String> },
}

fn format_list(title: &str, items: &[String]) -> String {
    if items.is_empty() {
        return " (keyring is empty)".to_string();
    }
    let lines: Vec<String> = items.iter().map(|item| format!("  - {item}")).collect();
    format!("\n{title}:\n{}", lines.join("\n"))
}

/// One-line description used in lookup errors and logs
pub fn describe_key(key: &KeyInfo) -> String {
    format!("{} (ID: {})", key.primary_uid(), key.key_id)
}

/// Parses colon-delimited key listing output
///
/// Only primary keys are returned; subkey fingerprints are skipped.
pub fn parse_colon_listing(output: &str) -> Vec<KeyInfo> {
    let mut keys: Vec<KeyInfo> = Vec::new();
    let mut in_primary = false;

    for line in output.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        match fields.first().copied() {
            Some("pub") => {
                keys.push(KeyInfo {
                    key_id: fields.get(4).copied().unwrap_or_default().to_string(),
                    fingerprint: String::new(),
                    uids: Vec::new(),
                });
                in_primary = true;
            }
            Some("sub") | Some("ssb") => in_primary = false,
            Some("fpr") if in_primary => {
                if let Some(key) = keys.last_mut() {
                    if key.fingerprint.is_empty() {
                        key.fingerprint = fields.get(9).copied().unwrap_or_default().to_string();
                    }
                }
            }
            Some("uid") => {
                if let Some(key) = keys.last_mut() {
                    let uid = unescape_colon_field(fields.get(9).copied().unwrap_or_default());
                    if !uid.is_empty() {
                        key.uids.push(uid);
                    }
                }
            }
            _ => {}
        }
    }

    keys
}

/// Decodes `\xHH` escapes used in colon listings
fn unescape_colon_field(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1] == b'x' {
            let decoded = std::str::from_utf8(&bytes[i + 2..i + 4])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn normalize_hex(query: &str) -> String {
    let q = query.trim();
    let q = q
        .strip_prefix("0x")
        .or_else(|| q.strip_prefix("0X"))
        .unwrap_or(q);
    q.replace(' ', "").to_ascii_uppercase()
}

/// Returns true if `query` identifies `key`
///
/// Matches a user ID substring (case-insensitive), the long or short key ID,
/// or the full fingerprint.
pub fn key_matches(key: &KeyInfo, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }

    if key
        .uids
        .iter()
        .any(|uid| uid.to_lowercase().contains(&needle))
    {
        return true;
    }

    let hex = normalize_hex(query);
    let key_id = key.key_id.to_ascii_uppercase();
    let fingerprint = key.fingerprint.to_ascii_uppercase();

    hex == key_id
        || (hex.len() == 8 && key_id.ends_with(&hex))
        || (!fingerprint.is_empty() && hex == fingerprint)
}

/// Resolves `query` to exactly one key
///
/// # Errors
/// [`KeyLookupError::NotFound`] when nothing matches,
/// [`KeyLookupError::Ambiguous`] when several keys match
pub fn resolve_key<'a>(keys: &'a [KeyInfo], query: &str) -> Result<&'a KeyInfo, KeyLookupError> {
    let matches: Vec<&KeyInfo> = keys.iter().filter(|key| key_matches(key, query)).collect();

    match matches.as_slice() {
        [single] => Ok(*single),
        [] => Err(KeyLookupError::NotFound {
            query: query.to_string(),
            available: keys.iter().map(describe_key).collect(),
        }),
        many => Err(KeyLookupError::Ambiguous {
            query: query.to_string(),
            matches: many.iter().map(|key| describe_key(key)).collect(),
        }),
    }
}
