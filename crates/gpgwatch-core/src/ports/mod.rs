//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the pipeline depends on; their implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IEncryptionEngine`] - Asymmetric encryption and key listing (gpg)
//! - [`ICloudUploader`] - Cloud uploads (Google Drive, Dropbox)
//! - [`INotifier`] - User-visible per-file notices

pub mod cloud_uploader;
pub mod encryption;
pub mod notification;

pub use cloud_uploader::{AccountInfo, ICloudUploader};
pub use encryption::{EncryptionOutput, IEncryptionEngine, KeyInfo};
pub use notification::{INotifier, Notice, NoticeLevel, NullNotifier};
