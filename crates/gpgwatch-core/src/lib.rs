//! gpgwatch Core - Domain types, configuration and ports
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `WatchedEntry`, `EncryptedArtifact`, `Destination`, `PipelineReport`
//! - **Port definitions** - Traits for adapters: `IEncryptionEngine`, `ICloudUploader`, `INotifier`
//! - **Configuration** - YAML configuration with validation and destination resolution
//!
//! # Architecture
//!
//! The domain module holds pure types and naming rules with no I/O. Ports
//! define trait interfaces that the crypto, cloud and CLI crates implement.
//! The pipeline crate drives the domain through those ports.

pub mod config;
pub mod domain;
pub mod ports;
