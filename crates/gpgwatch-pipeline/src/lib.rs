//! gpgwatch Pipeline - watch, encrypt and route
//!
//! Turns creation events in one directory into `.gpg` artifacts delivered to
//! a single destination.
//!
//! ## Modules
//!
//! - [`watcher`] - `notify`-based directory watcher emitting [`CreatedEntry`]
//! - [`filter`] - Extension allow-list
//! - [`guard`] - In-flight path registry with scoped tickets
//! - [`settle`] - Fixed settle delay with a vanish check
//! - [`encryptor`] - Source file to `.gpg` artifact
//! - [`mover`] - Collision-free local moves
//! - [`router`] - Local-or-cloud dispatch
//! - [`orchestrator`] - Per-file state machine
//! - [`service`] - Watch loop, task tracking and graceful shutdown

pub mod encryptor;
pub mod filter;
pub mod guard;
pub mod mover;
pub mod orchestrator;
pub mod router;
pub mod service;
pub mod settle;
pub mod watcher;

pub use encryptor::{EncryptionFailure, Encryptor};
pub use filter::ExtensionFilter;
pub use guard::{GuardTicket, ProcessingGuard};
pub use mover::{LocalMover, MoveError};
pub use orchestrator::{Dispatch, Orchestrator, SkipReason};
pub use router::{DestinationRouter, RouteResult};
pub use service::{shutdown_signal, WatchService, WatchSummary};
pub use settle::{SettleWaiter, Settled};
pub use watcher::{CreatedEntry, DirectoryWatcher};
