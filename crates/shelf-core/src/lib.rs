//! shelf-core library.
//!
//! Document model, storage and oracle seams, and the compaction engine that
//! folds near-duplicate documents into merged ones.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums in the library, each with a stable
//!   [`error::ErrorCode`]; `anyhow::Result` only where configuration is read.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//! - **Collaborators**: the engine borrows `&dyn` trait objects and owns no
//!   I/O of its own.

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod event;
pub mod loader;
pub mod lock;
pub mod oracle;
pub mod store;
pub mod sync;
