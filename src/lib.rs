//! File tree synchronization and mutation engine.
//!
//! A [`engine::TreeService`] mirrors a hierarchy reachable only through a
//! capability-based [`fs::storage::StorageProvider`] (create, read-all,
//! write-all, recursive remove) and synthesizes rename on top of it. Without
//! a connection it edits an in-memory workspace instead.

pub mod config;
pub mod edit;
pub mod engine;
pub mod error;
pub mod fs;
pub mod handler;
pub mod logging;
pub mod notify;
pub mod view;
