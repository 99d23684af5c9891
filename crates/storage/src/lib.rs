//! Snapshot persistence for Questline.
//!
//! This crate provides a trait-based interface for saving the quest state
//! that survives restarts, with a JSON file implementation and an
//! in-memory one.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;
pub mod memory;

pub use trait_::{SnapshotStore, StorageError, Result};
pub use json_storage::JsonSnapshotStore;
pub use memory::MemorySnapshotStore;
