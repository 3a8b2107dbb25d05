//! Storage port and its implementations.
//!
//! # Responsibility
//! - Define the node/group persistence contract used by family services.
//! - Provide SQLite and in-memory implementations of that contract.
//!
//! # Invariants
//! - Stores return semantic errors (`Conflict`, `NotFound`) in addition to
//!   transport errors.
//! - Node type matching is always exact.

pub mod memory_store;
pub mod pseudo_store;
pub mod sqlite_store;
