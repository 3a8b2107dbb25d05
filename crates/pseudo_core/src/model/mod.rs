//! Domain model for pseudo-potential records.
//!
//! # Responsibility
//! - Define the content-addressed node shared by every record variant.
//! - Define the `PseudoPotential` contract that families are generic over.
//!
//! # Invariants
//! - Every record is identified by a stable `NodeId`.
//! - Records are immutable once stored.

pub mod element;
pub mod family;
pub mod node;
pub mod pseudo;
pub mod structure;
