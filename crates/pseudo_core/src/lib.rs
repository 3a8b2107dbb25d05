//! Core domain logic for pseudo-potential families.
//! Families hold at most one content-addressed pseudo-potential record per
//! chemical element and delegate persistence to a pluggable store.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::family::{BasePseudoFamily, PseudoPotentialFamily, PsmlFamily, UpfFamily};
pub use model::node::{compute_checksum, NodeId, PseudoError, PseudoNode};
pub use model::pseudo::{PseudoPotential, PseudoPotentialData, PsmlData, UpfData};
pub use model::structure::{Kind, Structure};
pub use repo::memory_store::InMemoryPseudoStore;
pub use repo::pseudo_store::{GroupId, GroupRecord, PseudoStore, StoreError, StoreResult};
pub use repo::sqlite_store::SqlitePseudoStore;
pub use service::directory::{element_from_filename, parse_directory, parse_directory_with};
pub use service::family_service::{
    CreateFamilyOptions, FamilyError, FamilyResult, FamilyService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
