//! Storage port for pseudo-potential nodes and family groups.
//!
//! # Responsibility
//! - Define the persistence contract consumed by family services.
//! - Keep node/group storage details out of membership and lookup logic.
//!
//! # Invariants
//! - `insert_node` and `insert_group` never overwrite existing rows.
//! - `add_group_records` and `insert_group_with_records` are all-or-nothing,
//!   node inserts included.
//! - Listing order follows insertion order.

use crate::db::DbError;
use crate::model::node::{NodeId, PseudoNode};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one persisted group.
pub type GroupId = Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from backing store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Row with the same unique key already exists.
    Conflict(String),
    /// Referenced group or node does not exist.
    NotFound(String),
    /// Persisted data cannot be converted into a valid node or group.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Conflict(message) => write!(f, "store conflict: {message}"),
            Self::NotFound(message) => write!(f, "store entry not found: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "pseudo store requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persisted group row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub uuid: GroupId,
    /// Family type tag, e.g. `pseudo.family.upf`.
    pub type_string: String,
    /// Unique per `type_string`.
    pub label: String,
    pub description: String,
}

/// Backing store contract for nodes, groups and group membership.
pub trait PseudoStore {
    /// Finds a group by type tag and label.
    fn find_group(&self, type_string: &str, label: &str) -> StoreResult<Option<GroupRecord>>;
    /// Inserts a group. Fails with `Conflict` on `(type_string, label)` collision.
    fn insert_group(&self, group: &GroupRecord) -> StoreResult<()>;
    /// Inserts a node. Fails with `Conflict` when the id already exists.
    fn insert_node(&self, node: &PseudoNode) -> StoreResult<()>;
    /// Loads one node by id.
    fn get_node(&self, id: NodeId) -> StoreResult<Option<PseudoNode>>;
    /// Returns the first stored node of exactly `node_type` with `checksum`
    /// and `element`.
    fn find_node_by_checksum(
        &self,
        node_type: &str,
        checksum: &str,
        element: Option<&str>,
    ) -> StoreResult<Option<PseudoNode>>;
    /// Attaches `nodes` to a stored group in one atomic step.
    ///
    /// Unstored nodes are inserted first; stored nodes must already exist.
    fn add_group_records(&self, group: GroupId, nodes: &[PseudoNode]) -> StoreResult<()>;
    /// Inserts `group` and attaches `nodes` to it in one atomic step.
    fn insert_group_with_records(
        &self,
        group: &GroupRecord,
        nodes: &[PseudoNode],
    ) -> StoreResult<()>;
    /// Lists every node of a group.
    fn list_group_nodes(&self, group: GroupId) -> StoreResult<Vec<PseudoNode>>;
    /// Lists group nodes of exactly `node_type` with the given element.
    fn find_group_nodes_by_element(
        &self,
        group: GroupId,
        node_type: &str,
        element: &str,
    ) -> StoreResult<Vec<PseudoNode>>;
}
