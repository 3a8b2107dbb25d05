//! Content-addressed pseudo-potential node.
//!
//! # Responsibility
//! - Hold the raw file content of one pseudo potential with its checksum.
//! - Enforce immutability once the node has been persisted.
//!
//! # Invariants
//! - `checksum` is always the SHA-256 hex digest of `content`.
//! - `element`, when set, is a valid chemical symbol.
//! - Stored nodes reject every mutation with `ModificationNotAllowed`.

use crate::model::element::is_valid_element;
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one persisted node.
pub type NodeId = Uuid;

/// Errors raised by record construction and mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoError {
    /// File content could not be parsed by the record type.
    Parsing(String),
    /// Element symbol is not part of the periodic table.
    InvalidElement(String),
    /// Node is stored and therefore immutable.
    ModificationNotAllowed(NodeId),
    /// Node type tag does not match the requested record type exactly.
    WrongType {
        expected: &'static str,
        found: String,
    },
}

impl Display for PseudoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parsing(message) => write!(f, "{message}"),
            Self::InvalidElement(symbol) => write!(f, "invalid element symbol `{symbol}`"),
            Self::ModificationNotAllowed(id) => {
                write!(f, "node {id} is stored and cannot be modified")
            }
            Self::WrongType { expected, found } => {
                write!(f, "expected node of type `{expected}`, got `{found}`")
            }
        }
    }
}

impl Error for PseudoError {}

/// Raw node shared by every pseudo-potential record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoNode {
    uuid: NodeId,
    node_type: String,
    filename: String,
    element: Option<String>,
    checksum: String,
    content: Vec<u8>,
    is_stored: bool,
}

impl PseudoNode {
    /// Creates an unstored node with a fresh id.
    pub fn new(node_type: impl Into<String>, filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            node_type: node_type.into(),
            filename: filename.into(),
            element: None,
            checksum: compute_checksum(&content),
            content,
            is_stored: false,
        }
    }

    /// Rebuilds a node loaded from a backing store.
    ///
    /// The returned node is marked as stored. The checksum is recomputed from
    /// `content`; callers compare it with the persisted value when needed.
    pub fn restore(
        uuid: NodeId,
        node_type: impl Into<String>,
        filename: impl Into<String>,
        element: Option<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            uuid,
            node_type: node_type.into(),
            filename: filename.into(),
            element,
            checksum: compute_checksum(&content),
            content,
            is_stored: true,
        }
    }

    pub fn uuid(&self) -> NodeId {
        self.uuid
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn element(&self) -> Option<&str> {
        self.element.as_deref()
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn is_stored(&self) -> bool {
        self.is_stored
    }

    /// Assigns the element symbol of an unstored node.
    ///
    /// # Errors
    /// - `ModificationNotAllowed` when the node is stored.
    /// - `InvalidElement` when `symbol` is not a chemical element.
    pub fn set_element(&mut self, symbol: impl Into<String>) -> Result<(), PseudoError> {
        self.ensure_mutable()?;
        let symbol = symbol.into();
        if !is_valid_element(&symbol) {
            return Err(PseudoError::InvalidElement(symbol));
        }
        self.element = Some(symbol);
        Ok(())
    }

    /// Replaces the file content of an unstored node and refreshes its checksum.
    pub fn set_content(
        &mut self,
        filename: impl Into<String>,
        content: Vec<u8>,
    ) -> Result<(), PseudoError> {
        self.ensure_mutable()?;
        self.checksum = compute_checksum(&content);
        self.content = content;
        self.filename = filename.into();
        Ok(())
    }

    pub(crate) fn mark_stored(&mut self) {
        self.is_stored = true;
    }

    fn ensure_mutable(&self) -> Result<(), PseudoError> {
        if self.is_stored {
            return Err(PseudoError::ModificationNotAllowed(self.uuid));
        }
        Ok(())
    }
}

/// Returns the lower-case hex SHA-256 digest of `content`.
pub fn compute_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
