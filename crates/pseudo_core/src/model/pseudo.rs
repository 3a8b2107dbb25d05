//! Pseudo-potential record types.
//!
//! # Responsibility
//! - Define the `PseudoPotential` contract shared by every record variant.
//! - Parse the element symbol out of file content for formats that carry it.
//!
//! # Invariants
//! - A typed record always wraps a node whose `node_type` equals the record's
//!   `NODE_TYPE` exactly.
//! - Parsing never mutates a record when it fails.

use crate::model::element::is_valid_element;
use crate::model::node::{NodeId, PseudoError, PseudoNode};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Debug;

static UPF_V2_ELEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\belement\s*=\s*['"]\s*([a-z]{1,2})\s*['"]"#).expect("valid upf v2 regex")
});
static UPF_V1_ELEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*([A-Za-z]{1,2})\s+Element\b").expect("valid upf v1 regex")
});
static PSML_ELEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<pseudo-atom-spec\b[^>]*\batomic-label\s*=\s*['"]\s*([A-Za-z]{1,2})\s*['"]"#)
        .expect("valid psml regex")
});

/// Contract for one concrete pseudo-potential record variant.
///
/// Families are generic over this trait, so the accepted record type is fixed
/// at compile time. `NODE_TYPE` is still persisted and checked at the store
/// boundary, where nodes of every variant share one table.
pub trait PseudoPotential: Clone + Debug {
    /// Type tag persisted with every node of this variant.
    const NODE_TYPE: &'static str;
    /// Type tag of the family that hosts this variant.
    const FAMILY_TYPE: &'static str;

    /// Parses the element symbol from raw content.
    ///
    /// Returns `Ok(None)` for formats that do not carry the element.
    fn parse_element(content: &[u8]) -> Result<Option<String>, PseudoError>;

    /// Wraps `node` without checking its type tag.
    fn from_node_unchecked(node: PseudoNode) -> Self;

    fn node(&self) -> &PseudoNode;

    fn node_mut(&mut self) -> &mut PseudoNode;

    /// Builds an unstored record from file content.
    fn from_file(content: Vec<u8>, filename: &str) -> Result<Self, PseudoError> {
        let element = Self::parse_element(&content)?;
        let mut node = PseudoNode::new(Self::NODE_TYPE, filename, content);
        if let Some(element) = element {
            node.set_element(element)?;
        }
        Ok(Self::from_node_unchecked(node))
    }

    /// Converts a raw node into this record type.
    ///
    /// # Errors
    /// - `WrongType` unless the node type tag equals `NODE_TYPE` exactly.
    fn try_from_node(node: PseudoNode) -> Result<Self, PseudoError> {
        if node.node_type() != Self::NODE_TYPE {
            return Err(PseudoError::WrongType {
                expected: Self::NODE_TYPE,
                found: node.node_type().to_string(),
            });
        }
        Ok(Self::from_node_unchecked(node))
    }

    /// Replaces the file of an unstored record.
    ///
    /// The element is re-parsed from the new content; formats that do not
    /// carry an element keep the current one.
    fn set_file(&mut self, content: Vec<u8>, filename: &str) -> Result<(), PseudoError> {
        if self.node().is_stored() {
            return Err(PseudoError::ModificationNotAllowed(self.node().uuid()));
        }
        let element = Self::parse_element(&content)?;
        if let Some(symbol) = element.as_deref() {
            if !is_valid_element(symbol) {
                return Err(PseudoError::InvalidElement(symbol.to_string()));
            }
        }

        let node = self.node_mut();
        node.set_content(filename, content)?;
        if let Some(element) = element {
            node.set_element(element)?;
        }
        Ok(())
    }

    fn uuid(&self) -> NodeId {
        self.node().uuid()
    }

    fn element(&self) -> Option<&str> {
        self.node().element()
    }

    fn checksum(&self) -> &str {
        self.node().checksum()
    }

    fn filename(&self) -> &str {
        self.node().filename()
    }

    fn is_stored(&self) -> bool {
        self.node().is_stored()
    }
}

/// Format-agnostic record; the element comes from the filename or the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoPotentialData {
    node: PseudoNode,
}

impl PseudoPotential for PseudoPotentialData {
    const NODE_TYPE: &'static str = "pseudo";
    const FAMILY_TYPE: &'static str = "pseudo.family";

    fn parse_element(_content: &[u8]) -> Result<Option<String>, PseudoError> {
        Ok(None)
    }

    fn from_node_unchecked(node: PseudoNode) -> Self {
        Self { node }
    }

    fn node(&self) -> &PseudoNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut PseudoNode {
        &mut self.node
    }
}

/// Unified Pseudopotential Format record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpfData {
    node: PseudoNode,
}

impl PseudoPotential for UpfData {
    const NODE_TYPE: &'static str = "pseudo.upf";
    const FAMILY_TYPE: &'static str = "pseudo.family.upf";

    /// Reads the element from the v2 `element="..."` header attribute, falling
    /// back to the v1 `<symbol>  Element` header line.
    fn parse_element(content: &[u8]) -> Result<Option<String>, PseudoError> {
        let text = String::from_utf8_lossy(content);
        let captured = UPF_V2_ELEMENT_RE
            .captures(&text)
            .or_else(|| UPF_V1_ELEMENT_RE.captures(&text))
            .and_then(|captures| captures.get(1))
            .map(|symbol| capitalize_symbol(symbol.as_str()));

        match captured {
            Some(symbol) => Ok(Some(symbol)),
            None => Err(PseudoError::Parsing(
                "could not parse the element from the UPF content".to_string(),
            )),
        }
    }

    fn from_node_unchecked(node: PseudoNode) -> Self {
        Self { node }
    }

    fn node(&self) -> &PseudoNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut PseudoNode {
        &mut self.node
    }
}

/// PSML (XML) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsmlData {
    node: PseudoNode,
}

impl PseudoPotential for PsmlData {
    const NODE_TYPE: &'static str = "pseudo.psml";
    const FAMILY_TYPE: &'static str = "pseudo.family.psml";

    fn parse_element(content: &[u8]) -> Result<Option<String>, PseudoError> {
        let text = String::from_utf8_lossy(content);
        PSML_ELEMENT_RE
            .captures(&text)
            .and_then(|captures| captures.get(1))
            .map(|symbol| Some(capitalize_symbol(symbol.as_str())))
            .ok_or_else(|| {
                PseudoError::Parsing(
                    "could not parse `atomic-label` from the PSML `pseudo-atom-spec`".to_string(),
                )
            })
    }

    fn from_node_unchecked(node: PseudoNode) -> Self {
        Self { node }
    }

    fn node(&self) -> &PseudoNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut PseudoNode {
        &mut self.node
    }
}

pub(crate) fn capitalize_symbol(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
