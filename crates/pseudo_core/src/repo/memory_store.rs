//! In-memory implementation of the pseudo store port.
//!
//! Single-threaded by construction (`RefCell`); mirrors the SQLite store's
//! uniqueness and atomicity rules so services behave the same on both.

use crate::model::node::{NodeId, PseudoNode};
use crate::repo::pseudo_store::{GroupId, GroupRecord, PseudoStore, StoreError, StoreResult};
use std::cell::RefCell;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct MemoryState {
    nodes: Vec<PseudoNode>,
    groups: Vec<GroupRecord>,
    members: BTreeMap<GroupId, Vec<NodeId>>,
}

impl MemoryState {
    fn node(&self, id: NodeId) -> Option<&PseudoNode> {
        self.nodes.iter().find(|node| node.uuid() == id)
    }

    fn group_nodes(&self, group: GroupId) -> impl Iterator<Item = &PseudoNode> {
        self.members
            .get(&group)
            .into_iter()
            .flatten()
            .filter_map(|id| self.node(*id))
    }

    fn check_new_group(&self, group: &GroupRecord) -> StoreResult<()> {
        if self.groups.iter().any(|existing| {
            existing.uuid == group.uuid
                || (existing.type_string == group.type_string && existing.label == group.label)
        }) {
            return Err(StoreError::Conflict(format!(
                "group `{}` of type `{}` already exists",
                group.label, group.type_string
            )));
        }
        Ok(())
    }

    fn check_new_node(&self, node: &PseudoNode) -> StoreResult<()> {
        if self.node(node.uuid()).is_some() {
            return Err(StoreError::Conflict(format!(
                "node {} already exists",
                node.uuid()
            )));
        }
        Ok(())
    }

    fn check_attach(&self, group: GroupId, nodes: &[PseudoNode]) -> StoreResult<()> {
        let current = self.members.get(&group).map(Vec::as_slice).unwrap_or_default();
        for (index, node) in nodes.iter().enumerate() {
            let id = node.uuid();
            if node.is_stored() {
                if self.node(id).is_none() {
                    return Err(StoreError::NotFound(format!("node {id}")));
                }
            } else {
                self.check_new_node(node)?;
            }
            if current.contains(&id) || nodes[..index].iter().any(|other| other.uuid() == id) {
                return Err(StoreError::Conflict(format!(
                    "node {id} already in group {group}"
                )));
            }
        }
        Ok(())
    }

    fn attach(&mut self, group: GroupId, nodes: &[PseudoNode]) {
        for node in nodes.iter().filter(|node| !node.is_stored()) {
            self.push_node(node);
        }
        self.members
            .entry(group)
            .or_default()
            .extend(nodes.iter().map(PseudoNode::uuid));
    }

    fn push_node(&mut self, node: &PseudoNode) {
        let mut stored = node.clone();
        stored.mark_stored();
        self.nodes.push(stored);
    }
}

/// Process-local pseudo store.
#[derive(Debug, Default)]
pub struct InMemoryPseudoStore {
    state: RefCell<MemoryState>,
}

impl InMemoryPseudoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes.
    pub fn node_count(&self) -> usize {
        self.state.borrow().nodes.len()
    }

    /// Number of stored groups.
    pub fn group_count(&self) -> usize {
        self.state.borrow().groups.len()
    }
}

impl PseudoStore for InMemoryPseudoStore {
    fn find_group(&self, type_string: &str, label: &str) -> StoreResult<Option<GroupRecord>> {
        Ok(self
            .state
            .borrow()
            .groups
            .iter()
            .find(|group| group.type_string == type_string && group.label == label)
            .cloned())
    }

    fn insert_group(&self, group: &GroupRecord) -> StoreResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_new_group(group)?;
        state.groups.push(group.clone());
        Ok(())
    }

    fn insert_node(&self, node: &PseudoNode) -> StoreResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_new_node(node)?;
        state.push_node(node);
        Ok(())
    }

    fn get_node(&self, id: NodeId) -> StoreResult<Option<PseudoNode>> {
        Ok(self.state.borrow().node(id).cloned())
    }

    fn find_node_by_checksum(
        &self,
        node_type: &str,
        checksum: &str,
        element: Option<&str>,
    ) -> StoreResult<Option<PseudoNode>> {
        Ok(self
            .state
            .borrow()
            .nodes
            .iter()
            .find(|node| {
                node.node_type() == node_type
                    && node.checksum() == checksum
                    && node.element() == element
            })
            .cloned())
    }

    fn add_group_records(&self, group: GroupId, nodes: &[PseudoNode]) -> StoreResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.groups.iter().any(|existing| existing.uuid == group) {
            return Err(StoreError::NotFound(format!("group {group}")));
        }
        state.check_attach(group, nodes)?;
        state.attach(group, nodes);
        Ok(())
    }

    fn insert_group_with_records(
        &self,
        group: &GroupRecord,
        nodes: &[PseudoNode],
    ) -> StoreResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_new_group(group)?;
        state.check_attach(group.uuid, nodes)?;
        state.groups.push(group.clone());
        state.attach(group.uuid, nodes);
        Ok(())
    }

    fn list_group_nodes(&self, group: GroupId) -> StoreResult<Vec<PseudoNode>> {
        Ok(self.state.borrow().group_nodes(group).cloned().collect())
    }

    fn find_group_nodes_by_element(
        &self,
        group: GroupId,
        node_type: &str,
        element: &str,
    ) -> StoreResult<Vec<PseudoNode>> {
        Ok(self
            .state
            .borrow()
            .group_nodes(group)
            .filter(|node| node.node_type() == node_type && node.element() == Some(element))
            .cloned()
            .collect())
    }
}
