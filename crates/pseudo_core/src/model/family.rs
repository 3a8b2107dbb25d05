//! Pseudo-potential family model.
//!
//! # Responsibility
//! - Hold family identity (label, description, type tag) and stored state.
//! - Own the element-to-record membership cache.
//!
//! # Invariants
//! - The accepted record type is fixed by the type parameter `P`.
//! - `members` is `None` until first loaded; once loaded it mirrors the
//!   persisted membership and is only extended through the family service.
//! - `invalidate_members()` drops the cache so the next access reloads it.

use crate::model::pseudo::{PseudoPotential, PseudoPotentialData, PsmlData, UpfData};
use crate::repo::pseudo_store::{GroupId, GroupRecord};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Family hosting `UpfData` records.
pub type UpfFamily = PseudoPotentialFamily<UpfData>;
/// Family hosting `PsmlData` records.
pub type PsmlFamily = PseudoPotentialFamily<PsmlData>;
/// Family hosting format-agnostic records.
pub type BasePseudoFamily = PseudoPotentialFamily<PseudoPotentialData>;

/// Labelled collection with at most one record of type `P` per element.
#[derive(Debug, Clone)]
pub struct PseudoPotentialFamily<P: PseudoPotential> {
    uuid: GroupId,
    label: String,
    description: String,
    is_stored: bool,
    members: Option<BTreeMap<String, P>>,
}

impl<P: PseudoPotential> PseudoPotentialFamily<P> {
    /// Creates an unstored family.
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            label: label.into(),
            description: description.into(),
            is_stored: false,
            members: None,
        }
    }

    /// Type tag of this family, shared by every family hosting `P`.
    pub fn type_string() -> &'static str {
        P::FAMILY_TYPE
    }

    /// Type tag of the records this family accepts.
    pub fn pseudo_type() -> &'static str {
        P::NODE_TYPE
    }

    pub fn uuid(&self) -> GroupId {
        self.uuid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_stored(&self) -> bool {
        self.is_stored
    }

    /// Returns the membership cache if it has been loaded.
    pub fn cached_members(&self) -> Option<&BTreeMap<String, P>> {
        self.members.as_ref()
    }

    /// Drops the membership cache; the next lookup reloads it from the store.
    pub fn invalidate_members(&mut self) {
        self.members = None;
    }

    pub(crate) fn members_or_default(&mut self) -> &mut BTreeMap<String, P> {
        self.members.get_or_insert_with(BTreeMap::new)
    }

    pub(crate) fn set_members(&mut self, members: BTreeMap<String, P>) {
        self.members = Some(members);
    }

    pub(crate) fn mark_stored(&mut self) {
        self.is_stored = true;
    }

    pub(crate) fn to_group_record(&self) -> GroupRecord {
        GroupRecord {
            uuid: self.uuid,
            type_string: P::FAMILY_TYPE.to_string(),
            label: self.label.clone(),
            description: self.description.clone(),
        }
    }

    /// Rebuilds a stored family from its group row. The cache starts empty.
    pub(crate) fn from_group_record(group: GroupRecord) -> Self {
        Self {
            uuid: group.uuid,
            label: group.label,
            description: group.description,
            is_stored: true,
            members: None,
        }
    }
}

impl<P: PseudoPotential> Display for PseudoPotentialFamily<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}<{}>", P::FAMILY_TYPE, self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::{PsmlFamily, UpfFamily};

    #[test]
    fn new_family_is_unstored_without_cache() {
        let family = UpfFamily::new("SSSP", "efficiency");
        assert!(!family.is_stored());
        assert!(family.cached_members().is_none());
        assert_eq!(family.to_string(), "pseudo.family.upf<SSSP>");
        assert_eq!(UpfFamily::pseudo_type(), "pseudo.upf");
    }

    #[test]
    fn group_record_round_trip_keeps_identity() {
        let family = PsmlFamily::new("PseudoDojo", "");
        let record = family.to_group_record();
        assert_eq!(record.type_string, "pseudo.family.psml");

        let restored = PsmlFamily::from_group_record(record);
        assert_eq!(restored.uuid(), family.uuid());
        assert_eq!(restored.label(), "PseudoDojo");
        assert!(restored.is_stored());
    }
}
