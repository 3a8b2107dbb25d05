//! Pseudo-potential family use-case service.
//!
//! # Responsibility
//! - Create families from directories with checksum deduplication.
//! - Enforce one-record-per-element membership with all-or-nothing batches.
//! - Resolve elements and structures to member records.
//!
//! # Invariants
//! - No store write happens before a whole batch has been validated.
//! - New records and their membership are written in one atomic store call.
//! - Record type matching is exact, never by family of related types.

use crate::model::family::PseudoPotentialFamily;
use crate::model::node::{PseudoError, PseudoNode};
use crate::model::pseudo::PseudoPotential;
use crate::model::structure::Structure;
use crate::repo::pseudo_store::{PseudoStore, StoreError};
use crate::service::directory::parse_directory;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub type FamilyResult<T> = Result<T, FamilyError>;

/// Errors from family use-cases.
#[derive(Debug)]
pub enum FamilyError {
    /// Malformed directory or arguments.
    InvalidInput(String),
    /// A file could not be turned into a record.
    Parsing { path: PathBuf, message: String },
    /// A family of the same type already uses the label.
    AlreadyExists {
        family_type: &'static str,
        label: String,
    },
    /// No family of the requested type has the label.
    FamilyNotFound {
        family_type: &'static str,
        label: String,
    },
    /// Target is unstored (families) or stored (records).
    ModificationNotAllowed(String),
    /// Record type tag differs from the family's accepted type.
    WrongRecordType {
        expected: &'static str,
        found: String,
    },
    /// Element is already present in the family or repeated in a batch.
    DuplicateElement { family: String, element: String },
    /// Store returned several records where at most one may exist.
    LookupConsistency { family: String, element: String },
    /// Family has no record for the element.
    NotFound { family: String, element: String },
    /// Filesystem failure while reading a directory or file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Record-level failure not covered above.
    Record(PseudoError),
    /// Backing store failure.
    Store(StoreError),
}

impl Display for FamilyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Parsing { path, message } => {
                write!(f, "failed to parse `{}`: {message}", path.display())
            }
            Self::AlreadyExists { family_type, label } => {
                write!(f, "the {family_type} `{label}` already exists")
            }
            Self::FamilyNotFound { family_type, label } => {
                write!(f, "no {family_type} with label `{label}`")
            }
            Self::ModificationNotAllowed(message) => {
                write!(f, "modification not allowed: {message}")
            }
            Self::WrongRecordType { expected, found } => write!(
                f,
                "only records of type `{expected}` can be added, got `{found}`"
            ),
            Self::DuplicateElement { family, element } => {
                write!(f, "element `{element}` already present in family {family}")
            }
            Self::LookupConsistency { family, element } => {
                write!(f, "family {family} contains multiple pseudos for `{element}`")
            }
            Self::NotFound { family, element } => write!(
                f,
                "family {family} does not contain pseudo for element `{element}`"
            ),
            Self::Io { path, source } => write!(f, "failed to read `{}`: {source}", path.display()),
            Self::Record(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FamilyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Record(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PseudoError> for FamilyError {
    fn from(value: PseudoError) -> Self {
        match value {
            PseudoError::WrongType { expected, found } => {
                Self::WrongRecordType { expected, found }
            }
            PseudoError::ModificationNotAllowed(id) => {
                Self::ModificationNotAllowed(format!("record {id} is stored"))
            }
            other => Self::Record(other),
        }
    }
}

impl From<StoreError> for FamilyError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Options for [`FamilyService::create_from_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFamilyOptions {
    /// Free-form family description.
    pub description: String,
    /// Reuse stored records of the same type with an identical checksum.
    pub deduplicate: bool,
}

impl Default for CreateFamilyOptions {
    fn default() -> Self {
        Self {
            description: String::new(),
            deduplicate: true,
        }
    }
}

/// Family service facade over a backing store.
pub struct FamilyService<S: PseudoStore> {
    store: S,
}

impl<S: PseudoStore> FamilyService<S> {
    /// Creates a service using the provided store implementation.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persists an unstored family. Stored families are left untouched.
    ///
    /// # Errors
    /// - `AlreadyExists` when a family of the same type uses the label.
    pub fn store_family<P: PseudoPotential>(
        &self,
        family: &mut PseudoPotentialFamily<P>,
    ) -> FamilyResult<()> {
        if family.is_stored() {
            return Ok(());
        }

        let already_exists = || FamilyError::AlreadyExists {
            family_type: P::FAMILY_TYPE,
            label: family.label().to_string(),
        };
        if self.store.find_group(P::FAMILY_TYPE, family.label())?.is_some() {
            return Err(already_exists());
        }
        self.store
            .insert_group(&family.to_group_record())
            .map_err(|err| match err {
                StoreError::Conflict(_) => already_exists(),
                other => other.into(),
            })?;

        family.mark_stored();
        if family.cached_members().is_none() {
            family.set_members(BTreeMap::new());
        }
        info!(
            "event=family_store module=service status=ok family_type={} label={}",
            P::FAMILY_TYPE,
            family.label()
        );
        Ok(())
    }

    /// Loads a stored family by label. Members are loaded on first access.
    pub fn load_family<P: PseudoPotential>(
        &self,
        label: &str,
    ) -> FamilyResult<PseudoPotentialFamily<P>> {
        self.store
            .find_group(P::FAMILY_TYPE, label)?
            .map(PseudoPotentialFamily::from_group_record)
            .ok_or_else(|| FamilyError::FamilyNotFound {
                family_type: P::FAMILY_TYPE,
                label: label.to_string(),
            })
    }

    /// Persists one record. Stored records are left untouched.
    pub fn store_record<P: PseudoPotential>(&self, record: &mut P) -> FamilyResult<()> {
        if record.is_stored() {
            return Ok(());
        }
        self.store.insert_node(record.node())?;
        record.node_mut().mark_stored();
        Ok(())
    }

    /// Creates and persists a family from the pseudo potentials in `dirpath`.
    ///
    /// # Contract
    /// - The label is checked, the directory fully parsed and the batch
    ///   validated before any write.
    /// - With `deduplicate`, a stored record of exactly `P` with the same
    ///   checksum and element replaces the freshly parsed one.
    /// - The family, its new records and the membership are written in one
    ///   atomic store call.
    pub fn create_from_directory<P: PseudoPotential>(
        &self,
        dirpath: impl AsRef<Path>,
        label: &str,
        options: &CreateFamilyOptions,
    ) -> FamilyResult<PseudoPotentialFamily<P>> {
        let started_at = Instant::now();
        let already_exists = || FamilyError::AlreadyExists {
            family_type: P::FAMILY_TYPE,
            label: label.to_string(),
        };

        if self.store.find_group(P::FAMILY_TYPE, label)?.is_some() {
            warn!(
                "event=family_create module=service status=rejected reason=label_exists family_type={} label={}",
                P::FAMILY_TYPE,
                label
            );
            return Err(already_exists());
        }

        let mut family = PseudoPotentialFamily::<P>::new(label, options.description.clone());
        let parsed = parse_directory::<P>(dirpath)?;

        let mut records = Vec::with_capacity(parsed.len());
        let mut reused = 0usize;
        for pseudo in parsed {
            if !options.deduplicate {
                records.push(pseudo);
                continue;
            }
            match self.store.find_node_by_checksum(
                P::NODE_TYPE,
                pseudo.checksum(),
                pseudo.element(),
            )? {
                Some(existing) => {
                    debug!(
                        "event=family_create module=service status=dedup element={} node={}",
                        pseudo.element().unwrap_or_default(),
                        existing.uuid()
                    );
                    reused += 1;
                    records.push(P::try_from_node(existing)?);
                }
                None => records.push(pseudo),
            }
        }

        check_batch(&family.to_string(), &BTreeMap::new(), &records)?;

        let nodes: Vec<PseudoNode> = records.iter().map(|record| record.node().clone()).collect();
        match self
            .store
            .insert_group_with_records(&family.to_group_record(), &nodes)
        {
            Ok(()) => {}
            Err(StoreError::Conflict(message)) => {
                if self.store.find_group(P::FAMILY_TYPE, label)?.is_some() {
                    return Err(already_exists());
                }
                return Err(StoreError::Conflict(message).into());
            }
            Err(other) => return Err(other.into()),
        }

        let count = records.len();
        family.mark_stored();
        insert_members(family.members_or_default(), records);

        info!(
            "event=family_create module=service status=ok family_type={} label={} count={} reused={} duration_ms={}",
            P::FAMILY_TYPE,
            label,
            count,
            reused,
            started_at.elapsed().as_millis()
        );
        Ok(family)
    }

    /// Adds one record to a stored family.
    pub fn add_record<P: PseudoPotential>(
        &self,
        family: &mut PseudoPotentialFamily<P>,
        record: P,
    ) -> FamilyResult<()> {
        self.add_records(family, std::iter::once(record))
    }

    /// Adds a batch of records to a stored family.
    ///
    /// # Contract
    /// - All-or-nothing: the batch is validated against the full membership
    ///   before anything is written.
    /// - Unstored records are persisted together with the membership in one
    ///   atomic store call.
    ///
    /// # Errors
    /// - `ModificationNotAllowed` when the family is unstored.
    /// - `WrongRecordType` when a record's type tag is not `P::NODE_TYPE`.
    /// - `InvalidInput` when a record has no element.
    /// - `DuplicateElement` when an element is already a member or repeated.
    pub fn add_records<P, I>(
        &self,
        family: &mut PseudoPotentialFamily<P>,
        records: I,
    ) -> FamilyResult<()>
    where
        P: PseudoPotential,
        I: IntoIterator<Item = P>,
    {
        if !family.is_stored() {
            return Err(FamilyError::ModificationNotAllowed(format!(
                "cannot add records to unstored family {family}"
            )));
        }

        let records: Vec<P> = records.into_iter().collect();
        let family_name = family.to_string();
        check_batch(&family_name, self.loaded_members(family)?, &records)?;
        if records.is_empty() {
            return Ok(());
        }

        let nodes: Vec<PseudoNode> = records.iter().map(|record| record.node().clone()).collect();
        self.store.add_group_records(family.uuid(), &nodes)?;

        let count = records.len();
        insert_members(family.members_or_default(), records);

        info!(
            "event=family_add module=service status=ok family={} count={}",
            family_name, count
        );
        Ok(())
    }

    /// Returns the element-to-record membership, loading it on first access.
    pub fn records<'f, P: PseudoPotential>(
        &self,
        family: &'f mut PseudoPotentialFamily<P>,
    ) -> FamilyResult<&'f BTreeMap<String, P>> {
        Ok(self.loaded_members(family)?)
    }

    /// Returns the element symbols the family defines a record for.
    pub fn elements<P: PseudoPotential>(
        &self,
        family: &mut PseudoPotentialFamily<P>,
    ) -> FamilyResult<Vec<String>> {
        Ok(self.loaded_members(family)?.keys().cloned().collect())
    }

    /// Returns the record for `element`.
    ///
    /// The cache is consulted first; a miss falls back to a targeted store
    /// query constrained to this family, record type and element.
    ///
    /// # Errors
    /// - `LookupConsistency` when the store holds several matches.
    /// - `NotFound` when there is no match.
    pub fn get_record<P: PseudoPotential>(
        &self,
        family: &mut PseudoPotentialFamily<P>,
        element: &str,
    ) -> FamilyResult<P> {
        let family_name = family.to_string();
        let group = family.uuid();
        let is_stored = family.is_stored();

        let members = self.loaded_members(family)?;
        if let Some(record) = members.get(element) {
            return Ok(record.clone());
        }

        let not_found = || FamilyError::NotFound {
            family: family_name.clone(),
            element: element.to_string(),
        };
        if !is_stored {
            return Err(not_found());
        }

        let mut matches = self
            .store
            .find_group_nodes_by_element(group, P::NODE_TYPE, element)?;
        if matches.len() > 1 {
            return Err(FamilyError::LookupConsistency {
                family: family_name,
                element: element.to_string(),
            });
        }
        let node = matches.pop().ok_or_else(not_found)?;
        let record = P::try_from_node(node)?;
        members.insert(element.to_string(), record.clone());
        Ok(record)
    }

    /// Returns records keyed by element for either `elements` or the kinds
    /// of `structure`. Exactly one of the two must be given.
    pub fn get_records<P: PseudoPotential>(
        &self,
        family: &mut PseudoPotentialFamily<P>,
        elements: Option<&[&str]>,
        structure: Option<&Structure>,
    ) -> FamilyResult<BTreeMap<String, P>> {
        let elements: Vec<&str> = match (elements, structure) {
            (Some(_), Some(_)) => {
                return Err(FamilyError::InvalidInput(
                    "cannot specify both `elements` and `structure`".to_string(),
                ))
            }
            (None, None) => {
                return Err(FamilyError::InvalidInput(
                    "have to specify one of `elements` and `structure`".to_string(),
                ))
            }
            (Some(elements), None) => elements.to_vec(),
            (None, Some(structure)) => structure.kind_symbols(),
        };

        let mut records = BTreeMap::new();
        for element in elements {
            let record = self.get_record(family, element)?;
            records.insert(element.to_string(), record);
        }
        Ok(records)
    }

    fn loaded_members<'f, P: PseudoPotential>(
        &self,
        family: &'f mut PseudoPotentialFamily<P>,
    ) -> FamilyResult<&'f mut BTreeMap<String, P>> {
        if family.cached_members().is_none() && family.is_stored() {
            let loaded = self.load_members(family)?;
            family.set_members(loaded);
        }
        Ok(family.members_or_default())
    }

    fn load_members<P: PseudoPotential>(
        &self,
        family: &PseudoPotentialFamily<P>,
    ) -> FamilyResult<BTreeMap<String, P>> {
        let nodes = self.store.list_group_nodes(family.uuid())?;
        let mut members = BTreeMap::new();
        for node in nodes {
            let record = P::try_from_node(node)?;
            let element = match record.element() {
                Some(element) => element.to_string(),
                None => {
                    return Err(FamilyError::Store(StoreError::InvalidData(format!(
                        "member {} of family {family} has no element",
                        record.uuid()
                    ))))
                }
            };
            if members.insert(element.clone(), record).is_some() {
                return Err(FamilyError::LookupConsistency {
                    family: family.to_string(),
                    element,
                });
            }
        }
        debug!(
            "event=family_load_members module=service status=ok family={} count={}",
            family,
            members.len()
        );
        Ok(members)
    }
}

/// Validates a batch against the current membership of `family`.
fn check_batch<P: PseudoPotential>(
    family: &str,
    members: &BTreeMap<String, P>,
    records: &[P],
) -> FamilyResult<()> {
    if let Some(wrong) = records
        .iter()
        .find(|record| record.node().node_type() != P::NODE_TYPE)
    {
        return Err(FamilyError::WrongRecordType {
            expected: P::NODE_TYPE,
            found: wrong.node().node_type().to_string(),
        });
    }

    let mut batch = BTreeSet::new();
    for record in records {
        let element = record.element().ok_or_else(|| {
            FamilyError::InvalidInput(format!(
                "record `{}` does not define an element",
                record.filename()
            ))
        })?;
        if members.contains_key(element) || !batch.insert(element) {
            return Err(FamilyError::DuplicateElement {
                family: family.to_string(),
                element: element.to_string(),
            });
        }
    }
    Ok(())
}

/// Marks persisted `records` stored and caches them by element.
fn insert_members<P: PseudoPotential>(members: &mut BTreeMap<String, P>, records: Vec<P>) {
    for mut record in records {
        record.node_mut().mark_stored();
        if let Some(element) = record.element().map(str::to_string) {
            members.insert(element, record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CreateFamilyOptions, FamilyError, FamilyService};
    use crate::model::family::BasePseudoFamily;
    use crate::model::node::PseudoNode;
    use crate::model::pseudo::{PseudoPotential, PseudoPotentialData, UpfData};
    use crate::repo::memory_store::InMemoryPseudoStore;
    use crate::repo::pseudo_store::PseudoStore;

    fn record(element: &str, content: &str) -> PseudoPotentialData {
        let mut record =
            PseudoPotentialData::from_file(content.as_bytes().to_vec(), &format!("{element}.dat"))
                .unwrap();
        record.node_mut().set_element(element).unwrap();
        record
    }

    #[test]
    fn default_options_deduplicate() {
        let options = CreateFamilyOptions::default();
        assert!(options.deduplicate);
        assert!(options.description.is_empty());
    }

    #[test]
    fn add_records_requires_stored_family() {
        let service = FamilyService::new(InMemoryPseudoStore::new());
        let mut family = BasePseudoFamily::new("unstored", "");

        let err = service
            .add_record(&mut family, record("H", "h"))
            .unwrap_err();
        assert!(matches!(err, FamilyError::ModificationNotAllowed(_)));
        assert_eq!(service.store().node_count(), 0);
    }

    #[test]
    fn add_records_rejects_mismatched_type_tag() {
        let service = FamilyService::new(InMemoryPseudoStore::new());
        let mut family = BasePseudoFamily::new("typed", "");
        service.store_family(&mut family).unwrap();

        let foreign = PseudoPotentialData::from_node_unchecked(PseudoNode::new(
            UpfData::NODE_TYPE,
            "He.upf",
            b"he".to_vec(),
        ));
        let err = service.add_record(&mut family, foreign).unwrap_err();
        assert!(matches!(
            err,
            FamilyError::WrongRecordType { expected: "pseudo", ref found } if found == "pseudo.upf"
        ));
    }

    #[test]
    fn batch_with_repeated_element_writes_nothing() {
        let service = FamilyService::new(InMemoryPseudoStore::new());
        let mut family = BasePseudoFamily::new("batch", "");
        service.store_family(&mut family).unwrap();

        let err = service
            .add_records(&mut family, vec![record("O", "o1"), record("O", "o2")])
            .unwrap_err();
        assert!(matches!(err, FamilyError::DuplicateElement { ref element, .. } if element == "O"));
        assert_eq!(service.store().node_count(), 0);
        assert!(service.elements(&mut family).unwrap().is_empty());
    }

    #[test]
    fn record_without_element_is_rejected() {
        let service = FamilyService::new(InMemoryPseudoStore::new());
        let mut family = BasePseudoFamily::new("no-element", "");
        service.store_family(&mut family).unwrap();

        let bare = PseudoPotentialData::from_file(b"x".to_vec(), "unknown").unwrap();
        let err = service.add_record(&mut family, bare).unwrap_err();
        assert!(matches!(err, FamilyError::InvalidInput(_)));
    }

    #[test]
    fn get_record_falls_back_to_store_query_on_cache_miss() {
        let service = FamilyService::new(InMemoryPseudoStore::new());
        let mut family = BasePseudoFamily::new("fallback", "");
        service.store_family(&mut family).unwrap();

        let mut helium = record("He", "he");
        service.store_record(&mut helium).unwrap();
        service
            .store()
            .add_group_records(family.uuid(), &[helium.node().clone()])
            .unwrap();

        let found = service.get_record(&mut family, "He").unwrap();
        assert_eq!(found.uuid(), helium.uuid());
        assert!(family.cached_members().unwrap().contains_key("He"));
    }

    #[test]
    fn duplicated_membership_is_a_consistency_error() {
        let service = FamilyService::new(InMemoryPseudoStore::new());
        let mut family = BasePseudoFamily::new("corrupted", "");
        service.store_family(&mut family).unwrap();

        let mut first = record("Ne", "ne1");
        let mut second = record("Ne", "ne2");
        service.store_record(&mut first).unwrap();
        service.store_record(&mut second).unwrap();
        service
            .store()
            .add_group_records(
                family.uuid(),
                &[first.node().clone(), second.node().clone()],
            )
            .unwrap();

        let err = service.get_record(&mut family, "Ne").unwrap_err();
        assert!(matches!(err, FamilyError::LookupConsistency { .. }));

        family.invalidate_members();
        let err = service.get_record(&mut family, "Ne").unwrap_err();
        assert!(matches!(err, FamilyError::LookupConsistency { ref element, .. } if element == "Ne"));
    }

    #[test]
    fn load_family_requires_existing_label() {
        let service = FamilyService::new(InMemoryPseudoStore::new());
        let err = service
            .load_family::<PseudoPotentialData>("missing")
            .unwrap_err();
        assert!(matches!(err, FamilyError::FamilyNotFound { .. }));
    }
}
