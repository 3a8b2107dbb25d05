use pseudo_core::db::{open_db, open_db_in_memory};
use pseudo_core::{
    BasePseudoFamily, CreateFamilyOptions, FamilyError, FamilyService, InMemoryPseudoStore, Kind,
    PseudoPotential, PseudoPotentialData, PseudoStore, SqlitePseudoStore, Structure, UpfData,
    UpfFamily,
};
use rusqlite::Connection;
use std::fs;
use std::path::Path;

fn upf_content(element: &str) -> String {
    format!(
        "<UPF version=\"2.0.1\">\n  <PP_HEADER\n    element=\"{element}\"\n    pseudo_type=\"NC\"\n  />\n</UPF>\n"
    )
}

fn write_upf_dir(dir: &Path, elements: &[&str]) {
    for element in elements {
        fs::write(dir.join(format!("{element}.upf")), upf_content(element)).unwrap();
    }
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}

fn assert_h_he_scenario<S: PseudoStore>(service: &FamilyService<S>) {
    let dir = tempfile::tempdir().unwrap();
    write_upf_dir(dir.path(), &["H", "He"]);

    let mut family: UpfFamily = service
        .create_from_directory(dir.path(), "X", &CreateFamilyOptions::default())
        .unwrap();
    assert!(family.is_stored());
    assert_eq!(service.elements(&mut family).unwrap(), vec!["H", "He"]);

    let records = service
        .get_records(&mut family, Some(&["H", "He"][..]), None)
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records["H"].element(), Some("H"));
    assert_eq!(records["He"].element(), Some("He"));
    assert!(records.values().all(|record| record.is_stored()));

    let err = service
        .get_records(&mut family, Some(&["Li"][..]), None)
        .unwrap_err();
    assert!(matches!(err, FamilyError::NotFound { ref element, .. } if element == "Li"));
}

#[test]
fn create_from_directory_on_sqlite_store() {
    let conn = open_db_in_memory().unwrap();
    let service = FamilyService::new(SqlitePseudoStore::try_new(&conn).unwrap());
    assert_h_he_scenario(&service);
    assert_eq!(count_rows(&conn, "group_nodes"), 2);
}

#[test]
fn create_from_directory_on_in_memory_store() {
    let service = FamilyService::new(InMemoryPseudoStore::new());
    assert_h_he_scenario(&service);
    assert_eq!(service.store().node_count(), 2);
    assert_eq!(service.store().group_count(), 1);
}

#[test]
fn existing_label_is_rejected_without_store_mutation() {
    let conn = open_db_in_memory().unwrap();
    let service = FamilyService::new(SqlitePseudoStore::try_new(&conn).unwrap());
    let dir = tempfile::tempdir().unwrap();
    write_upf_dir(dir.path(), &["O"]);
    service
        .create_from_directory::<UpfData>(dir.path(), "SSSP", &CreateFamilyOptions::default())
        .unwrap();

    let other = tempfile::tempdir().unwrap();
    write_upf_dir(other.path(), &["Fe", "Ni"]);
    let nodes_before = count_rows(&conn, "nodes");
    let groups_before = count_rows(&conn, "groups");

    let err = service
        .create_from_directory::<UpfData>(other.path(), "SSSP", &CreateFamilyOptions::default())
        .unwrap_err();
    assert!(matches!(err, FamilyError::AlreadyExists { ref label, .. } if label == "SSSP"));
    assert_eq!(count_rows(&conn, "nodes"), nodes_before);
    assert_eq!(count_rows(&conn, "groups"), groups_before);
}

#[test]
fn invalid_directory_leaves_store_untouched() {
    let service = FamilyService::new(InMemoryPseudoStore::new());
    let dir = tempfile::tempdir().unwrap();
    write_upf_dir(dir.path(), &["C"]);
    fs::write(dir.path().join("broken.upf"), "<UPF></UPF>").unwrap();

    let err = service
        .create_from_directory::<UpfData>(dir.path(), "broken", &CreateFamilyOptions::default())
        .unwrap_err();
    assert!(matches!(err, FamilyError::Parsing { ref path, .. } if path.ends_with("broken.upf")));
    assert_eq!(service.store().node_count(), 0);
    assert_eq!(service.store().group_count(), 0);
}

#[test]
fn deduplicate_reuses_stored_record_with_same_checksum() {
    let service = FamilyService::new(InMemoryPseudoStore::new());
    let mut existing = UpfData::from_file(upf_content("Si").into_bytes(), "Si.upf").unwrap();
    service.store_record(&mut existing).unwrap();

    let dir = tempfile::tempdir().unwrap();
    write_upf_dir(dir.path(), &["Si", "C"]);
    let mut family: UpfFamily = service
        .create_from_directory(dir.path(), "dedup", &CreateFamilyOptions::default())
        .unwrap();

    let silicon = service.get_record(&mut family, "Si").unwrap();
    assert_eq!(silicon.uuid(), existing.uuid());
    assert_eq!(service.store().node_count(), 2);
}

#[test]
fn deduplicate_disabled_stores_fresh_records() {
    let service = FamilyService::new(InMemoryPseudoStore::new());
    let mut existing = UpfData::from_file(upf_content("Si").into_bytes(), "Si.upf").unwrap();
    service.store_record(&mut existing).unwrap();

    let dir = tempfile::tempdir().unwrap();
    write_upf_dir(dir.path(), &["Si"]);
    let options = CreateFamilyOptions {
        description: "no dedup".to_string(),
        deduplicate: false,
    };
    let mut family: UpfFamily = service
        .create_from_directory(dir.path(), "fresh", &options)
        .unwrap();

    let silicon = service.get_record(&mut family, "Si").unwrap();
    assert_ne!(silicon.uuid(), existing.uuid());
    assert_eq!(silicon.checksum(), existing.checksum());
    assert_eq!(family.description(), "no dedup");
    assert_eq!(service.store().node_count(), 2);
}

#[test]
fn family_and_elements_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("pseudo.sqlite3");
    let pseudos = tempfile::tempdir().unwrap();
    let nested = pseudos.path().join("SSSP_1.3");
    fs::create_dir(&nested).unwrap();
    write_upf_dir(&nested, &["Ga", "As"]);

    let created_ids = {
        let conn = open_db(&db_path).unwrap();
        let service = FamilyService::new(SqlitePseudoStore::try_new(&conn).unwrap());
        let mut family: UpfFamily = service
            .create_from_directory(pseudos.path(), "GaAs", &CreateFamilyOptions::default())
            .unwrap();
        let records = service.records(&mut family).unwrap();
        (records["Ga"].uuid(), records["As"].uuid())
    };

    let conn = open_db(&db_path).unwrap();
    let service = FamilyService::new(SqlitePseudoStore::try_new(&conn).unwrap());
    let mut family = service.load_family::<UpfData>("GaAs").unwrap();
    assert!(family.cached_members().is_none());

    let structure = Structure::new(vec![
        Kind::new("Ga1", "Ga"),
        Kind::new("As1", "As"),
        Kind::new("Ga2", "Ga"),
    ]);
    let records = service
        .get_records(&mut family, None, Some(&structure))
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records["Ga"].uuid(), created_ids.0);
    assert_eq!(records["As"].uuid(), created_ids.1);
    assert_eq!(records["Ga"].element(), Some("Ga"));
    assert!(records["As"].is_stored());
}

#[test]
fn get_records_requires_exactly_one_argument() {
    let service = FamilyService::new(InMemoryPseudoStore::new());
    let dir = tempfile::tempdir().unwrap();
    write_upf_dir(dir.path(), &["N"]);
    let mut family: UpfFamily = service
        .create_from_directory(dir.path(), "args", &CreateFamilyOptions::default())
        .unwrap();
    let structure: Structure =
        serde_json::from_str(r#"{"kinds": [{"name": "N", "symbol": "N"}]}"#).unwrap();

    let both = service
        .get_records(&mut family, Some(&["N"][..]), Some(&structure))
        .unwrap_err();
    assert!(matches!(both, FamilyError::InvalidInput(_)));

    let neither = service.get_records(&mut family, None, None).unwrap_err();
    assert!(matches!(neither, FamilyError::InvalidInput(_)));

    let from_structure = service
        .get_records(&mut family, None, Some(&structure))
        .unwrap();
    assert_eq!(from_structure.keys().collect::<Vec<_>>(), vec!["N"]);
}

fn stored_hydrogen_with_content<S: PseudoStore>(
    service: &FamilyService<S>,
    content: &str,
) -> PseudoPotentialData {
    let mut hydrogen =
        PseudoPotentialData::from_file(content.as_bytes().to_vec(), "H.dat").unwrap();
    hydrogen.node_mut().set_element("H").unwrap();
    service.store_record(&mut hydrogen).unwrap();
    hydrogen
}

#[test]
fn identical_content_is_only_reused_for_the_same_element() {
    let service = FamilyService::new(InMemoryPseudoStore::new());
    let hydrogen = stored_hydrogen_with_content(&service, "same");

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("H.dat"), "same").unwrap();
    fs::write(dir.path().join("He.dat"), "same").unwrap();
    let mut family: BasePseudoFamily = service
        .create_from_directory(dir.path(), "X", &CreateFamilyOptions::default())
        .unwrap();

    assert_eq!(service.elements(&mut family).unwrap(), vec!["H", "He"]);
    assert_eq!(service.get_record(&mut family, "H").unwrap().uuid(), hydrogen.uuid());
    let helium = service.get_record(&mut family, "He").unwrap();
    assert_ne!(helium.uuid(), hydrogen.uuid());
    assert_eq!(helium.element(), Some("He"));
    assert_eq!(service.store().group_count(), 1);
    assert_eq!(service.store().node_count(), 2);
}

#[test]
fn every_directory_element_survives_a_checksum_match_on_another_element() {
    let conn = open_db_in_memory().unwrap();
    let service = FamilyService::new(SqlitePseudoStore::try_new(&conn).unwrap());
    stored_hydrogen_with_content(&service, "same");

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("He.dat"), "same").unwrap();
    let mut family: BasePseudoFamily = service
        .create_from_directory(dir.path(), "helium", &CreateFamilyOptions::default())
        .unwrap();

    assert_eq!(service.elements(&mut family).unwrap(), vec!["He"]);
    assert_eq!(
        service.get_record(&mut family, "He").unwrap().element(),
        Some("He")
    );

    family.invalidate_members();
    assert_eq!(service.elements(&mut family).unwrap(), vec!["He"]);
    assert_eq!(count_rows(&conn, "nodes"), 2);
}

#[test]
fn failed_create_keeps_the_label_available() {
    let service = FamilyService::new(InMemoryPseudoStore::new());
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("He.dat"), "he").unwrap();
    fs::write(dir.path().join("helium"), "he").unwrap();

    let err = service
        .create_from_directory::<PseudoPotentialData>(
            dir.path(),
            "retry",
            &CreateFamilyOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, FamilyError::Parsing { .. }));
    assert_eq!(service.store().group_count(), 0);

    fs::remove_file(dir.path().join("helium")).unwrap();
    let mut family: BasePseudoFamily = service
        .create_from_directory(dir.path(), "retry", &CreateFamilyOptions::default())
        .unwrap();
    assert_eq!(service.elements(&mut family).unwrap(), vec!["He"]);
}
