//! Tests for per-unit population

use super::*;
use crate::layout::{MODULE_CONTENT_XML, MODULE_METADATA_XML};
use cnxpop_model::{
    Document, DocumentBody, PortalType, ResolvedIdentity, ResourceRef, UnitMetadata,
};
use cnxpop_storage::{ArchiveStore, ArchiveTransaction, SqliteStore};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use uuid::Uuid;

const CC_BY_3: &str = "http://creativecommons.org/licenses/by/3.0/";

fn test_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.ensure_schema().unwrap();
    store
}

fn module(legacy_id: &str, resources: Vec<ResourceRef>) -> Document {
    Document {
        abstract_text: "Compare and contrast anatomy and physiology".to_string(),
        license_url: CC_BY_3.to_string(),
        metadata: UnitMetadata::new(PortalType::Module, legacy_id, "1.4", "Overview", "en"),
        keywords: vec!["anatomy".into(), "energy".into(), "anatomy".into()],
        subjects: vec!["Science and Technology".into()],
        body: DocumentBody::Module { resources },
    }
}

fn minted() -> ResolvedIdentity {
    ResolvedIdentity {
        uuid: Uuid::new_v4(),
        ident: None,
    }
}

/// Write the module's own XML files into `dir`.
fn write_module_xml(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(MODULE_METADATA_XML), "<document/>").unwrap();
    fs::write(dir.join(MODULE_CONTENT_XML), "<document/>").unwrap();
}

#[test]
fn test_attachments_for_module_list_xml_then_resources() {
    let doc = module(
        "m1",
        vec![ResourceRef::new("figure.png", "image/png")],
    );
    let files = attachments(&doc, Path::new("/archive/m1"));

    let names: Vec<_> = files.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(names, vec![MODULE_METADATA_XML, MODULE_CONTENT_XML, "figure.png"]);
    assert!(files[0].required);
    assert!(!files[1].required);
    assert!(!files[2].required);
    assert_eq!(files[2].path, Path::new("/archive/m1/figure.png"));
    assert_eq!(files[0].mimetype, "text/xml");
}

#[test]
fn test_attachments_for_collection_is_manifest_only() {
    let mut doc = module("col1", Vec::new());
    doc.metadata.portal_type = PortalType::Collection;
    doc.body = DocumentBody::Collection {
        modules: vec!["m1".into()],
    };

    let files = attachments(&doc, Path::new("/archive"));
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "collection.xml");
    assert!(files[0].required);
}

#[test]
fn test_populate_module_writes_all_records() {
    let dir = tempdir().unwrap();
    let module_dir = dir.path().join("m1");
    write_module_xml(&module_dir);
    fs::write(module_dir.join("figure.png"), b"png").unwrap();

    let doc = module("m1", vec![ResourceRef::new("figure.png", "image/png")]);
    let identity = minted();
    let mut store = test_store();

    let mut tx = store.begin().unwrap();
    let unit = populate_unit(&mut tx, &doc, &identity, &module_dir).unwrap();
    tx.commit().unwrap();

    assert_eq!(unit.legacy_id, "m1");
    assert_eq!(unit.uuid, identity.uuid);
    assert_eq!(unit.files_attached, 3);
    assert!(unit.missing.is_empty());
    assert_eq!(unit.tags, 1);
    assert_eq!(unit.keywords, 2);

    let stored = &store.find_units("m1").unwrap()[0];
    assert_eq!(stored.ident, unit.ident);
    assert_eq!(stored.abstract_id, unit.abstract_id);
    assert!(unit.abstract_id.is_some());

    let files = store.unit_files(unit.ident).unwrap();
    let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names, vec![MODULE_METADATA_XML, MODULE_CONTENT_XML, "figure.png"]);
    assert_eq!(files[2].mimetype, "image/png");
    assert_eq!(files[2].size, 3);

    assert_eq!(
        store.unit_keywords(unit.ident).unwrap(),
        vec!["anatomy", "energy"]
    );
    assert_eq!(
        store.unit_tags(unit.ident).unwrap(),
        vec!["Science and Technology"]
    );
}

#[test]
fn test_empty_abstract_creates_no_abstract_row() {
    let dir = tempdir().unwrap();
    write_module_xml(dir.path());
    let mut doc = module("m1", Vec::new());
    doc.abstract_text.clear();

    let mut store = test_store();
    let mut tx = store.begin().unwrap();
    let unit = populate_unit(&mut tx, &doc, &minted(), dir.path()).unwrap();
    tx.commit().unwrap();

    assert_eq!(unit.abstract_id, None);
    assert_eq!(store.find_units("m1").unwrap()[0].abstract_id, None);
}

#[test]
fn test_missing_resource_is_skipped_and_recorded() {
    let dir = tempdir().unwrap();
    write_module_xml(dir.path());
    fs::write(dir.path().join("a.jpg"), b"a").unwrap();
    fs::write(dir.path().join("c.pdf"), b"c").unwrap();

    let doc = module(
        "m1",
        vec![
            ResourceRef::new("a.jpg", "image/jpeg"),
            ResourceRef::new("b.png", "image/png"),
            ResourceRef::new("c.pdf", "application/pdf"),
        ],
    );

    let mut store = test_store();
    let mut tx = store.begin().unwrap();
    let unit = populate_unit(&mut tx, &doc, &minted(), dir.path()).unwrap();
    tx.commit().unwrap();

    assert_eq!(unit.missing.len(), 1);
    assert_eq!(unit.missing[0].filename, "b.png");
    assert_eq!(unit.missing[0].legacy_id, "m1");
    assert!(unit.missing[0].to_string().contains("b.png"));

    let resources: Vec<_> = store
        .unit_files(unit.ident)
        .unwrap()
        .into_iter()
        .filter(|f| f.filename != MODULE_METADATA_XML && f.filename != MODULE_CONTENT_XML)
        .map(|f| f.filename)
        .collect();
    assert_eq!(resources, vec!["a.jpg", "c.pdf"]);
}

#[test]
fn test_resources_outside_module_directory_are_never_read() {
    let dir = tempdir().unwrap();
    let module_dir = dir.path().join("m1");
    write_module_xml(&module_dir);
    let secret = dir.path().join("outside-secret.txt");
    fs::write(&secret, b"top secret").unwrap();
    fs::write(module_dir.join("figure.png"), b"png").unwrap();

    let absolute = secret.to_str().unwrap().to_string();
    let doc = module(
        "m1",
        vec![
            ResourceRef::new("../outside-secret.txt", "text/plain"),
            ResourceRef::new(absolute.clone(), "text/plain"),
            ResourceRef::new("figure.png", "image/png"),
        ],
    );

    let mut store = test_store();
    let mut tx = store.begin().unwrap();
    let unit = populate_unit(&mut tx, &doc, &minted(), &module_dir).unwrap();
    tx.commit().unwrap();

    let skipped: Vec<_> = unit.missing.iter().map(|m| m.filename.as_str()).collect();
    assert_eq!(skipped, vec!["../outside-secret.txt", absolute.as_str()]);

    let stored: Vec<_> = store
        .unit_files(unit.ident)
        .unwrap()
        .into_iter()
        .map(|f| f.filename)
        .collect();
    assert_eq!(stored, vec![MODULE_METADATA_XML, MODULE_CONTENT_XML, "figure.png"]);
}

#[test]
fn test_repeated_subject_is_counted_once() {
    let dir = tempdir().unwrap();
    write_module_xml(dir.path());
    let mut doc = module("m1", Vec::new());
    doc.subjects = vec!["Science and Technology".into(), "Science and Technology".into()];

    let mut store = test_store();
    let mut tx = store.begin().unwrap();
    let unit = populate_unit(&mut tx, &doc, &minted(), dir.path()).unwrap();
    tx.commit().unwrap();

    assert_eq!(unit.tags, 1);
    assert_eq!(store.unit_tags(unit.ident).unwrap(), vec!["Science and Technology"]);
}

#[test]
fn test_missing_raw_content_is_a_warning() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(MODULE_METADATA_XML), "<document/>").unwrap();

    let mut store = test_store();
    let mut tx = store.begin().unwrap();
    let unit = populate_unit(&mut tx, &module("m1", Vec::new()), &minted(), dir.path()).unwrap();

    assert_eq!(unit.files_attached, 1);
    assert_eq!(unit.missing[0].filename, MODULE_CONTENT_XML);
}

#[test]
fn test_missing_required_xml_is_fatal() {
    let dir = tempdir().unwrap();
    let mut store = test_store();
    let mut tx = store.begin().unwrap();

    let err = populate_unit(&mut tx, &module("m1", Vec::new()), &minted(), dir.path()).unwrap_err();
    assert!(matches!(err, PopulateError::Io { .. }));
}

#[test]
fn test_unknown_license_fails_before_unit_row() {
    let dir = tempdir().unwrap();
    write_module_xml(dir.path());
    let mut doc = module("m1", Vec::new());
    doc.license_url = "http://example.com/proprietary".to_string();

    let mut store = test_store();
    {
        let mut tx = store.begin().unwrap();
        let err = populate_unit(&mut tx, &doc, &minted(), dir.path()).unwrap_err();
        match err {
            PopulateError::UnknownLicense { url } => {
                assert_eq!(url, "http://example.com/proprietary")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert!(store.units().unwrap().is_empty());
}

#[test]
fn test_unknown_subject_is_skipped() {
    let dir = tempdir().unwrap();
    write_module_xml(dir.path());
    let mut doc = module("m1", Vec::new());
    doc.subjects = vec!["Astrology".into(), "Mathematics and Statistics".into()];

    let mut store = test_store();
    let mut tx = store.begin().unwrap();
    let unit = populate_unit(&mut tx, &doc, &minted(), dir.path()).unwrap();
    tx.commit().unwrap();

    assert_eq!(unit.tags, 1);
    assert_eq!(
        store.unit_tags(unit.ident).unwrap(),
        vec!["Mathematics and Statistics"]
    );
}

#[test]
fn test_keyword_is_shared_across_units() {
    let dir = tempdir().unwrap();
    write_module_xml(dir.path());
    let mut store = test_store();

    let mut idents = Vec::new();
    for id in ["m1", "m2"] {
        let mut tx = store.begin().unwrap();
        let unit = populate_unit(&mut tx, &module(id, Vec::new()), &minted(), dir.path()).unwrap();
        tx.commit().unwrap();
        idents.push(unit.ident);
    }

    assert_eq!(store.keyword_rows("energy").unwrap(), 1);
    for ident in idents {
        assert!(store
            .unit_keywords(ident)
            .unwrap()
            .contains(&"energy".to_string()));
    }
}

#[test]
fn test_known_identity_is_kept() {
    let dir = tempdir().unwrap();
    write_module_xml(dir.path());
    let identity = ResolvedIdentity {
        uuid: Uuid::new_v4(),
        ident: Some(42),
    };

    let mut store = test_store();
    let mut tx = store.begin().unwrap();
    let unit = populate_unit(&mut tx, &module("m1", Vec::new()), &identity, dir.path()).unwrap();
    tx.commit().unwrap();

    assert_eq!(unit.ident, 42);
    let stored = &store.find_units("m1").unwrap()[0];
    assert_eq!(stored.ident, 42);
    assert_eq!(stored.uuid, identity.uuid);
}
