//! Metadata store persistence and error-message integration tests.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use rstest::rstest;
use tidesync_core::{
    paths,
    types::{Changestamp, Origin, OriginClass, OriginRecord, ResourceId},
    MetadataStore, StoreError, YamlMetadataStore,
};

fn record(class: OriginClass, dir: &str, last_seen: Option<i64>) -> OriginRecord {
    let mut record = OriginRecord::pending(Some(ResourceId::from(dir)));
    record.class = class;
    record.last_seen = last_seen.map(Changestamp);
    record
}

#[test]
fn metadata_file_contains_classifications() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut store = YamlMetadataStore::open_at(home.path()).expect("open");
    store
        .set_origin_classification(
            &Origin::for_app("notes"),
            &record(OriginClass::Incremental, "folder:notes", Some(12)),
        )
        .expect("set notes");
    store
        .set_origin_classification(
            &Origin::for_app("music"),
            &record(OriginClass::Disabled, "folder:music", None),
        )
        .expect("set music");

    let file = home.child(".tidesync").child("metadata.yaml");
    file.assert(predicate::path::exists());
    file.assert(predicate::str::contains("app://notes/"));
    file.assert(predicate::str::contains("class: incremental"));
    file.assert(predicate::str::contains("class: disabled"));
    file.assert(predicate::str::contains("last_seen: 12"));
}

#[rstest]
#[case(OriginClass::PendingBatch)]
#[case(OriginClass::Incremental)]
#[case(OriginClass::Disabled)]
fn every_classification_survives_reopen(#[case] class: OriginClass) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let origin = Origin::for_app("notes");
    {
        let mut store = YamlMetadataStore::open_at(home.path()).expect("open");
        store
            .set_origin_classification(&origin, &record(class, "folder:notes", Some(3)))
            .expect("set");
    }
    let store = YamlMetadataStore::open_at(home.path()).expect("reopen");
    let origins = store.load_origins();
    assert_eq!(origins.len(), 1);
    assert_eq!(origins[0].1.class, class);
}

#[test]
fn wrong_shape_yaml_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    paths::ensure_root(home.path()).expect("root");
    std::fs::write(
        paths::metadata_path(home.path()),
        b"- this is a list, not a mapping\n",
    )
    .expect("write");

    let err = YamlMetadataStore::open_at(home.path()).unwrap_err();
    assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
}

#[test]
fn home_not_found_error_message() {
    assert!(StoreError::HomeNotFound.to_string().contains("home directory"));
}
