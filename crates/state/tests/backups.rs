mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cluster_state::{
    BackupCatalog, IdGenerator, Metadata, StateConfig, DEFAULT_CHECKSUM_FORMAT,
};
use cluster_state_storage::MemoryStore;

use common::{finished_metadata, origin};

fn catalog() -> BackupCatalog<MemoryStore> {
    BackupCatalog::new(Arc::new(MemoryStore::new()), &StateConfig::default())
}

fn check_metadata(actual: &Metadata, expected: &Metadata, id: &str) {
    assert_eq!(actual.id(), Some(id));
    assert_eq!(actual.notes(), expected.notes());
    assert_eq!(
        actual.timestamp().unix_timestamp(),
        expected.timestamp().unix_timestamp()
    );
    assert_eq!(actual.checksum(), expected.checksum());
    assert_eq!(actual.checksum_format(), expected.checksum_format());
    assert_eq!(actual.size(), expected.size());
    assert_eq!(actual.origin(), expected.origin());
    assert_eq!(actual.stored(), expected.stored());
}

// ── get ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_returns_inserted_record() {
    let catalog = catalog();
    let expected = finished_metadata();
    let id = catalog.insert(&expected).await.unwrap();

    let actual = catalog.get(&id).await.unwrap();
    check_metadata(&actual, &expected, &id);
    assert_eq!(actual.checksum_format(), DEFAULT_CHECKSUM_FORMAT);
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let err = catalog().get("spam").await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

// ── insert ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_round_trips_notes_checksum_size_origin() {
    let catalog = catalog();
    let mut expected = Metadata::new(origin(), "N");
    expected.finish(42, "H", "").unwrap();

    let id = catalog.insert(&expected).await.unwrap();
    let actual = catalog.get(&id).await.unwrap();

    assert_eq!(actual.notes(), "N");
    assert_eq!(actual.checksum(), "H");
    assert_eq!(actual.size(), 42);
    assert_eq!(actual.origin(), &origin());
    assert!(!actual.stored());
    assert_eq!(actual.timestamp(), expected.timestamp());
}

#[tokio::test]
async fn insert_generates_distinct_ids() {
    let catalog = catalog();
    let meta = finished_metadata();
    let first = catalog.insert(&meta).await.unwrap();
    let second = catalog.insert(&meta).await.unwrap();
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[tokio::test]
async fn insert_uses_preassigned_id() {
    let catalog = catalog();
    let mut meta = finished_metadata();
    meta.set_id("spam");
    let id = catalog.insert(&meta).await.unwrap();
    assert_eq!(id, "spam");
    catalog.get("spam").await.unwrap();
}

#[tokio::test]
async fn insert_empty_record_fails_validation() {
    let catalog = catalog();
    let empty = Metadata::default();
    assert!(empty.timestamp().unix_timestamp() > 0);

    let err = catalog.insert(&empty).await.unwrap_err();
    assert!(err.is_validation(), "{err}");
}

#[tokio::test]
async fn insert_with_taken_id_is_already_exists() {
    let catalog = catalog();
    let expected = finished_metadata();
    let id = catalog.insert(&expected).await.unwrap();

    let mut other = Metadata::new(origin(), "different");
    other.finish(7, "other hash", "md5").unwrap();
    let err = catalog.insert_with_id(&other, &id).await.unwrap_err();
    assert!(err.is_already_exists(), "{err}");

    let kept = catalog.get(&id).await.unwrap();
    check_metadata(&kept, &expected, &id);
}

#[tokio::test]
async fn second_insert_with_same_preassigned_id_fails() {
    let catalog = catalog();
    let mut meta = finished_metadata();
    meta.set_id("b1");
    catalog.insert(&meta).await.unwrap();

    let err = catalog.insert(&meta).await.unwrap_err();
    assert!(err.is_already_exists(), "{err}");
    assert_eq!(err.to_string(), "backup metadata b1 already exists");
}

#[tokio::test]
async fn storage_location_is_persisted() {
    let catalog = catalog();
    let mut meta = finished_metadata();
    meta.set_storage_location("backups/2014-03-01.tar.gz");
    let id = catalog.insert(&meta).await.unwrap();
    assert_eq!(
        catalog.get(&id).await.unwrap().storage_location(),
        Some("backups/2014-03-01.tar.gz")
    );
}

/// Hands out "fixed-0", "fixed-1", ... then repeats "fixed-0".
struct CyclingIds(AtomicUsize);

impl IdGenerator for CyclingIds {
    fn next_id(&self) -> String {
        format!("fixed-{}", self.0.fetch_add(1, Ordering::SeqCst) % 2)
    }
}

#[tokio::test]
async fn generated_id_collision_is_rejected() {
    let catalog = BackupCatalog::with_id_generator(
        Arc::new(MemoryStore::new()),
        &StateConfig::default(),
        CyclingIds(AtomicUsize::new(0)),
    );
    let meta = finished_metadata();
    assert_eq!(catalog.insert(&meta).await.unwrap(), "fixed-0");
    assert_eq!(catalog.insert(&meta).await.unwrap(), "fixed-1");
    let err = catalog.insert(&meta).await.unwrap_err();
    assert!(err.is_already_exists(), "{err}");
}

// ── set_stored ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn set_stored_flips_flag_and_is_idempotent() {
    let catalog = catalog();
    let id = catalog.insert(&finished_metadata()).await.unwrap();
    assert!(!catalog.get(&id).await.unwrap().stored());

    catalog.set_stored(&id).await.unwrap();
    let stored = catalog.get(&id).await.unwrap();
    assert!(stored.stored());
    assert_eq!(stored.size(), 42);

    catalog.set_stored(&id).await.unwrap();
    assert!(catalog.get(&id).await.unwrap().stored());
}

#[tokio::test]
async fn set_stored_missing_is_not_found() {
    let err = catalog().set_stored("spam").await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn reinserted_stored_record_starts_unstored() {
    let catalog = catalog();
    let id = catalog.insert(&finished_metadata()).await.unwrap();
    catalog.set_stored(&id).await.unwrap();
    let stored = catalog.get(&id).await.unwrap();
    assert!(stored.stored());

    catalog.insert_with_id(&stored, "copy").await.unwrap();
    let copy = catalog.get("copy").await.unwrap();
    assert!(!copy.stored());
    assert_eq!(copy.checksum(), stored.checksum());
    assert!(catalog.get(&id).await.unwrap().stored());
}
