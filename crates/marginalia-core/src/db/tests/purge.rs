use super::{note, open_store};
use crate::config::StorageConfig;
use crate::db::{RecordStore, DB_FILE};
use rusqlite::Connection;
use tempfile::tempdir;

#[test]
fn test_purge_removes_only_tombstoned_rows() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let a = store.append(note("s", "a", &[])).unwrap().id;
    let b = store.append(note("s", "b", &[])).unwrap().id;
    let c = store.append(note("s", "c", &[])).unwrap().id;
    store.delete(a).unwrap();
    store.delete(c).unwrap();

    let outcome = store.purge_tombstones().unwrap();
    assert_eq!(outcome.purged, vec![a, c]);

    assert!(store.get_including_deleted(a).unwrap().is_none());
    assert!(store.get(b).is_ok());
    let stats = store.stats().unwrap();
    assert_eq!(stats.live_records, 1);
    assert_eq!(stats.tombstoned_records, 0);
}

#[test]
fn test_ids_are_not_reused_after_purging_newest() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let a = store.append(note("s", "a", &[])).unwrap().id;
    store.delete(a).unwrap();
    store.purge_tombstones().unwrap();

    let b = store.append(note("s", "b", &[])).unwrap().id;
    assert!(b > a);
}

#[test]
fn test_purge_with_nothing_to_do() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.append(note("s", "a", &[])).unwrap();

    assert!(store.purge_tombstones().unwrap().purged.is_empty());
    assert_eq!(store.reclaim_space(16).unwrap(), Some(0));
}

#[test]
fn test_purge_spans_several_batches() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let mut dead = Vec::new();
    for i in 0..1200 {
        let id = store.append(note("s", &format!("n{}", i), &[])).unwrap().id;
        if i % 3 != 0 {
            store.delete(id).unwrap();
            dead.push(id);
        }
    }

    let outcome = store.purge_tombstones().unwrap();
    assert_eq!(outcome.purged, dead);
    let stats = store.stats().unwrap();
    assert_eq!(stats.live_records, 400);
    assert_eq!(stats.tombstoned_records, 0);
}

#[test]
fn test_reclaim_space_shrinks_store_in_steps() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let body = "filler ".repeat(1000);
    let ids: Vec<_> = (0..200)
        .map(|_| store.append(note("s", &body, &[])).unwrap().id)
        .collect();
    for id in &ids[..180] {
        store.delete(*id).unwrap();
    }
    store.purge_tombstones().unwrap();
    let before = store.stats().unwrap().size_bytes;

    let released = store.reclaim_space(4).unwrap().unwrap();
    assert!(released > 4, "released {} pages", released);
    assert!(store.stats().unwrap().size_bytes < before);
    assert_eq!(store.reclaim_space(4).unwrap(), Some(0));

    // The store stays writable and consistent afterwards
    let fresh = store.append(note("s", "after vacuum", &[])).unwrap().id;
    assert_eq!(store.get(fresh).unwrap().body, "after vacuum");
    assert_eq!(store.stats().unwrap().live_records, 21);
}

#[test]
fn test_reclaim_space_skips_stores_without_incremental_vacuum() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(DB_FILE);
    {
        // A table written first fixes auto_vacuum at its default of NONE
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE unrelated (x INTEGER)").unwrap();
    }
    let store = RecordStore::open(&path, &StorageConfig::default()).unwrap();
    let id = store.append(note("s", &"x ".repeat(5000), &[])).unwrap().id;
    store.delete(id).unwrap();
    store.purge_tombstones().unwrap();

    assert_eq!(store.reclaim_space(4).unwrap(), None);
}
