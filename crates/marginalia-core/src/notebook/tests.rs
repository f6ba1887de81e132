use super::*;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn open(dir: &Path) -> Notebook {
    Notebook::open(dir).unwrap()
}

#[test]
fn test_append_get_roundtrip() {
    let dir = tempdir().unwrap();
    let nb = open(dir.path());

    let id = nb
        .append("DDIA ch. 3", "SSTables and LSM-trees", &["storage", "DDIA"])
        .unwrap();
    let record = nb.get(id).unwrap();
    assert_eq!(record.body, "SSTables and LSM-trees");
    assert_eq!(record.source, "DDIA ch. 3");
    assert!(record.tags.contains("DDIA"));
    assert!(record.tags.contains("storage"));
}

#[test]
fn test_invalid_tag_rejected_before_write() {
    let dir = tempdir().unwrap();
    let nb = open(dir.path());

    let err = nb.append("src", "body", &["ok", "  "]).unwrap_err();
    assert!(matches!(err, MarginaliaError::InvalidValue { .. }));
    assert_eq!(nb.stats().unwrap().live_records, 0);
}

#[test]
fn test_delete_hides_from_queries_and_get() {
    let dir = tempdir().unwrap();
    let nb = open(dir.path());
    let id = nb.append("src", "lazy deletion", &["gc"]).unwrap();

    nb.delete(id).unwrap();
    assert!(matches!(nb.get(id), Err(MarginaliaError::NotFound { .. })));
    assert!(matches!(nb.delete(id), Err(MarginaliaError::NotFound { .. })));
    assert!(nb
        .query_ids(&Query::term("lazy"), &QueryOptions::default())
        .unwrap()
        .is_empty());

    let stats = nb.stats().unwrap();
    assert_eq!(stats.tombstoned_records, 1);
    assert_eq!(stats.stale_entries, 1);
}

#[test]
fn test_search_paging() {
    let dir = tempdir().unwrap();
    let nb = open(dir.path());
    let ids: Vec<_> = (0..5)
        .map(|i| nb.append("src", &format!("entry {}", i), &["log"]).unwrap())
        .collect();

    let page = nb
        .search(&Query::tag("log"), &QueryOptions::limit(2).with_offset(1))
        .unwrap();
    let got: Vec<_> = page.iter().map(|h| h.id).collect();
    assert_eq!(got, vec![ids[3], ids[2]]);
    assert_eq!(page[0].body, "entry 3");
}

#[test]
fn test_default_limit_from_config() {
    let dir = tempdir().unwrap();
    let mut config = NotebookConfig::default();
    config.query.default_limit = Some(2);
    let nb = Notebook::open_with_config(dir.path(), config).unwrap();
    for i in 0..4 {
        nb.append("src", &format!("note {}", i), &["t"]).unwrap();
    }

    assert_eq!(
        nb.query_ids(&Query::tag("t"), &QueryOptions::default())
            .unwrap()
            .len(),
        2
    );
    assert_eq!(
        nb.query_ids(&Query::tag("t"), &QueryOptions::limit(3))
            .unwrap()
            .len(),
        3
    );
}

#[test]
fn test_search_text_reports_parse_errors() {
    let dir = tempdir().unwrap();
    let nb = open(dir.path());
    let err = nb
        .search_text("tag:go AND", &QueryOptions::default())
        .unwrap_err();
    assert!(matches!(err, MarginaliaError::InvalidQuery { position: 10, .. }));
}

#[test]
fn test_verify_detects_and_repair_heals_dangling_entries() {
    let dir = tempdir().unwrap();
    let nb = open(dir.path());
    let keep = nb.append("src", "kept note", &["x"]).unwrap();
    let lost = nb.append("src", "lost note", &["x"]).unwrap();

    // Tombstone behind the index's back
    nb.store.delete(lost).unwrap();

    match nb.verify_index() {
        Err(MarginaliaError::IndexCorruption { dangling }) => assert_eq!(dangling, vec![lost]),
        other => panic!("expected IndexCorruption, got {:?}", other),
    }
    // Searches never surface the missing record
    let hits = nb.search(&Query::tag("x"), &QueryOptions::default()).unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![keep]);

    let report = nb.repair_index().unwrap();
    assert_eq!(report.healed_dangling, 1);
    assert_eq!(report.purged_records, 0);
    nb.verify_index().unwrap();
    assert_eq!(
        nb.query_ids(&Query::tag("x"), &QueryOptions::default())
            .unwrap(),
        vec![keep]
    );
}

#[test]
fn test_in_flight_delete_is_not_reported_dangling() {
    let dir = tempdir().unwrap();
    let nb = open(dir.path());
    nb.append("src", "kept", &["x"]).unwrap();
    let gone = nb.append("src", "gone", &["x"]).unwrap();

    // Candidates computed from a version older than the store scan
    let older = nb.snapshot();
    nb.delete(gone).unwrap();
    let scan = nb.store.scan_live().unwrap();
    let live: HashSet<RecordId> = scan.records.iter().map(|r| r.id).collect();
    let candidates = older.dangling_ids(&live, scan.high_water);
    assert_eq!(candidates, vec![gone]);

    assert!(nb.settle_dangling(candidates).is_empty());
    nb.verify_index().unwrap();
    assert_eq!(nb.repair_index().unwrap().healed_dangling, 0);
}

#[test]
fn test_held_snapshot_does_not_block_writers() {
    let dir = tempdir().unwrap();
    let nb = Arc::new(open(dir.path()));
    let first = nb.append("src", "snapshot isolation", &["mvcc"]).unwrap();

    // A reader mid-query keeps its version for as long as it likes
    let held = nb.snapshot();

    let (tx, rx) = mpsc::channel();
    let writer = {
        let nb = Arc::clone(&nb);
        thread::spawn(move || {
            let second = nb.append("src", "copy on write", &["mvcc"]).unwrap();
            nb.delete(first).unwrap();
            tx.send(second).unwrap();
        })
    };
    let second = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("writer blocked behind a reader");
    writer.join().unwrap();

    let stats = QueryStats::new();
    let seen_by_reader = evaluate(&held, &Query::tag("mvcc"), &CancelFlag::new(), &stats).unwrap();
    assert_eq!(seen_by_reader, vec![first]);
    assert_eq!(
        nb.query_ids(&Query::tag("mvcc"), &QueryOptions::default())
            .unwrap(),
        vec![second]
    );
}

#[test]
fn test_tags_counts_live_records() {
    let dir = tempdir().unwrap();
    let nb = open(dir.path());
    nb.append("src", "a", &["Go"]).unwrap();
    nb.append("src", "b", &["go", "rust"]).unwrap();
    let c = nb.append("src", "c", &["rust"]).unwrap();
    nb.delete(c).unwrap();

    assert_eq!(
        nb.tags(),
        vec![("go".to_string(), 2), ("rust".to_string(), 1)]
    );
}

#[test]
fn test_open_reads_config_file() {
    let dir = tempdir().unwrap();
    let mut config = NotebookConfig::default();
    config.index.stemming = true;
    config
        .save(&dir.path().join(crate::config::CONFIG_FILE))
        .unwrap();

    let nb = open(dir.path());
    assert!(nb.config().index.stemming);
    nb.append("src", "buffered channels", &["go"]).unwrap();
    assert_eq!(
        nb.query_ids(&Query::term("channel"), &QueryOptions::default())
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_notebook_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Notebook>();
}
