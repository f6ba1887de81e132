mod purge;

use super::RecordStore;
use crate::config::StorageConfig;
use crate::record::NewRecord;
use std::path::Path;

fn open_store(dir: &Path) -> RecordStore {
    RecordStore::open(&dir.join(super::DB_FILE), &StorageConfig::default()).unwrap()
}

fn note(source: &str, body: &str, tags: &[&str]) -> NewRecord {
    NewRecord::new(source, body, tags).unwrap()
}
