use rusqlite::Connection;

use crate::model::repository::FileRecord;
use crate::repository::{self, file_repository};
use crate::service::object_store::{self, ObjectStore};

/// a fresh in-memory metadata index with the schema and reserved roots
pub fn test_connection() -> Connection {
    repository::open_connection().unwrap()
}

/// a scratch object store; keep the `TempDir` alive for the duration of the
/// test or the directory disappears under the store
pub fn test_store() -> (tempfile::TempDir, ObjectStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ObjectStore::new(dir.path());
    (dir, store)
}

/// stages `content` into the store as a deduplicated blob and records a file
/// row pointing at it, the way a completed write leaves things
pub fn add_stored_file(
    name: &str,
    parent_id: i64,
    content: &str,
    store: &ObjectStore,
    con: &Connection,
) -> (i64, String) {
    let staged = store.root().join(format!("{name}.staged"));
    std::fs::write(&staged, content).unwrap();
    let hash = object_store::digest_file(&staged).unwrap();
    if store.contains(&hash) {
        std::fs::remove_file(&staged).unwrap();
    } else {
        store.materialize(&staged, &hash).unwrap();
    }
    let id = file_repository::create_file(
        &FileRecord {
            id: None,
            name: name.to_string(),
            hash: hash.clone(),
            parent_id,
        },
        con,
    )
    .unwrap();
    (id, hash)
}
