use std::path::Path;
use std::time::Duration;

use rusqlite::{backup, Connection, Result};

pub mod file_repository;
pub mod folder_repository;
pub mod tag_repository;

/// opens a fresh in-memory database holding the metadata index and creates
/// the schema along with its reserved root rows
pub fn open_connection() -> Result<Connection> {
    let con = Connection::open_in_memory()?;
    con.execute_batch(include_str!("../assets/init.sql"))?;
    Ok(con)
}

/// opens the metadata index for the daemon: the snapshot at `path` when one
/// exists, otherwise a fresh schema. The index lives in memory for the
/// lifetime of the daemon and is only written back by [`save_snapshot`].
pub fn open_metadata_db(path: &Path) -> Result<Connection> {
    if path.exists() {
        let mut con = Connection::open_in_memory()?;
        load_snapshot(&mut con, path)?;
        Ok(con)
    } else {
        open_connection()
    }
}

/// replaces the contents of the in-memory database with the snapshot at `path`
fn load_snapshot(con: &mut Connection, path: &Path) -> Result<()> {
    let source = Connection::open(path)?;
    let backup = backup::Backup::new(&source, con)?;
    backup.run_to_completion(64, Duration::from_millis(0), None)?;
    Ok(())
}

/// writes the in-memory database out to the snapshot file at `path`,
/// replacing whatever the file held before
pub fn save_snapshot(con: &Connection, path: &Path) -> Result<()> {
    let mut destination = Connection::open(path)?;
    let backup = backup::Backup::new(con, &mut destination)?;
    backup.run_to_completion(64, Duration::from_millis(0), None)?;
    Ok(())
}

#[cfg(test)]
mod snapshot_tests {
    use crate::model::repository::Folder;
    use crate::repository::{folder_repository, open_connection, open_metadata_db, save_snapshot};

    #[test]
    fn fresh_database_has_reserved_roots() {
        let con = open_connection().unwrap();
        let folder_count: i64 = con
            .query_row("SELECT COUNT(*) FROM folders", [], |row| row.get(0))
            .unwrap();
        let tag_count: i64 = con
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(1, folder_count);
        assert_eq!(1, tag_count);
    }

    #[test]
    fn snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("fs.db");
        let con = open_connection().unwrap();
        folder_repository::create_folder(
            &Folder {
                id: None,
                name: "docs".to_string(),
                parent_id: Some(1),
            },
            &con,
        )
        .unwrap();
        save_snapshot(&con, &db_path).unwrap();
        con.close().unwrap();

        let restored = open_metadata_db(&db_path).unwrap();
        let id = folder_repository::get_folder_id("docs", 1, &restored).unwrap();
        assert_eq!(Some(2), id);
    }

    #[test]
    fn missing_snapshot_yields_fresh_schema() {
        let dir = tempfile::tempdir().unwrap();
        let con = open_metadata_db(&dir.path().join("fs.db")).unwrap();
        let id = folder_repository::get_folder_id("anything", 1, &con).unwrap();
        assert_eq!(None, id);
    }
}
