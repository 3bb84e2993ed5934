use rusqlite::{params, Connection, OptionalExtension};

use crate::model::repository::FileRecord;

/// looks up a file id by basename within a parent folder
pub fn get_file_id(
    name: &str,
    parent_id: i64,
    con: &Connection,
) -> Result<Option<i64>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/file/get_file_id.sql"))?;
    pst.query_row(params![name, parent_id], |row| row.get(0))
        .optional()
}

/// ids of all files directly inside the given folder
pub fn get_file_ids_in_folder(
    parent_id: i64,
    con: &Connection,
) -> Result<Vec<i64>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/file/get_file_ids_in_folder.sql"
    ))?;
    let rows = pst.query_map(params![parent_id], |row| row.get(0))?;
    rows.collect()
}

/// the basename of the file with the given id
pub fn get_filename(file_id: i64, con: &Connection) -> Result<Option<String>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/file/get_filename.sql"))?;
    pst.query_row(params![file_id], |row| row.get(0)).optional()
}

/// basenames of all files directly inside the given folder
pub fn get_child_file_names(
    parent_id: i64,
    con: &Connection,
) -> Result<Vec<String>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/file/get_child_file_names.sql"
    ))?;
    let rows = pst.query_map(params![parent_id], |row| row.get(0))?;
    rows.collect()
}

/// the content digest of a file addressed by basename and parent folder.
/// While a first write is in flight this is a `TEMP<seq>` placeholder.
pub fn get_hash(
    name: &str,
    parent_id: i64,
    con: &Connection,
) -> Result<Option<String>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/file/get_hash.sql"))?;
    pst.query_row(params![name, parent_id], |row| row.get(0))
        .optional()
}

/// the content digest of the file with the given id
pub fn get_hash_by_id(file_id: i64, con: &Connection) -> Result<Option<String>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/file/get_hash_by_id.sql"))?;
    pst.query_row(params![file_id], |row| row.get(0)).optional()
}

/// points the file record at a new object-store blob after a write or
/// truncate changed its contents
pub fn update_hash(file_id: i64, new_hash: &str, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/file/update_hash.sql"))?;
    pst.execute(params![new_hash, file_id])?;
    Ok(())
}

/// creates a file record and returns its id. Collision checks are the
/// caller's job.
pub fn create_file(file: &FileRecord, con: &Connection) -> Result<i64, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/file/create_file.sql"))?;
    pst.insert(params![file.name, file.hash, file.parent_id])
}

/// deletes a file record. Object-store reference counting and tag membership
/// cleanup happen in the service layer.
pub fn delete_file(file_id: i64, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/file/delete_file.sql"))?;
    pst.execute(params![file_id])?;
    Ok(())
}

/// renames and/or moves a file record
pub fn update_file(
    file_id: i64,
    new_name: &str,
    new_parent_id: i64,
    con: &Connection,
) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/file/update_file.sql"))?;
    pst.execute(params![new_name, new_parent_id, file_id])?;
    Ok(())
}

/// total number of file records
pub fn count_files(con: &Connection) -> Result<i64, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/file/count_files.sql"))?;
    pst.query_row([], |row| row.get(0))
}

/// how many file records point at the given blob; drives refcounted unlink
pub fn count_hash_references(hash: &str, con: &Connection) -> Result<i64, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/file/count_hash_references.sql"
    ))?;
    pst.query_row(params![hash], |row| row.get(0))
}
