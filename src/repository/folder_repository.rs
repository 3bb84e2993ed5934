use rusqlite::{params, Connection, OptionalExtension};

use crate::model::repository::Folder;

/// looks up a folder id by name within a parent folder
pub fn get_folder_id(
    name: &str,
    parent_id: i64,
    con: &Connection,
) -> Result<Option<i64>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/folder/get_folder_id.sql"))?;
    pst.query_row(params![name, parent_id], |row| row.get(0))
        .optional()
}

/// creates a folder record and returns its id. This does not check for name
/// collisions or that the parent exists; the caller must do that first.
pub fn create_folder(folder: &Folder, con: &Connection) -> Result<i64, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/folder/create_folder.sql"))?;
    pst.insert(params![folder.name, folder.parent_id])
}

/// deletes a folder record. The caller must check emptiness first.
pub fn delete_folder(id: i64, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/folder/delete_folder.sql"))?;
    pst.execute(params![id])?;
    Ok(())
}

/// renames and/or moves a folder. Collision checks are the caller's job.
pub fn update_folder(
    id: i64,
    new_name: &str,
    new_parent_id: i64,
    con: &Connection,
) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/folder/update_folder.sql"))?;
    pst.execute(params![new_name, new_parent_id, id])?;
    Ok(())
}

/// names of the folders directly inside the given folder
pub fn get_child_folder_names(
    parent_id: i64,
    con: &Connection,
) -> Result<Vec<String>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/folder/get_child_folder_names.sql"
    ))?;
    let rows = pst.query_map(params![parent_id], |row| row.get(0))?;
    rows.collect()
}

/// number of files directly inside the given folder; used for the emptiness
/// check before a folder delete
pub fn count_child_files(folder_id: i64, con: &Connection) -> Result<i64, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/folder/count_child_files.sql"
    ))?;
    pst.query_row(params![folder_id], |row| row.get(0))
}
