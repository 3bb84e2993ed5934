use std::backtrace::Backtrace;
use std::fs::{self, OpenOptions};
use std::path::Path;

use rusqlite::Connection;

use crate::model::error::file_errors::{
    CreateFileError, DeleteFileError, GetFileError, RenamePathError, TruncateFileError,
    UpdateFileError,
};
use crate::model::error::folder_errors::GetFolderError;
use crate::model::repository::FileRecord;
use crate::repository::{file_repository, folder_repository, tag_repository};
use crate::service::folder_service;
use crate::service::object_store::{
    self, ObjectStore, EMPTY_FILE_HASH, TRUNCATE_SUFFIX, WRITE_SUFFIX,
};
use crate::util;

/// splits a folder-view path into its basename and the resolved id of its
/// parent folder. `None` when the path is the root or the parent is missing.
fn split_parent(path: &str, con: &Connection) -> Result<Option<(String, i64)>, GetFolderError> {
    let mut parts = util::split_path(path);
    let name = match parts.pop() {
        Some(name) => name,
        None => return Ok(None),
    };
    Ok(folder_service::resolve_folder(&parts, con)?.map(|parent_id| (name, parent_id)))
}

fn errno_of(e: &std::io::Error) -> i32 {
    e.raw_os_error().unwrap_or(libc::EIO)
}

/// resolves a folder-view path to the location of its blob inside the object
/// store. When the parent folder exists but the file does not, the bare store
/// prefix (`<root>/`) is returned so the adapter can stage a new file there.
pub fn file_path(path: &str, store: &ObjectStore, con: &Connection) -> Result<String, GetFileError> {
    let (name, parent_id) = split_parent(path, con)
        .map_err(|_| GetFileError::DbError)?
        .ok_or(GetFileError::NotFound)?;
    let hash = file_repository::get_hash(&name, parent_id, con)
        .map_err(|_| GetFileError::DbError)?
        .unwrap_or_default();
    Ok(format!("{}/{}", store.root().display(), hash))
}

/// records a just-created file as a placeholder row pointing at the
/// adapter-supplied temporary name; the row is promoted to a content digest
/// on first release
pub fn add_temp_file(temp_name: &str, path: &str, con: &Connection) -> Result<(), CreateFileError> {
    let (name, parent_id) = split_parent(path, con)
        .map_err(|_| CreateFileError::DbError)?
        .ok_or(CreateFileError::ParentNotFound)?;
    file_repository::create_file(
        &FileRecord {
            id: None,
            name,
            hash: temp_name.to_string(),
            parent_id,
        },
        con,
    )
    .map_err(|e| {
        log::error!(
            "Failed to record temporary file for {path}! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        CreateFileError::DbError
    })?;
    Ok(())
}

/// promotes a file after its writer released it: if a `.WRITE` shadow exists
/// and hashes to new content, the shadow becomes the canonical blob, the row
/// is repointed, and the old blob is removed once nothing references it. A
/// shadow hashing to the old digest or to the empty sentinel is discarded.
pub fn update_file(path: &str, store: &ObjectStore, con: &Connection) -> Result<(), UpdateFileError> {
    let Ok(Some((name, parent_id))) = split_parent(path, con) else {
        // release on a path that no longer resolves; nothing to promote
        return Ok(());
    };
    let old_hash = match file_repository::get_hash(&name, parent_id, con) {
        Ok(Some(hash)) => hash,
        Ok(None) => return Ok(()),
        Err(_) => return Err(UpdateFileError::DbError),
    };
    let shadow = store.staging_path(&old_hash, WRITE_SUFFIX);
    if !shadow.exists() {
        return Ok(());
    }
    let new_hash = match object_store::digest_file(&shadow) {
        Ok(hash) => hash,
        Err(e) => {
            let _ = fs::remove_file(&shadow);
            return Err(UpdateFileError::FileSystemError(errno_of(&e)));
        }
    };
    if new_hash != old_hash && new_hash != EMPTY_FILE_HASH {
        store
            .materialize(&shadow, &new_hash)
            .map_err(|e| UpdateFileError::FileSystemError(errno_of(&e)))?;
        let file_id = file_repository::get_file_id(&name, parent_id, con)
            .map_err(|_| UpdateFileError::DbError)?
            .ok_or(UpdateFileError::DbError)?;
        file_repository::update_hash(file_id, &new_hash, con)
            .map_err(|_| UpdateFileError::DbError)?;
        let remaining = file_repository::count_hash_references(&old_hash, con)
            .map_err(|_| UpdateFileError::DbError)?;
        if remaining == 0 {
            if let Err(e) = store.remove(&old_hash) {
                log::warn!("Failed to remove unreferenced blob {old_hash}: {e:?}");
            }
        }
    } else {
        fs::remove_file(&shadow).map_err(|e| UpdateFileError::FileSystemError(errno_of(&e)))?;
    }
    Ok(())
}

/// truncates a file to the given length. When other files share the blob the
/// truncate happens on a `.TRUNCATE` side-copy so their content is untouched;
/// the side-copy is always removed.
pub fn truncate_file(
    length: u64,
    path: &str,
    store: &ObjectStore,
    con: &Connection,
) -> Result<(), TruncateFileError> {
    let (name, parent_id) = split_parent(path, con)
        .map_err(|_| TruncateFileError::DbError)?
        .ok_or(TruncateFileError::NotFound)?;
    let hash = file_repository::get_hash(&name, parent_id, con)
        .map_err(|_| TruncateFileError::DbError)?
        .ok_or(TruncateFileError::NotFound)?;
    let shared = file_repository::count_hash_references(&hash, con)
        .map_err(|_| TruncateFileError::DbError)?
        > 1;
    let work_path = if shared {
        store
            .copy_to_staging(&hash, TRUNCATE_SUFFIX)
            .map_err(|e| TruncateFileError::FileSystemError(errno_of(&e)))?
    } else {
        store.blob_path(&hash)
    };
    let outcome = match apply_truncate(&work_path, length) {
        Ok(()) => promote_truncated(&work_path, &name, parent_id, &hash, store, con),
        Err(e) => Err(TruncateFileError::FileSystemError(errno_of(&e))),
    };
    if shared {
        // gone already when the promotion above claimed it
        let _ = fs::remove_file(&work_path);
    }
    outcome
}

fn apply_truncate(path: &Path, length: u64) -> std::io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(length)
}

/// re-digests a truncated working file and, if the content actually changed,
/// moves it onto its canonical name and repoints the record
fn promote_truncated(
    work_path: &Path,
    name: &str,
    parent_id: i64,
    old_hash: &str,
    store: &ObjectStore,
    con: &Connection,
) -> Result<(), TruncateFileError> {
    let new_hash = object_store::digest_file(work_path)
        .map_err(|e| TruncateFileError::FileSystemError(errno_of(&e)))?;
    if new_hash == old_hash || new_hash == EMPTY_FILE_HASH {
        return Ok(());
    }
    store
        .materialize(work_path, &new_hash)
        .map_err(|e| TruncateFileError::FileSystemError(errno_of(&e)))?;
    let file_id = file_repository::get_file_id(name, parent_id, con)
        .map_err(|_| TruncateFileError::DbError)?
        .ok_or(TruncateFileError::DbError)?;
    file_repository::update_hash(file_id, &new_hash, con).map_err(|_| TruncateFileError::DbError)
}

/// destroys a file record: removes its blob when this was the last reference,
/// scrubs it out of every tag, and deletes the row. The ids of the tags that
/// held the file are returned so a rename-overwrite can rebind them.
pub fn delete_file(
    path: &str,
    store: &ObjectStore,
    con: &Connection,
) -> Result<Vec<i64>, DeleteFileError> {
    let (name, parent_id) = split_parent(path, con)
        .map_err(|_| DeleteFileError::DbError)?
        .ok_or(DeleteFileError::NotFound)?;
    let hash = file_repository::get_hash(&name, parent_id, con)
        .map_err(|_| DeleteFileError::DbError)?
        .ok_or(DeleteFileError::NotFound)?;
    let last_reference = file_repository::count_hash_references(&hash, con)
        .map_err(|_| DeleteFileError::DbError)?
        <= 1;
    if last_reference {
        store.remove(&hash).map_err(|e| {
            log::error!(
                "Failed to remove blob {hash} while deleting {path}! Error is {e:?}\n{}",
                Backtrace::force_capture()
            );
            DeleteFileError::FileSystemError(errno_of(&e))
        })?;
    }
    let file_id = file_repository::get_file_id(&name, parent_id, con)
        .map_err(|_| DeleteFileError::DbError)?
        .ok_or(DeleteFileError::NotFound)?;
    let saved_tag_ids =
        tag_repository::get_tag_ids_on_file(file_id, con).map_err(|_| DeleteFileError::DbError)?;
    tag_repository::remove_file_from_all_tags(file_id, con)
        .map_err(|_| DeleteFileError::DbError)?;
    file_repository::delete_file(file_id, con).map_err(|_| DeleteFileError::DbError)?;
    Ok(saved_tag_ids)
}

/// moves a file or folder. Four outcomes by what the endpoints resolve to:
/// file onto nothing (plain move), file onto an existing file (overwrite,
/// rebinding the destroyed record's tags), folder onto nothing (plain move),
/// anything else fails.
pub fn rename_path(
    old_path: &str,
    new_path: &str,
    store: &ObjectStore,
    con: &Connection,
) -> Result<(), RenamePathError> {
    let (old_name, old_parent_id) = split_parent(old_path, con)
        .map_err(|_| RenamePathError::DbError)?
        .ok_or(RenamePathError::Invalid)?;
    let old_file_id = file_repository::get_file_id(&old_name, old_parent_id, con)
        .map_err(|_| RenamePathError::DbError)?;
    let old_folder_id = folder_repository::get_folder_id(&old_name, old_parent_id, con)
        .map_err(|_| RenamePathError::DbError)?;

    let new_endpoint = split_parent(new_path, con).map_err(|_| RenamePathError::DbError)?;
    let (new_name, new_parent_id, new_file_id, new_folder_id) = match new_endpoint {
        Some((name, parent_id)) => {
            let file_id = file_repository::get_file_id(&name, parent_id, con)
                .map_err(|_| RenamePathError::DbError)?;
            let folder_id = folder_repository::get_folder_id(&name, parent_id, con)
                .map_err(|_| RenamePathError::DbError)?;
            (name, parent_id, file_id, folder_id)
        }
        None => return Err(RenamePathError::Invalid),
    };

    if let (Some(file_id), None) = (old_file_id, new_folder_id) {
        // the new basename may not collide with anything tagged alongside the
        // source file
        let tag_ids = tag_repository::get_tag_ids_on_file(file_id, con)
            .map_err(|_| RenamePathError::DbError)?;
        for tag_id in tag_ids {
            let tagged_names = tag_repository::get_filenames_under_tag(tag_id, con)
                .map_err(|_| RenamePathError::DbError)?;
            if tagged_names.iter().any(|tagged| *tagged == new_name) {
                return Err(RenamePathError::Conflict);
            }
        }
        let mut saved_tag_ids = Vec::new();
        if new_file_id.is_some() {
            saved_tag_ids = delete_file(new_path, store, con).map_err(|e| match e {
                DeleteFileError::DbError => RenamePathError::DbError,
                _ => RenamePathError::Invalid,
            })?;
        }
        file_repository::update_file(file_id, &new_name, new_parent_id, con)
            .map_err(|_| RenamePathError::DbError)?;
        for tag_id in saved_tag_ids {
            tag_repository::add_file_to_tag(tag_id, file_id, con)
                .map_err(|_| RenamePathError::DbError)?;
        }
        Ok(())
    } else if let (Some(folder_id), None, None) = (old_folder_id, new_folder_id, new_file_id) {
        folder_repository::update_folder(folder_id, &new_name, new_parent_id, con)
            .map_err(|_| RenamePathError::DbError)?;
        Ok(())
    } else {
        Err(RenamePathError::Invalid)
    }
}



#[cfg(test)]
mod update_file_tests {
    use super::*;
    use crate::test::{add_stored_file, test_connection, test_store};
    use std::fs;

    #[test]
    fn write_then_release_repoints_the_row() {
        let con = test_connection();
        let (_dir, store) = test_store();
        let (_, old_hash) = add_stored_file("x", 1, "old", &store, &con);
        fs::write(store.staging_path(&old_hash, WRITE_SUFFIX), "new contents").unwrap();
        update_file("/x", &store, &con).unwrap();
        let new_hash = file_repository::get_hash("x", 1, &con).unwrap().unwrap();
        assert_ne!(old_hash, new_hash);
        assert!(store.contains(&new_hash));
        assert!(!store.contains(&old_hash));
        assert_eq!(
            "new contents",
            fs::read_to_string(store.blob_path(&new_hash)).unwrap()
        );
    }

    #[test]
    fn rewrite_of_identical_content_discards_the_shadow() {
        let con = test_connection();
        let (_dir, store) = test_store();
        let (_, hash) = add_stored_file("x", 1, "same", &store, &con);
        fs::write(store.staging_path(&hash, WRITE_SUFFIX), "same").unwrap();
        update_file("/x", &store, &con).unwrap();
        assert_eq!(
            Some(hash.clone()),
            file_repository::get_hash("x", 1, &con).unwrap()
        );
        assert!(store.contains(&hash));
        assert!(!store.staging_path(&hash, WRITE_SUFFIX).exists());
    }

    #[test]
    fn zero_byte_write_does_not_orphan_the_original() {
        let con = test_connection();
        let (_dir, store) = test_store();
        let (_, hash) = add_stored_file("x", 1, "keep me", &store, &con);
        fs::write(store.staging_path(&hash, WRITE_SUFFIX), "").unwrap();
        update_file("/x", &store, &con).unwrap();
        assert_eq!(
            Some(hash.clone()),
            file_repository::get_hash("x", 1, &con).unwrap()
        );
        assert!(store.contains(&hash));
        assert!(!store.staging_path(&hash, WRITE_SUFFIX).exists());
    }

    #[test]
    fn shared_blob_survives_one_writer() {
        let con = test_connection();
        let (_dir, store) = test_store();
        let (_, hash) = add_stored_file("x", 1, "shared", &store, &con);
        add_stored_file("y", 1, "shared", &store, &con);
        fs::write(store.staging_path(&hash, WRITE_SUFFIX), "diverged").unwrap();
        update_file("/x", &store, &con).unwrap();
        // y still points at the shared blob, which must still exist
        assert_eq!(
            Some(hash.clone()),
            file_repository::get_hash("y", 1, &con).unwrap()
        );
        assert!(store.contains(&hash));
        assert_ne!(
            hash,
            file_repository::get_hash("x", 1, &con).unwrap().unwrap()
        );
    }

    #[test]
    fn release_without_shadow_is_a_no_op() {
        let con = test_connection();
        let (_dir, store) = test_store();
        let (_, hash) = add_stored_file("x", 1, "content", &store, &con);
        update_file("/x", &store, &con).unwrap();
        assert_eq!(
            Some(hash),
            file_repository::get_hash("x", 1, &con).unwrap()
        );
    }
}


#[cfg(test)]
mod delete_file_tests {
    use super::*;
    use crate::test::{add_stored_file, test_connection, test_store};

    #[test]
    fn last_reference_removes_the_blob() {
        let con = test_connection();
        let (_dir, store) = test_store();
        let (_, hash) = add_stored_file("x", 1, "bytes", &store, &con);
        delete_file("/x", &store, &con).unwrap();
        assert!(!store.contains(&hash));
        assert_eq!(None, file_repository::get_file_id("x", 1, &con).unwrap());
    }

    #[test]
    fn shared_blob_survives_until_the_last_unlink() {
        let con = test_connection();
        let (_dir, store) = test_store();
        let (_, hash) = add_stored_file("x", 1, "bytes", &store, &con);
        add_stored_file("y", 1, "bytes", &store, &con);
        delete_file("/x", &store, &con).unwrap();
        assert!(store.contains(&hash));
        delete_file("/y", &store, &con).unwrap();
        assert!(!store.contains(&hash));
    }

    #[test]
    fn deleting_a_tagged_file_scrubs_and_reports_its_tags() {
        let con = test_connection();
        let (_dir, store) = test_store();
        let (file_id, _) = add_stored_file("x", 1, "bytes", &store, &con);
        let tag_id = tag_repository::create_tag("red", &con).unwrap();
        tag_repository::add_file_to_tag(tag_id, file_id, &con).unwrap();
        let saved = delete_file("/x", &store, &con).unwrap();
        assert_eq!(vec![tag_id], saved);
        assert_eq!(
            Vec::<i64>::new(),
            tag_repository::get_file_ids_under_tag(tag_id, &con).unwrap()
        );
    }

    #[test]
    fn delete_missing_file_fails() {
        let con = test_connection();
        let (_dir, store) = test_store();
        assert_eq!(
            Err(DeleteFileError::NotFound),
            delete_file("/x", &store, &con)
        );
    }
}
