use std::backtrace::Backtrace;

use rusqlite::Connection;

use crate::model::error::folder_errors::{CreateFolderError, DeleteFolderError, GetFolderError};
use crate::model::repository::{Folder, ROOT_FOLDER_ID};
use crate::repository::{file_repository, folder_repository};
use crate::util;

/// walks the folder tree from the root, one `(name, parent)` lookup per
/// component. Returns `None` as soon as any component is missing.
pub fn resolve_folder(parts: &[String], con: &Connection) -> Result<Option<i64>, GetFolderError> {
    let mut folder_id = ROOT_FOLDER_ID;
    for part in parts {
        let found = folder_repository::get_folder_id(part, folder_id, con).map_err(|e| {
            log::error!(
                "Failed to look up folder {part}! Error is {e:?}\n{}",
                Backtrace::force_capture()
            );
            GetFolderError::DbError
        })?;
        match found {
            Some(id) => folder_id = id,
            None => return Ok(None),
        }
    }
    Ok(Some(folder_id))
}

/// resolves a full folder-view path to a folder id
pub fn resolve_path(path: &str, con: &Connection) -> Result<Option<i64>, GetFolderError> {
    resolve_folder(&util::split_path(path), con)
}

/// whether the path names a folder; drives the directory check from the
/// filesystem adapter
pub fn folder_exists(path: &str, con: &Connection) -> bool {
    matches!(resolve_path(path, con), Ok(Some(_)))
}

/// lists the contents of a folder: child folder names followed by child file
/// names, no `.`/`..` entries
pub fn list_folder(path: &str, con: &Connection) -> Result<Vec<String>, GetFolderError> {
    let folder_id = match resolve_path(path, con)? {
        Some(id) => id,
        None => return Err(GetFolderError::NotFound),
    };
    let mut contents = folder_repository::get_child_folder_names(folder_id, con).map_err(|e| {
        log::error!(
            "Failed to list folders under {path}! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        GetFolderError::DbError
    })?;
    let files = file_repository::get_child_file_names(folder_id, con).map_err(|e| {
        log::error!(
            "Failed to list files under {path}! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        GetFolderError::DbError
    })?;
    contents.extend(files);
    Ok(contents)
}

/// creates the folder named by the path. The parent must already exist and
/// the basename must not collide with a file or folder in it.
pub fn create_folder(path: &str, con: &Connection) -> Result<(), CreateFolderError> {
    let mut parts = util::split_path(path);
    let name = match parts.pop() {
        Some(name) => name,
        // the path names the root, which always exists
        None => return Err(CreateFolderError::AlreadyExists),
    };
    let parent_id = resolve_folder(&parts, con)
        .map_err(|_| CreateFolderError::DbError)?
        .ok_or(CreateFolderError::ParentNotFound)?;
    let file_collision = file_repository::get_file_id(&name, parent_id, con)
        .map_err(|_| CreateFolderError::DbError)?;
    let folder_collision = folder_repository::get_folder_id(&name, parent_id, con)
        .map_err(|_| CreateFolderError::DbError)?;
    if file_collision.is_some() || folder_collision.is_some() {
        return Err(CreateFolderError::AlreadyExists);
    }
    folder_repository::create_folder(
        &Folder {
            id: None,
            name,
            parent_id: Some(parent_id),
        },
        con,
    )
    .map_err(|e| {
        log::error!(
            "Failed to create folder at {path}! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        CreateFolderError::DbError
    })?;
    Ok(())
}

/// deletes the folder named by the path if it holds no files
pub fn delete_folder(path: &str, con: &Connection) -> Result<(), DeleteFolderError> {
    let folder_id = resolve_path(path, con)
        .map_err(|_| DeleteFolderError::DbError)?
        .ok_or(DeleteFolderError::NotFound)?;
    if folder_id == ROOT_FOLDER_ID {
        return Err(DeleteFolderError::NotFound);
    }
    let child_files = folder_repository::count_child_files(folder_id, con).map_err(|e| {
        log::error!(
            "Failed to check if folder {path} is empty! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        DeleteFolderError::DbError
    })?;
    if child_files > 0 {
        return Err(DeleteFolderError::NotEmpty);
    }
    folder_repository::delete_folder(folder_id, con).map_err(|e| {
        log::error!(
            "Failed to delete folder {path}! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        DeleteFolderError::DbError
    })?;
    Ok(())
}

#[cfg(test)]
mod resolve_folder_tests {
    use super::*;
    use crate::test::test_connection;

    #[test]
    fn root_resolves_to_reserved_id() {
        let con = test_connection();
        assert_eq!(Ok(Some(ROOT_FOLDER_ID)), resolve_path("/", &con));
    }

    #[test]
    fn nested_path_resolves() {
        let con = test_connection();
        create_folder("/a", &con).unwrap();
        create_folder("/a/b", &con).unwrap();
        let id = resolve_path("/a/b", &con).unwrap().unwrap();
        assert!(id > ROOT_FOLDER_ID);
    }

    #[test]
    fn missing_component_resolves_to_none() {
        let con = test_connection();
        create_folder("/a", &con).unwrap();
        assert_eq!(Ok(None), resolve_path("/a/missing", &con));
        assert_eq!(Ok(None), resolve_path("/missing/a", &con));
    }
}


#[cfg(test)]
mod delete_folder_tests {
    use super::*;
    use crate::test::test_connection;

    #[test]
    fn mkdir_then_rmdir_restores_state() {
        let con = test_connection();
        create_folder("/a", &con).unwrap();
        delete_folder("/a", &con).unwrap();
        assert!(!folder_exists("/a", &con));
        create_folder("/a", &con).unwrap();
    }

    #[test]
    fn delete_missing_folder() {
        let con = test_connection();
        assert_eq!(Err(DeleteFolderError::NotFound), delete_folder("/a", &con));
    }

    #[test]
    fn delete_folder_with_files_fails() {
        let con = test_connection();
        create_folder("/a", &con).unwrap();
        let parent = resolve_path("/a", &con).unwrap().unwrap();
        crate::repository::file_repository::create_file(
            &crate::model::repository::FileRecord {
                id: None,
                name: "x".to_string(),
                hash: "AB".to_string(),
                parent_id: parent,
            },
            &con,
        )
        .unwrap();
        assert_eq!(Err(DeleteFolderError::NotEmpty), delete_folder("/a", &con));
    }

    #[test]
    fn the_root_cannot_be_deleted() {
        let con = test_connection();
        assert_eq!(Err(DeleteFolderError::NotFound), delete_folder("/", &con));
    }
}
