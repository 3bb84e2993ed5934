use std::backtrace::Backtrace;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

use crate::model::error::file_errors::GetFileError;
use crate::model::error::tag_errors::{
    CreateTagError, DeleteTagError, GetTagError, NestTagError, RenameTaggedPathError,
    TagFilesError, UnnestTagError, UntagFilesError,
};
use crate::model::repository::ROOT_TAG_ID;
use crate::repository::{file_repository, folder_repository, tag_repository};
use crate::service::folder_service;
use crate::service::object_store::ObjectStore;
use crate::util;

/// tag names travel over the wire as positional arguments and serialized
/// lists, so the delimiters are off limits
static VALID_TAG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new("^[^/,;]+$").unwrap());

/// resolves a tag-view path (or a bare tag name) to a tag id.
///
/// The final component is a global name lookup; every preceding component
/// must be an ancestor of it in the tag graph. The same tag is therefore
/// visible under every ancestor path, and a path is valid iff it describes a
/// walk in the graph.
pub fn resolve_tag(tag_path: &str, con: &Connection) -> Result<Option<i64>, GetTagError> {
    if tag_path.is_empty() {
        return Ok(None);
    }
    if tag_path == "/" {
        return Ok(Some(ROOT_TAG_ID));
    }
    if !tag_path.starts_with('/') {
        return tag_repository::get_tag_id(tag_path, con).map_err(|e| {
            log::error!(
                "Failed to look up tag {tag_path}! Error is {e:?}\n{}",
                Backtrace::force_capture()
            );
            GetTagError::DbError
        });
    }
    let mut parts = util::split_path(tag_path);
    let last = match parts.pop() {
        Some(part) => part,
        None => return Ok(Some(ROOT_TAG_ID)),
    };
    let tag_id = match resolve_tag(&last, con)? {
        Some(id) => id,
        None => return Ok(None),
    };
    let mut ancestors = HashSet::new();
    collect_ancestor_ids(tag_id, con, &mut ancestors)?;
    for part in parts {
        match resolve_tag(&part, con)? {
            Some(part_id) if ancestors.contains(&part_id) => {}
            _ => return Ok(None),
        }
    }
    Ok(Some(tag_id))
}

/// gathers the ids of a tag and all of its unique ancestors by walking the
/// parent edges. The root sentinel is never part of the set.
pub fn collect_ancestor_ids(
    tag_id: i64,
    con: &Connection,
    ancestors: &mut HashSet<i64>,
) -> Result<(), GetTagError> {
    if tag_id == ROOT_TAG_ID || !ancestors.insert(tag_id) {
        return Ok(());
    }
    let parent_ids = tag_repository::get_parent_ids(tag_id, con).map_err(|e| {
        log::error!(
            "Failed to load parents of tag {tag_id}! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        GetTagError::DbError
    })?;
    for parent_id in parent_ids {
        collect_ancestor_ids(parent_id, con, ancestors)?;
    }
    Ok(())
}

/// resolves the parent-tag component of a tag-view path; the parent of a
/// top-level entry is the root sentinel
pub fn parent_tag_id_from_path(
    tag_path: &str,
    con: &Connection,
) -> Result<Option<i64>, GetTagError> {
    let prefix = util::parent_path(tag_path);
    if prefix.is_empty() {
        return Ok(Some(ROOT_TAG_ID));
    }
    resolve_tag(prefix, con)
}

/// whether the path names a tag in the tag view
pub fn tag_exists(tag_path: &str, con: &Connection) -> bool {
    matches!(resolve_tag(tag_path, con), Ok(Some(_)))
}

/// lists a tag's children in the tag view: nested tag names followed by the
/// basenames of its tagged files
pub fn list_tag_children(tag_path: &str, con: &Connection) -> Result<Vec<String>, GetTagError> {
    let tag_id = resolve_tag(tag_path, con)?.ok_or(GetTagError::NotFound)?;
    let child_ids = tag_repository::get_child_ids(tag_id, con).map_err(|_| GetTagError::DbError)?;
    let mut contents = Vec::with_capacity(child_ids.len());
    for child_id in child_ids {
        if let Some(name) =
            tag_repository::get_tag_name(child_id, con).map_err(|_| GetTagError::DbError)?
        {
            contents.push(name);
        }
    }
    let filenames =
        tag_repository::get_filenames_under_tag(tag_id, con).map_err(|_| GetTagError::DbError)?;
    contents.extend(filenames);
    Ok(contents)
}

/// resolves a tag-view file path to the location of its blob in the object
/// store
pub fn tagged_file_path(
    path: &str,
    store: &ObjectStore,
    con: &Connection,
) -> Result<String, GetFileError> {
    let parent_tag_id = parent_tag_id_from_path(path, con)
        .map_err(|_| GetFileError::DbError)?
        .ok_or(GetFileError::NotFound)?;
    let filename = util::base_name(path);
    let file_id = tag_repository::get_tagged_file_id(parent_tag_id, filename, con)
        .map_err(|_| GetFileError::DbError)?
        .ok_or(GetFileError::NotFound)?;
    let hash = file_repository::get_hash_by_id(file_id, con)
        .map_err(|_| GetFileError::DbError)?
        .ok_or(GetFileError::NotFound)?;
    Ok(format!("{}/{}", store.root().display(), hash))
}

/// creates a tag from a bare name or a tag-view path. Tag names are globally
/// unique. A nested path (`/parent/new`) nests the new tag under the
/// resolved parent component; otherwise it lands at the top level.
pub fn create_tag(tag_path: &str, con: &Connection) -> Result<(), CreateTagError> {
    let name = util::base_name(tag_path);
    if !VALID_TAG_NAME.is_match(name) {
        return Err(CreateTagError::InvalidName);
    }
    let existing = tag_repository::get_tag_id(name, con).map_err(|_| CreateTagError::DbError)?;
    if existing.is_some() {
        return Err(CreateTagError::AlreadyExists);
    }
    let mut parent_tag_id = ROOT_TAG_ID;
    if tag_path.contains('/') {
        let mut parts = util::split_path(tag_path);
        parts.pop();
        if let Some(parent_name) = parts.last() {
            parent_tag_id = tag_repository::get_tag_id(parent_name, con)
                .map_err(|_| CreateTagError::DbError)?
                .ok_or(CreateTagError::InvalidParent)?;
        }
    }
    let tag_id = tag_repository::create_tag(name, con).map_err(|e| {
        log::error!(
            "Failed to create tag {name}! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        CreateTagError::DbError
    })?;
    tag_repository::create_edge(tag_id, parent_tag_id, con).map_err(|_| CreateTagError::DbError)?;
    Ok(())
}

/// deletes a tag once nothing is nested under it and no files carry it,
/// detaching it from every parent
pub fn delete_tag(tag_path: &str, con: &Connection) -> Result<(), DeleteTagError> {
    let tag_id = resolve_tag(tag_path, con)
        .map_err(|_| DeleteTagError::DbError)?
        .ok_or(DeleteTagError::NotFound)?;
    if tag_id == ROOT_TAG_ID {
        return Err(DeleteTagError::NotFound);
    }
    let file_ids =
        tag_repository::get_file_ids_under_tag(tag_id, con).map_err(|_| DeleteTagError::DbError)?;
    let child_ids =
        tag_repository::get_child_ids(tag_id, con).map_err(|_| DeleteTagError::DbError)?;
    if !file_ids.is_empty() || !child_ids.is_empty() {
        return Err(DeleteTagError::NotEmpty);
    }
    tag_repository::delete_parent_edges(tag_id, con).map_err(|_| DeleteTagError::DbError)?;
    tag_repository::delete_tag(tag_id, con).map_err(|e| {
        log::error!(
            "Failed to delete tag {tag_path}! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        DeleteTagError::DbError
    })?;
    Ok(())
}

/// nests a tag under a parent tag. Refused when the edge already exists or
/// when the parent is reachable from the child, which would close a cycle.
/// The root sentinel can never be nested; it is a legal parent only for the
/// internal top-level edges.
pub fn nest_tag(tag_id: i64, parent_tag_id: i64, con: &Connection) -> Result<(), NestTagError> {
    if tag_id == ROOT_TAG_ID {
        return Err(NestTagError::NotFound);
    }
    let parent_ids = tag_repository::get_parent_ids(tag_id, con).map_err(|_| NestTagError::DbError)?;
    if parent_ids.contains(&parent_tag_id) {
        return Err(NestTagError::AlreadyNested);
    }
    let mut ancestors = HashSet::new();
    collect_ancestor_ids(parent_tag_id, con, &mut ancestors).map_err(|_| NestTagError::DbError)?;
    if ancestors.contains(&tag_id) {
        return Err(NestTagError::Cycle);
    }
    tag_repository::create_edge(tag_id, parent_tag_id, con).map_err(|e| {
        log::error!(
            "Failed to nest tag {tag_id} under {parent_tag_id}! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        NestTagError::DbError
    })?;
    Ok(())
}

/// removes a nesting edge
pub fn unnest_tag(tag_id: i64, parent_tag_id: i64, con: &Connection) -> Result<(), UnnestTagError> {
    let removed =
        tag_repository::delete_edge(tag_id, parent_tag_id, con).map_err(|_| UnnestTagError::DbError)?;
    if removed == 0 {
        return Err(UnnestTagError::NotFound);
    }
    Ok(())
}

/// tags one file, refusing a basename that is already tagged with the same tag
fn tag_single_file(file_id: i64, tag_id: i64, con: &Connection) -> Result<(), TagFilesError> {
    let filename = file_repository::get_filename(file_id, con)
        .map_err(|_| TagFilesError::DbError)?
        .ok_or(TagFilesError::NotFound)?;
    let tagged_names =
        tag_repository::get_filenames_under_tag(tag_id, con).map_err(|_| TagFilesError::DbError)?;
    if tagged_names.iter().any(|tagged| *tagged == filename) {
        return Err(TagFilesError::Conflict);
    }
    tag_repository::add_file_to_tag(tag_id, file_id, con).map_err(|_| TagFilesError::DbError)?;
    Ok(())
}

fn untag_single_file(file_id: i64, tag_id: i64, con: &Connection) -> Result<(), UntagFilesError> {
    let removed = tag_repository::remove_file_from_tag(tag_id, file_id, con)
        .map_err(|_| UntagFilesError::DbError)?;
    if removed == 0 {
        return Err(UntagFilesError::NotFound);
    }
    Ok(())
}

/// tags the file at the folder-view path, or every direct child file when the
/// path names a folder (non-recursive). A missing tag is created at the top
/// level on demand. Basename conflicts inside the batch are reported as the
/// worst outcome but do not stop the remaining files.
pub fn tag_files(file_path: &str, tag: &str, con: &Connection) -> Result<(), TagFilesError> {
    let mut parts = util::split_path(file_path);
    let name = parts.pop().ok_or(TagFilesError::NotFound)?;
    let parent_id = folder_service::resolve_folder(&parts, con)
        .map_err(|_| TagFilesError::DbError)?
        .ok_or(TagFilesError::NotFound)?;
    let tag_id = match tag_repository::get_tag_id(tag, con).map_err(|_| TagFilesError::DbError)? {
        Some(id) => id,
        None => {
            create_tag(tag, con).map_err(|_| TagFilesError::InvalidTag)?;
            tag_repository::get_tag_id(tag, con)
                .map_err(|_| TagFilesError::DbError)?
                .ok_or(TagFilesError::InvalidTag)?
        }
    };
    if let Some(file_id) =
        file_repository::get_file_id(&name, parent_id, con).map_err(|_| TagFilesError::DbError)?
    {
        return tag_single_file(file_id, tag_id, con);
    }
    if let Some(folder_id) =
        folder_repository::get_folder_id(&name, parent_id, con).map_err(|_| TagFilesError::DbError)?
    {
        let mut worst = Ok(());
        let file_ids = file_repository::get_file_ids_in_folder(folder_id, con)
            .map_err(|_| TagFilesError::DbError)?;
        for file_id in file_ids {
            match tag_single_file(file_id, tag_id, con) {
                Ok(()) => {}
                Err(TagFilesError::Conflict) => worst = Err(TagFilesError::Conflict),
                Err(e) => return Err(e),
            }
        }
        return worst;
    }
    Err(TagFilesError::NotFound)
}

/// untags the file at the folder-view path, or every direct child file when
/// the path names a folder (non-recursive)
pub fn untag_files(file_path: &str, tag: &str, con: &Connection) -> Result<(), UntagFilesError> {
    let mut parts = util::split_path(file_path);
    let name = parts.pop().ok_or(UntagFilesError::NotFound)?;
    let parent_id = folder_service::resolve_folder(&parts, con)
        .map_err(|_| UntagFilesError::DbError)?
        .ok_or(UntagFilesError::NotFound)?;
    let tag_id = tag_repository::get_tag_id(tag, con)
        .map_err(|_| UntagFilesError::DbError)?
        .ok_or(UntagFilesError::NotFound)?;
    if let Some(file_id) =
        file_repository::get_file_id(&name, parent_id, con).map_err(|_| UntagFilesError::DbError)?
    {
        return untag_single_file(file_id, tag_id, con);
    }
    if let Some(folder_id) = folder_repository::get_folder_id(&name, parent_id, con)
        .map_err(|_| UntagFilesError::DbError)?
    {
        let mut worst = Ok(());
        let file_ids = file_repository::get_file_ids_in_folder(folder_id, con)
            .map_err(|_| UntagFilesError::DbError)?;
        for file_id in file_ids {
            match untag_single_file(file_id, tag_id, con) {
                Ok(()) => {}
                Err(UntagFilesError::NotFound) => worst = Err(UntagFilesError::NotFound),
                Err(e) => return Err(e),
            }
        }
        return worst;
    }
    Err(UntagFilesError::NotFound)
}

/// the unlink of the tag view: removes the file named by the path from its
/// parent tag without touching the record or its content
pub fn untag_tagged_path(path: &str, con: &Connection) -> Result<(), UntagFilesError> {
    let parent_tag_id = parent_tag_id_from_path(path, con)
        .map_err(|_| UntagFilesError::DbError)?
        .ok_or(UntagFilesError::NotFound)?;
    let file_id = tag_repository::get_tagged_file_id(parent_tag_id, util::base_name(path), con)
        .map_err(|_| UntagFilesError::DbError)?
        .ok_or(UntagFilesError::NotFound)?;
    untag_single_file(file_id, parent_tag_id, con)
}

/// names of all tags carried by the file at the folder-view path
pub fn get_tags_on_path(path: &str, con: &Connection) -> Result<Vec<String>, GetFileError> {
    let mut parts = util::split_path(path);
    let name = parts.pop().ok_or(GetFileError::NotFound)?;
    let parent_id = folder_service::resolve_folder(&parts, con)
        .map_err(|_| GetFileError::DbError)?
        .ok_or(GetFileError::NotFound)?;
    let file_id = file_repository::get_file_id(&name, parent_id, con)
        .map_err(|_| GetFileError::DbError)?
        .ok_or(GetFileError::NotFound)?;
    tag_repository::get_tag_names_on_file(file_id, con).map_err(|_| GetFileError::DbError)
}

/// rename inside the tag view. Two forms are supported: moving a file between
/// tags while keeping its basename, and moving/renaming a tag by unnesting it
/// from the old parent and nesting it under the new one. Everything else is
/// refused.
pub fn rename_tagged_path(
    old_path: &str,
    new_path: &str,
    con: &Connection,
) -> Result<(), RenameTaggedPathError> {
    let old_parent_id = parent_tag_id_from_path(old_path, con)
        .map_err(|_| RenameTaggedPathError::DbError)?
        .ok_or(RenameTaggedPathError::NotFound)?;
    let new_parent_id = parent_tag_id_from_path(new_path, con)
        .map_err(|_| RenameTaggedPathError::DbError)?
        .ok_or(RenameTaggedPathError::NotFound)?;
    let old_name = util::base_name(old_path);
    let new_name = util::base_name(new_path);
    let old_tag_id =
        tag_repository::get_tag_id(old_name, con).map_err(|_| RenameTaggedPathError::DbError)?;
    let new_tag_id =
        tag_repository::get_tag_id(new_name, con).map_err(|_| RenameTaggedPathError::DbError)?;
    let old_file_id = tag_repository::get_tagged_file_id(old_parent_id, old_name, con)
        .map_err(|_| RenameTaggedPathError::DbError)?;
    let new_file_id = tag_repository::get_tagged_file_id(new_parent_id, new_name, con)
        .map_err(|_| RenameTaggedPathError::DbError)?;

    if let (Some(file_id), None, None) = (old_file_id, new_tag_id, new_file_id) {
        // only moving a file between tags is supported, not renaming it here
        if old_name != new_name {
            return Err(RenameTaggedPathError::Unsupported);
        }
        untag_single_file(file_id, old_parent_id, con)
            .map_err(|_| RenameTaggedPathError::DbError)?;
        tag_single_file(file_id, new_parent_id, con).map_err(|_| RenameTaggedPathError::DbError)?;
        return Ok(());
    }
    if let (Some(tag_id), None) = (old_tag_id, new_file_id) {
        if let Some(existing) = new_tag_id {
            if existing != tag_id {
                return Err(RenameTaggedPathError::Unsupported);
            }
        }
        if new_parent_id != old_parent_id {
            unnest_tag(tag_id, old_parent_id, con).map_err(|e| match e {
                UnnestTagError::DbError => RenameTaggedPathError::DbError,
                UnnestTagError::NotFound => RenameTaggedPathError::NotFound,
            })?;
            if let Err(e) = nest_tag(tag_id, new_parent_id, con) {
                // restore the old edge so a refused nest leaves the graph as
                // it was
                let _ = tag_repository::create_edge(tag_id, old_parent_id, con);
                return Err(match e {
                    NestTagError::DbError => RenameTaggedPathError::DbError,
                    _ => RenameTaggedPathError::Unsupported,
                });
            }
        }
        if new_tag_id.is_none() {
            tag_repository::update_tag(tag_id, new_name, con)
                .map_err(|_| RenameTaggedPathError::DbError)?;
        }
        return Ok(());
    }
    Err(RenameTaggedPathError::Unsupported)
}


#[cfg(test)]
mod create_tag_tests {
    use super::*;
    use crate::test::test_connection;

    #[test]
    fn create_tag_lands_at_top_level() {
        let con = test_connection();
        create_tag("red", &con).unwrap();
        let id = resolve_tag("red", &con).unwrap().unwrap();
        assert_eq!(
            vec![ROOT_TAG_ID],
            tag_repository::get_parent_ids(id, &con).unwrap()
        );
    }

    #[test]
    fn create_tag_twice_fails() {
        let con = test_connection();
        create_tag("red", &con).unwrap();
        assert_eq!(Err(CreateTagError::AlreadyExists), create_tag("red", &con));
    }

    #[test]
    fn names_with_delimiters_are_refused() {
        let con = test_connection();
        assert_eq!(Err(CreateTagError::InvalidName), create_tag("a,b", &con));
        assert_eq!(Err(CreateTagError::InvalidName), create_tag("a;b", &con));
    }

    #[test]
    fn nested_path_nests_under_the_parent() {
        let con = test_connection();
        create_tag("color", &con).unwrap();
        create_tag("/color/red", &con).unwrap();
        let color = resolve_tag("color", &con).unwrap().unwrap();
        let red = resolve_tag("red", &con).unwrap().unwrap();
        assert_eq!(
            vec![color],
            tag_repository::get_parent_ids(red, &con).unwrap()
        );
    }

    #[test]
    fn nested_path_with_unknown_parent_fails() {
        let con = test_connection();
        assert_eq!(
            Err(CreateTagError::InvalidParent),
            create_tag("/missing/red", &con)
        );
    }
}

#[cfg(test)]
mod delete_tag_tests {
    use super::*;
    use crate::test::{add_stored_file, test_connection, test_store};

    #[test]
    fn create_then_delete_restores_state() {
        let con = test_connection();
        create_tag("red", &con).unwrap();
        delete_tag("red", &con).unwrap();
        assert_eq!(Ok(None), resolve_tag("red", &con));
        create_tag("red", &con).unwrap();
    }

    #[test]
    fn tag_with_files_is_not_empty() {
        let con = test_connection();
        let (_dir, store) = test_store();
        let (file_id, _) = add_stored_file("x", 1, "bytes", &store, &con);
        create_tag("red", &con).unwrap();
        let red = resolve_tag("red", &con).unwrap().unwrap();
        tag_repository::add_file_to_tag(red, file_id, &con).unwrap();
        assert_eq!(Err(DeleteTagError::NotEmpty), delete_tag("red", &con));
    }

    #[test]
    fn tag_with_children_is_not_empty() {
        let con = test_connection();
        create_tag("color", &con).unwrap();
        create_tag("red", &con).unwrap();
        let color = resolve_tag("color", &con).unwrap().unwrap();
        let red = resolve_tag("red", &con).unwrap().unwrap();
        nest_tag(red, color, &con).unwrap();
        assert_eq!(Err(DeleteTagError::NotEmpty), delete_tag("color", &con));
    }

    #[test]
    fn deletion_detaches_from_every_parent() {
        let con = test_connection();
        create_tag("color", &con).unwrap();
        create_tag("red", &con).unwrap();
        let color = resolve_tag("color", &con).unwrap().unwrap();
        let red = resolve_tag("red", &con).unwrap().unwrap();
        nest_tag(red, color, &con).unwrap();
        delete_tag("red", &con).unwrap();
        assert_eq!(
            Vec::<i64>::new(),
            tag_repository::get_child_ids(color, &con).unwrap()
        );
    }

    #[test]
    fn missing_tag_is_not_found() {
        let con = test_connection();
        assert_eq!(Err(DeleteTagError::NotFound), delete_tag("ghost", &con));
    }
}
