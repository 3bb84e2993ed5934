use libc::{EEXIST, EINVAL, EIO, ENOENT, ENOTEMPTY, EPERM};
use rusqlite::Connection;

use crate::model::error::file_errors::{DeleteFileError, TruncateFileError};
use crate::model::error::folder_errors::{CreateFolderError, DeleteFolderError};
use crate::model::error::tag_errors::{
    CreateTagError, DeleteTagError, NestTagError, TagFilesError, UntagFilesError,
};
use crate::repository::{file_repository, tag_repository};
use crate::service::file_service;
use crate::service::folder_service;
use crate::service::object_store::ObjectStore;
use crate::service::search_service;
use crate::service::tag_service;
use crate::util;

/// which outbound channel a reply belongs on, keyed by the request prefix
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Target {
    FileSystem,
    Query,
}

/// what the dispatcher decided for one request. A reply's frames are sent in
/// order with only the last one marked complete.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Reply(Target, Vec<String>),
    Ignore,
    Exit,
}

/// The single-threaded request dispatcher. It owns the metadata index and the
/// object store; every state mutation in the daemon happens through it, one
/// request at a time, in receipt order.
pub struct Dispatcher {
    con: Connection,
    store: ObjectStore,
    tag_view: bool,
    dispatched: u64,
}

fn filesystem_reply(frames: Vec<String>) -> Outcome {
    Outcome::Reply(Target::FileSystem, frames)
}

fn query_reply(frames: Vec<String>) -> Outcome {
    Outcome::Reply(Target::Query, frames)
}

impl Dispatcher {
    pub fn new(con: Connection, store: ObjectStore, tag_view: bool) -> Dispatcher {
        Dispatcher {
            con,
            store,
            tag_view,
            dispatched: 0,
        }
    }

    /// releases the index and store, e.g. for the shutdown-time snapshot
    pub fn into_parts(self) -> (Connection, ObjectStore) {
        (self.con, self.store)
    }

    /// routes one request to its handler and renders the reply frames
    pub fn dispatch(&mut self, request: &str) -> Outcome {
        self.dispatched += 1;
        let (verb, args) = match request.split_once(' ') {
            Some((verb, args)) => (verb, args),
            None => (request, ""),
        };
        match verb {
            "QH_EXIT" | "FD_EXIT" => Outcome::Exit,
            "QH_TEST" => query_reply(vec![format!(
                "TM_ACK (messages dispatched: {})",
                self.dispatched
            )]),
            "FD_TEST" => filesystem_reply(vec!["TM_ACK".to_string()]),
            "FD_LOG" => {
                log::info!("{args}");
                filesystem_reply(vec!["TM_ACK".to_string()])
            }
            "FD_GET_PATH" | "FD_GET_PATH_WRITE" => self.get_path(verb, args),
            "FD_IF_DIR" => self.if_directory(args),
            "FD_READ_DIR" => self.read_directory(args),
            "FD_MKDIR" => self.make_directory(args),
            "FD_RMDIR" => self.remove_directory(args),
            "FD_UNLINK" => self.unlink(args),
            "FD_RENAME" => self.rename(args),
            "FD_TRUNCATE" => self.truncate(args),
            "FD_UPDATE" => self.update(args),
            "FD_ADD_TEMP" => self.add_temp(args),
            "QH_TAG" => self.tag(args),
            "QH_UNTAG" => self.untag(args),
            "QH_NEST" => self.nest(args),
            "QH_UNNEST" => self.unnest(args),
            "QH_STATS" => self.stats(),
            "QH_SEARCH" => self.search(args),
            "QH_CREATE_TAG" => self.create_tag(args),
            "QH_DELETE_TAG" => self.delete_tag(args),
            "QH_GET_TAGS" => self.get_tags(args),
            _ => {
                log::warn!("Ignoring unknown request: {request}");
                Outcome::Ignore
            }
        }
    }

    fn get_path(&self, verb: &str, path: &str) -> Outcome {
        let real_path = if !self.tag_view {
            file_service::file_path(path, &self.store, &self.con).unwrap_or_default()
        } else if verb == "FD_GET_PATH" {
            tag_service::tagged_file_path(path, &self.store, &self.con).unwrap_or_default()
        } else {
            // the tag view is read-only
            String::new()
        };
        filesystem_reply(vec![real_path])
    }

    fn if_directory(&self, path: &str) -> Outcome {
        let is_directory = if self.tag_view {
            tag_service::tag_exists(path, &self.con)
        } else {
            folder_service::folder_exists(path, &self.con)
        };
        filesystem_reply(vec![
            if is_directory { "TM_TRUE" } else { "TM_FALSE" }.to_string()
        ])
    }

    fn read_directory(&self, path: &str) -> Outcome {
        let contents = if self.tag_view {
            tag_service::list_tag_children(path, &self.con).unwrap_or_default()
        } else {
            folder_service::list_folder(path, &self.con).unwrap_or_default()
        };
        if contents.is_empty() {
            filesystem_reply(vec![String::new()])
        } else {
            filesystem_reply(contents)
        }
    }

    fn make_directory(&self, path: &str) -> Outcome {
        let reply = if self.tag_view {
            match tag_service::create_tag(path, &self.con) {
                Ok(()) => "TM_ACK".to_string(),
                Err(CreateTagError::AlreadyExists) => EEXIST.to_string(),
                Err(CreateTagError::InvalidName) => EINVAL.to_string(),
                Err(CreateTagError::InvalidParent) => ENOENT.to_string(),
                Err(CreateTagError::DbError) => EIO.to_string(),
            }
        } else {
            match folder_service::create_folder(path, &self.con) {
                Ok(()) => "TM_ACK".to_string(),
                Err(CreateFolderError::ParentNotFound) => ENOENT.to_string(),
                Err(CreateFolderError::AlreadyExists) => EEXIST.to_string(),
                Err(CreateFolderError::DbError) => EIO.to_string(),
            }
        };
        filesystem_reply(vec![reply])
    }

    fn remove_directory(&self, path: &str) -> Outcome {
        let reply = if self.tag_view {
            match tag_service::delete_tag(path, &self.con) {
                Ok(()) => "TM_ACK".to_string(),
                Err(DeleteTagError::NotFound) => ENOENT.to_string(),
                Err(DeleteTagError::NotEmpty) => ENOTEMPTY.to_string(),
                Err(DeleteTagError::DbError) => EIO.to_string(),
            }
        } else {
            match folder_service::delete_folder(path, &self.con) {
                Ok(()) => "TM_ACK".to_string(),
                Err(DeleteFolderError::NotFound) => ENOENT.to_string(),
                Err(DeleteFolderError::NotEmpty) => ENOTEMPTY.to_string(),
                Err(DeleteFolderError::DbError) => EIO.to_string(),
            }
        };
        filesystem_reply(vec![reply])
    }

    fn unlink(&self, path: &str) -> Outcome {
        let reply = if self.tag_view {
            // in the tag view unlink means untag, never destroy
            match tag_service::untag_tagged_path(path, &self.con) {
                Ok(()) => "TM_ACK".to_string(),
                Err(UntagFilesError::NotFound) => ENOENT.to_string(),
                Err(UntagFilesError::DbError) => EIO.to_string(),
            }
        } else {
            match file_service::delete_file(path, &self.store, &self.con) {
                Ok(_) => "TM_ACK".to_string(),
                Err(DeleteFileError::NotFound) => ENOENT.to_string(),
                Err(DeleteFileError::FileSystemError(errno)) => errno.to_string(),
                Err(DeleteFileError::DbError) => EIO.to_string(),
            }
        };
        filesystem_reply(vec![reply])
    }

    fn rename(&self, args: &str) -> Outcome {
        let Some((old_path, new_path)) = args.split_once(',') else {
            return filesystem_reply(vec!["TM_FAIL".to_string()]);
        };
        let renamed = if self.tag_view {
            tag_service::rename_tagged_path(old_path, new_path, &self.con).is_ok()
        } else {
            file_service::rename_path(old_path, new_path, &self.store, &self.con).is_ok()
        };
        filesystem_reply(vec![if renamed { "TM_ACK" } else { "TM_FAIL" }.to_string()])
    }

    fn truncate(&self, args: &str) -> Outcome {
        let Some((length, path)) = args.split_once(',') else {
            return filesystem_reply(vec![EINVAL.to_string()]);
        };
        if self.tag_view {
            return filesystem_reply(vec![EPERM.to_string()]);
        }
        let Ok(length) = length.parse::<u64>() else {
            return filesystem_reply(vec![EINVAL.to_string()]);
        };
        let reply = match file_service::truncate_file(length, path, &self.store, &self.con) {
            Ok(()) => "TM_ACK".to_string(),
            Err(TruncateFileError::NotFound) => ENOENT.to_string(),
            Err(TruncateFileError::FileSystemError(errno)) => errno.to_string(),
            Err(TruncateFileError::DbError) => EIO.to_string(),
        };
        filesystem_reply(vec![reply])
    }

    fn update(&self, path: &str) -> Outcome {
        if !self.tag_view {
            if let Err(e) = file_service::update_file(path, &self.store, &self.con) {
                log::error!("Failed to promote {path} after release! Error is {e:?}");
            }
        }
        filesystem_reply(vec!["TM_ACK".to_string()])
    }

    fn add_temp(&self, args: &str) -> Outcome {
        if let Some((temp_name, path)) = args.split_once(',') {
            if let Err(e) = file_service::add_temp_file(temp_name, path, &self.con) {
                log::error!("Failed to record temporary file {temp_name} for {path}: {e:?}");
            }
        }
        filesystem_reply(vec!["TM_ACK".to_string()])
    }

    fn tag(&self, args: &str) -> Outcome {
        let Some((path, tag)) = args.split_once(',') else {
            return query_reply(vec![
                "Failed. Either file(s) path or tag is invalid.".to_string()
            ]);
        };
        let reply = match tag_service::tag_files(path, tag, &self.con) {
            Ok(()) => "File(s) successfully tagged.",
            Err(TagFilesError::Conflict) => {
                "Failed. Filename conflict with files already tagged with the same tag."
            }
            Err(_) => "Failed. Either file(s) path or tag is invalid.",
        };
        query_reply(vec![reply.to_string()])
    }

    fn untag(&self, args: &str) -> Outcome {
        let Some((path, tag)) = args.split_once(',') else {
            return query_reply(vec![
                "Failed. Either file(s) path or tag is invalid.".to_string()
            ]);
        };
        let reply = match tag_service::untag_files(path, tag, &self.con) {
            Ok(()) => "File(s) successfully untagged.",
            Err(_) => "Failed. Either file(s) path or tag is invalid.",
        };
        query_reply(vec![reply.to_string()])
    }

    fn nest(&self, args: &str) -> Outcome {
        let reply = match self.resolve_nest_endpoints(args) {
            Some((tag_id, parent_id)) => match tag_service::nest_tag(tag_id, parent_id, &self.con) {
                Ok(()) => "Tag successfully nested.",
                Err(NestTagError::Cycle) => "Cyclic check error.",
                Err(_) => "Failed. Either tag is invalid.",
            },
            None => "Failed. Either tag is invalid.",
        };
        query_reply(vec![reply.to_string()])
    }

    fn unnest(&self, args: &str) -> Outcome {
        let reply = match self.resolve_nest_endpoints(args) {
            Some((tag_id, parent_id)) => {
                match tag_service::unnest_tag(tag_id, parent_id, &self.con) {
                    Ok(()) => "Tag successfully unnested.",
                    Err(_) => "Failed. Either tag is invalid.",
                }
            }
            None => "Failed. Either tag is invalid.",
        };
        query_reply(vec![reply.to_string()])
    }

    fn resolve_nest_endpoints(&self, args: &str) -> Option<(i64, i64)> {
        let (tag, parent) = args.split_once(',')?;
        let tag_id = tag_service::resolve_tag(tag, &self.con).ok()??;
        let parent_id = tag_service::resolve_tag(parent, &self.con).ok()??;
        Some((tag_id, parent_id))
    }

    fn stats(&self) -> Outcome {
        let counts = file_repository::count_files(&self.con)
            .and_then(|files| tag_repository::count_tags(&self.con).map(|tags| (files, tags)));
        let reply = match counts {
            Ok((files, tags)) => format!("Files: {files}, Tags: {tags}"),
            Err(e) => {
                log::error!("Failed to gather stats! Error is {e:?}");
                "TM_FAIL".to_string()
            }
        };
        query_reply(vec![reply])
    }

    fn search(&self, args: &str) -> Outcome {
        let Some((strict, tags)) = args.split_once(',') else {
            return query_reply(vec![String::new()]);
        };
        let tags = util::deserialize_ids(tags, ';');
        let matches = search_service::search(strict == "1", &tags, &self.con).unwrap_or_default();
        if matches.is_empty() {
            query_reply(vec![String::new()])
        } else {
            query_reply(matches)
        }
    }

    fn create_tag(&self, tag: &str) -> Outcome {
        let reply = match tag_service::create_tag(tag, &self.con) {
            Ok(()) => "Tag successfully created.",
            Err(CreateTagError::AlreadyExists) => "Failed. Tag already exists.",
            Err(_) => "Failed. Given tag is invalid.",
        };
        query_reply(vec![reply.to_string()])
    }

    fn delete_tag(&self, tag: &str) -> Outcome {
        let reply = match tag_service::delete_tag(tag, &self.con) {
            Ok(()) => "Tag successfully deleted.",
            Err(DeleteTagError::NotEmpty) => {
                "Failed. Tag is not empty and has tags and/or files nested under it."
            }
            Err(_) => "Failed. Given tag is invalid.",
        };
        query_reply(vec![reply.to_string()])
    }

    fn get_tags(&self, path: &str) -> Outcome {
        let reply = match tag_service::get_tags_on_path(path, &self.con) {
            Ok(tags) => util::serialize_ids(&tags, ';'),
            Err(_) => "Invalid".to_string(),
        };
        query_reply(vec![reply])
    }
}
