use std::backtrace::Backtrace;

use itertools::Itertools;
use rusqlite::Connection;

use crate::model::error::tag_errors::GetTagError;
use crate::repository::{file_repository, tag_repository};

/// ids of the files carrying every one of the given tags, computed as a
/// sorted-merge intersection across the membership sets. Any unknown tag
/// short-circuits to the empty result.
pub fn find_files_with_all_tags(
    tags: &[String],
    con: &Connection,
) -> Result<Vec<i64>, GetTagError> {
    let Some((first, rest)) = tags.split_first() else {
        return Ok(Vec::new());
    };
    let Some(tag_id) = lookup(first, con)? else {
        return Ok(Vec::new());
    };
    let mut matches = members(tag_id, con)?;
    matches.sort_unstable();
    for tag in rest {
        let Some(tag_id) = lookup(tag, con)? else {
            return Ok(Vec::new());
        };
        let mut file_ids = members(tag_id, con)?;
        file_ids.sort_unstable();
        matches = intersect_sorted(&matches, &file_ids);
        if matches.is_empty() {
            break;
        }
    }
    Ok(matches)
}

/// ids of the files carrying at least one of the given tags. Any unknown tag
/// short-circuits to the empty result.
pub fn find_files_with_any_tag(
    tags: &[String],
    con: &Connection,
) -> Result<Vec<i64>, GetTagError> {
    let mut matches = Vec::new();
    if tags.is_empty() {
        return Ok(matches);
    }
    for tag in tags {
        let Some(tag_id) = lookup(tag, con)? else {
            return Ok(Vec::new());
        };
        matches.extend(members(tag_id, con)?);
    }
    Ok(matches.into_iter().sorted_unstable().dedup().collect())
}

/// runs a multi-tag search and renders the matches as filenames
pub fn search(strict: bool, tags: &[String], con: &Connection) -> Result<Vec<String>, GetTagError> {
    let file_ids = if strict {
        find_files_with_all_tags(tags, con)?
    } else {
        find_files_with_any_tag(tags, con)?
    };
    let mut filenames = Vec::with_capacity(file_ids.len());
    for file_id in file_ids {
        if let Some(name) =
            file_repository::get_filename(file_id, con).map_err(|_| GetTagError::DbError)?
        {
            filenames.push(name);
        }
    }
    Ok(filenames)
}

fn lookup(tag: &str, con: &Connection) -> Result<Option<i64>, GetTagError> {
    tag_repository::get_tag_id(tag, con).map_err(|e| {
        log::error!(
            "Failed to look up tag {tag} during search! Error is {e:?}\n{}",
            Backtrace::force_capture()
        );
        GetTagError::DbError
    })
}

fn members(tag_id: i64, con: &Connection) -> Result<Vec<i64>, GetTagError> {
    tag_repository::get_file_ids_under_tag(tag_id, con).map_err(|_| GetTagError::DbError)
}

fn intersect_sorted(left: &[i64], right: &[i64]) -> Vec<i64> {
    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        match left[i].cmp(&right[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result.push(left[i]);
                i += 1;
                j += 1;
            }
        }
    }
    result
}

#[cfg(test)]
mod search_tests {
    use super::*;
    use crate::service::tag_service::tag_files;
    use crate::test::{add_stored_file, test_connection, test_store};

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn strict_search_intersects_memberships() {
        let con = test_connection();
        let (_dir, store) = test_store();
        add_stored_file("x", 1, "one", &store, &con);
        add_stored_file("y", 1, "two", &store, &con);
        tag_files("/x", "red", &con).unwrap();
        tag_files("/x", "blue", &con).unwrap();
        tag_files("/y", "red", &con).unwrap();
        assert_eq!(
            vec!["x"],
            search(true, &tags(&["red", "blue"]), &con).unwrap()
        );
    }

    #[test]
    fn loose_search_unions_memberships() {
        let con = test_connection();
        let (_dir, store) = test_store();
        add_stored_file("x", 1, "one", &store, &con);
        add_stored_file("y", 1, "two", &store, &con);
        tag_files("/x", "red", &con).unwrap();
        tag_files("/x", "blue", &con).unwrap();
        tag_files("/y", "blue", &con).unwrap();
        assert_eq!(
            vec!["x", "y"],
            search(false, &tags(&["red", "blue"]), &con).unwrap()
        );
    }

    #[test]
    fn unknown_tag_short_circuits_to_empty() {
        let con = test_connection();
        let (_dir, store) = test_store();
        add_stored_file("x", 1, "one", &store, &con);
        tag_files("/x", "red", &con).unwrap();
        assert_eq!(
            Vec::<String>::new(),
            search(true, &tags(&["red", "ghost"]), &con).unwrap()
        );
        assert_eq!(
            Vec::<String>::new(),
            search(false, &tags(&["red", "ghost"]), &con).unwrap()
        );
    }

    #[test]
    fn empty_tag_list_finds_nothing() {
        let con = test_connection();
        assert_eq!(Vec::<String>::new(), search(true, &[], &con).unwrap());
        assert_eq!(Vec::<String>::new(), search(false, &[], &con).unwrap());
    }

    #[test]
    fn intersect_sorted_merges() {
        assert_eq!(vec![2, 5], intersect_sorted(&[1, 2, 5, 9], &[2, 3, 5]));
        assert_eq!(Vec::<i64>::new(), intersect_sorted(&[1, 2], &[3, 4]));
    }
}
