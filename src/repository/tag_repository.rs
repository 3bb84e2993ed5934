use rusqlite::{params, Connection, OptionalExtension};

/// looks up a tag id by name. Tag names are globally unique; the reserved
/// root sentinel is never returned.
pub fn get_tag_id(name: &str, con: &Connection) -> Result<Option<i64>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/get_tag_id.sql"))?;
    pst.query_row(params![name], |row| row.get(0)).optional()
}

/// the name of the tag with the given id
pub fn get_tag_name(tag_id: i64, con: &Connection) -> Result<Option<String>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/get_tag_name.sql"))?;
    pst.query_row(params![tag_id], |row| row.get(0)).optional()
}

/// creates a tag record and returns its id. This does not check if the tag
/// already exists, so the caller must check that themselves.
pub fn create_tag(name: &str, con: &Connection) -> Result<i64, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/create_tag.sql"))?;
    pst.insert(params![name])
}

/// deletes a tag record. Emptiness and edge cleanup are the caller's job.
pub fn delete_tag(tag_id: i64, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/delete_tag.sql"))?;
    pst.execute(params![tag_id])?;
    Ok(())
}

/// renames a tag. Name uniqueness is the caller's job.
pub fn update_tag(tag_id: i64, new_name: &str, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/update_tag.sql"))?;
    pst.execute(params![new_name, tag_id])?;
    Ok(())
}

/// total number of tags, the root sentinel excluded
pub fn count_tags(con: &Connection) -> Result<i64, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/count_tags.sql"))?;
    pst.query_row([], |row| row.get(0))
}

/// ids of the tags the given tag is nested directly under
pub fn get_parent_ids(tag_id: i64, con: &Connection) -> Result<Vec<i64>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/get_parent_ids.sql"))?;
    let rows = pst.query_map(params![tag_id], |row| row.get(0))?;
    rows.collect()
}

/// ids of the tags nested directly under the given tag
pub fn get_child_ids(tag_id: i64, con: &Connection) -> Result<Vec<i64>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/get_child_ids.sql"))?;
    let rows = pst.query_map(params![tag_id], |row| row.get(0))?;
    rows.collect()
}

/// records a nesting edge. Both directions of the relation are this one row,
/// so parent and child stay mutually consistent by construction.
pub fn create_edge(child_id: i64, parent_id: i64, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/create_edge.sql"))?;
    pst.execute(params![child_id, parent_id])?;
    Ok(())
}

/// removes a nesting edge, returning how many rows matched so the caller can
/// tell a missing edge apart from a removed one
pub fn delete_edge(
    child_id: i64,
    parent_id: i64,
    con: &Connection,
) -> Result<usize, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/delete_edge.sql"))?;
    pst.execute(params![child_id, parent_id])
}

/// removes every edge from the given tag up to its parents; used when the
/// tag itself is deleted
pub fn delete_parent_edges(child_id: i64, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/tag/delete_parent_edges.sql"
    ))?;
    pst.execute(params![child_id])?;
    Ok(())
}

/// ids of the files tagged with the given tag
pub fn get_file_ids_under_tag(tag_id: i64, con: &Connection) -> Result<Vec<i64>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/tag/get_file_ids_under_tag.sql"
    ))?;
    let rows = pst.query_map(params![tag_id], |row| row.get(0))?;
    rows.collect()
}

/// basenames of the files tagged with the given tag
pub fn get_filenames_under_tag(
    tag_id: i64,
    con: &Connection,
) -> Result<Vec<String>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/tag/get_filenames_under_tag.sql"
    ))?;
    let rows = pst.query_map(params![tag_id], |row| row.get(0))?;
    rows.collect()
}

/// the id of the file with the given basename under the given tag
pub fn get_tagged_file_id(
    tag_id: i64,
    name: &str,
    con: &Connection,
) -> Result<Option<i64>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/tag/get_tagged_file_id.sql"
    ))?;
    pst.query_row(params![tag_id, name], |row| row.get(0))
        .optional()
}

/// tags a file. Basename uniqueness under the tag is the caller's job.
pub fn add_file_to_tag(
    tag_id: i64,
    file_id: i64,
    con: &Connection,
) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!("../assets/queries/tag/add_file_to_tag.sql"))?;
    pst.execute(params![tag_id, file_id])?;
    Ok(())
}

/// untags a file, returning how many rows matched
pub fn remove_file_from_tag(
    tag_id: i64,
    file_id: i64,
    con: &Connection,
) -> Result<usize, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/tag/remove_file_from_tag.sql"
    ))?;
    pst.execute(params![tag_id, file_id])
}

/// scrubs a file out of every tag's membership; used when the file record is
/// destroyed
pub fn remove_file_from_all_tags(file_id: i64, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/tag/remove_file_from_all_tags.sql"
    ))?;
    pst.execute(params![file_id])?;
    Ok(())
}

/// ids of every tag holding the given file
pub fn get_tag_ids_on_file(file_id: i64, con: &Connection) -> Result<Vec<i64>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/tag/get_tag_ids_on_file.sql"
    ))?;
    let rows = pst.query_map(params![file_id], |row| row.get(0))?;
    rows.collect()
}

/// names of every tag holding the given file
pub fn get_tag_names_on_file(
    file_id: i64,
    con: &Connection,
) -> Result<Vec<String>, rusqlite::Error> {
    let mut pst = con.prepare_cached(include_str!(
        "../assets/queries/tag/get_tag_names_on_file.sql"
    ))?;
    let rows = pst.query_map(params![file_id], |row| row.get(0))?;
    rows.collect()
}

#[cfg(test)]
mod tag_repository_tests {
    use super::*;
    use crate::model::repository::{FileRecord, ROOT_FOLDER_ID, ROOT_TAG_ID};
    use crate::repository::file_repository;
    use crate::test::test_connection;

    #[test]
    fn create_and_look_up_tag() {
        let con = test_connection();
        let id = create_tag("red", &con).unwrap();
        assert_eq!(Some(id), get_tag_id("red", &con).unwrap());
        assert_eq!(Some("red".to_string()), get_tag_name(id, &con).unwrap());
    }

    #[test]
    fn root_sentinel_is_not_resolvable_by_name() {
        let con = test_connection();
        assert_eq!(None, get_tag_id("__TaggableFS__//", &con).unwrap());
    }

    #[test]
    fn edges_are_visible_from_both_sides() {
        let con = test_connection();
        let red = create_tag("red", &con).unwrap();
        let color = create_tag("color", &con).unwrap();
        create_edge(red, color, &con).unwrap();
        assert_eq!(vec![color], get_parent_ids(red, &con).unwrap());
        assert_eq!(vec![red], get_child_ids(color, &con).unwrap());
    }

    #[test]
    fn delete_edge_reports_missing_edges() {
        let con = test_connection();
        let red = create_tag("red", &con).unwrap();
        let color = create_tag("color", &con).unwrap();
        create_edge(red, color, &con).unwrap();
        assert_eq!(1, delete_edge(red, color, &con).unwrap());
        assert_eq!(0, delete_edge(red, color, &con).unwrap());
    }

    #[test]
    fn membership_queries_cover_both_directions() {
        let con = test_connection();
        let red = create_tag("red", &con).unwrap();
        let file = file_repository::create_file(
            &FileRecord {
                id: None,
                name: "x".to_string(),
                hash: "AB".to_string(),
                parent_id: ROOT_FOLDER_ID,
            },
            &con,
        )
        .unwrap();
        add_file_to_tag(red, file, &con).unwrap();
        assert_eq!(vec![file], get_file_ids_under_tag(red, &con).unwrap());
        assert_eq!(vec!["x"], get_filenames_under_tag(red, &con).unwrap());
        assert_eq!(Some(file), get_tagged_file_id(red, "x", &con).unwrap());
        assert_eq!(vec![red], get_tag_ids_on_file(file, &con).unwrap());
        assert_eq!(vec!["red"], get_tag_names_on_file(file, &con).unwrap());
    }

    #[test]
    fn scrubbing_a_file_clears_every_membership() {
        let con = test_connection();
        let red = create_tag("red", &con).unwrap();
        let blue = create_tag("blue", &con).unwrap();
        let file = file_repository::create_file(
            &FileRecord {
                id: None,
                name: "x".to_string(),
                hash: "AB".to_string(),
                parent_id: ROOT_FOLDER_ID,
            },
            &con,
        )
        .unwrap();
        add_file_to_tag(red, file, &con).unwrap();
        add_file_to_tag(blue, file, &con).unwrap();
        remove_file_from_all_tags(file, &con).unwrap();
        assert_eq!(Vec::<i64>::new(), get_tag_ids_on_file(file, &con).unwrap());
    }

    #[test]
    fn count_ignores_the_root_sentinel() {
        let con = test_connection();
        assert_eq!(0, count_tags(&con).unwrap());
        create_tag("red", &con).unwrap();
        create_edge(get_tag_id("red", &con).unwrap().unwrap(), ROOT_TAG_ID, &con).unwrap();
        assert_eq!(1, count_tags(&con).unwrap());
    }
}
