/// id of the reserved folder-view root row (`/`)
pub const ROOT_FOLDER_ID: i64 = 1;

/// id of the reserved tag-view root sentinel. It is never a tag a user can
/// name; top-level tags are the ones nested directly under it.
pub const ROOT_TAG_ID: i64 = 0;

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Folder {
    /// cannot be changed, and only retrieved from the database
    pub id: Option<i64>,
    /// the name of the folder as shown in the folder view
    pub name: String,
    /// `None` only for the reserved root row
    pub parent_id: Option<i64>,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct FileRecord {
    /// the id, will only be populated when pulled from the database
    pub id: Option<i64>,
    /// the user-visible basename
    pub name: String,
    /// content digest naming the object-store blob, or a `TEMP<seq>`
    /// placeholder while the first write is still in flight
    pub hash: String,
    /// the folder containing this file
    pub parent_id: i64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Tag {
    /// the id of the tag
    pub id: i64,
    /// the display name of the tag; globally unique
    pub name: String,
}
