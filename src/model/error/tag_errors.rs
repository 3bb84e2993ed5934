#[derive(PartialEq, Debug)]
pub enum GetTagError {
    /// an error with the database
    DbError,
    /// no tag resolves from the given name or path
    NotFound,
}

#[derive(PartialEq, Debug)]
pub enum CreateTagError {
    /// an error with the database
    DbError,
    /// a tag with that name already exists
    AlreadyExists,
    /// the tag name contains a path or wire delimiter
    InvalidName,
    /// the parent component of the path does not resolve to a tag
    InvalidParent,
}

#[derive(PartialEq, Debug)]
pub enum DeleteTagError {
    /// an error with the database
    DbError,
    /// no tag resolves from the given name or path
    NotFound,
    /// the tag still has nested tags or tagged files
    NotEmpty,
}

#[derive(PartialEq, Debug)]
pub enum NestTagError {
    /// an error with the database
    DbError,
    /// one of the endpoints does not resolve to a tag
    NotFound,
    /// the edge already exists
    AlreadyNested,
    /// the edge would close a directed cycle in the tag graph
    Cycle,
}

#[derive(PartialEq, Debug)]
pub enum UnnestTagError {
    /// an error with the database
    DbError,
    /// an endpoint does not resolve, or the edge does not exist
    NotFound,
}

#[derive(PartialEq, Debug)]
pub enum TagFilesError {
    /// an error with the database
    DbError,
    /// the path does not resolve to a file or folder
    NotFound,
    /// at least one file's basename collides with a file already under the
    /// tag; the rest of the batch is still applied
    Conflict,
    /// the tag did not exist and could not be created
    InvalidTag,
}

#[derive(PartialEq, Debug)]
pub enum UntagFilesError {
    /// an error with the database
    DbError,
    /// the path or tag does not resolve, or the file was not tagged
    NotFound,
}

#[derive(PartialEq, Debug)]
pub enum RenameTaggedPathError {
    /// an error with the database
    DbError,
    /// an endpoint of the rename does not resolve in the tag view
    NotFound,
    /// the endpoints do not form a supported tag-view rename
    Unsupported,
}
