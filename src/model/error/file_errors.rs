#[derive(PartialEq, Debug)]
pub enum GetFileError {
    /// an error with the database
    DbError,
    /// the file or its parent folder does not exist
    NotFound,
}

#[derive(PartialEq, Debug)]
pub enum CreateFileError {
    /// an error with the database
    DbError,
    /// the parent folder in the path does not exist
    ParentNotFound,
}

#[derive(PartialEq, Debug)]
pub enum UpdateFileError {
    /// an error with the database
    DbError,
    /// a host filesystem operation failed with the contained errno
    FileSystemError(i32),
}

#[derive(PartialEq, Debug)]
pub enum TruncateFileError {
    /// an error with the database
    DbError,
    /// the file or its parent folder does not exist
    NotFound,
    /// a host filesystem operation failed with the contained errno
    FileSystemError(i32),
}

#[derive(PartialEq, Debug)]
pub enum DeleteFileError {
    /// an error with the database
    DbError,
    /// the file or its parent folder does not exist
    NotFound,
    /// a host filesystem operation failed with the contained errno
    FileSystemError(i32),
}

#[derive(PartialEq, Debug)]
pub enum RenamePathError {
    /// an error with the database
    DbError,
    /// the new basename collides with a file already tagged with one of the
    /// source file's tags
    Conflict,
    /// the endpoints do not form a supported rename (missing source, missing
    /// destination parent, or an unsupported combination)
    Invalid,
}
