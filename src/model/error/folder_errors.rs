#[derive(PartialEq, Debug)]
pub enum GetFolderError {
    /// an error with the database
    DbError,
    /// no folder exists at the given path
    NotFound,
}

#[derive(PartialEq, Debug)]
pub enum CreateFolderError {
    /// an error with the database
    DbError,
    /// the parent folder in the path does not exist
    ParentNotFound,
    /// a file or folder with that name already exists in the parent
    AlreadyExists,
}

#[derive(PartialEq, Debug)]
pub enum DeleteFolderError {
    /// an error with the database
    DbError,
    /// no folder exists at the given path
    NotFound,
    /// the folder still contains files
    NotEmpty,
}
