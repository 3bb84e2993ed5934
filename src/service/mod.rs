pub mod file_service;
pub mod folder_service;
pub mod object_store;
pub mod search_service;
pub mod tag_service;
