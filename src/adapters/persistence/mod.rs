pub mod fs_attachments;
pub mod json_store;
pub mod sqlite_repo;

pub use fs_attachments::FsAttachmentStore;
pub use json_store::JsonStore;
pub use sqlite_repo::SqliteStore;
