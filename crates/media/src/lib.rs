//! Attachment uploads: MIME allowlist, size limit, on-disk storage under
//! generated names.

pub mod mime;
pub mod store;

pub use store::{StoredUpload, UploadError, UploadStore};
