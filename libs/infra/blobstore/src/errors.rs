// [libs/infra/blobstore/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    /// The requested key resolves outside the store's root, or contains a
    /// component that cannot be made safe (`..`, embedded NUL, an absolute
    /// path smuggled in as a "relative" one, etc).
    #[error("[L3_BLOB_FAULT]: unsafe path -> {0}")]
    InvalidPath(String),

    #[error("[L3_BLOB_FAULT]: not found -> {0}")]
    NotFound(String),

    #[error("[L3_BLOB_FAULT]: io failure -> {0}")]
    Io(#[from] std::io::Error),
}
