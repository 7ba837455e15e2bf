//! Synchronizer error types

use rules_hub_codec::CodecError;
use rules_hub_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Rule index {idx} out of range, the file holds {count} rules")]
    InvalidIndex { idx: usize, count: usize },

    #[error("Editing session for {0} was cancelled")]
    Cancelled(String),

    #[error("Upload of {file_name} rejected: {response}")]
    UploadRejected { file_name: String, response: String },

    #[error("Rule file error: {0}")]
    Codec(#[from] CodecError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
