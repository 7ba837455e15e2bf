//! Error types for the core crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown block type: {0}")]
    UnknownBlockType(String),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Invalid rule status: {0}")]
    InvalidStatus(i8),
}
