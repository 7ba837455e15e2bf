//! Codec error types

use rules_hub_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    #[error("Unexpected slot '{slot}' on block {block_type}")]
    UnexpectedSlot { block_type: String, slot: String },

    #[error("Block {found} cannot plug into slot '{slot}' of {parent}")]
    IncompatibleBlock {
        parent: String,
        slot: String,
        found: String,
    },

    #[error("Expected {expected} block, found {found}")]
    UnexpectedBlock {
        expected: &'static str,
        found: String,
    },

    #[error("Invalid value '{value}' for {slot}")]
    InvalidValue { slot: String, value: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}
