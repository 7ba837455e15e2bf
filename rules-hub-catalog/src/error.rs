//! Catalog error types

use rules_hub_core::CoreError;
use thiserror::Error;

use crate::FilterKey;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unknown filter key: {0}")]
    UnknownFilterKey(String),

    #[error("No dropdown for filter key {0:?}")]
    UnknownDropdown(FilterKey),

    #[error("Block has no device slot: {0}")]
    NoDeviceSlot(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
