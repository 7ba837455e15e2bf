//! Device catalog and dynamic block schema
//!
//! Filters the controller's device snapshot to populate the editor's
//! dependent dropdowns, and resolves which inputs a block exposes given
//! its mutation and the catalog.

pub mod error;
pub mod filter;
pub mod provider;
pub mod resolver;
pub mod session;

pub use error::CatalogError;
pub use filter::{
    filter_options, matches, DeviceFilterCriteria, DropdownOption, FilterKey, OptionSort,
};
pub use provider::{CatalogProvider, StaticCatalog};
pub use resolver::{
    compute_visible_slots, device_slot_criteria, Dropdown, DropdownGroup, NodeShape,
    RefreshOutcome, SchemaResolver, ShapeDiff, SlotState,
};
pub use session::CatalogSession;
