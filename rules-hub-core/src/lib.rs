//! Core domain models for Rules Hub
//!
//! This crate contains the shared data structures used across the rule
//! editor backend: devices, the editor block tree and its mutation-driven
//! shape, normalized rule documents, and rule status projection.

pub mod block;
pub mod device;
pub mod document;
pub mod error;
pub mod schema;
pub mod status;

pub use block::{Block, Field, Input, InputKind, Mutation, Position};
pub use device::{ActionDefinition, Device, DeviceState, Room, ServiceActions};
pub use document::*;
pub use error::CoreError;
pub use schema::{BlockKind, CheckType, ListKind, ListShape, SlotKind, SlotSpec};
pub use status::{IconState, RuleErrorEntry, RuleStatusInfo, RuleStatusView, Timeline};
