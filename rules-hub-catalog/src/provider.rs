//! Device and action catalog provider

use rules_hub_core::{Device, Room, ServiceActions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{matches, DeviceFilterCriteria};

/// Read-only source of the controller's devices, rooms and actions
///
/// Calls return synchronously. Implementations backed by a remote
/// controller serve a cached copy.
pub trait CatalogProvider: Send + Sync {
    /// Devices, optionally narrowed by `filter`
    fn list_devices(&self, filter: Option<&DeviceFilterCriteria>) -> Vec<Device>;

    /// Actions the device exposes, grouped by service
    fn actions_for_device(&self, device: &Device) -> Vec<ServiceActions>;

    fn rooms(&self) -> Vec<Room>;

    /// Controller owning a device, given its id or altuiid
    fn controller_of(&self, device_ref: &str) -> Option<String>;
}

/// In-memory catalog for development and testing
///
/// Also reads a catalog export: `{ "devices": [..], "rooms": [..],
/// "actions": { "<altuiid>": [..] } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    devices: Vec<Device>,
    #[serde(default)]
    rooms: Vec<Room>,
    /// Keyed by device altuiid
    #[serde(default)]
    actions: HashMap<String, Vec<ServiceActions>>,
}

impl StaticCatalog {
    pub fn new(devices: Vec<Device>, rooms: Vec<Room>) -> Self {
        Self {
            devices,
            rooms,
            actions: HashMap::new(),
        }
    }

    pub fn with_actions(
        mut self,
        altuiid: impl Into<String>,
        actions: Vec<ServiceActions>,
    ) -> Self {
        self.actions.insert(altuiid.into(), actions);
        self
    }
}

impl CatalogProvider for StaticCatalog {
    fn list_devices(&self, filter: Option<&DeviceFilterCriteria>) -> Vec<Device> {
        match filter {
            None => self.devices.clone(),
            Some(criteria) => self
                .devices
                .iter()
                .filter(|d| matches(d, criteria, &self.actions_for_device(d)))
                .cloned()
                .collect(),
        }
    }

    fn actions_for_device(&self, device: &Device) -> Vec<ServiceActions> {
        self.actions.get(&device.altuiid).cloned().unwrap_or_default()
    }

    fn rooms(&self) -> Vec<Room> {
        self.rooms.clone()
    }

    fn controller_of(&self, device_ref: &str) -> Option<String> {
        self.devices
            .iter()
            .find(|d| d.altuiid == device_ref || d.id == device_ref)
            .map(|d| d.controller_id.clone())
    }
}
