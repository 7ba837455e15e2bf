//! Catalog session
//!
//! Holds one snapshot of the provider's devices and rooms, plus an LRU
//! cache of per-device action catalogs. Components that need the catalog
//! receive the session explicitly; refreshing is an explicit call.

use lru::LruCache;
use parking_lot::Mutex;
use rules_hub_core::{Device, Room, ServiceActions};
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::{
    filter_options, matches, CatalogProvider, DeviceFilterCriteria, DropdownOption, FilterKey,
};

const DEFAULT_ACTION_CACHE_SIZE: usize = 256;

pub struct CatalogSession {
    provider: Arc<dyn CatalogProvider>,
    devices: Vec<Device>,
    rooms: Vec<Room>,
    generation: u64,
    action_cache: Mutex<LruCache<String, Arc<Vec<ServiceActions>>>>,
}

impl CatalogSession {
    /// Open a session and take the first snapshot
    pub fn new(provider: Arc<dyn CatalogProvider>, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size)
            .or_else(|| NonZeroUsize::new(DEFAULT_ACTION_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);
        let mut session = Self {
            provider,
            devices: Vec::new(),
            rooms: Vec::new(),
            generation: 0,
            action_cache: Mutex::new(LruCache::new(cache_size)),
        };
        session.refresh();
        session
    }

    /// Replace the snapshot with the provider's current catalog
    ///
    /// Returns the new snapshot generation.
    pub fn refresh(&mut self) -> u64 {
        self.devices = self.provider.list_devices(None);
        self.rooms = self.provider.rooms();
        self.action_cache.lock().clear();
        self.generation += 1;
        tracing::debug!(
            "Catalog snapshot {} loaded: {} devices, {} rooms",
            self.generation,
            self.devices.len(),
            self.rooms.len()
        );
        self.generation
    }

    /// Drop cached actions for one device, or for all devices
    pub fn invalidate_actions(&self, altuiid: Option<&str>) {
        let mut cache = self.action_cache.lock();
        match altuiid {
            Some(id) => {
                cache.pop(id);
            }
            None => cache.clear(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room_name(&self, room_id: &str) -> Option<&str> {
        self.rooms
            .iter()
            .find(|r| r.id == room_id)
            .map(|r| r.name.as_str())
    }

    pub fn find_device(&self, device_ref: &str) -> Option<&Device> {
        self.devices
            .iter()
            .find(|d| d.altuiid == device_ref || d.id == device_ref)
    }

    pub fn controller_of(&self, device_ref: &str) -> Option<String> {
        self.provider.controller_of(device_ref)
    }

    /// Actions of a device, served from the cache when possible
    pub fn actions_for(&self, device: &Device) -> Arc<Vec<ServiceActions>> {
        if let Some(actions) = self.action_cache.lock().get(&device.altuiid) {
            return Arc::clone(actions);
        }
        let actions = Arc::new(self.provider.actions_for_device(device));
        self.action_cache
            .lock()
            .put(device.altuiid.clone(), Arc::clone(&actions));
        actions
    }

    pub fn matches(&self, device: &Device, criteria: &DeviceFilterCriteria) -> bool {
        if criteria.needs_actions() {
            matches(device, criteria, &self.actions_for(device))
        } else {
            matches(device, criteria, &[])
        }
    }

    pub fn matching_devices(&self, criteria: &DeviceFilterCriteria) -> Vec<&Device> {
        self.devices
            .iter()
            .filter(|d| self.matches(d, criteria))
            .collect()
    }

    /// Whether at least one device satisfies `criteria`
    pub fn any_match(&self, criteria: &DeviceFilterCriteria) -> bool {
        self.devices.iter().any(|d| self.matches(d, criteria))
    }

    /// Options of the `key` dropdown among devices matching `criteria`
    pub fn options(&self, key: FilterKey, criteria: &DeviceFilterCriteria) -> Vec<DropdownOption> {
        let needs_actions = criteria.needs_actions()
            || matches!(key, FilterKey::ActionService | FilterKey::Action);
        filter_options(
            &self.devices,
            criteria,
            |device| {
                if needs_actions {
                    self.actions_for(device).as_ref().clone()
                } else {
                    Vec::new()
                }
            },
            |device, actions| self.extract(key, device, actions),
            key.option_sort(),
        )
    }

    fn extract(
        &self,
        key: FilterKey,
        device: &Device,
        actions: &[ServiceActions],
    ) -> Vec<DropdownOption> {
        match key {
            FilterKey::DeviceId => {
                vec![DropdownOption::new(device.name.clone(), device.id.clone())]
            }
            FilterKey::DeviceRoom => {
                if device.room_id.is_empty() {
                    return Vec::new();
                }
                let label = self.room_name(&device.room_id).unwrap_or(device.room_id.as_str());
                vec![DropdownOption::new(label, device.room_id.clone())]
            }
            FilterKey::DeviceType => vec![DropdownOption::new(
                short_urn(&device.device_type),
                device.device_type.clone(),
            )],
            FilterKey::DeviceCategory => {
                let Some(category) = device.category_num else {
                    return Vec::new();
                };
                let mut options = vec![DropdownOption::new(
                    category.to_string(),
                    category.to_string(),
                )];
                if let Some(sub) = device.subcategory_num {
                    let value = format!("{};{}", category, sub);
                    options.push(DropdownOption::new(value.clone(), value));
                }
                options
            }
            FilterKey::VariableService => device
                .states
                .iter()
                .map(|s| DropdownOption::new(short_urn(&s.service), s.service.clone()))
                .collect(),
            FilterKey::Variable => device
                .states
                .iter()
                .map(|s| DropdownOption::new(s.variable.clone(), s.variable.clone()))
                .collect(),
            FilterKey::ActionService => actions
                .iter()
                .map(|a| DropdownOption::new(short_urn(&a.service_id), a.service_id.clone()))
                .collect(),
            FilterKey::Action => actions
                .iter()
                .flat_map(|a| a.actions.iter())
                .map(|def| DropdownOption::new(def.name.clone(), def.name.clone()))
                .collect(),
        }
    }
}

/// `urn:upnp-org:serviceId:SwitchPower1` -> `SwitchPower1`
fn short_urn(urn: &str) -> &str {
    urn.rsplit(':').find(|part| !part.is_empty()).unwrap_or(urn)
}
