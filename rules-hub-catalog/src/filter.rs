//! Device filtering
//!
//! Criteria are ANDed; every populated key must hold for a device to
//! match. Missing or malformed device data never matches and never errors.

use rules_hub_core::{Device, ServiceActions};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use crate::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKey {
    DeviceId,
    DeviceRoom,
    DeviceType,
    DeviceCategory,
    VariableService,
    Variable,
    ActionService,
    Action,
}

impl FilterKey {
    pub const ALL: [FilterKey; 8] = [
        FilterKey::DeviceId,
        FilterKey::DeviceRoom,
        FilterKey::DeviceType,
        FilterKey::DeviceCategory,
        FilterKey::VariableService,
        FilterKey::Variable,
        FilterKey::ActionService,
        FilterKey::Action,
    ];

    /// Name of the block field holding this criterion
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKey::DeviceId => "device_id",
            FilterKey::DeviceRoom => "device_room",
            FilterKey::DeviceType => "device_type",
            FilterKey::DeviceCategory => "device_category",
            FilterKey::VariableService => "variable_service",
            FilterKey::Variable => "variable",
            FilterKey::ActionService => "action_service",
            FilterKey::Action => "action",
        }
    }

    /// Category codes sort numerically, everything else by label
    pub fn option_sort(self) -> OptionSort {
        match self {
            FilterKey::DeviceCategory => OptionSort::Numeric,
            _ => OptionSort::Alphabetic,
        }
    }
}

impl FromStr for FilterKey {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownFilterKey(s.to_string()))
    }
}

/// Filter values keyed by [`FilterKey`]; absent or empty means wildcard
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceFilterCriteria {
    values: BTreeMap<FilterKey, String>,
}

impl DeviceFilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: FilterKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a criterion; an empty value clears it
    pub fn set(&mut self, key: FilterKey, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value);
        }
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn remove(&mut self, key: FilterKey) -> Option<String> {
        self.values.remove(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Union with `other`; on conflicting keys `other` wins
    pub fn merged(&self, other: &DeviceFilterCriteria) -> DeviceFilterCriteria {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.set(key, value);
        }
        merged
    }

    /// Whether evaluating these criteria needs the device action catalog
    pub fn needs_actions(&self) -> bool {
        self.get(FilterKey::ActionService).is_some() || self.get(FilterKey::Action).is_some()
    }
}

impl FromIterator<(FilterKey, String)> for DeviceFilterCriteria {
    fn from_iter<T: IntoIterator<Item = (FilterKey, String)>>(iter: T) -> Self {
        let mut criteria = DeviceFilterCriteria::new();
        for (key, value) in iter {
            criteria.set(key, value);
        }
        criteria
    }
}

/// Whether `device` satisfies every populated criterion
///
/// `actions` is the device's action catalog; it is only consulted for the
/// `action_service` and `action` keys.
pub fn matches(
    device: &Device,
    criteria: &DeviceFilterCriteria,
    actions: &[ServiceActions],
) -> bool {
    if let Some(id) = criteria.get(FilterKey::DeviceId) {
        if device.id != id && device.altuiid != id {
            return false;
        }
    }
    if let Some(room) = criteria.get(FilterKey::DeviceRoom) {
        if device.room_id != room {
            return false;
        }
    }
    if let Some(device_type) = criteria.get(FilterKey::DeviceType) {
        if device.device_type != device_type {
            return false;
        }
    }
    if let Some(category) = criteria.get(FilterKey::DeviceCategory) {
        if !category_matches(device, category) {
            return false;
        }
    }

    let service = criteria.get(FilterKey::VariableService);
    let variable = criteria.get(FilterKey::Variable);
    if service.is_some() || variable.is_some() {
        // Service and variable must hold on the same state
        let found = device.states.iter().any(|state| {
            service.map_or(true, |s| state.service == s)
                && variable.map_or(true, |v| state.variable == v)
        });
        if !found {
            return false;
        }
    }

    let action_service = criteria.get(FilterKey::ActionService);
    let action = criteria.get(FilterKey::Action);
    if action_service.is_some() || action.is_some() {
        let found = actions.iter().any(|service_actions| {
            action_service.map_or(true, |s| service_actions.service_id == s)
                && action.map_or(true, |a| service_actions.actions.iter().any(|def| def.name == a))
        });
        if !found {
            return false;
        }
    }

    true
}

/// `"category"` or `"category;subcategory"`
fn category_matches(device: &Device, criterion: &str) -> bool {
    let mut parts = criterion.splitn(2, ';');
    let category = parts.next().and_then(|c| c.trim().parse::<u32>().ok());
    let Some(category) = category else {
        return false;
    };
    if device.category_num != Some(category) {
        return false;
    }
    match parts.next() {
        None => true,
        Some(sub) => match sub.trim().parse::<u32>() {
            Ok(sub) => device.subcategory_num == Some(sub),
            Err(_) => false,
        },
    }
}

/// One entry of a dropdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropdownOption {
    pub label: String,
    pub value: String,
}

impl DropdownOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSort {
    /// By label, case-insensitive
    Alphabetic,
    /// By the numeric components of the value (`"4;1"` sorts as `(4, 1)`)
    Numeric,
}

impl OptionSort {
    pub fn sort(self, options: &mut [DropdownOption]) {
        match self {
            OptionSort::Alphabetic => options.sort_by(|a, b| {
                a.label
                    .to_lowercase()
                    .cmp(&b.label.to_lowercase())
                    .then_with(|| a.label.cmp(&b.label))
            }),
            OptionSort::Numeric => options.sort_by(|a, b| numeric_cmp(&a.value, &b.value)),
        }
    }
}

fn numeric_cmp(a: &str, b: &str) -> Ordering {
    fn key(value: &str) -> Option<Vec<u64>> {
        value.split(';').map(|p| p.trim().parse::<u64>().ok()).collect()
    }
    match (key(a), key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Distinct options extracted from the devices matching `criteria`
///
/// Options are deduplicated by value, keeping the first label seen, then
/// sorted with `sort`.
pub fn filter_options<A, E>(
    devices: &[Device],
    criteria: &DeviceFilterCriteria,
    actions_for: A,
    extract: E,
    sort: OptionSort,
) -> Vec<DropdownOption>
where
    A: Fn(&Device) -> Vec<ServiceActions>,
    E: Fn(&Device, &[ServiceActions]) -> Vec<DropdownOption>,
{
    let mut seen = HashSet::new();
    let mut options = Vec::new();
    for device in devices {
        let actions = actions_for(device);
        if !matches(device, criteria, &actions) {
            continue;
        }
        for option in extract(device, &actions) {
            if option.value.is_empty() {
                continue;
            }
            if seen.insert(option.value.clone()) {
                options.push(option);
            }
        }
    }
    sort.sort(&mut options);
    options
}
