//! Dynamic block schema
//!
//! Tracks, per editor node, which slots currently exist, keeps the
//! device filter dropdowns of a node consistent with each other, and
//! re-validates devices plugged into filtered slots.

use rules_hub_core::schema::{canonical_slots, complete_slots, fixed_fields};
use rules_hub_core::{Block, BlockKind, Mutation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{CatalogError, CatalogSession, DeviceFilterCriteria, DropdownOption, FilterKey};

/// Filter dropdowns carried by a `device` block, in display order
pub const DEVICE_FILTER_KEYS: [FilterKey; 4] = [
    FilterKey::DeviceRoom,
    FilterKey::DeviceType,
    FilterKey::DeviceCategory,
    FilterKey::DeviceId,
];

/// Names of the visible slots of a block, in canonical order
pub fn compute_visible_slots(kind: BlockKind, mutation: &Mutation) -> Vec<String> {
    canonical_slots(kind, mutation)
        .into_iter()
        .map(|slot| slot.name)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    /// Present and editable
    Editable,
    /// Pinned by a shortcut: hidden, with no editable slot
    Fixed { value: String },
}

/// Current shape of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeShape {
    pub kind: BlockKind,
    pub mutation: Mutation,
    pub slots: Vec<(String, SlotState)>,
}

impl NodeShape {
    pub fn compute(kind: BlockKind, mutation: Mutation) -> Self {
        let mut slots: Vec<(String, SlotState)> = compute_visible_slots(kind, &mutation)
            .into_iter()
            .map(|name| (name, SlotState::Editable))
            .collect();
        slots.extend(fixed_fields(kind, &mutation).into_iter().map(|(name, value)| {
            (
                name.to_string(),
                SlotState::Fixed {
                    value: value.to_string(),
                },
            )
        }));
        Self {
            kind,
            mutation,
            slots,
        }
    }

    pub fn state(&self, name: &str) -> Option<&SlotState> {
        self.slots.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn is_present(&self, name: &str) -> bool {
        matches!(self.state(name), Some(SlotState::Editable))
    }

    pub fn present_slots(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|(_, s)| *s == SlotState::Editable)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Slots to add and remove to turn this shape into `desired`
    pub fn diff(&self, desired: &NodeShape) -> ShapeDiff {
        ShapeDiff {
            added: desired
                .present_slots()
                .into_iter()
                .filter(|name| !self.is_present(name))
                .map(String::from)
                .collect(),
            removed: self
                .present_slots()
                .into_iter()
                .filter(|name| !desired.is_present(name))
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ShapeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// One filter dropdown; an empty selection is the wildcard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dropdown {
    pub key: FilterKey,
    pub selected: String,
    pub options: Vec<DropdownOption>,
}

/// The filter dropdowns sharing one parent node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropdownGroup {
    /// Criteria imposed by the slot the node is plugged into
    pub inherited: DeviceFilterCriteria,
    pub dropdowns: Vec<Dropdown>,
}

impl DropdownGroup {
    pub fn new(inherited: DeviceFilterCriteria, keys: &[FilterKey]) -> Self {
        Self {
            inherited,
            dropdowns: keys
                .iter()
                .map(|key| Dropdown {
                    key: *key,
                    selected: String::new(),
                    options: Vec::new(),
                })
                .collect(),
        }
    }

    /// Dropdowns of a `device` block, selected from its fields
    pub fn from_device_block(
        block: &Block,
        inherited: DeviceFilterCriteria,
    ) -> Result<Self, CatalogError> {
        if block.kind()? != BlockKind::DeviceRef {
            return Err(CatalogError::NoDeviceSlot(block.block_type.clone()));
        }
        let mut group = Self::new(inherited, &DEVICE_FILTER_KEYS);
        for dropdown in &mut group.dropdowns {
            dropdown.selected = block.field(dropdown.key.as_str()).unwrap_or_default().to_string();
        }
        Ok(group)
    }

    /// Write the selections back into a `device` block
    pub fn apply_to(&self, block: &mut Block) {
        for dropdown in &self.dropdowns {
            block.set_field(dropdown.key.as_str(), dropdown.selected.clone());
        }
    }

    pub fn dropdown(&self, key: FilterKey) -> Option<&Dropdown> {
        self.dropdowns.iter().find(|d| d.key == key)
    }

    pub fn select(&mut self, key: FilterKey, value: impl Into<String>) -> Result<(), CatalogError> {
        let dropdown = self
            .dropdowns
            .iter_mut()
            .find(|d| d.key == key)
            .ok_or(CatalogError::UnknownDropdown(key))?;
        dropdown.selected = value.into();
        Ok(())
    }

    /// Inherited criteria plus every selection except `key`'s own
    pub fn criteria_excluding(&self, key: FilterKey) -> DeviceFilterCriteria {
        let mut criteria = self.inherited.clone();
        for dropdown in self.dropdowns.iter().filter(|d| d.key != key && !d.selected.is_empty()) {
            criteria.set(dropdown.key, dropdown.selected.clone());
        }
        criteria
    }

    /// Inherited criteria plus every selection
    pub fn criteria(&self) -> DeviceFilterCriteria {
        let mut criteria = self.inherited.clone();
        for dropdown in self.dropdowns.iter().filter(|d| !d.selected.is_empty()) {
            criteria.set(dropdown.key, dropdown.selected.clone());
        }
        criteria
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    /// Dropdowns whose option list changed
    pub updated: Vec<FilterKey>,
    /// Dropdowns whose selection fell back to the wildcard
    pub reset: Vec<FilterKey>,
    pub passes: usize,
}

/// Recompute every dropdown but `changed` after `changed` got a new value
///
/// Options of each sibling are computed from the same snapshot of
/// selections, then vanished selections are reset. A reset widens the
/// others, so passes repeat until no reset happens; the result is a fixed
/// point.
pub fn refresh_sibling_options(
    group: &mut DropdownGroup,
    changed: FilterKey,
    catalog: &CatalogSession,
) -> RefreshOutcome {
    let mut outcome = RefreshOutcome::default();
    loop {
        outcome.passes += 1;
        let recomputed: Vec<(usize, Vec<DropdownOption>)> = group
            .dropdowns
            .iter()
            .enumerate()
            .filter(|(_, d)| d.key != changed)
            .map(|(i, d)| (i, catalog.options(d.key, &group.criteria_excluding(d.key))))
            .collect();

        let mut any_reset = false;
        for (index, options) in recomputed {
            let dropdown = &mut group.dropdowns[index];
            if dropdown.options != options {
                dropdown.options = options;
                if !outcome.updated.contains(&dropdown.key) {
                    outcome.updated.push(dropdown.key);
                }
            }
            if !dropdown.selected.is_empty()
                && !dropdown.options.iter().any(|o| o.value == dropdown.selected)
            {
                tracing::debug!(
                    "Selection '{}' of {} no longer available, reset to wildcard",
                    dropdown.selected,
                    dropdown.key.as_str()
                );
                dropdown.selected.clear();
                outcome.reset.push(dropdown.key);
                any_reset = true;
            }
        }

        if !any_reset {
            return outcome;
        }
    }
}

/// Criteria a device plugged into `block`'s `device` slot must satisfy
pub fn device_slot_criteria(block: &Block) -> Result<DeviceFilterCriteria, CatalogError> {
    let kind = block.kind()?;
    let keys = match kind {
        BlockKind::ConditionValue => [FilterKey::VariableService, FilterKey::Variable],
        BlockKind::ActionDevice => [FilterKey::ActionService, FilterKey::Action],
        _ => return Err(CatalogError::NoDeviceSlot(block.block_type.clone())),
    };
    let fixed = fixed_fields(kind, &block.mutation_or_default());
    let mut criteria = DeviceFilterCriteria::new();
    for key in keys {
        let value = fixed
            .iter()
            .find(|(name, _)| *name == key.as_str())
            .map(|(_, value)| *value)
            .or_else(|| block.field(key.as_str()))
            .unwrap_or_default();
        criteria.set(key, value);
    }
    Ok(criteria)
}

/// Criteria of every device reference in a `device` or `list_device` tree
fn connected_criteria(
    block: &Block,
    out: &mut Vec<DeviceFilterCriteria>,
) -> Result<(), CatalogError> {
    match block.kind()? {
        BlockKind::DeviceRef => {
            out.push(
                DEVICE_FILTER_KEYS
                    .iter()
                    .map(|key| (*key, block.field(key.as_str()).unwrap_or_default().to_string()))
                    .collect(),
            );
            Ok(())
        }
        BlockKind::DeviceList => {
            for input in &block.inputs {
                if let Some(child) = input.block.as_deref() {
                    connected_criteria(child, out)?;
                }
            }
            Ok(())
        }
        _ => Err(CatalogError::NoDeviceSlot(block.block_type.clone())),
    }
}

#[derive(Debug, Clone)]
struct ConnectionCheck {
    checked: Vec<DeviceFilterCriteria>,
    generation: u64,
    compatible: bool,
}

/// Per-node shape and connection state of an editing workspace
#[derive(Debug, Default)]
pub struct SchemaResolver {
    shapes: HashMap<String, NodeShape>,
    connection_checks: HashMap<String, ConnectionCheck>,
}

impl SchemaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shape(&self, node_id: &str) -> Option<&NodeShape> {
        self.shapes.get(node_id)
    }

    /// Record a node's new mutation and return how its slots change
    pub fn apply_mutation(
        &mut self,
        node_id: &str,
        kind: BlockKind,
        mutation: Mutation,
    ) -> ShapeDiff {
        let desired = NodeShape::compute(kind, mutation);
        let diff = match self.shapes.get(node_id) {
            Some(current) => current.diff(&desired),
            None => ShapeDiff {
                added: desired.present_slots().into_iter().map(String::from).collect(),
                removed: Vec::new(),
            },
        };
        // A shape change alters the node's filter inputs
        if self.shapes.contains_key(node_id) && !diff.is_empty() {
            self.invalidate_connection(node_id);
        }
        self.shapes.insert(node_id.to_string(), desired);
        diff
    }

    /// Bring a block's slots in line with its mutation
    ///
    /// Added slots start empty; removed slots are dropped with whatever
    /// they held. Remaining slots keep their content, in canonical order.
    pub fn sync_block(
        &mut self,
        node_id: &str,
        block: &mut Block,
    ) -> Result<ShapeDiff, CatalogError> {
        let kind = block.kind()?;
        let mutation = block.mutation_or_default();
        let specs = canonical_slots(kind, &mutation);

        if !self.shapes.contains_key(node_id) {
            let current = NodeShape {
                kind,
                mutation: mutation.clone(),
                slots: block
                    .fields
                    .iter()
                    .map(|f| f.name.clone())
                    .chain(block.inputs.iter().map(|i| i.name.clone()))
                    .map(|name| (name, SlotState::Editable))
                    .collect(),
            };
            self.shapes.insert(node_id.to_string(), current);
        }
        let diff = self.apply_mutation(node_id, kind, mutation);

        for name in &diff.removed {
            if block.remove_field(name).is_none() {
                block.remove_input(name);
            }
        }
        complete_slots(block, &specs);
        Ok(diff)
    }

    pub fn forget(&mut self, node_id: &str) {
        self.shapes.remove(node_id);
        self.connection_checks.remove(node_id);
    }

    /// Refresh a node's dropdowns after one of them changed
    pub fn refresh_sibling_options(
        &mut self,
        node_id: &str,
        group: &mut DropdownGroup,
        changed: FilterKey,
        catalog: &CatalogSession,
    ) -> RefreshOutcome {
        self.invalidate_connection(node_id);
        refresh_sibling_options(group, changed, catalog)
    }

    /// Forget the cached connection check of a node whose filters changed
    pub fn invalidate_connection(&mut self, node_id: &str) {
        self.connection_checks.remove(node_id);
    }

    /// Whether the devices plugged into a node's filtered slot still exist
    ///
    /// Every device reference combined with `slot_criteria` must match at
    /// least one catalog device. The result is cached per node until the
    /// criteria, the connected devices or the catalog snapshot change.
    pub fn check_device_filter_connection(
        &mut self,
        node_id: &str,
        slot_criteria: &DeviceFilterCriteria,
        connected: &Block,
        catalog: &CatalogSession,
    ) -> Result<bool, CatalogError> {
        let mut references = Vec::new();
        connected_criteria(connected, &mut references)?;
        let checked: Vec<DeviceFilterCriteria> = references
            .iter()
            .map(|reference| slot_criteria.merged(reference))
            .collect();

        if let Some(cached) = self.connection_checks.get(node_id) {
            if cached.generation == catalog.generation() && cached.checked == checked {
                return Ok(cached.compatible);
            }
        }

        let compatible = checked.iter().all(|criteria| catalog.any_match(criteria));
        if !compatible {
            tracing::debug!("Device connected to node {} no longer satisfies its filter", node_id);
        }
        self.connection_checks.insert(
            node_id.to_string(),
            ConnectionCheck {
                checked,
                generation: catalog.generation(),
                compatible,
            },
        );
        Ok(compatible)
    }

    /// Last cached connection result of a node
    pub fn cached_connection(&self, node_id: &str) -> Option<bool> {
        self.connection_checks.get(node_id).map(|c| c.compatible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticCatalog;
    use proptest::prelude::*;
    use rules_hub_core::{Device, Room};
    use std::sync::Arc;

    const SECURITY: &str = "urn:micasaverde-com:serviceId:SecuritySensor1";
    const MOTION: &str = "urn:schemas-micasaverde-com:device:MotionSensor:1";
    const DOOR: &str = "urn:schemas-micasaverde-com:device:DoorSensor:1";

    fn catalog() -> CatalogSession {
        let devices = vec![
            Device::new("1", "Hall motion")
                .with_room("1")
                .with_type(MOTION)
                .with_category(4, Some(3))
                .with_state(SECURITY, "Armed", "0"),
            Device::new("2", "Front door")
                .with_room("1")
                .with_type(DOOR)
                .with_category(4, Some(1))
                .with_state(SECURITY, "Armed", "1"),
            Device::new("3", "Garage motion")
                .with_room("2")
                .with_type(MOTION)
                .with_category(4, Some(3))
                .with_state(SECURITY, "Armed", "1"),
            Device::new("4", "Lamp").with_room("2").with_category(3, None),
        ];
        let rooms = vec![
            Room::new("1", "Hall"),
            Room::new("2", "Garage"),
        ];
        CatalogSession::new(Arc::new(StaticCatalog::new(devices, rooms)), 16)
    }

    fn values(group: &DropdownGroup, key: FilterKey) -> Vec<String> {
        group
            .dropdown(key)
            .map(|d| d.options.iter().map(|o| o.value.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_shortcut_removes_fixed_slots() {
        let mut resolver = SchemaResolver::new();
        let diff = resolver.apply_mutation("c1", BlockKind::ConditionValue, Mutation::default());
        assert_eq!(diff.added.len(), 6);

        let diff = resolver.apply_mutation(
            "c1",
            BlockKind::ConditionValue,
            Mutation::with_condition_type("sensor_armed"),
        );
        assert_eq!(diff.added, Vec::<String>::new());
        assert_eq!(diff.removed, vec!["variable_service", "variable", "operator", "value"]);

        let shape = resolver.shape("c1").unwrap();
        assert!(!shape.is_present("variable"));
        assert_eq!(
            shape.state("variable"),
            Some(&SlotState::Fixed { value: "Armed".to_string() })
        );
    }

    #[test]
    fn test_sync_block_adds_and_drops_slots() {
        let mut resolver = SchemaResolver::new();
        let mut block = Block::new(BlockKind::ActionDevice)
            .with_field("action", "SetTarget")
            .with_field("action_service", "urn:upnp-org:serviceId:SwitchPower1")
            .with_field("param_Old", "1")
            .with_mutation(Mutation {
                inputs: vec!["newTargetValue".to_string()],
                ..Mutation::default()
            });

        let diff = resolver.sync_block("a1", &mut block).unwrap();
        assert_eq!(diff.removed, vec!["param_Old"]);
        assert!(diff.added.contains(&"device".to_string()));
        let fields: Vec<_> = block.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["action_service", "action", "param_newTargetValue"]);
        assert_eq!(block.field("action"), Some("SetTarget"));
        assert!(block.input("device").is_some());
    }

    #[test]
    fn test_sibling_refresh_excludes_own_value() {
        let catalog = catalog();
        let mut group = DropdownGroup::new(DeviceFilterCriteria::new(), &DEVICE_FILTER_KEYS);
        group.select(FilterKey::DeviceRoom, "1").unwrap();
        group.select(FilterKey::DeviceType, MOTION).unwrap();

        refresh_sibling_options(&mut group, FilterKey::DeviceType, &catalog);

        // Room options ignore the room selection itself
        assert_eq!(values(&group, FilterKey::DeviceRoom), vec!["2", "1"]);
        assert_eq!(values(&group, FilterKey::DeviceId), vec!["1"]);
    }

    #[test]
    fn test_vanished_selection_resets_to_wildcard() {
        let catalog = catalog();
        let mut group = DropdownGroup::new(DeviceFilterCriteria::new(), &DEVICE_FILTER_KEYS);
        group.select(FilterKey::DeviceId, "2").unwrap();
        group.select(FilterKey::DeviceRoom, "2").unwrap();

        let outcome = refresh_sibling_options(&mut group, FilterKey::DeviceRoom, &catalog);

        assert_eq!(outcome.reset, vec![FilterKey::DeviceId]);
        assert_eq!(group.dropdown(FilterKey::DeviceId).unwrap().selected, "");
        assert_eq!(values(&group, FilterKey::DeviceId), vec!["3", "4"]);
    }

    #[test]
    fn test_inherited_criteria_narrow_every_dropdown() {
        let catalog = catalog();
        let inherited = DeviceFilterCriteria::new()
            .with(FilterKey::VariableService, SECURITY)
            .with(FilterKey::Variable, "Armed");
        let mut group = DropdownGroup::new(inherited, &DEVICE_FILTER_KEYS);
        group.select(FilterKey::DeviceRoom, "2").unwrap();

        refresh_sibling_options(&mut group, FilterKey::DeviceRoom, &catalog);
        assert_eq!(values(&group, FilterKey::DeviceId), vec!["3"]);
        assert_eq!(values(&group, FilterKey::DeviceCategory), vec!["4", "4;3"]);
    }

    #[test]
    fn test_connection_check_is_cached_per_node() {
        let mut catalog = catalog();
        let mut resolver = SchemaResolver::new();
        let condition = Block::new(BlockKind::ConditionValue)
            .with_mutation(Mutation::with_condition_type("sensor_armed"));
        let criteria = device_slot_criteria(&condition).unwrap();
        assert_eq!(criteria.get(FilterKey::Variable), Some("Armed"));

        let lamp = Block::new(BlockKind::DeviceRef).with_field("device_id", "4");
        assert!(!resolver
            .check_device_filter_connection("c1", &criteria, &lamp, &catalog)
            .unwrap());
        assert_eq!(resolver.cached_connection("c1"), Some(false));

        let motion = Block::new(BlockKind::DeviceRef).with_field("device_id", "1");
        assert!(resolver
            .check_device_filter_connection("c1", &criteria, &motion, &catalog)
            .unwrap());

        resolver.invalidate_connection("c1");
        assert_eq!(resolver.cached_connection("c1"), None);

        catalog.refresh();
        let list = Block::new(BlockKind::DeviceList)
            .with_mutation(Mutation::with_items(2))
            .with_value("ADD0", motion.clone())
            .with_value("ADD1", lamp);
        assert!(!resolver
            .check_device_filter_connection("c1", &criteria, &list, &catalog)
            .unwrap());
    }

    #[test]
    fn test_device_slot_criteria_requires_a_device_slot() {
        assert!(device_slot_criteria(&Block::new(BlockKind::ActionWait)).is_err());
        let action = Block::new(BlockKind::ActionDevice)
            .with_mutation(Mutation::with_action_type("switch"));
        let criteria = device_slot_criteria(&action).unwrap();
        assert_eq!(criteria.get(FilterKey::Action), Some("SetTarget"));
    }

    #[test]
    fn test_group_round_trips_through_device_block() {
        let block = Block::new(BlockKind::DeviceRef)
            .with_field("device_room", "1")
            .with_field("device_id", "2");
        let group = DropdownGroup::from_device_block(&block, DeviceFilterCriteria::new()).unwrap();
        assert_eq!(group.criteria().len(), 2);

        let mut copy = Block::new(BlockKind::DeviceRef);
        group.apply_to(&mut copy);
        assert_eq!(copy.field("device_id"), Some("2"));
        assert_eq!(copy.field("device_type"), Some(""));
    }

    proptest! {
        #[test]
        fn prop_refresh_reaches_a_fixed_point(
            room in prop::option::of(1u8..3),
            device_type in prop::option::of(prop_oneof![Just(MOTION), Just(DOOR)]),
            category in prop::option::of(prop_oneof![Just("4"), Just("4;3"), Just("3")]),
            device in prop::option::of(1u8..5),
            changed in 0usize..4,
        ) {
            let catalog = catalog();
            let mut group = DropdownGroup::new(DeviceFilterCriteria::new(), &DEVICE_FILTER_KEYS);
            group
                .select(FilterKey::DeviceRoom, room.map(|r| r.to_string()).unwrap_or_default())
                .unwrap();
            group.select(FilterKey::DeviceType, device_type.unwrap_or_default()).unwrap();
            group.select(FilterKey::DeviceCategory, category.unwrap_or_default()).unwrap();
            group
                .select(FilterKey::DeviceId, device.map(|d| d.to_string()).unwrap_or_default())
                .unwrap();
            let changed = DEVICE_FILTER_KEYS[changed];

            refresh_sibling_options(&mut group, changed, &catalog);
            let settled = group.clone();
            let outcome = refresh_sibling_options(&mut group, changed, &catalog);

            prop_assert_eq!(&group, &settled);
            prop_assert!(outcome.updated.is_empty());
            prop_assert!(outcome.reset.is_empty());
            prop_assert_eq!(outcome.passes, 1);
        }
    }
}
