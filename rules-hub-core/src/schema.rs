//! Block vocabulary and shape rules
//!
//! The set of slots a block carries is a pure function of its kind and
//! its mutation. Both the codec (canonical serialization) and the schema
//! resolver (editor visibility) derive shapes from [`canonical_slots`].

use serde::{Deserialize, Serialize};

use crate::{Block, InputKind, Mutation};

/// Prefix of the fields holding device action arguments
pub const ACTION_PARAM_PREFIX: &str = "param_";

/// Prefix of the synthesized item slots of list blocks
pub const LIST_ITEM_PREFIX: &str = "ADD";

/// Mutation input name that enables the rule's property list
pub const RULE_PROPERTIES_INPUT: &str = "properties";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Rule,
    PropertyList,
    PropertyAutoUntrip,
    PropertyAcknowledgeable,
    PropertyAlarmPanel,
    ConditionList,
    ConditionValue,
    ConditionTime,
    ConditionRule,
    ConditionParamList,
    ActionGroup,
    ActionWait,
    ActionFunction,
    ActionDevice,
    ActionParamList,
    ParamLevel,
    ParamSince,
    ParamDelay,
    ParamCritical,
    DeviceRef,
    DeviceList,
    Text,
    TextArea,
    Number,
}

impl BlockKind {
    pub const ALL: [BlockKind; 24] = [
        BlockKind::Rule,
        BlockKind::PropertyList,
        BlockKind::PropertyAutoUntrip,
        BlockKind::PropertyAcknowledgeable,
        BlockKind::PropertyAlarmPanel,
        BlockKind::ConditionList,
        BlockKind::ConditionValue,
        BlockKind::ConditionTime,
        BlockKind::ConditionRule,
        BlockKind::ConditionParamList,
        BlockKind::ActionGroup,
        BlockKind::ActionWait,
        BlockKind::ActionFunction,
        BlockKind::ActionDevice,
        BlockKind::ActionParamList,
        BlockKind::ParamLevel,
        BlockKind::ParamSince,
        BlockKind::ParamDelay,
        BlockKind::ParamCritical,
        BlockKind::DeviceRef,
        BlockKind::DeviceList,
        BlockKind::Text,
        BlockKind::TextArea,
        BlockKind::Number,
    ];

    /// Type tag used in the XML `type` attribute
    pub fn type_name(self) -> &'static str {
        match self {
            BlockKind::Rule => "rule",
            BlockKind::PropertyList => "list_property",
            BlockKind::PropertyAutoUntrip => "property_auto_untrip",
            BlockKind::PropertyAcknowledgeable => "property_is_acknowledgeable",
            BlockKind::PropertyAlarmPanel => "property_alarm_panel",
            BlockKind::ConditionList => "list_with_operator_condition",
            BlockKind::ConditionValue => "condition_value",
            BlockKind::ConditionTime => "condition_time",
            BlockKind::ConditionRule => "condition_rule",
            BlockKind::ConditionParamList => "list_condition_param",
            BlockKind::ActionGroup => "action_group",
            BlockKind::ActionWait => "action_wait",
            BlockKind::ActionFunction => "action_function",
            BlockKind::ActionDevice => "action_device",
            BlockKind::ActionParamList => "list_action_param",
            BlockKind::ParamLevel => "param_level",
            BlockKind::ParamSince => "condition_param_since",
            BlockKind::ParamDelay => "action_param_delay",
            BlockKind::ParamCritical => "action_param_critical",
            BlockKind::DeviceRef => "device",
            BlockKind::DeviceList => "list_device",
            BlockKind::Text => "text",
            BlockKind::TextArea => "text_area",
            BlockKind::Number => "math_number",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }

    /// Connection types this block can plug into as a value
    pub fn output_checks(self) -> &'static [CheckType] {
        match self {
            BlockKind::PropertyList => &[CheckType::PropertyList],
            BlockKind::PropertyAutoUntrip
            | BlockKind::PropertyAcknowledgeable
            | BlockKind::PropertyAlarmPanel => &[CheckType::Property],
            BlockKind::ConditionList
            | BlockKind::ConditionValue
            | BlockKind::ConditionTime
            | BlockKind::ConditionRule => &[CheckType::Boolean],
            BlockKind::ConditionParamList => &[CheckType::ConditionParamList],
            BlockKind::ActionParamList => &[CheckType::ActionParamList],
            BlockKind::ParamLevel => &[CheckType::ConditionParam, CheckType::ActionParam],
            BlockKind::ParamSince => &[CheckType::ConditionParam],
            BlockKind::ParamDelay | BlockKind::ParamCritical => &[CheckType::ActionParam],
            BlockKind::DeviceRef | BlockKind::DeviceList => &[CheckType::Device],
            BlockKind::Text | BlockKind::TextArea => &[CheckType::Text],
            BlockKind::Number => &[CheckType::Number],
            BlockKind::Rule
            | BlockKind::ActionGroup
            | BlockKind::ActionWait
            | BlockKind::ActionFunction
            | BlockKind::ActionDevice => &[],
        }
    }

    /// Connection type of statement blocks (those chained through `next`)
    pub fn statement_check(self) -> Option<CheckType> {
        match self {
            BlockKind::ActionGroup => Some(CheckType::ActionGroup),
            BlockKind::ActionWait | BlockKind::ActionFunction | BlockKind::ActionDevice => {
                Some(CheckType::Action)
            }
            _ => None,
        }
    }

    pub fn accepts(self, check: CheckType) -> bool {
        self.output_checks().contains(&check) || self.statement_check() == Some(check)
    }

    pub fn list_kind(self) -> Option<ListKind> {
        match self {
            BlockKind::ConditionList => Some(ListKind::Conditions),
            BlockKind::DeviceList => Some(ListKind::Devices),
            BlockKind::PropertyList => Some(ListKind::Properties),
            BlockKind::ConditionParamList => Some(ListKind::ConditionParams),
            BlockKind::ActionParamList => Some(ListKind::ActionParams),
            _ => None,
        }
    }
}

/// Connection type of an input or of a block output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Boolean,
    Device,
    Text,
    Number,
    Property,
    PropertyList,
    ConditionParam,
    ConditionParamList,
    ActionParam,
    ActionParamList,
    ActionGroup,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Field,
    Value,
    Statement,
}

/// One slot of a block's canonical shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub name: String,
    pub kind: SlotKind,
    pub check: Option<CheckType>,
}

impl SlotSpec {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Field,
            check: None,
        }
    }

    pub fn value(name: impl Into<String>, check: CheckType) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Value,
            check: Some(check),
        }
    }

    pub fn statement(name: impl Into<String>, check: CheckType) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Statement,
            check: Some(check),
        }
    }
}

/// Item kinds of the `list_*` blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Conditions,
    Devices,
    Properties,
    ConditionParams,
    ActionParams,
}

impl ListKind {
    pub fn item_check(self) -> CheckType {
        match self {
            ListKind::Conditions => CheckType::Boolean,
            ListKind::Devices => CheckType::Device,
            ListKind::Properties => CheckType::Property,
            ListKind::ConditionParams => CheckType::ConditionParam,
            ListKind::ActionParams => CheckType::ActionParam,
        }
    }

    pub fn block_kind(self) -> BlockKind {
        match self {
            ListKind::Conditions => BlockKind::ConditionList,
            ListKind::Devices => BlockKind::DeviceList,
            ListKind::Properties => BlockKind::PropertyList,
            ListKind::ConditionParams => BlockKind::ConditionParamList,
            ListKind::ActionParams => BlockKind::ActionParamList,
        }
    }
}

/// Capability shared by every list-shaped node
pub trait ListShape {
    fn list_kind(&self) -> Option<ListKind>;

    fn item_count(&self) -> usize;

    fn check_type(&self) -> Option<CheckType> {
        self.list_kind().map(ListKind::item_check)
    }
}

impl ListShape for Block {
    fn list_kind(&self) -> Option<ListKind> {
        BlockKind::from_type_name(&self.block_type).and_then(BlockKind::list_kind)
    }

    fn item_count(&self) -> usize {
        self.mutation.as_ref().and_then(|m| m.items).unwrap_or(0)
    }
}

pub fn item_slot_name(index: usize) -> String {
    format!("{}{}", LIST_ITEM_PREFIX, index)
}

/// Index of an `ADDn` slot name
pub fn item_slot_index(name: &str) -> Option<usize> {
    name.strip_prefix(LIST_ITEM_PREFIX)?.parse().ok()
}

/// Slots of a list block holding `count` items
pub fn list_slots(kind: ListKind, count: usize) -> Vec<SlotSpec> {
    let mut slots = Vec::with_capacity(count + 1);
    // The operator dropdown sits on the first item row
    if kind == ListKind::Conditions && count > 0 {
        slots.push(SlotSpec::field("operator"));
    }
    slots.extend((0..count).map(|i| SlotSpec::value(item_slot_name(i), kind.item_check())));
    slots
}

/// A `condition_type` that pins the watched variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionShortcut {
    pub name: &'static str,
    pub service: &'static str,
    pub variable: &'static str,
    pub operator: Option<&'static str>,
    pub value: Option<&'static str>,
}

pub const CONDITION_SHORTCUTS: &[ConditionShortcut] = &[
    ConditionShortcut {
        name: "sensor_armed",
        service: "urn:micasaverde-com:serviceId:SecuritySensor1",
        variable: "Armed",
        operator: Some("=="),
        value: Some("1"),
    },
    ConditionShortcut {
        name: "sensor_tripped",
        service: "urn:micasaverde-com:serviceId:SecuritySensor1",
        variable: "Tripped",
        operator: Some("=="),
        value: Some("1"),
    },
    ConditionShortcut {
        name: "switch",
        service: "urn:upnp-org:serviceId:SwitchPower1",
        variable: "Status",
        operator: Some("=="),
        value: Some("1"),
    },
    ConditionShortcut {
        name: "dimmer",
        service: "urn:upnp-org:serviceId:Dimming1",
        variable: "LoadLevelStatus",
        operator: None,
        value: None,
    },
    ConditionShortcut {
        name: "sensor_temperature",
        service: "urn:upnp-org:serviceId:TemperatureSensor1",
        variable: "CurrentTemperature",
        operator: None,
        value: None,
    },
];

pub fn condition_shortcut(name: &str) -> Option<&'static ConditionShortcut> {
    CONDITION_SHORTCUTS.iter().find(|s| s.name == name)
}

/// An `action_type` that pins the called service action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionShortcut {
    pub name: &'static str,
    pub service: &'static str,
    pub action: &'static str,
    pub params: &'static [&'static str],
}

pub const ACTION_SHORTCUTS: &[ActionShortcut] = &[
    ActionShortcut {
        name: "switch",
        service: "urn:upnp-org:serviceId:SwitchPower1",
        action: "SetTarget",
        params: &["newTargetValue"],
    },
    ActionShortcut {
        name: "dimmer",
        service: "urn:upnp-org:serviceId:Dimming1",
        action: "SetLoadLevelTarget",
        params: &["newLoadlevelTarget"],
    },
    ActionShortcut {
        name: "scene",
        service: "urn:micasaverde-com:serviceId:HomeAutomationGateway1",
        action: "RunScene",
        params: &["SceneNum"],
    },
];

pub fn action_shortcut(name: &str) -> Option<&'static ActionShortcut> {
    ACTION_SHORTCUTS.iter().find(|s| s.name == name)
}

/// Field values pinned by the block's shortcut, in slot order
pub fn fixed_fields(kind: BlockKind, mutation: &Mutation) -> Vec<(&'static str, &'static str)> {
    match kind {
        BlockKind::ConditionValue => {
            let Some(shortcut) = mutation.condition_type.as_deref().and_then(condition_shortcut)
            else {
                return Vec::new();
            };
            let mut fixed = vec![
                ("variable_service", shortcut.service),
                ("variable", shortcut.variable),
            ];
            if let Some(operator) = shortcut.operator {
                fixed.push(("operator", operator));
            }
            if let Some(value) = shortcut.value {
                fixed.push(("value", value));
            }
            fixed
        }
        BlockKind::ActionDevice => mutation
            .action_type
            .as_deref()
            .and_then(action_shortcut)
            .map(|s| vec![("action_service", s.service), ("action", s.action)])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Argument names of a device action block
pub fn action_param_names(mutation: &Mutation) -> Vec<String> {
    match mutation.action_type.as_deref().and_then(action_shortcut) {
        Some(shortcut) => shortcut.params.iter().map(|p| p.to_string()).collect(),
        None => mutation.inputs.clone(),
    }
}

/// The slots a block of `kind` carries under `mutation`, in canonical order
pub fn canonical_slots(kind: BlockKind, mutation: &Mutation) -> Vec<SlotSpec> {
    if let Some(list) = kind.list_kind() {
        return list_slots(list, mutation.items.unwrap_or(0));
    }

    let fixed = fixed_fields(kind, mutation);
    let editable = |name: &str| !fixed.iter().any(|(f, _)| *f == name);

    match kind {
        BlockKind::Rule => {
            let mut slots = vec![
                SlotSpec::field("id"),
                SlotSpec::value("name", CheckType::Text),
                SlotSpec::value("description", CheckType::Text),
            ];
            if mutation.has_input(RULE_PROPERTIES_INPUT) {
                slots.push(SlotSpec::value(RULE_PROPERTIES_INPUT, CheckType::PropertyList));
            }
            slots.push(SlotSpec::value("conditions", CheckType::Boolean));
            slots.push(SlotSpec::statement("actions", CheckType::ActionGroup));
            slots
        }
        BlockKind::PropertyAutoUntrip => vec![SlotSpec::value("delay", CheckType::Number)],
        BlockKind::PropertyAcknowledgeable => vec![SlotSpec::field("acknowledgeable")],
        BlockKind::PropertyAlarmPanel => vec![SlotSpec::field("device_id")],
        BlockKind::ConditionValue => {
            let mut slots = vec![SlotSpec::value("device", CheckType::Device)];
            slots.extend(
                ["variable_service", "variable", "operator", "value"]
                    .into_iter()
                    .filter(|name| editable(name))
                    .map(SlotSpec::field),
            );
            slots.push(SlotSpec::value("params", CheckType::ConditionParamList));
            slots
        }
        BlockKind::ConditionTime => vec![
            SlotSpec::field("time_type"),
            SlotSpec::field("time"),
            SlotSpec::field("days"),
            SlotSpec::value("params", CheckType::ConditionParamList),
        ],
        BlockKind::ConditionRule => vec![
            SlotSpec::field("rule"),
            SlotSpec::field("status"),
            SlotSpec::value("params", CheckType::ConditionParamList),
        ],
        BlockKind::ActionGroup => vec![
            SlotSpec::field("event"),
            SlotSpec::value("params", CheckType::ActionParamList),
            SlotSpec::statement("do", CheckType::Action),
        ],
        BlockKind::ActionWait => vec![SlotSpec::field("delay"), SlotSpec::field("unit")],
        BlockKind::ActionFunction => vec![SlotSpec::field("functionContent")],
        BlockKind::ActionDevice => {
            let mut slots = vec![SlotSpec::value("device", CheckType::Device)];
            slots.extend(
                ["action_service", "action"]
                    .into_iter()
                    .filter(|name| editable(name))
                    .map(SlotSpec::field),
            );
            slots.extend(
                action_param_names(mutation)
                    .into_iter()
                    .map(|p| SlotSpec::field(format!("{}{}", ACTION_PARAM_PREFIX, p))),
            );
            slots
        }
        BlockKind::ParamLevel => vec![SlotSpec::field("level")],
        BlockKind::ParamSince => vec![SlotSpec::field("since")],
        BlockKind::ParamDelay => vec![SlotSpec::field("delay"), SlotSpec::field("unit")],
        BlockKind::ParamCritical => vec![SlotSpec::field("isCritical")],
        BlockKind::DeviceRef => vec![
            SlotSpec::field("device_room"),
            SlotSpec::field("device_type"),
            SlotSpec::field("device_category"),
            SlotSpec::field("device_id"),
        ],
        BlockKind::Text | BlockKind::TextArea => vec![SlotSpec::field("TEXT")],
        BlockKind::Number => vec![SlotSpec::field("NUM")],
        BlockKind::PropertyList
        | BlockKind::ConditionList
        | BlockKind::ConditionParamList
        | BlockKind::ActionParamList
        | BlockKind::DeviceList => unreachable!("list kinds are handled above"),
    }
}

/// Create every slot of `specs` the block lacks, empty, then move all of
/// its slots to their canonical position. Slots outside `specs` sort last.
pub fn complete_slots(block: &mut Block, specs: &[SlotSpec]) {
    for spec in specs {
        match spec.kind {
            SlotKind::Field if block.field(&spec.name).is_none() => {
                block.set_field(spec.name.clone(), "");
            }
            SlotKind::Value if block.input(&spec.name).is_none() => {
                block.set_input(spec.name.clone(), InputKind::Value, None);
            }
            SlotKind::Statement if block.input(&spec.name).is_none() => {
                block.set_input(spec.name.clone(), InputKind::Statement, None);
            }
            _ => {}
        }
    }
    let position = |name: &str| specs.iter().position(|s| s.name == name).unwrap_or(usize::MAX);
    block.fields.sort_by_key(|f| position(&f.name));
    block.inputs.sort_by_key(|i| position(&i.name));
}
