//! Normalized rule documents
//!
//! A rule document is the editor-independent form of a rule: its
//! identity, properties, condition tree and action groups.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A rule as persisted in a rule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    /// Assigned by the runtime; absent until the first save is reloaded
    pub id: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub conditions: ConditionList,
    #[serde(default)]
    pub action_groups: Vec<ActionGroup>,
}

impl RuleDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            properties: Vec::new(),
            conditions: ConditionList::default(),
            action_groups: Vec::new(),
        }
    }

    /// Ascending order by name, then id
    pub fn cmp_by_name(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Property {
    /// Untrip automatically after `delay` seconds
    AutoUntrip { delay: String },
    Acknowledgeable { enabled: bool },
    AlarmPanel { device_id: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AND" => Some(LogicalOperator::And),
            "OR" => Some(LogicalOperator::Or),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionList {
    pub operator: LogicalOperator,
    pub items: Vec<Condition>,
    /// A rule's lone condition plugged in without a list block around it.
    /// Only meaningful for the top level of a rule and for a single item
    /// that is not itself a list.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bare: bool,
}

impl ConditionList {
    pub fn new(operator: LogicalOperator, items: Vec<Condition>) -> Self {
        Self {
            operator,
            items,
            bare: false,
        }
    }

    pub fn single(condition: Condition) -> Self {
        Self {
            operator: LogicalOperator::And,
            items: vec![condition],
            bare: true,
        }
    }

    /// The condition to emit in place of the list, if it stands alone
    pub fn bare_condition(&self) -> Option<&Condition> {
        match self.items.as_slice() {
            [condition]
                if self.bare
                    && self.operator == LogicalOperator::And
                    && !matches!(condition, Condition::List(_)) =>
            {
                Some(condition)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    List(ConditionList),
    Value(ValueCondition),
    Time(TimeCondition),
    Rule(RuleCondition),
}

/// Condition on a device variable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueCondition {
    pub condition_type: Option<String>,
    pub device: Option<DeviceSelection>,
    pub service: String,
    pub variable: String,
    pub operator: String,
    pub value: String,
    #[serde(default)]
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeCondition {
    pub time_type: String,
    pub time: String,
    pub days: String,
    #[serde(default)]
    pub params: Vec<Param>,
}

/// Condition on the status of another rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub rule: String,
    pub status: String,
    #[serde(default)]
    pub params: Vec<Param>,
}

/// Devices targeted by a condition or an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "devices", rename_all = "snake_case")]
pub enum DeviceSelection {
    Single(DeviceRef),
    List(Vec<DeviceRef>),
}

/// A device reference, either a concrete device or a filter over devices
///
/// Empty members are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    #[serde(default)]
    pub device_room: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub device_category: String,
    #[serde(default)]
    pub device_id: String,
}

impl DeviceRef {
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Param {
    Level { level: String },
    Since { since: String },
    Delay { delay: String, unit: String },
    Critical { critical: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionGroup {
    /// Rule event that triggers the group (`start`, `end`, `reminder`, ...)
    pub event: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl ActionGroup {
    pub fn on(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            params: Vec::new(),
            actions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Wait { delay: String, unit: String },
    Function { code: String },
    Device(DeviceAction),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAction {
    pub action_type: Option<String>,
    pub device: Option<DeviceSelection>,
    pub service: String,
    pub action: String,
    #[serde(default)]
    pub arguments: Vec<ActionArgument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionArgument {
    pub name: String,
    pub value: String,
}
