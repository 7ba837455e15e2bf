//! Block tree ⇄ rule document conversion
//!
//! `decode` reads a normalized copy of the tree, so it accepts anything
//! [`normalize`] accepts. `encode` emits canonical trees: every slot of the
//! block's shape in canonical order, empty inputs left unconnected.

use rules_hub_core::schema::{
    action_param_names, canonical_slots, complete_slots, fixed_fields, item_slot_name,
    ACTION_PARAM_PREFIX, RULE_PROPERTIES_INPUT,
};
use rules_hub_core::{
    Action, ActionArgument, ActionGroup, Block, BlockKind, Condition, ConditionList, DeviceAction,
    DeviceRef, DeviceSelection, InputKind, ListKind, LogicalOperator, Mutation, Param, Property,
    RuleCondition, RuleDocument, TimeCondition, ValueCondition,
};

use crate::{normalize, parse_blocks, write_blocks, CodecError};

const TRUE: &str = "TRUE";
const FALSE: &str = "FALSE";

/// Converts rules between block trees and documents
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleCodec;

impl RuleCodec {
    pub fn new() -> Self {
        Self
    }

    /// Build the canonical block tree of a rule
    pub fn encode(&self, rule: &RuleDocument) -> Block {
        let mut mutation = Mutation::default();
        if !rule.properties.is_empty() {
            mutation.inputs.push(RULE_PROPERTIES_INPUT.to_string());
        }

        let mut block = shaped(BlockKind::Rule, mutation);
        block.set_field("id", rule.id.map(|id| id.to_string()).unwrap_or_default());
        block.set_input("name", InputKind::Value, Some(text(BlockKind::Text, &rule.name)));
        block.set_input(
            "description",
            InputKind::Value,
            Some(text(BlockKind::TextArea, &rule.description)),
        );
        if !rule.properties.is_empty() {
            let items = rule.properties.iter().map(encode_property).collect();
            block.set_input(
                RULE_PROPERTIES_INPUT,
                InputKind::Value,
                Some(list(ListKind::Properties, items)),
            );
        }
        let conditions = match rule.conditions.bare_condition() {
            Some(condition) => encode_condition(condition),
            None => encode_condition_list(&rule.conditions),
        };
        block.set_input("conditions", InputKind::Value, Some(conditions));
        let groups = rule.action_groups.iter().map(encode_action_group).collect();
        block.set_input("actions", InputKind::Statement, Block::link_chain(groups));
        block
    }

    /// Read a rule from its block tree
    pub fn decode(&self, block: &Block) -> Result<RuleDocument, CodecError> {
        let mut block = block.clone();
        normalize(&mut block)?;
        check_connections(&block)?;
        decode_rule(&block)
    }

    /// Check that a rule tree would decode, discarding the document
    pub fn validate(&self, block: &Block) -> Result<(), CodecError> {
        self.decode(block).map(|_| ())
    }

    /// Decode every rule of an XML rule file, in file order
    pub fn decode_file(&self, xml: &str) -> Result<Vec<RuleDocument>, CodecError> {
        parse_blocks(xml)?
            .iter()
            .map(|block| self.decode(block))
            .collect()
    }

    pub fn encode_file(&self, rules: &[RuleDocument]) -> Result<String, CodecError> {
        let blocks: Vec<Block> = rules.iter().map(|rule| self.encode(rule)).collect();
        write_blocks(&blocks)
    }
}

/// Every connected child must fit the check type of its slot
fn check_connections(block: &Block) -> Result<(), CodecError> {
    let kind = block.kind()?;
    let specs = canonical_slots(kind, &block.mutation_or_default());
    for input in &block.inputs {
        let Some(child) = input.block.as_deref() else {
            continue;
        };
        let check = specs
            .iter()
            .find(|s| s.name == input.name)
            .and_then(|s| s.check);
        for linked in child.chain() {
            let fits = match check {
                Some(check) => linked.kind()?.accepts(check),
                None => false,
            };
            if !fits {
                return Err(CodecError::IncompatibleBlock {
                    parent: block.block_type.clone(),
                    slot: input.name.clone(),
                    found: linked.block_type.clone(),
                });
            }
            check_connections(linked)?;
        }
    }
    Ok(())
}

/// A block carrying `mutation` only when it says something
fn shaped(kind: BlockKind, mutation: Mutation) -> Block {
    let block = Block::new(kind);
    if mutation.is_empty() {
        block
    } else {
        block.with_mutation(mutation)
    }
}

fn text(kind: BlockKind, value: &str) -> Block {
    Block::new(kind).with_field("TEXT", value)
}

fn flag(value: bool) -> &'static str {
    if value {
        TRUE
    } else {
        FALSE
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case(TRUE) || value == "1"
}

/// A list block holding `items`, one per `ADDn` slot
fn list(kind: ListKind, items: Vec<Block>) -> Block {
    let mut block = Block::new(kind.block_kind()).with_mutation(Mutation::with_items(items.len()));
    for (index, item) in items.into_iter().enumerate() {
        block.set_input(item_slot_name(index), InputKind::Value, Some(item));
    }
    block
}

/// Set every slot of the block's shape that is still missing
fn complete(mut block: Block) -> Block {
    if let Ok(kind) = block.kind() {
        let specs = canonical_slots(kind, &block.mutation_or_default());
        complete_slots(&mut block, &specs);
    }
    block
}

fn encode_property(property: &Property) -> Block {
    match property {
        Property::AutoUntrip { delay } => Block::new(BlockKind::PropertyAutoUntrip).with_value(
            "delay",
            Block::new(BlockKind::Number).with_field("NUM", delay.as_str()),
        ),
        Property::Acknowledgeable { enabled } => Block::new(BlockKind::PropertyAcknowledgeable)
            .with_field("acknowledgeable", flag(*enabled)),
        Property::AlarmPanel { device_id } => {
            Block::new(BlockKind::PropertyAlarmPanel).with_field("device_id", device_id.as_str())
        }
    }
}

fn encode_condition_list(conditions: &ConditionList) -> Block {
    let items = conditions.items.iter().map(encode_condition).collect();
    let mut block = list(ListKind::Conditions, items);
    if !conditions.items.is_empty() {
        block.set_field("operator", conditions.operator.as_str());
    }
    block
}

fn encode_condition(condition: &Condition) -> Block {
    match condition {
        Condition::List(list) => encode_condition_list(list),
        Condition::Value(value) => {
            let mutation = Mutation {
                condition_type: value.condition_type.clone(),
                ..Mutation::default()
            };
            let pinned = fixed_fields(BlockKind::ConditionValue, &mutation);
            let mut block = shaped(BlockKind::ConditionValue, mutation);
            block.set_input("device", InputKind::Value, value.device.as_ref().map(encode_devices));
            for (name, content) in [
                ("variable_service", &value.service),
                ("variable", &value.variable),
                ("operator", &value.operator),
                ("value", &value.value),
            ] {
                if !pinned.iter().any(|(pinned, _)| *pinned == name) {
                    block.set_field(name, content.as_str());
                }
            }
            block.set_input(
                "params",
                InputKind::Value,
                encode_params(ListKind::ConditionParams, &value.params),
            );
            block
        }
        Condition::Time(time) => {
            let mut block = Block::new(BlockKind::ConditionTime)
                .with_field("time_type", time.time_type.as_str())
                .with_field("time", time.time.as_str())
                .with_field("days", time.days.as_str());
            block.set_input(
                "params",
                InputKind::Value,
                encode_params(ListKind::ConditionParams, &time.params),
            );
            block
        }
        Condition::Rule(rule) => {
            let mut block = Block::new(BlockKind::ConditionRule)
                .with_field("rule", rule.rule.as_str())
                .with_field("status", rule.status.as_str());
            block.set_input(
                "params",
                InputKind::Value,
                encode_params(ListKind::ConditionParams, &rule.params),
            );
            block
        }
    }
}

fn encode_devices(selection: &DeviceSelection) -> Block {
    match selection {
        DeviceSelection::Single(device) => encode_device(device),
        DeviceSelection::List(devices) => {
            list(ListKind::Devices, devices.iter().map(encode_device).collect())
        }
    }
}

fn encode_device(device: &DeviceRef) -> Block {
    Block::new(BlockKind::DeviceRef)
        .with_field("device_room", device.device_room.as_str())
        .with_field("device_type", device.device_type.as_str())
        .with_field("device_category", device.device_category.as_str())
        .with_field("device_id", device.device_id.as_str())
}

fn encode_params(kind: ListKind, params: &[Param]) -> Option<Block> {
    if params.is_empty() {
        return None;
    }
    Some(list(kind, params.iter().map(encode_param).collect()))
}

fn encode_param(param: &Param) -> Block {
    match param {
        Param::Level { level } => {
            Block::new(BlockKind::ParamLevel).with_field("level", level.as_str())
        }
        Param::Since { since } => {
            Block::new(BlockKind::ParamSince).with_field("since", since.as_str())
        }
        Param::Delay { delay, unit } => Block::new(BlockKind::ParamDelay)
            .with_field("delay", delay.as_str())
            .with_field("unit", unit.as_str()),
        Param::Critical { critical } => {
            Block::new(BlockKind::ParamCritical).with_field("isCritical", flag(*critical))
        }
    }
}

fn encode_action_group(group: &ActionGroup) -> Block {
    let actions = group.actions.iter().map(encode_action).collect();
    let mut block = Block::new(BlockKind::ActionGroup).with_field("event", group.event.as_str());
    block.set_input(
        "params",
        InputKind::Value,
        encode_params(ListKind::ActionParams, &group.params),
    );
    block.set_input("do", InputKind::Statement, Block::link_chain(actions));
    block
}

fn encode_action(action: &Action) -> Block {
    match action {
        Action::Wait { delay, unit } => Block::new(BlockKind::ActionWait)
            .with_field("delay", delay.as_str())
            .with_field("unit", unit.as_str()),
        Action::Function { code } => {
            Block::new(BlockKind::ActionFunction).with_field("functionContent", code.as_str())
        }
        Action::Device(device_action) => encode_device_action(device_action),
    }
}

fn encode_device_action(action: &DeviceAction) -> Block {
    let mut mutation = Mutation {
        action_type: action.action_type.clone(),
        ..Mutation::default()
    };
    let shortcut_params = action_param_names(&mutation);
    if shortcut_params.is_empty() {
        mutation.inputs = action.arguments.iter().map(|a| a.name.clone()).collect();
    }
    let pinned = fixed_fields(BlockKind::ActionDevice, &mutation);

    let mut block = shaped(BlockKind::ActionDevice, mutation.clone());
    block.set_input("device", InputKind::Value, action.device.as_ref().map(encode_devices));
    for (name, content) in [("action_service", &action.service), ("action", &action.action)] {
        if !pinned.iter().any(|(pinned, _)| *pinned == name) {
            block.set_field(name, content.as_str());
        }
    }
    for name in action_param_names(&mutation) {
        let value = action
            .arguments
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
            .unwrap_or_default();
        block.set_field(format!("{}{}", ACTION_PARAM_PREFIX, name), value);
    }
    complete(block)
}

fn expect_kind(
    block: &Block,
    expected: &'static str,
    kinds: &[BlockKind],
) -> Result<BlockKind, CodecError> {
    let kind = block.kind()?;
    if kinds.contains(&kind) {
        Ok(kind)
    } else {
        Err(CodecError::UnexpectedBlock {
            expected,
            found: block.block_type.clone(),
        })
    }
}

fn field(block: &Block, name: &str) -> String {
    block.field(name).unwrap_or_default().to_string()
}

/// Text of the literal block plugged into `slot`; empty when unconnected
fn text_input(block: &Block, slot: &str) -> Result<String, CodecError> {
    match block.child(slot) {
        None => Ok(String::new()),
        Some(child) => {
            let kinds = [BlockKind::Text, BlockKind::TextArea, BlockKind::Number];
            match expect_kind(child, "a text", &kinds)? {
                BlockKind::Number => Ok(field(child, "NUM")),
                _ => Ok(field(child, "TEXT")),
            }
        }
    }
}

/// Connected items of a list block, in slot order
fn list_items(block: &Block) -> Vec<&Block> {
    block
        .inputs
        .iter()
        .filter_map(|input| input.block.as_deref())
        .collect()
}

fn decode_rule(block: &Block) -> Result<RuleDocument, CodecError> {
    expect_kind(block, "a rule", &[BlockKind::Rule])?;

    let id = match block.field("id").map(str::trim).unwrap_or_default() {
        "" => None,
        raw => Some(raw.parse::<u32>().map_err(|_| CodecError::InvalidValue {
            slot: "id".to_string(),
            value: raw.to_string(),
        })?),
    };

    let properties = match block.child(RULE_PROPERTIES_INPUT) {
        Some(list) => {
            expect_kind(list, "a property list", &[BlockKind::PropertyList])?;
            list_items(list)
                .into_iter()
                .map(decode_property)
                .collect::<Result<Vec<_>, _>>()?
        }
        None => Vec::new(),
    };

    let conditions = match block.child("conditions") {
        None => ConditionList::default(),
        Some(child) => match decode_condition(child)? {
            Condition::List(list) => list,
            single => ConditionList::single(single),
        },
    };

    let action_groups = block
        .statement_blocks("actions")
        .into_iter()
        .map(decode_action_group)
        .collect::<Result<Vec<_>, _>>()?;

    // Rules are matched by name when the runtime has not assigned an id yet
    let name = text_input(block, "name")?;
    if name.trim().is_empty() {
        return Err(CodecError::InvalidValue {
            slot: "name".to_string(),
            value: name,
        });
    }

    Ok(RuleDocument {
        id,
        name,
        description: text_input(block, "description")?,
        properties,
        conditions,
        action_groups,
    })
}

fn decode_property(block: &Block) -> Result<Property, CodecError> {
    let kind = expect_kind(
        block,
        "a property",
        &[
            BlockKind::PropertyAutoUntrip,
            BlockKind::PropertyAcknowledgeable,
            BlockKind::PropertyAlarmPanel,
        ],
    )?;
    Ok(match kind {
        BlockKind::PropertyAutoUntrip => Property::AutoUntrip {
            delay: text_input(block, "delay")?,
        },
        BlockKind::PropertyAcknowledgeable => Property::Acknowledgeable {
            enabled: parse_flag(&field(block, "acknowledgeable")),
        },
        _ => Property::AlarmPanel {
            device_id: field(block, "device_id"),
        },
    })
}

fn decode_condition(block: &Block) -> Result<Condition, CodecError> {
    let kind = expect_kind(
        block,
        "a condition",
        &[
            BlockKind::ConditionList,
            BlockKind::ConditionValue,
            BlockKind::ConditionTime,
            BlockKind::ConditionRule,
        ],
    )?;
    let condition = match kind {
        BlockKind::ConditionList => {
            let operator = match block.field("operator").unwrap_or_default() {
                "" => LogicalOperator::default(),
                raw => LogicalOperator::parse(raw).ok_or_else(|| CodecError::InvalidValue {
                    slot: "operator".to_string(),
                    value: raw.to_string(),
                })?,
            };
            let items = list_items(block)
                .into_iter()
                .map(decode_condition)
                .collect::<Result<Vec<_>, _>>()?;
            Condition::List(ConditionList::new(operator, items))
        }
        BlockKind::ConditionValue => {
            let mutation = block.mutation_or_default();
            let pinned = fixed_fields(kind, &mutation);
            let value_of = |name: &str| {
                pinned
                    .iter()
                    .find(|(pinned, _)| *pinned == name)
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_else(|| field(block, name))
            };
            Condition::Value(ValueCondition {
                condition_type: mutation.condition_type.clone(),
                device: decode_devices(block)?,
                service: value_of("variable_service"),
                variable: value_of("variable"),
                operator: value_of("operator"),
                value: value_of("value"),
                params: decode_params(block)?,
            })
        }
        BlockKind::ConditionTime => Condition::Time(TimeCondition {
            time_type: field(block, "time_type"),
            time: field(block, "time"),
            days: field(block, "days"),
            params: decode_params(block)?,
        }),
        _ => Condition::Rule(RuleCondition {
            rule: field(block, "rule"),
            status: field(block, "status"),
            params: decode_params(block)?,
        }),
    };
    Ok(condition)
}

fn decode_devices(block: &Block) -> Result<Option<DeviceSelection>, CodecError> {
    let Some(child) = block.child("device") else {
        return Ok(None);
    };
    let kinds = [BlockKind::DeviceRef, BlockKind::DeviceList];
    let selection = match expect_kind(child, "a device", &kinds)? {
        BlockKind::DeviceRef => DeviceSelection::Single(decode_device(child)?),
        _ => DeviceSelection::List(
            list_items(child)
                .into_iter()
                .map(decode_device)
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };
    Ok(Some(selection))
}

fn decode_device(block: &Block) -> Result<DeviceRef, CodecError> {
    expect_kind(block, "a device", &[BlockKind::DeviceRef])?;
    Ok(DeviceRef {
        device_room: field(block, "device_room"),
        device_type: field(block, "device_type"),
        device_category: field(block, "device_category"),
        device_id: field(block, "device_id"),
    })
}

fn decode_params(block: &Block) -> Result<Vec<Param>, CodecError> {
    let Some(list) = block.child("params") else {
        return Ok(Vec::new());
    };
    expect_kind(
        list,
        "a parameter list",
        &[BlockKind::ConditionParamList, BlockKind::ActionParamList],
    )?;
    list_items(list).into_iter().map(decode_param).collect()
}

fn decode_param(block: &Block) -> Result<Param, CodecError> {
    let kind = expect_kind(
        block,
        "a parameter",
        &[
            BlockKind::ParamLevel,
            BlockKind::ParamSince,
            BlockKind::ParamDelay,
            BlockKind::ParamCritical,
        ],
    )?;
    Ok(match kind {
        BlockKind::ParamLevel => Param::Level {
            level: field(block, "level"),
        },
        BlockKind::ParamSince => Param::Since {
            since: field(block, "since"),
        },
        BlockKind::ParamDelay => Param::Delay {
            delay: field(block, "delay"),
            unit: field(block, "unit"),
        },
        _ => Param::Critical {
            critical: parse_flag(&field(block, "isCritical")),
        },
    })
}

fn decode_action_group(block: &Block) -> Result<ActionGroup, CodecError> {
    expect_kind(block, "an action group", &[BlockKind::ActionGroup])?;
    Ok(ActionGroup {
        event: field(block, "event"),
        params: decode_params(block)?,
        actions: block
            .statement_blocks("do")
            .into_iter()
            .map(decode_action)
            .collect::<Result<Vec<_>, _>>()?,
    })
}

fn decode_action(block: &Block) -> Result<Action, CodecError> {
    let kind = expect_kind(
        block,
        "an action",
        &[BlockKind::ActionWait, BlockKind::ActionFunction, BlockKind::ActionDevice],
    )?;
    Ok(match kind {
        BlockKind::ActionWait => Action::Wait {
            delay: field(block, "delay"),
            unit: field(block, "unit"),
        },
        BlockKind::ActionFunction => Action::Function {
            code: field(block, "functionContent"),
        },
        _ => {
            let mutation = block.mutation_or_default();
            let pinned = fixed_fields(kind, &mutation);
            let value_of = |name: &str| {
                pinned
                    .iter()
                    .find(|(pinned, _)| *pinned == name)
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_else(|| field(block, name))
            };
            let arguments = action_param_names(&mutation)
                .into_iter()
                .map(|name| ActionArgument {
                    value: field(block, &format!("{}{}", ACTION_PARAM_PREFIX, name)),
                    name,
                })
                .collect();
            Action::Device(DeviceAction {
                action_type: mutation.action_type.clone(),
                device: decode_devices(block)?,
                service: value_of("action_service"),
                action: value_of("action"),
                arguments,
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const SECURITY: &str = "urn:micasaverde-com:serviceId:SecuritySensor1";

    fn night_rule() -> RuleDocument {
        let mut rule = RuleDocument::new("Night alarm");
        rule.id = Some(4);
        rule.description = "Arms the hall\nwhen everyone sleeps".to_string();
        rule.properties = vec![
            Property::AutoUntrip { delay: "60".to_string() },
            Property::Acknowledgeable { enabled: true },
        ];
        rule.conditions = ConditionList::new(
            LogicalOperator::Or,
            vec![
                Condition::Value(ValueCondition {
                    condition_type: Some("sensor_tripped".to_string()),
                    device: Some(DeviceSelection::List(vec![
                        DeviceRef::device("12"),
                        DeviceRef {
                            device_room: "3".to_string(),
                            ..DeviceRef::default()
                        },
                    ])),
                    service: SECURITY.to_string(),
                    variable: "Tripped".to_string(),
                    operator: "==".to_string(),
                    value: "1".to_string(),
                    params: vec![Param::Since { since: "30".to_string() }],
                }),
                Condition::Time(TimeCondition {
                    time_type: "between".to_string(),
                    time: "22:00:00".to_string(),
                    days: "1,2,3".to_string(),
                    params: Vec::new(),
                }),
            ],
        );
        let mut group = ActionGroup::on("start");
        group.params = vec![Param::Delay {
            delay: "10".to_string(),
            unit: "s".to_string(),
        }];
        group.actions = vec![
            Action::Device(DeviceAction {
                action_type: Some("switch".to_string()),
                device: Some(DeviceSelection::Single(DeviceRef::device("5"))),
                service: "urn:upnp-org:serviceId:SwitchPower1".to_string(),
                action: "SetTarget".to_string(),
                arguments: vec![ActionArgument {
                    name: "newTargetValue".to_string(),
                    value: "1".to_string(),
                }],
            }),
            Action::Wait {
                delay: "5".to_string(),
                unit: "m".to_string(),
            },
            Action::Function {
                code: "luup.log(\"night\")".to_string(),
            },
        ];
        rule.action_groups = vec![group, ActionGroup::on("end")];
        rule
    }

    #[test]
    fn test_rule_shape_without_properties() {
        let block = RuleCodec::new().encode(&RuleDocument::new("Plain"));
        let inputs: Vec<_> = block.inputs.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(inputs, vec!["name", "description", "conditions", "actions"]);
        assert_eq!(block.field("id"), Some(""));
        assert!(block.mutation_or_default().inputs.is_empty());
    }

    #[test]
    fn test_rule_shape_with_properties() {
        let block = RuleCodec::new().encode(&night_rule());
        let inputs: Vec<_> = block.inputs.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            inputs,
            vec!["name", "description", "properties", "conditions", "actions"]
        );
        let conditions = block.child("conditions").unwrap();
        assert_eq!(conditions.field("operator"), Some("OR"));
        assert_eq!(conditions.mutation.as_ref().and_then(|m| m.items), Some(2));
    }

    #[test]
    fn test_shortcut_slots_are_not_encoded() {
        let block = RuleCodec::new().encode(&night_rule());
        let condition = block.child("conditions").and_then(|c| c.child("ADD0")).unwrap();
        assert!(condition.field("variable").is_none());
        assert!(condition.field("operator").is_none());

        let group = block.child("actions").unwrap();
        let action = group.statement_blocks("do")[0];
        assert!(action.field("action").is_none());
        assert_eq!(action.field("param_newTargetValue"), Some("1"));
    }

    #[test]
    fn test_document_round_trip() {
        let codec = RuleCodec::new();
        let rule = night_rule();
        let block = codec.encode(&rule);

        assert_eq!(codec.decode(&block).unwrap(), rule);
        codec.validate(&block).unwrap();
    }

    #[test]
    fn test_file_round_trip_keeps_newlines() {
        let codec = RuleCodec::new();
        let rules = vec![night_rule(), RuleDocument::new("Second")];
        let xml = codec.encode_file(&rules).unwrap();

        assert!(xml.contains(r"Arms the hall\nwhen everyone sleeps"));
        assert_eq!(codec.decode_file(&xml).unwrap(), rules);
    }

    #[test]
    fn test_decode_sparse_editor_output() {
        let xml = r#"<xml>
          <block type="rule">
            <field name="id"></field>
            <value name="name"><block type="text"><field name="TEXT">Hall</field></block></value>
            <value name="conditions">
              <block type="condition_value">
                <mutation condition_type="sensor_armed"></mutation>
                <value name="device"><block type="device"><field name="device_id">12</field></block></value>
              </block>
            </value>
          </block>
        </xml>"#;
        let rules = RuleCodec::new().decode_file(xml).unwrap();
        let rule = &rules[0];

        assert_eq!(rule.name, "Hall");
        assert_eq!(rule.id, None);
        let Condition::Value(condition) = &rule.conditions.items[0] else {
            panic!("expected a value condition");
        };
        assert_eq!(condition.variable, "Armed");
        assert_eq!(condition.value, "1");
        assert_eq!(condition.device, Some(DeviceSelection::Single(DeviceRef::device("12"))));
    }

    #[test]
    fn test_lone_condition_stays_unwrapped() {
        let xml = r#"<xml>
          <block type="rule">
            <value name="name"><block type="text"><field name="TEXT">Porch</field></block></value>
            <value name="description"><block type="text_area"><field name="TEXT"></field></block></value>
            <value name="conditions">
              <block type="condition_rule">
                <field name="rule">3</field>
                <field name="status">1</field>
              </block>
            </value>
          </block>
        </xml>"#;
        let codec = RuleCodec::new();
        let mut tree = parse_blocks(xml).unwrap().remove(0);
        let rule = codec.decode(&tree).unwrap();
        assert!(rule.conditions.bare);
        assert_eq!(rule.conditions.items.len(), 1);

        let back = codec.encode(&rule);
        normalize(&mut tree).unwrap();
        assert_eq!(back.child("conditions").map(|c| c.block_type.as_str()), Some("condition_rule"));
        assert!(back.structurally_eq(&tree));
    }

    #[test]
    fn test_one_item_list_keeps_its_wrapper() {
        let codec = RuleCodec::new();
        let mut rule = RuleDocument::new("Listed");
        rule.conditions = ConditionList::new(
            LogicalOperator::Or,
            vec![Condition::Rule(RuleCondition::default())],
        );
        let block = codec.encode(&rule);

        assert_eq!(
            block.child("conditions").map(|c| c.block_type.as_str()),
            Some("list_with_operator_condition")
        );
        assert_eq!(codec.decode(&block).unwrap(), rule);
    }

    #[test]
    fn test_bare_or_list_keeps_its_operator() {
        let codec = RuleCodec::new();
        let mut rule = RuleDocument::new("Either");
        rule.conditions = ConditionList {
            operator: LogicalOperator::Or,
            items: vec![Condition::Rule(RuleCondition::default())],
            bare: true,
        };
        let block = codec.encode(&rule);

        assert_eq!(
            block.child("conditions").map(|c| c.block_type.as_str()),
            Some("list_with_operator_condition")
        );
        let decoded = codec.decode(&block).unwrap();
        assert_eq!(decoded.conditions.operator, LogicalOperator::Or);
        assert_eq!(decoded.conditions.items, rule.conditions.items);
        assert!(!decoded.conditions.bare);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\n")]
    fn test_blank_name_is_rejected(#[case] name: &str) {
        let codec = RuleCodec::new();
        let block = codec.encode(&RuleDocument::new(name));

        assert!(matches!(
            codec.decode(&block),
            Err(CodecError::InvalidValue { ref slot, .. }) if slot == "name"
        ));
        assert!(codec.validate(&block).is_err());
    }

    #[test]
    fn test_incompatible_child_is_rejected() {
        let codec = RuleCodec::new();
        let mut block = codec.encode(&RuleDocument::new("Broken"));
        block.set_input("conditions", InputKind::Value, Some(text(BlockKind::Text, "oops")));

        let err = codec.validate(&block).unwrap_err();
        assert!(matches!(
            err,
            CodecError::IncompatibleBlock { ref slot, .. } if slot == "conditions"
        ));
        assert!(codec.decode(&block).is_err());
    }

    #[test]
    fn test_invalid_rule_id_is_rejected() {
        let codec = RuleCodec::new();
        let mut block = codec.encode(&RuleDocument::new("Broken"));
        block.set_field("id", "seven");
        assert!(matches!(
            codec.decode(&block),
            Err(CodecError::InvalidValue { ref slot, .. }) if slot == "id"
        ));
    }

    #[test]
    fn test_action_group_rejects_condition_params() {
        let codec = RuleCodec::new();
        let mut rule = RuleDocument::new("Wrong params");
        let mut group = ActionGroup::on("start");
        group.params = vec![Param::Since { since: "5".to_string() }];
        rule.action_groups.push(group);

        assert!(codec.validate(&codec.encode(&rule)).is_err());
    }

    fn arb_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 <>&\"'\n]{0,12}"
    }

    fn arb_params(allowed: &'static [u8]) -> impl Strategy<Value = Vec<Param>> {
        prop::collection::vec(
            (prop::sample::select(allowed), "[0-9]{1,3}", any::<bool>()).prop_map(
                |(tag, number, critical)| match tag {
                    0 => Param::Level { level: number },
                    1 => Param::Since { since: number },
                    2 => Param::Delay {
                        delay: number,
                        unit: "s".to_string(),
                    },
                    _ => Param::Critical { critical },
                },
            ),
            0..3,
        )
    }

    fn arb_device_ref() -> impl Strategy<Value = DeviceRef> {
        ("[0-9]{0,2}", "[a-z:]{0,8}", "[0-9;]{0,3}", "[0-9]{0,3}").prop_map(
            |(device_room, device_type, device_category, device_id)| DeviceRef {
                device_room,
                device_type,
                device_category,
                device_id,
            },
        )
    }

    fn arb_devices() -> impl Strategy<Value = Option<DeviceSelection>> {
        prop::option::of(prop_oneof![
            arb_device_ref().prop_map(DeviceSelection::Single),
            prop::collection::vec(arb_device_ref(), 0..3).prop_map(DeviceSelection::List),
        ])
    }

    fn arb_leaf_condition() -> impl Strategy<Value = Condition> {
        prop_oneof![
            (
                arb_devices(),
                arb_text(),
                arb_text(),
                "(==|>|<)?",
                arb_text(),
                arb_params(&[0, 1]),
            )
                .prop_map(|(device, service, variable, operator, value, params)| {
                    Condition::Value(ValueCondition {
                        condition_type: None,
                        device,
                        service,
                        variable,
                        operator,
                        value,
                        params,
                    })
                }),
            ("[a-z]{0,6}", "[0-9:]{0,8}", arb_params(&[0, 1])).prop_map(
                |(time_type, time, params)| {
                    Condition::Time(TimeCondition {
                        time_type,
                        time,
                        days: String::new(),
                        params,
                    })
                }
            ),
            ("[0-9]{1,2}", "[01]", arb_params(&[1])).prop_map(|(rule, status, params)| {
                Condition::Rule(RuleCondition { rule, status, params })
            }),
        ]
    }

    fn arb_condition_list(
        items: impl Strategy<Value = Condition>,
    ) -> impl Strategy<Value = ConditionList> {
        (any::<bool>(), prop::collection::vec(items, 0..3)).prop_map(|(or, items)| {
            // An empty list carries no operator slot
            let operator = if or && !items.is_empty() {
                LogicalOperator::Or
            } else {
                LogicalOperator::And
            };
            ConditionList::new(operator, items)
        })
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            ("[0-9]{1,3}", "[sm]").prop_map(|(delay, unit)| Action::Wait { delay, unit }),
            arb_text().prop_map(|code| Action::Function { code }),
            (
                arb_devices(),
                "[a-z:]{0,10}",
                "[A-Za-z]{0,8}",
                prop::collection::btree_map("[A-Za-z]{1,6}", "[0-9]{0,2}", 0..3),
            )
                .prop_map(|(device, service, action, arguments)| {
                    Action::Device(DeviceAction {
                        action_type: None,
                        device,
                        service,
                        action,
                        arguments: arguments
                            .into_iter()
                            .map(|(name, value)| ActionArgument { name, value })
                            .collect(),
                    })
                }),
        ]
    }

    fn arb_rule() -> impl Strategy<Value = RuleDocument> {
        let condition = arb_leaf_condition().prop_recursive(2, 8, 3, |inner| {
            arb_condition_list(inner).prop_map(Condition::List)
        });
        (
            prop::option::of(0u32..500),
            "[a-zA-Z0-9][a-zA-Z0-9 <>&\"'\n]{0,11}",
            arb_text(),
            prop::collection::vec(
                prop_oneof![
                    "[0-9]{1,3}".prop_map(|delay| Property::AutoUntrip { delay }),
                    any::<bool>().prop_map(|enabled| Property::Acknowledgeable { enabled }),
                    "[0-9]{0,3}".prop_map(|device_id| Property::AlarmPanel { device_id }),
                ],
                0..3,
            ),
            (arb_condition_list(condition), any::<bool>()),
            prop::collection::vec(
                (
                    "[a-z]{1,8}",
                    arb_params(&[0, 2, 3]),
                    prop::collection::vec(arb_action(), 0..3),
                ),
                0..3,
            ),
        )
            .prop_map(
                |(id, name, description, properties, (mut conditions, bare), groups)| {
                    conditions.bare = bare;
                    if conditions.bare_condition().is_none() {
                        conditions.bare = false;
                    }
                    RuleDocument {
                        id,
                        name,
                        description,
                        properties,
                        conditions,
                        action_groups: groups
                            .into_iter()
                            .map(|(event, params, actions)| ActionGroup {
                                event,
                                params,
                                actions,
                            })
                            .collect(),
                    }
                },
            )
    }

    /// What the editor writes: no empty slots, no fixed slot order, and a
    /// lone rule condition plugged in without its list
    fn editor_shaped(block: &Block) -> Block {
        let mut block = block.clone();
        block.fields.retain(|f| !f.value.is_empty());
        block.fields.reverse();
        block.inputs.retain(|i| i.block.is_some());
        block.inputs.reverse();
        for input in &mut block.inputs {
            if let Some(child) = input.block.as_deref_mut() {
                *child = editor_shaped(child);
            }
        }
        if let Some(next) = block.next.as_deref_mut() {
            *next = editor_shaped(next);
        }

        let lone = block
            .child("conditions")
            .filter(|list| list.kind().ok() == Some(BlockKind::ConditionList))
            .and_then(|list| match list_items(list).as_slice() {
                [only] => Some((*only).clone()),
                _ => None,
            });
        if lone.is_some() {
            block.set_input("conditions", InputKind::Value, lone);
        }
        block
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(rule in arb_rule()) {
            let codec = RuleCodec::new();
            let block = codec.encode(&rule);
            let decoded = codec.decode(&block).unwrap();
            prop_assert_eq!(&decoded, &rule);

            let reencoded = codec.encode(&decoded);
            prop_assert!(reencoded.structurally_eq(&block));
        }

        #[test]
        fn prop_xml_round_trip(rule in arb_rule()) {
            let codec = RuleCodec::new();
            let block = codec.encode(&rule);
            let xml = write_blocks(&[block.clone()]).unwrap();
            let mut parsed = parse_blocks(&xml).unwrap();
            prop_assert_eq!(parsed.len(), 1);

            normalize(&mut parsed[0]).unwrap();
            let mut canonical = block;
            normalize(&mut canonical).unwrap();
            prop_assert!(parsed[0].structurally_eq(&canonical));
            prop_assert_eq!(codec.decode(&parsed[0]).unwrap(), rule);
        }

        #[test]
        fn prop_encode_inverts_decode_on_editor_trees(rule in arb_rule()) {
            let codec = RuleCodec::new();
            let tree = editor_shaped(&codec.encode(&rule));
            let mut canonical = tree.clone();
            normalize(&mut canonical).unwrap();

            let back = codec.encode(&codec.decode(&tree).unwrap());
            prop_assert!(back.structurally_eq(&canonical));
        }
    }
}
