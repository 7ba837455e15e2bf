//! Editor block tree
//!
//! The visual editor hands us a tree of typed nodes. Each node has a type
//! tag, named fields holding literal values, named inputs holding child
//! blocks, an optional `next` block for statement chains, and optional
//! mutation metadata that determines which optional inputs exist.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{BlockKind, CoreError};

/// Workspace coordinates of a top-level block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

/// Mutation metadata carried by dynamically shaped blocks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    /// Shortcut that fixes some inputs of a value condition
    pub condition_type: Option<String>,
    /// Shortcut that fixes some inputs of a device action
    pub action_type: Option<String>,
    /// Item count of list blocks
    pub items: Option<usize>,
    /// Optional inputs explicitly added to the block
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Attributes this version does not interpret, kept verbatim
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Mutation {
    pub fn with_items(count: usize) -> Self {
        Self {
            items: Some(count),
            ..Self::default()
        }
    }

    pub fn with_condition_type(condition_type: impl Into<String>) -> Self {
        Self {
            condition_type: Some(condition_type.into()),
            ..Self::default()
        }
    }

    pub fn with_action_type(action_type: impl Into<String>) -> Self {
        Self {
            action_type: Some(action_type.into()),
            ..Self::default()
        }
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|i| i == name)
    }

    pub fn is_empty(&self) -> bool {
        self.condition_type.is_none()
            && self.action_type.is_none()
            && self.items.is_none()
            && self.inputs.is_empty()
            && self.extra.is_empty()
    }

    /// Build a mutation from raw XML attributes
    ///
    /// An `items` attribute that is not a number is kept in `extra` so the
    /// list resynthesizes to zero items instead of failing.
    pub fn from_attributes<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut mutation = Mutation::default();
        for (key, value) in attributes {
            let key = key.into();
            let value = value.into();
            match key.as_str() {
                "condition_type" if !value.is_empty() => mutation.condition_type = Some(value),
                "action_type" if !value.is_empty() => mutation.action_type = Some(value),
                "items" => match value.trim().parse::<usize>() {
                    Ok(count) => mutation.items = Some(count),
                    Err(_) => {
                        mutation.extra.insert(key, value);
                    }
                },
                "inputs" => {
                    mutation.inputs = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                }
                _ => {
                    mutation.extra.insert(key, value);
                }
            }
        }
        mutation
    }

    /// Attributes in canonical order
    pub fn to_attributes(&self) -> Vec<(String, String)> {
        let mut attributes = Vec::new();
        if let Some(condition_type) = &self.condition_type {
            attributes.push(("condition_type".to_string(), condition_type.clone()));
        }
        if let Some(action_type) = &self.action_type {
            attributes.push(("action_type".to_string(), action_type.clone()));
        }
        if let Some(items) = self.items {
            attributes.push(("items".to_string(), items.to_string()));
        }
        if !self.inputs.is_empty() {
            attributes.push(("inputs".to_string(), self.inputs.join(",")));
        }
        for (key, value) in &self.extra {
            attributes.push((key.clone(), value.clone()));
        }
        attributes
    }
}

/// A named literal value of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Value,
    Statement,
}

/// A named input slot, possibly empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    pub kind: InputKind,
    pub block: Option<Box<Block>>,
}

/// One node of the editor tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub block_type: String,
    /// Editor-assigned id, irrelevant to the rule's meaning
    pub id: Option<String>,
    pub position: Option<Position>,
    pub mutation: Option<Mutation>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub inputs: Vec<Input>,
    pub next: Option<Box<Block>>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self::of_type(kind.type_name())
    }

    pub fn of_type(block_type: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            id: None,
            position: None,
            mutation: None,
            fields: Vec::new(),
            inputs: Vec::new(),
            next: None,
        }
    }

    pub fn kind(&self) -> Result<BlockKind, CoreError> {
        BlockKind::from_type_name(&self.block_type)
            .ok_or_else(|| CoreError::UnknownBlockType(self.block_type.clone()))
    }

    pub fn with_mutation(mut self, mutation: Mutation) -> Self {
        self.mutation = Some(mutation);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(name, value);
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, block: Block) -> Self {
        self.set_input(name, InputKind::Value, Some(block));
        self
    }

    pub fn with_statement(mut self, name: impl Into<String>, block: Option<Block>) -> Self {
        self.set_input(name, InputKind::Statement, block);
        self
    }

    pub fn mutation_or_default(&self) -> Mutation {
        self.mutation.clone().unwrap_or_default()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(Field { name, value }),
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<String> {
        let position = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(position).value)
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// The block connected to an input, if any
    pub fn child(&self, name: &str) -> Option<&Block> {
        self.input(name).and_then(|i| i.block.as_deref())
    }

    pub fn set_input(&mut self, name: impl Into<String>, kind: InputKind, block: Option<Block>) {
        let name = name.into();
        let block = block.map(Box::new);
        match self.inputs.iter_mut().find(|i| i.name == name) {
            Some(input) => {
                input.kind = kind;
                input.block = block;
            }
            None => self.inputs.push(Input { name, kind, block }),
        }
    }

    pub fn remove_input(&mut self, name: &str) -> Option<Input> {
        let position = self.inputs.iter().position(|i| i.name == name)?;
        Some(self.inputs.remove(position))
    }

    /// This block followed by every block linked through `next`
    pub fn chain(&self) -> Vec<&Block> {
        let mut blocks = vec![self];
        let mut current = self.next.as_deref();
        while let Some(block) = current {
            blocks.push(block);
            current = block.next.as_deref();
        }
        blocks
    }

    /// Blocks of a statement input, in order
    pub fn statement_blocks(&self, name: &str) -> Vec<&Block> {
        self.child(name).map(Block::chain).unwrap_or_default()
    }

    /// Link blocks into a statement chain, returning its head
    pub fn link_chain(blocks: Vec<Block>) -> Option<Block> {
        blocks.into_iter().rev().fold(None, |next, mut block| {
            block.next = next.map(Box::new);
            Some(block)
        })
    }

    /// Copy of this tree without editor ids and positions
    pub fn without_presentation(&self) -> Block {
        Block {
            block_type: self.block_type.clone(),
            id: None,
            position: None,
            mutation: self.mutation.clone(),
            fields: self.fields.clone(),
            inputs: self
                .inputs
                .iter()
                .map(|input| Input {
                    name: input.name.clone(),
                    kind: input.kind,
                    block: input
                        .block
                        .as_ref()
                        .map(|b| Box::new(b.without_presentation())),
                })
                .collect(),
            next: self.next.as_ref().map(|b| Box::new(b.without_presentation())),
        }
    }

    /// Equality ignoring editor ids and positions
    pub fn structurally_eq(&self, other: &Block) -> bool {
        self.without_presentation() == other.without_presentation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_attribute_order_is_canonical() {
        let mutation = Mutation::from_attributes([
            ("inputs", "params, properties"),
            ("zeta", "1"),
            ("items", "3"),
            ("condition_type", "sensor_armed"),
        ]);

        assert_eq!(mutation.items, Some(3));
        assert_eq!(mutation.inputs, vec!["params", "properties"]);
        let keys: Vec<_> = mutation.to_attributes().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["condition_type", "items", "inputs", "zeta"]);
    }

    #[test]
    fn test_unparseable_items_is_preserved() {
        let mutation = Mutation::from_attributes([("items", "many")]);
        assert_eq!(mutation.items, None);
        assert_eq!(mutation.extra.get("items").map(String::as_str), Some("many"));
    }

    #[test]
    fn test_link_chain_and_back() {
        let head = Block::link_chain(vec![
            Block::of_type("action_wait"),
            Block::of_type("action_function"),
            Block::of_type("action_device"),
        ])
        .unwrap();

        let types: Vec<_> = head.chain().iter().map(|b| b.block_type.as_str()).collect();
        assert_eq!(types, vec!["action_wait", "action_function", "action_device"]);
        assert!(Block::link_chain(Vec::new()).is_none());
    }

    #[test]
    fn test_structural_equality_ignores_ids() {
        let mut a = Block::of_type("text").with_field("TEXT", "hello");
        a.id = Some("abc".to_string());
        a.position = Some(Position { x: 10, y: 20 });
        let b = Block::of_type("text").with_field("TEXT", "hello");

        assert!(a.structurally_eq(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_set_field_replaces_in_place() {
        let mut block = Block::of_type("device")
            .with_field("device_room", "1")
            .with_field("device_id", "");
        block.set_field("device_room", "2");

        assert_eq!(block.fields.len(), 2);
        assert_eq!(block.fields[0].value, "2");
        assert_eq!(block.remove_field("device_id").as_deref(), Some(""));
        assert!(block.field("device_id").is_none());
    }
}
