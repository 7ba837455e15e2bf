//! Positional rule files
//!
//! A rule file is the ordered list of top-level rule blocks. Position
//! `idx` is 1-based and must line up with the order the runtime reports.

use rules_hub_codec::{parse_blocks, write_blocks, RuleCodec};
use rules_hub_core::{Block, RuleDocument};

use crate::SyncError;

#[derive(Debug, Clone, PartialEq)]
pub struct RuleFile {
    pub file_name: String,
    pub blocks: Vec<Block>,
}

impl RuleFile {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            blocks: Vec::new(),
        }
    }

    /// Parse file text; field escapes are decoded by the reader
    pub fn parse(file_name: impl Into<String>, text: &str) -> Result<Self, SyncError> {
        Ok(Self {
            file_name: file_name.into(),
            blocks: parse_blocks(text)?,
        })
    }

    pub fn serialize(&self) -> Result<String, SyncError> {
        Ok(write_blocks(&self.blocks)?)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Block> {
        idx.checked_sub(1).and_then(|i| self.blocks.get(i))
    }

    /// Replace the rule at `idx`, or append when `idx` is `None`
    ///
    /// Returns the position the rule ended up at.
    pub fn put(&mut self, idx: Option<usize>, block: Block) -> Result<usize, SyncError> {
        match idx {
            None => {
                self.blocks.push(block);
                Ok(self.blocks.len())
            }
            Some(idx) => {
                let position = self.position(idx)?;
                self.blocks[position] = block;
                Ok(idx)
            }
        }
    }

    pub fn remove(&mut self, idx: usize) -> Result<Block, SyncError> {
        let position = self.position(idx)?;
        Ok(self.blocks.remove(position))
    }

    /// Decode every rule with its position
    pub fn documents(&self, codec: &RuleCodec) -> Result<Vec<(usize, RuleDocument)>, SyncError> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, block)| Ok((i + 1, codec.decode(block)?)))
            .collect()
    }

    fn position(&self, idx: usize) -> Result<usize, SyncError> {
        if idx == 0 || idx > self.blocks.len() {
            return Err(SyncError::InvalidIndex {
                idx,
                count: self.blocks.len(),
            });
        }
        Ok(idx - 1)
    }
}

/// Runtime id written in a rule block, if any
pub fn rule_id(block: &Block) -> Option<u32> {
    block.field("id").and_then(|id| id.trim().parse().ok())
}

/// Rule name as typed in the block's name input
pub fn rule_name(block: &Block) -> &str {
    block
        .child("name")
        .and_then(|name| name.field("TEXT"))
        .unwrap_or_default()
}
