//! Canonical block shapes
//!
//! Brings a parsed tree in line with [`canonical_slots`]: list blocks get
//! exactly one `ADDn` slot per declared item, missing slots are created
//! empty and every slot is moved to its canonical position. A slot the
//! shape does not allow is an error; nothing else is repaired.

use rules_hub_core::schema::{canonical_slots, complete_slots, fixed_fields, item_slot_index};
use rules_hub_core::{Block, BlockKind, InputKind, LogicalOperator, SlotKind};

use crate::CodecError;

/// Normalize `block`, its children and its statement chain
pub fn normalize(block: &mut Block) -> Result<(), CodecError> {
    let kind = block.kind()?;
    if kind.list_kind().is_some() {
        resynthesize_items(kind, block)?;
    }
    drop_pinned_fields(kind, block);

    let mutation = block.mutation_or_default();
    let specs = canonical_slots(kind, &mutation);

    for field in &block.fields {
        if !specs
            .iter()
            .any(|s| s.kind == SlotKind::Field && s.name == field.name)
        {
            return Err(unexpected_slot(block, &field.name));
        }
    }
    for input in &block.inputs {
        let expected = match input.kind {
            InputKind::Value => SlotKind::Value,
            InputKind::Statement => SlotKind::Statement,
        };
        if !specs.iter().any(|s| s.kind == expected && s.name == input.name) {
            return Err(unexpected_slot(block, &input.name));
        }
    }

    if kind == BlockKind::ConditionList
        && block.field("operator").is_none()
        && specs.iter().any(|s| s.name == "operator")
    {
        block.set_field("operator", LogicalOperator::default().as_str());
    }
    complete_slots(block, &specs);

    for input in &mut block.inputs {
        if let Some(child) = input.block.as_deref_mut() {
            normalize(child)?;
        }
    }
    if let Some(next) = block.next.as_deref_mut() {
        normalize(next)?;
    }
    Ok(())
}

/// Match a list block's `ADDn` slots to its item count
///
/// A declared count wins: empty slots past it are dropped and the missing
/// ones are created later with the rest of the shape. A connected item
/// past the declared count is an error. Without a declared count, the
/// populated slots define it.
fn resynthesize_items(kind: BlockKind, block: &mut Block) -> Result<(), CodecError> {
    let declared = block.mutation.as_ref().and_then(|m| m.items);
    let count = match declared {
        Some(count) => count,
        None => block
            .inputs
            .iter()
            .filter_map(|input| item_slot_index(&input.name))
            .max()
            .map_or(0, |index| index + 1),
    };

    if let Some(orphan) = block.inputs.iter().find(|input| {
        input.block.is_some()
            && item_slot_index(&input.name).is_some_and(|index| index >= count)
    }) {
        return Err(unexpected_slot(block, &orphan.name));
    }
    let before = block.inputs.len();
    block
        .inputs
        .retain(|input| item_slot_index(&input.name).map_or(true, |index| index < count));

    if declared != Some(count) || block.inputs.len() != before {
        tracing::debug!(
            "Resynthesized {} items of {} (declared {:?})",
            count,
            kind.type_name(),
            declared
        );
        block.mutation.get_or_insert_with(Default::default).items = Some(count);
    }
    if count == 0 && kind == BlockKind::ConditionList {
        block.remove_field("operator");
    }
    Ok(())
}

/// Drop fields a shortcut pins, as long as they hold the pinned value
fn drop_pinned_fields(kind: BlockKind, block: &mut Block) {
    for (name, value) in fixed_fields(kind, &block.mutation_or_default()) {
        if block.field(name) == Some(value) {
            block.remove_field(name);
        }
    }
}

fn unexpected_slot(block: &Block, slot: &str) -> CodecError {
    CodecError::UnexpectedSlot {
        block_type: block.block_type.clone(),
        slot: slot.to_string(),
    }
}
