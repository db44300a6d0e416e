//! Structural edits driven by the editor: Enter, Backspace, Tab, paste.
//!
//! Reparenting itself lives on [`Block`]; the functions here pick the
//! operation for the current cursor and keep focus and selection in step.
//! Cursor offsets count characters, not bytes.

use super::markdown::parse_markdown_to_blocks;
use super::traversal::{next_visible_block, previous_visible_block, visible_blocks};
use crate::block::{Block, Position};
use crate::error::Result;
use crate::properties;
use crate::repo::BlockSeed;
use crate::store::{BlockId, ChangeScope};
use crate::ui_state::UiState;
use tracing::debug;

/// Result of splitting a block at the cursor.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitOutcome {
    /// Block that received focus.
    pub focus: Block,
    pub created: Block,
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(ix, _)| ix)
}

pub fn split_block_at_cursor(ui: &UiState, block: &Block, cursor: usize) -> Result<SplitOutcome> {
    let repo = block.repo()?;
    let content = block.content()?;
    let len = content.chars().count();

    let outcome = if cursor < len && block.parent_id()?.is_none() {
        let at = byte_offset(&content, cursor);
        let (head, tail) = content.split_at(at);
        let created = repo.batch(&ChangeScope::DOCUMENT, || {
            block.set_content(head)?;
            block.create_child(BlockSeed::new(tail), Position::First)
        })?;
        SplitOutcome {
            focus: created.clone(),
            created,
        }
    } else if cursor < len {
        let at = byte_offset(&content, cursor);
        let (head, tail) = content.split_at(at);
        let created = repo.batch(&ChangeScope::DOCUMENT, || {
            let created = block.create_sibling_above(BlockSeed::new(head))?;
            block.set_content(tail)?;
            Ok(created)
        })?;
        SplitOutcome {
            focus: block.clone(),
            created,
        }
    } else {
        let expanded_children = block.has_children()? && !block.is_collapsed()?;
        let created = if expanded_children || block.parent_id()?.is_none() {
            block.create_child(BlockSeed::default(), Position::First)?
        } else {
            block.create_sibling_below(BlockSeed::default())?
        };
        SplitOutcome {
            focus: created.clone(),
            created,
        }
    };

    debug!(block = %block.id(), cursor, "split block");
    ui.focus(&outcome.focus, Some(0))?;
    Ok(outcome)
}

/// Backspace in an empty block. Deletes it and focuses the previous
/// visible block at the end of its text. Returns the newly focused block,
/// or `None` when nothing was deleted.
pub fn delete_empty_block(
    ui: &UiState,
    block: &Block,
    top_level_id: &BlockId,
) -> Result<Option<Block>> {
    if !block.content()?.is_empty() || block.has_children()? {
        return Ok(None);
    }
    let Some(previous) = previous_visible_block(block, top_level_id)? else {
        return Ok(None);
    };
    if !block.delete()? {
        return Ok(None);
    }
    let end = previous.content()?.chars().count();
    ui.focus(&previous, Some(end))?;
    Ok(Some(previous))
}

/// Indents `block`, expanding its new parent so it stays visible.
pub fn indent_block(ui: &UiState, block: &Block) -> Result<bool> {
    if !block.indent()? {
        return Ok(false);
    }
    if let Some(parent) = block.parent()? {
        if parent.is_collapsed()? {
            parent.set_property(&properties::collapsed(), false)?;
        }
    }
    keep_focus(ui, block)?;
    Ok(true)
}

pub fn outdent_block(ui: &UiState, block: &Block) -> Result<bool> {
    if !block.outdent()? {
        return Ok(false);
    }
    keep_focus(ui, block)?;
    Ok(true)
}

fn keep_focus(ui: &UiState, block: &Block) -> Result<()> {
    let cursor = ui.cursor_offset(block.id())?;
    ui.focus(block, cursor)
}

fn selected_blocks(ui: &UiState) -> Result<Vec<Block>> {
    let repo = ui.repo()?;
    Ok(ui
        .selection()?
        .selected_block_ids
        .iter()
        .filter_map(|id| repo.find(id).ok())
        .collect())
}

/// Indents every selected block, first to last. Returns how many moved.
pub fn indent_selected_blocks(ui: &UiState) -> Result<usize> {
    let blocks = selected_blocks(ui)?;
    let repo = ui.repo()?;
    repo.batch(&ChangeScope::DOCUMENT, || {
        let mut moved = 0;
        for block in &blocks {
            if block.indent()? {
                moved += 1;
            }
        }
        Ok(moved)
    })
}

/// Outdents every selected block, last to first so siblings keep their
/// relative order.
pub fn outdent_selected_blocks(ui: &UiState) -> Result<usize> {
    let blocks = selected_blocks(ui)?;
    let repo = ui.repo()?;
    repo.batch(&ChangeScope::DOCUMENT, || {
        let mut moved = 0;
        for block in blocks.iter().rev() {
            if block.outdent()? {
                moved += 1;
            }
        }
        Ok(moved)
    })
}

/// Deletes the selected blocks, clears the selection and focuses the
/// nearest visible block that survives.
pub fn delete_selected_blocks(ui: &UiState, top_level_id: &BlockId) -> Result<usize> {
    let blocks = selected_blocks(ui)?;
    if blocks.is_empty() {
        return Ok(0);
    }
    let repo = ui.repo()?;
    let top_level = repo.find(top_level_id)?;
    let order = visible_blocks(&top_level)?;
    let doomed = |candidate: &Block| -> bool {
        blocks.iter().any(|block| {
            candidate == block || candidate.is_descendant_of(block).unwrap_or(false)
        })
    };
    let first = order.iter().position(|candidate| doomed(candidate));
    let successor = first.and_then(|first| {
        order[..first]
            .iter()
            .rev()
            .chain(order[first..].iter())
            .find(|candidate| !doomed(candidate) && *candidate != &top_level)
            .cloned()
    });

    let deleted = repo.batch(&ChangeScope::DOCUMENT, || {
        let mut deleted = 0;
        for block in &blocks {
            if block.delete()? {
                deleted += 1;
            }
        }
        Ok(deleted)
    })?;

    repo.batch(&ChangeScope::UI_STATE, || {
        ui.clear_selection()?;
        match &successor {
            Some(block) => ui.focus(block, None),
            None => ui.clear_focus(),
        }
    })?;
    Ok(deleted)
}

/// Moves `block` one place up or down among its siblings.
pub fn move_block(block: &Block, shift: isize) -> Result<bool> {
    block.change_order(shift)
}

pub fn toggle_collapsed(block: &Block) -> Result<bool> {
    let collapsed = !block.is_collapsed()?;
    block.set_property(&properties::collapsed(), collapsed)?;
    Ok(collapsed)
}

/// Focus target for arrow-key navigation.
pub fn navigate(ui: &UiState, block: &Block, top_level_id: &BlockId, down: bool) -> Result<Option<Block>> {
    let target = if down {
        next_visible_block(block, top_level_id)?
    } else {
        previous_visible_block(block, top_level_id)?
    };
    if let Some(target) = &target {
        ui.focus(target, None)?;
    }
    Ok(target)
}

/// Parses `text` as markdown and inserts the resulting blocks as siblings
/// right after `target`. A target without a parent receives them as its
/// last children. Returns the created top-level blocks.
pub fn paste_multiline_text(target: &Block, text: &str) -> Result<Vec<Block>> {
    let parsed = parse_markdown_to_blocks(text);
    if parsed.is_empty() {
        return Ok(Vec::new());
    }
    match target.parent()? {
        Some(parent) => {
            let index = target.index()?;
            parsed.create_under(&parent, Position::Index(index + 1))
        }
        None => parsed.create_under(target, Position::Last),
    }
}
