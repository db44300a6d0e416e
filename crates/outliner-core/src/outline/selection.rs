//! Block range selection.

use super::traversal::visible_blocks;
use crate::block::Block;
use crate::error::{Error, Result};
use crate::properties::{self, SelectionState};
use crate::repo::Repo;
use crate::store::{BlockId, ChangeScope};
use crate::ui_state::UiState;
use std::collections::HashSet;
use tracing::warn;

pub fn all_visible_block_ids_in_order(top_level: &Block) -> Result<Vec<BlockId>> {
    Ok(visible_blocks(top_level)?
        .iter()
        .map(|block| block.id().clone())
        .collect())
}

/// Validated inclusive range between `start` and `end` in `ordered`, in
/// either direction. When an endpoint is not in `ordered` only the present
/// endpoint is returned.
pub fn blocks_in_range(
    repo: &Repo,
    start: &BlockId,
    end: &BlockId,
    ordered: &[BlockId],
) -> Vec<BlockId> {
    let start_ix = ordered.iter().position(|id| id == start);
    let end_ix = ordered.iter().position(|id| id == end);
    let range = match (start_ix, end_ix) {
        (Some(a), Some(b)) => ordered[a.min(b)..=a.max(b)].to_vec(),
        (Some(ix), None) | (None, Some(ix)) => {
            warn!(start = %start, end = %end, "selection endpoint not visible");
            vec![ordered[ix].clone()]
        }
        (None, None) => {
            warn!(start = %start, end = %end, "selection endpoints not visible");
            Vec::new()
        }
    };
    validate_selection_hierarchy(repo, &range)
}

/// Drops ancestor/descendant pairs from `ids`.
///
/// Candidates are processed in order: a candidate below an accepted id is
/// dropped, and accepted ids below a candidate are replaced by it.
pub fn validate_selection_hierarchy(repo: &Repo, ids: &[BlockId]) -> Vec<BlockId> {
    let mut accepted: Vec<BlockId> = Vec::with_capacity(ids.len());
    for candidate in ids {
        if !repo.exists(candidate) {
            warn!(block = %candidate, "dropping missing block from selection");
            continue;
        }
        if accepted.contains(candidate) {
            continue;
        }
        if accepted
            .iter()
            .any(|ancestor| descends_from(repo, candidate, ancestor))
        {
            continue;
        }
        accepted.retain(|id| !descends_from(repo, id, candidate));
        accepted.push(candidate.clone());
    }
    accepted
}

fn descends_from(repo: &Repo, id: &BlockId, ancestor: &BlockId) -> bool {
    let mut seen = HashSet::from([id.clone()]);
    let mut current = id.clone();
    loop {
        let parent = match repo.read(&current, |doc| doc.parent_id.clone()) {
            Ok(parent) => parent,
            Err(err) => {
                warn!(block = %current, error = %err, "broken ancestor chain");
                return false;
            }
        };
        let Some(parent) = parent else {
            return false;
        };
        if &parent == ancestor {
            return true;
        }
        if !seen.insert(parent.clone()) {
            return false;
        }
        current = parent;
    }
}

/// Moves the far end of the block selection to `target`, keeping the anchor.
pub fn extend_selection(ui: &UiState, target: &BlockId) -> Result<SelectionState> {
    let repo = ui.repo()?;
    let target_block = repo.find(target)?;
    let current = ui.selection()?;
    let anchor = match current.anchor_block_id {
        Some(anchor) => anchor,
        None => ui.focused_block_id()?.unwrap_or_else(|| target.clone()),
    };

    let top_level = match ui.top_level_block_id()? {
        Some(id) => repo.find(&id)?,
        None => target_block
            .parents()?
            .into_iter()
            .next()
            .unwrap_or(target_block),
    };
    let ordered = all_visible_block_ids_in_order(&top_level)?;
    let state = SelectionState {
        anchor_block_id: Some(anchor.clone()),
        selected_block_ids: blocks_in_range(&repo, &anchor, target, &ordered),
    };

    repo.batch(&ChangeScope::UI_STATE, || {
        ui.set_selection(state.clone())?;
        ui.block()
            .set_property(&properties::focused_block_id(), Some(target.clone()))
    })?;
    Ok(state)
}

/// Selects exactly `block`, making it the anchor of later extensions.
pub fn select_block(ui: &UiState, block: &Block) -> Result<SelectionState> {
    if !block.exists() {
        return Err(Error::BlockNotFound(block.id().clone()));
    }
    let state = SelectionState {
        anchor_block_id: Some(block.id().clone()),
        selected_block_ids: vec![block.id().clone()],
    };
    ui.repo()?.batch(&ChangeScope::UI_STATE, || {
        ui.set_selection(state.clone())?;
        ui.block()
            .set_property(&properties::focused_block_id(), Some(block.id().clone()))
    })?;
    Ok(state)
}
