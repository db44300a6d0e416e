use crate::block::{Block, Position};
use crate::repo::{BlockSeed, Repo};
use crate::ui_state::UiState;
use std::collections::HashMap;

pub(crate) struct Outline {
    pub(crate) root: Block,
    blocks: HashMap<String, Block>,
}

impl Outline {
    pub(crate) fn get(&self, content: &str) -> &Block {
        self.blocks
            .get(content)
            .unwrap_or_else(|| panic!("no block with content {content:?}"))
    }
}

/// Builds a tree under a `"root"` block from `(content, depth)` rows; depth 0
/// rows are children of the root.
pub(crate) fn build_outline(repo: &Repo, rows: &[(&str, usize)]) -> Outline {
    let root = repo.create_root("root").expect("root");
    let mut stack: Vec<Block> = vec![root.clone()];
    let mut blocks = HashMap::new();
    for (content, depth) in rows {
        stack.truncate(depth + 1);
        let parent = stack.last().expect("parent for depth").clone();
        let block = parent
            .create_child(BlockSeed::new(*content), Position::Last)
            .expect("child");
        blocks.insert(content.to_string(), block.clone());
        stack.push(block);
    }
    Outline { root, blocks }
}

pub(crate) fn contents(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .map(|block| block.content().expect("content"))
        .collect()
}

pub(crate) fn ui_state(repo: &Repo) -> UiState {
    UiState::new(repo.create_root("ui-state").expect("ui-state"))
}
