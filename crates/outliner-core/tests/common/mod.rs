#![allow(dead_code)]

use outliner_core::{Block, BlockSeed, Position, Repo, UiState};
use std::collections::HashMap;

pub struct Tree {
    pub root: Block,
    blocks: HashMap<String, Block>,
}

impl Tree {
    pub fn get(&self, content: &str) -> &Block {
        self.blocks
            .get(content)
            .unwrap_or_else(|| panic!("no block {content:?}"))
    }
}

/// `(content, depth)` rows under a fresh `"root"` block.
pub fn tree(repo: &Repo, rows: &[(&str, usize)]) -> Tree {
    let root = repo.create_root("root").expect("root");
    let mut stack = vec![root.clone()];
    let mut blocks = HashMap::new();
    for (content, depth) in rows {
        stack.truncate(depth + 1);
        let parent = stack.last().expect("parent").clone();
        let block = parent
            .create_child(BlockSeed::new(*content), Position::Last)
            .expect("child");
        blocks.insert(content.to_string(), block.clone());
        stack.push(block);
    }
    Tree { root, blocks }
}

pub fn texts(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .map(|block| block.content().expect("content"))
        .collect()
}

pub fn ui(repo: &Repo) -> UiState {
    UiState::new(repo.create_root("ui-state").expect("ui-state"))
}
