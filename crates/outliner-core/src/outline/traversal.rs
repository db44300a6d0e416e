use crate::block::Block;
use crate::error::Result;
use crate::store::BlockId;
use std::collections::HashSet;
use tracing::warn;

/// Blocks in display order below `top_level`, the block itself first.
///
/// Children of collapsed blocks are skipped, except for `top_level` whose
/// own collapsed state is ignored. Child ids whose document cannot be
/// resolved are skipped.
pub fn visible_blocks(top_level: &Block) -> Result<Vec<Block>> {
    let repo = top_level.repo()?;
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![top_level.clone()];
    while let Some(block) = stack.pop() {
        if !seen.insert(block.id().clone()) {
            warn!(block = %block.id(), "block reachable twice in visible order");
            continue;
        }
        let expanded = &block == top_level || !block.is_collapsed().unwrap_or(false);
        let child_ids = if expanded {
            block.child_ids().unwrap_or_else(|err| {
                warn!(block = %block.id(), error = %err, "could not read children");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        for id in child_ids.iter().rev() {
            match repo.find(id) {
                Ok(child) => stack.push(child),
                Err(err) => {
                    warn!(parent = %block.id(), child = %id, error = %err, "skipping missing child")
                }
            }
        }
        order.push(block);
    }
    Ok(order)
}

pub fn next_visible_block(block: &Block, top_level_id: &BlockId) -> Result<Option<Block>> {
    let order = visible_order(block, top_level_id)?;
    Ok(order
        .iter()
        .position(|candidate| candidate == block)
        .and_then(|ix| order.get(ix + 1).cloned()))
}

pub fn previous_visible_block(block: &Block, top_level_id: &BlockId) -> Result<Option<Block>> {
    let order = visible_order(block, top_level_id)?;
    Ok(order
        .iter()
        .position(|candidate| candidate == block)
        .and_then(|ix| ix.checked_sub(1))
        .and_then(|ix| order.get(ix).cloned()))
}

fn visible_order(block: &Block, top_level_id: &BlockId) -> Result<Vec<Block>> {
    let top_level = block.repo()?.find(top_level_id)?;
    visible_blocks(&top_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{build_outline, contents};
    use crate::properties;
    use crate::repo::Repo;

    const TREE: &[(&str, usize)] = &[
        ("a", 0),
        ("a1", 1),
        ("a1x", 2),
        ("a2", 1),
        ("b", 0),
        ("b1", 1),
        ("c", 0),
    ];

    #[test]
    fn expanded_tree_is_preorder() {
        let repo = Repo::new("tester");
        let outline = build_outline(&repo, TREE);
        let order = visible_blocks(&outline.root).expect("order");
        assert_eq!(
            contents(&order),
            vec!["root", "a", "a1", "a1x", "a2", "b", "b1", "c"]
        );
    }

    #[test]
    fn collapsing_hides_only_the_subtree() {
        let repo = Repo::new("tester");
        let outline = build_outline(&repo, TREE);
        outline
            .get("a")
            .set_property(&properties::collapsed(), true)
            .expect("collapse");
        let order = visible_blocks(&outline.root).expect("order");
        assert_eq!(contents(&order), vec!["root", "a", "b", "b1", "c"]);
    }

    #[test]
    fn collapsed_top_level_still_shows_children() {
        let repo = Repo::new("tester");
        let outline = build_outline(&repo, TREE);
        let a = outline.get("a");
        a.set_property(&properties::collapsed(), true)
            .expect("collapse");
        let order = visible_blocks(a).expect("order");
        assert_eq!(contents(&order), vec!["a", "a1", "a1x", "a2"]);
    }

    #[test]
    fn next_and_previous_are_inverse() {
        let repo = Repo::new("tester");
        let outline = build_outline(&repo, TREE);
        outline
            .get("a1")
            .set_property(&properties::collapsed(), true)
            .expect("collapse");
        let top = outline.root.id();
        let order = visible_blocks(&outline.root).expect("order");
        for pair in order.windows(2) {
            assert_eq!(
                next_visible_block(&pair[0], top).expect("next").as_ref(),
                Some(&pair[1])
            );
            assert_eq!(
                previous_visible_block(&pair[1], top).expect("previous").as_ref(),
                Some(&pair[0])
            );
        }
        assert!(next_visible_block(outline.get("c"), top)
            .expect("next")
            .is_none());
        assert!(previous_visible_block(&outline.root, top)
            .expect("previous")
            .is_none());
    }

    #[test]
    fn dangling_child_ids_are_skipped() {
        let repo = Repo::new("tester");
        let outline = build_outline(&repo, &[("a", 0), ("b", 0)]);
        let ghost = BlockId::generate();
        outline
            .root
            .change(|doc| doc.child_ids.insert(1, ghost.clone()))
            .expect("corrupt");
        let order = visible_blocks(&outline.root).expect("order");
        assert_eq!(contents(&order), vec!["root", "a", "b"]);
    }

    #[test]
    fn block_outside_the_order_has_no_neighbours() {
        let repo = Repo::new("tester");
        let outline = build_outline(&repo, TREE);
        let a = outline.get("a");
        assert!(next_visible_block(outline.get("c"), a.id())
            .expect("next")
            .is_none());
    }
}
