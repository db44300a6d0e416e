//! JSON export/import of block subtrees: `{ "blocks": [BlockData, ...] }`.

use crate::block::{Block, Position};
use crate::error::Result;
use crate::repo::Repo;
use crate::store::{BlockData, BlockId, ChangeScope};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub blocks: Vec<BlockData>,
}

impl ExportDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Collects `root` and its descendants in pre-order.
pub fn export_subtree(root: &Block) -> Result<ExportDocument> {
    let repo = root.repo()?;
    let mut blocks = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root.id().clone()];
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        let data = match repo.snapshot(&id) {
            Ok(data) => data,
            Err(err) if &id != root.id() => {
                warn!(block = %id, error = %err, "skipping missing block in export");
                continue;
            }
            Err(err) => return Err(err),
        };
        stack.extend(data.child_ids.iter().rev().cloned());
        blocks.push(data);
    }
    Ok(ExportDocument { blocks })
}

/// Copies `doc` into `repo` under fresh ids.
///
/// `parentId`/`childIds` are rewritten through the old to new id map and
/// references to blocks outside the document are dropped. Blocks whose
/// parent is not part of the document are import roots; they are linked
/// as last children of `parent` when one is given. Returns the import
/// roots in document order.
pub fn import_blocks(repo: &Repo, doc: &ExportDocument, parent: Option<&Block>) -> Result<Vec<Block>> {
    let ids: HashMap<&BlockId, BlockId> = doc
        .blocks
        .iter()
        .map(|data| (&data.id, BlockId::generate()))
        .collect();
    let remap = |id: &BlockId| -> Option<BlockId> {
        let mapped = ids.get(id).cloned();
        if mapped.is_none() {
            warn!(block = %id, "dropping reference outside the imported document");
        }
        mapped
    };

    repo.batch(&ChangeScope::DOCUMENT, || {
        let mut roots = Vec::new();
        for data in &doc.blocks {
            let Some(new_id) = ids.get(&data.id).cloned() else {
                continue;
            };
            let mut copy = data.clone();
            copy.id = new_id;
            copy.child_ids = data.child_ids.iter().filter_map(&remap).collect();
            copy.parent_id = data.parent_id.as_ref().and_then(|id| ids.get(id).cloned());
            if copy.parent_id.is_none() {
                copy.parent_id = parent.map(|parent| parent.id().clone());
                let block = repo.insert(copy)?;
                roots.push(block);
            } else {
                repo.insert(copy)?;
            }
        }
        if let Some(parent) = parent {
            parent.insert_children(&roots, Position::Last)?;
        }
        debug!(blocks = doc.blocks.len(), roots = roots.len(), "imported blocks");
        Ok(roots)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{build_outline, contents};
    use crate::outline::visible_blocks;

    #[test]
    fn export_is_preorder() {
        let repo = Repo::new("tester");
        let outline = build_outline(&repo, &[("a", 0), ("a1", 1), ("b", 0)]);
        let doc = export_subtree(&outline.root).expect("export");
        let contents: Vec<&str> = doc.blocks.iter().map(|data| data.content.as_str()).collect();
        assert_eq!(contents, vec!["root", "a", "a1", "b"]);
    }

    #[test]
    fn json_uses_camel_case_fields() {
        let repo = Repo::new("tester");
        let outline = build_outline(&repo, &[("a", 0)]);
        let json = export_subtree(&outline.root)
            .expect("export")
            .to_json()
            .expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        let first = &value["blocks"][0];
        assert!(first["childIds"].is_array());
        assert!(first["createTime"].is_i64());
        assert!(first.get("parentId").is_none());
        assert_eq!(value["blocks"][1]["parentId"], first["id"]);
    }

    #[test]
    fn import_rewrites_ids_and_links() {
        let source = Repo::new("tester");
        let outline = build_outline(&source, &[("a", 0), ("a1", 1), ("b", 0)]);
        let doc = export_subtree(outline.get("a")).expect("export");

        let target = Repo::new("other");
        let host = build_outline(&target, &[("existing", 0)]);
        let roots = import_blocks(&target, &doc, Some(&host.root)).expect("import");

        assert_eq!(contents(&roots), vec!["a"]);
        assert_ne!(roots[0].id(), outline.get("a").id());
        assert_eq!(roots[0].parent_id().expect("parent"), Some(host.root.id().clone()));
        let order = visible_blocks(&host.root).expect("order");
        assert_eq!(contents(&order), vec!["root", "existing", "a", "a1"]);

        let a1 = roots[0].children().expect("children");
        assert_eq!(a1[0].parent_id().expect("parent"), Some(roots[0].id().clone()));
    }

    #[test]
    fn dangling_children_are_dropped() {
        let repo = Repo::new("tester");
        let mut lone = BlockData::new(BlockId::generate(), "tester", 1);
        lone.content = "lone".to_string();
        lone.child_ids.push(BlockId::generate());
        let doc = ExportDocument { blocks: vec![lone] };

        let roots = import_blocks(&repo, &doc, None).expect("import");
        assert_eq!(roots.len(), 1);
        assert!(roots[0].child_ids().expect("children").is_empty());
        assert!(roots[0].parent_id().expect("parent").is_none());
    }

    #[test]
    fn import_undoes_as_one_step() {
        let repo = Repo::new("tester");
        let host = build_outline(&repo, &[]);
        let source = Repo::new("tester");
        let outline = build_outline(&source, &[("a", 0), ("b", 0)]);
        let doc = export_subtree(&outline.root).expect("export");
        let roots = import_blocks(&repo, &doc, Some(&host.root)).expect("import");

        assert!(repo.undo(&ChangeScope::DOCUMENT).expect("undo"));
        assert!(host.root.child_ids().expect("children").is_empty());
        assert!(!repo.exists(roots[0].id()));
    }
}
