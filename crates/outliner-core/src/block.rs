//! Block entity: an identity-stable handle onto one block document.
//!
//! All mutation helpers go through [`Block::change`] (or a [`Repo::batch`]
//! of them) so each logical edit is a single undoable unit.

use crate::error::{Error, Result};
use crate::properties::{self, BlockProperty, PropertyDescriptor, PropertyValue};
use crate::repo::{BlockSeed, ListenerId, Repo, RepoInner};
use crate::store::{BlockData, BlockId, ChangeScope, StoreEvent};
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use tracing::warn;

/// Where a block is placed among its new siblings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Position {
    First,
    #[default]
    Last,
    Index(usize),
}

impl Position {
    pub fn resolve(&self, len: usize) -> usize {
        match self {
            Position::First => 0,
            Position::Last => len,
            Position::Index(ix) => (*ix).min(len),
        }
    }
}

#[derive(Clone)]
pub struct Block {
    inner: Rc<BlockInner>,
}

struct BlockInner {
    id: BlockId,
    repo: Weak<RepoInner>,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Block").field(&self.inner.id).finish()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Block {}

impl Block {
    pub(crate) fn new(id: BlockId, repo: Weak<RepoInner>) -> Self {
        Self {
            inner: Rc::new(BlockInner { id, repo }),
        }
    }

    pub fn id(&self) -> &BlockId {
        &self.inner.id
    }

    /// True when both handles are the same cached instance.
    pub fn ptr_eq(a: &Block, b: &Block) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn repo(&self) -> Result<Repo> {
        RepoInner::upgrade(&self.inner.repo)
    }

    pub fn exists(&self) -> bool {
        self.repo().is_ok_and(|repo| repo.exists(self.id()))
    }

    fn read<R>(&self, f: impl FnOnce(&BlockData) -> R) -> Result<R> {
        self.repo()?.read(self.id(), f)
    }

    pub fn data(&self) -> Result<BlockData> {
        self.read(BlockData::clone)
    }

    pub fn content(&self) -> Result<String> {
        self.read(|doc| doc.content.clone())
    }

    pub fn child_ids(&self) -> Result<Vec<BlockId>> {
        self.read(|doc| doc.child_ids.clone())
    }

    pub fn parent_id(&self) -> Result<Option<BlockId>> {
        self.read(|doc| doc.parent_id.clone())
    }

    pub fn has_children(&self) -> Result<bool> {
        self.read(|doc| !doc.child_ids.is_empty())
    }

    pub fn change(&self, mutator: impl FnOnce(&mut BlockData)) -> Result<()> {
        self.change_scoped(&ChangeScope::DOCUMENT, mutator)
    }

    pub fn change_scoped(
        &self,
        scope: &ChangeScope,
        mutator: impl FnOnce(&mut BlockData),
    ) -> Result<()> {
        self.repo()?.change(self.id(), scope, mutator)
    }

    pub fn set_content(&self, content: impl Into<String>) -> Result<()> {
        let content = content.into();
        self.change(|doc| doc.content = content)
    }

    /// Subscribes to events for this block only.
    pub fn on_change(&self, listener: impl Fn(&StoreEvent) + 'static) -> Result<ListenerId> {
        let id = self.id().clone();
        Ok(self.repo()?.subscribe(move |event| {
            if event.id() == &id {
                listener(event);
            }
        }))
    }

    pub fn parent(&self) -> Result<Option<Block>> {
        let Some(parent_id) = self.parent_id()? else {
            return Ok(None);
        };
        Ok(Some(self.repo()?.find(&parent_id)?))
    }

    /// Ancestors ordered from the root down to the direct parent.
    pub fn parents(&self) -> Result<Vec<Block>> {
        let repo = self.repo()?;
        let mut chain = Vec::new();
        let mut seen = HashSet::from([self.id().clone()]);
        let mut current = self.parent_id()?;
        while let Some(id) = current {
            if !seen.insert(id.clone()) {
                warn!(block = %self.id(), "cycle in parent chain");
                break;
            }
            let parent = match repo.find(&id) {
                Ok(parent) => parent,
                Err(err) => {
                    warn!(block = %self.id(), error = %err, "broken parent link");
                    break;
                }
            };
            current = parent.parent_id()?;
            chain.push(parent);
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn children(&self) -> Result<Vec<Block>> {
        let repo = self.repo()?;
        self.child_ids()?
            .iter()
            .map(|id| repo.find(id))
            .collect()
    }

    /// Position of this block in its parent's `childIds`.
    pub fn index(&self) -> Result<usize> {
        let parent = self
            .parent()?
            .ok_or_else(|| Error::RootBlock(self.id().clone()))?;
        parent
            .child_ids()?
            .iter()
            .position(|id| id == self.id())
            .ok_or_else(|| Error::NotLinked {
                parent: parent.id().clone(),
                child: self.id().clone(),
            })
    }

    pub fn is_collapsed(&self) -> Result<bool> {
        self.get_property(&properties::collapsed())
    }

    /// Makes this block the last child of its preceding sibling. Returns
    /// `false` when there is no preceding sibling.
    pub fn indent(&self) -> Result<bool> {
        let repo = self.repo()?;
        let Some(parent) = self.parent()? else {
            return Ok(false);
        };
        let index = self.index()?;
        if index == 0 {
            return Ok(false);
        }
        let sibling_id = parent.child_ids()?[index - 1].clone();
        let sibling = repo.find(&sibling_id)?;

        repo.batch(&ChangeScope::DOCUMENT, || {
            parent.change(|doc| doc.child_ids.retain(|id| id != self.id()))?;
            sibling.change(|doc| doc.child_ids.push(self.id().clone()))?;
            self.change(|doc| doc.parent_id = Some(sibling_id.clone()))
        })?;
        Ok(true)
    }

    /// Makes this block the next sibling of its parent. Returns `false` at
    /// the root or when the parent has no parent.
    pub fn outdent(&self) -> Result<bool> {
        let repo = self.repo()?;
        let Some(parent) = self.parent()? else {
            return Ok(false);
        };
        let Some(grandparent) = parent.parent()? else {
            return Ok(false);
        };
        // both indexes must resolve before either side is touched
        self.index()?;
        parent.index()?;

        repo.batch(&ChangeScope::DOCUMENT, || {
            parent.change(|doc| doc.child_ids.retain(|id| id != self.id()))?;
            grandparent.change(|doc| {
                let at = doc
                    .child_ids
                    .iter()
                    .position(|id| id == parent.id())
                    .map_or(doc.child_ids.len(), |ix| ix + 1);
                doc.child_ids.insert(at, self.id().clone());
            })?;
            self.change(|doc| doc.parent_id = Some(grandparent.id().clone()))
        })?;
        Ok(true)
    }

    /// Moves this block `shift` places among its siblings, clamped to the
    /// sibling range. Negative shifts move it earlier.
    pub fn change_order(&self, shift: isize) -> Result<bool> {
        let Some(parent) = self.parent()? else {
            return Ok(false);
        };
        let index = self.index()?;
        let len = parent.child_ids()?.len();
        let target = (index as isize + shift).clamp(0, len as isize - 1) as usize;
        if target == index {
            return Ok(false);
        }
        parent.change(|doc| {
            let id = doc.child_ids.remove(index);
            doc.child_ids.insert(target, id);
        })?;
        Ok(true)
    }

    pub fn create_child(&self, seed: BlockSeed, position: Position) -> Result<Block> {
        let repo = self.repo()?;
        repo.batch(&ChangeScope::DOCUMENT, || {
            let child = repo.create(seed.with_parent(self.id().clone()))?;
            self.change(|doc| {
                let at = position.resolve(doc.child_ids.len());
                doc.child_ids.insert(at, child.id().clone());
            })?;
            Ok(child)
        })
    }

    pub fn create_sibling_above(&self, seed: BlockSeed) -> Result<Block> {
        let parent = self
            .parent()?
            .ok_or_else(|| Error::RootBlock(self.id().clone()))?;
        let index = self.index()?;
        parent.create_child(seed, Position::Index(index))
    }

    pub fn create_sibling_below(&self, seed: BlockSeed) -> Result<Block> {
        let parent = self
            .parent()?
            .ok_or_else(|| Error::RootBlock(self.id().clone()))?;
        let index = self.index()?;
        parent.create_child(seed, Position::Index(index + 1))
    }

    /// Unlinks this block from its parent. The document and its subtree stay
    /// in the store.
    pub fn delete(&self) -> Result<bool> {
        let repo = self.repo()?;
        let Some(parent_id) = self.parent_id()? else {
            return Ok(false);
        };
        let Ok(parent) = repo.find(&parent_id) else {
            return Ok(false);
        };
        if !parent.child_ids()?.contains(self.id()) {
            return Ok(false);
        }
        parent.change(|doc| doc.child_ids.retain(|id| id != self.id()))?;
        Ok(true)
    }

    /// Links already-created `blocks` as children of this block, in order,
    /// starting at `position`. Blocks linked elsewhere are moved. Fails with
    /// [`Error::CycleDetected`] when a block is this block or one of its
    /// ancestors.
    pub fn insert_children(&self, blocks: &[Block], position: Position) -> Result<()> {
        let repo = self.repo()?;
        for block in blocks {
            if block == self || self.is_descendant_of(block)? {
                return Err(Error::CycleDetected(block.id().clone()));
            }
        }
        let mut previous_parents = Vec::with_capacity(blocks.len());
        for block in blocks {
            let parent_id = repo.read(block.id(), |doc| doc.parent_id.clone())?;
            previous_parents.push(parent_id.filter(|id| repo.exists(id)));
        }
        let ids: Vec<BlockId> = blocks.iter().map(|block| block.id().clone()).collect();

        repo.batch(&ChangeScope::DOCUMENT, || {
            for (block, previous) in blocks.iter().zip(&previous_parents) {
                if let Some(previous) = previous {
                    if previous != self.id() {
                        repo.change(previous, &ChangeScope::DOCUMENT, |doc| {
                            doc.child_ids.retain(|id| id != block.id())
                        })?;
                    }
                }
                block.change(|doc| doc.parent_id = Some(self.id().clone()))?;
            }
            self.change(|doc| {
                doc.child_ids.retain(|id| !ids.contains(id));
                let at = position.resolve(doc.child_ids.len());
                let tail = doc.child_ids.split_off(at);
                doc.child_ids.extend(ids.iter().cloned());
                doc.child_ids.extend(tail);
            })
        })
    }

    /// Resolves a path of direct-child contents below this block, optionally
    /// creating missing segments.
    pub fn child_by_content(&self, path: &[&str], create_if_not_exists: bool) -> Result<Option<Block>> {
        let repo = self.repo()?;
        let mut current = self.clone();
        for segment in path {
            let mut found = None;
            for id in current.child_ids()? {
                let Ok(child) = repo.find(&id) else {
                    warn!(parent = %current.id(), child = %id, "skipping missing child");
                    continue;
                };
                if child.content()? == *segment {
                    found = Some(child);
                    break;
                }
            }
            current = match found {
                Some(child) => child,
                None if create_if_not_exists => {
                    current.create_child(BlockSeed::new(*segment), Position::Last)?
                }
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    pub fn property(&self, name: &str) -> Result<Option<BlockProperty>> {
        self.read(|doc| doc.properties.get(name).cloned())
    }

    pub fn get_property<T: PropertyValue + Clone>(
        &self,
        descriptor: &PropertyDescriptor<T>,
    ) -> Result<T> {
        let stored = self.property(descriptor.name)?;
        Ok(descriptor.read(stored.as_ref()))
    }

    pub fn set_property<T: PropertyValue>(
        &self,
        descriptor: &PropertyDescriptor<T>,
        value: T,
    ) -> Result<()> {
        self.set_raw_property(descriptor.record(&value)?)
    }

    pub fn set_raw_property(&self, property: BlockProperty) -> Result<()> {
        let scope = property.change_scope.clone().unwrap_or_default();
        self.change_scoped(&scope, |doc| {
            doc.properties.insert(property.name.clone(), property);
        })
    }

    pub fn is_descendant_of(&self, ancestor: &Block) -> Result<bool> {
        let repo = self.repo()?;
        let mut seen = HashSet::from([self.id().clone()]);
        let mut current = self.parent_id()?;
        while let Some(id) = current {
            if &id == ancestor.id() {
                return Ok(true);
            }
            if !seen.insert(id.clone()) {
                return Ok(false);
            }
            current = match repo.read(&id, |doc| doc.parent_id.clone()) {
                Ok(parent) => parent,
                Err(Error::BlockNotFound(_)) => return Ok(false),
                Err(err) => return Err(err),
            };
        }
        Ok(false)
    }
}
