//! Repository facade over a [`DocumentStore`].
//!
//! Owns the identity cache of [`Block`] handles, the undo history and the
//! change subscribers. Cloning a `Repo` is cheap and shares all of it.

use crate::block::Block;
use crate::error::{Error, Result};
use crate::history::{History, UndoGroup};
use crate::properties::BlockProperty;
use crate::store::{
    BlockData, BlockId, ChangeRecord, ChangeScope, ChangedPath, DocumentStore, MemoryStore,
    StoreEvent,
};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

pub type Listener = Rc<dyn Fn(&StoreEvent)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Initial state for a new block document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockSeed {
    pub content: String,
    pub properties: Vec<BlockProperty>,
    pub parent_id: Option<BlockId>,
}

impl BlockSeed {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, property: BlockProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_parent(mut self, parent_id: BlockId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

#[derive(Clone)]
pub struct Repo {
    inner: Rc<RepoInner>,
}

pub(crate) struct RepoInner {
    store: RefCell<Box<dyn DocumentStore>>,
    cache: RefCell<HashMap<BlockId, Block>>,
    history: RefCell<History>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener_id: Cell<u64>,
    replaying: Cell<bool>,
    user_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Repo {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self::with_store(MemoryStore::new(), user_id)
    }

    pub fn with_store(store: impl DocumentStore + 'static, user_id: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RepoInner {
                store: RefCell::new(Box::new(store)),
                cache: RefCell::new(HashMap::new()),
                history: RefCell::new(History::default()),
                listeners: RefCell::new(Vec::new()),
                next_listener_id: Cell::new(1),
                replaying: Cell::new(false),
                user_id: user_id.into(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<RepoInner>) -> Self {
        Self { inner }
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn exists(&self, id: &BlockId) -> bool {
        self.inner.store.borrow().contains(id)
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.inner.store.borrow().ids()
    }

    /// Resolves `id` to its cached handle. The same id always yields the
    /// same handle until the document is removed from the store.
    pub fn find(&self, id: &BlockId) -> Result<Block> {
        if !self.exists(id) {
            return Err(Error::BlockNotFound(id.clone()));
        }
        let mut cache = self.inner.cache.borrow_mut();
        let block = cache
            .entry(id.clone())
            .or_insert_with(|| Block::new(id.clone(), Rc::downgrade(&self.inner)));
        Ok(block.clone())
    }

    pub fn find_str(&self, raw: &str) -> Result<Block> {
        self.find(&BlockId::parse(raw)?)
    }

    pub fn snapshot(&self, id: &BlockId) -> Result<BlockData> {
        self.read(id, BlockData::clone)
    }

    pub(crate) fn read<R>(&self, id: &BlockId, f: impl FnOnce(&BlockData) -> R) -> Result<R> {
        let store = self.inner.store.borrow();
        let doc = store
            .get(id)
            .ok_or_else(|| Error::BlockNotFound(id.clone()))?;
        Ok(f(doc))
    }

    /// Allocates a new document. Only the block's own `parentId` is set; the
    /// caller links it into the parent's `childIds`.
    pub fn create(&self, seed: BlockSeed) -> Result<Block> {
        let mut data = BlockData::new(BlockId::generate(), &self.inner.user_id, now_millis());
        data.content = seed.content;
        data.parent_id = seed.parent_id;
        for property in seed.properties {
            data.properties.insert(property.name.clone(), property);
        }
        self.insert(data)
    }

    /// Stores a complete document as-is. Fails with `DuplicateBlock` when
    /// the id is taken.
    pub fn insert(&self, data: BlockData) -> Result<Block> {
        let id = data.id.clone();
        self.inner.history.borrow_mut().begin(&ChangeScope::DOCUMENT);
        let inserted = self.inner.store.borrow_mut().insert(data.clone());
        if inserted.is_ok() && !self.inner.replaying.get() {
            self.inner
                .history
                .borrow_mut()
                .record(ChangeRecord::Created { data });
        }
        self.inner.history.borrow_mut().end();
        inserted?;

        debug!(block = %id, "created block");
        self.notify(StoreEvent::Created { id: id.clone() });
        self.find(&id)
    }

    pub fn create_root(&self, content: impl Into<String>) -> Result<Block> {
        self.create(BlockSeed::new(content))
    }

    /// Applies one atomic, undoable mutation to the document `id`.
    pub fn change(
        &self,
        id: &BlockId,
        scope: &ChangeScope,
        mutator: impl FnOnce(&mut BlockData),
    ) -> Result<()> {
        self.inner.history.borrow_mut().begin(scope);
        let result = self.apply_change(id, scope, mutator);
        self.inner.history.borrow_mut().end();
        result
    }

    fn apply_change(
        &self,
        id: &BlockId,
        scope: &ChangeScope,
        mutator: impl FnOnce(&mut BlockData),
    ) -> Result<()> {
        let mut mutator = Some(mutator);
        let mut apply = |doc: &mut BlockData| {
            if let Some(mutator) = mutator.take() {
                mutator(doc);
            }
        };
        let record = self.inner.store.borrow_mut().change(id, &mut apply)?;
        let Some(record) = record else {
            return Ok(());
        };
        let paths = record.paths();
        if !self.inner.replaying.get() {
            self.inner.history.borrow_mut().record(record);
        }
        self.notify(StoreEvent::Changed {
            id: id.clone(),
            paths,
            scope: scope.clone(),
        });
        Ok(())
    }

    /// Runs `f` with every change it makes grouped into one undo unit.
    pub fn batch<R>(&self, scope: &ChangeScope, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.inner.history.borrow_mut().begin(scope);
        let result = f();
        self.inner.history.borrow_mut().end();
        result
    }

    pub fn can_undo(&self, scope: &ChangeScope) -> bool {
        self.inner.history.borrow().can_undo(scope)
    }

    pub fn can_redo(&self, scope: &ChangeScope) -> bool {
        self.inner.history.borrow().can_redo(scope)
    }

    pub fn undo(&self, scope: &ChangeScope) -> Result<bool> {
        let Some(group) = self.inner.history.borrow_mut().take_undo(scope) else {
            return Ok(false);
        };
        self.replay(&group.records, scope, Direction::Undo);
        self.inner.history.borrow_mut().push_redo(group);
        Ok(true)
    }

    pub fn redo(&self, scope: &ChangeScope) -> Result<bool> {
        let Some(group) = self.inner.history.borrow_mut().take_redo(scope) else {
            return Ok(false);
        };
        self.replay(&group.records, scope, Direction::Redo);
        self.inner.history.borrow_mut().push_undo(UndoGroup {
            scope: group.scope,
            records: group.records,
        });
        Ok(true)
    }

    /// Re-applies the recorded paths of `records` onto the current
    /// documents. Paths the group never touched keep their current value.
    fn replay(&self, records: &[ChangeRecord], scope: &ChangeScope, direction: Direction) {
        self.inner.replaying.set(true);
        let ordered: Vec<&ChangeRecord> = match direction {
            Direction::Undo => records.iter().rev().collect(),
            Direction::Redo => records.iter().collect(),
        };
        for record in ordered {
            let event = {
                let mut store = self.inner.store.borrow_mut();
                match (record, direction) {
                    (ChangeRecord::Created { data }, Direction::Undo) => {
                        match store.remove(&data.id) {
                            Some(_) => StoreEvent::Deleted {
                                id: data.id.clone(),
                            },
                            None => continue,
                        }
                    }
                    (ChangeRecord::Created { data }, Direction::Redo) => {
                        if store.contains(&data.id) {
                            warn!(block = %data.id, "redo of create skipped, block exists");
                            continue;
                        }
                        store.put(data.clone());
                        StoreEvent::Created {
                            id: data.id.clone(),
                        }
                    }
                    (ChangeRecord::Updated { id, changes }, direction) => {
                        let Some(current) = store.get(id).cloned() else {
                            warn!(block = %id, "replayed change targets a removed block");
                            continue;
                        };
                        let mut next = current.clone();
                        for change in changes {
                            next.apply(match direction {
                                Direction::Undo => change.before.clone(),
                                Direction::Redo => change.after.clone(),
                            });
                        }
                        let paths = BlockData::changed_paths(&current, &next);
                        if paths.is_empty() {
                            continue;
                        }
                        store.put(next);
                        StoreEvent::Changed {
                            id: id.clone(),
                            paths,
                            scope: scope.clone(),
                        }
                    }
                }
            };
            self.notify(event);
        }
        self.inner.replaying.set(false);
    }

    pub fn subscribe(&self, listener: impl Fn(&StoreEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.get());
        self.inner.next_listener_id.set(id.0 + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn notify(&self, event: StoreEvent) {
        if let StoreEvent::Deleted { id } = &event {
            self.inner.cache.borrow_mut().remove(id);
        }

        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }

        if let StoreEvent::Changed { id, paths, scope } = &event {
            self.stamp_update(id, scope, paths);
        }
    }

    /// Built-in subscriber keeping `updateTime`/`updatedByUserId` current.
    /// A change that only touched those paths is not stamped again.
    fn stamp_update(&self, id: &BlockId, scope: &ChangeScope, paths: &[ChangedPath]) {
        if self.inner.replaying.get() || paths.iter().all(ChangedPath::is_timestamp) {
            return;
        }
        let user_id = self.inner.user_id.clone();
        let now = now_millis();
        let stamped = self.change(id, scope, |doc| {
            doc.update_time = doc.update_time.max(now);
            doc.updated_by_user_id = user_id;
        });
        if let Err(err) = stamped {
            warn!(block = %id, error = %err, "failed to stamp block update");
        }
    }

    /// Hard-removes every document not reachable from `roots` via `childIds`.
    pub fn sweep_unreachable(&self, roots: &[BlockId]) -> Result<Vec<BlockId>> {
        let unreachable = {
            let store = self.inner.store.borrow();
            let mut reachable = HashSet::new();
            let mut queue: VecDeque<BlockId> = roots.iter().cloned().collect();
            while let Some(id) = queue.pop_front() {
                let Some(doc) = store.get(&id) else {
                    continue;
                };
                if !reachable.insert(id) {
                    continue;
                }
                queue.extend(doc.child_ids.iter().cloned());
            }
            store
                .ids()
                .into_iter()
                .filter(|id| !reachable.contains(id))
                .collect::<Vec<_>>()
        };

        for id in &unreachable {
            let removed = self.inner.store.borrow_mut().remove(id);
            if removed.is_some() {
                self.notify(StoreEvent::Deleted { id: id.clone() });
            }
        }
        debug!(removed = unreachable.len(), "swept unreachable blocks");
        Ok(unreachable)
    }
}

impl RepoInner {
    pub(crate) fn upgrade(weak: &Weak<RepoInner>) -> Result<Repo> {
        weak.upgrade().map(Repo::from_inner).ok_or(Error::RepoClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_returns_identity_stable_handles() {
        let repo = Repo::new("alice");
        let block = repo.create_root("root").expect("create");
        let a = repo.find(block.id()).expect("find");
        let b = repo.find(block.id()).expect("find");
        assert!(Block::ptr_eq(&a, &b));
        assert!(Block::ptr_eq(&a, &block));
    }

    #[test]
    fn find_reports_missing_and_malformed_ids() {
        let repo = Repo::new("alice");
        assert!(matches!(
            repo.find(&BlockId::generate()),
            Err(Error::BlockNotFound(_))
        ));
        assert!(matches!(
            repo.find_str("nope"),
            Err(Error::InvalidBlockId(_))
        ));
    }

    #[test]
    fn change_stamps_update_time_and_user() {
        let mut store = MemoryStore::new();
        let id = BlockId::generate();
        store
            .insert(BlockData::new(id.clone(), "bob", 0))
            .expect("insert");
        let repo = Repo::with_store(store, "alice");

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        repo.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        repo.change(&id, &ChangeScope::DOCUMENT, |doc| {
            doc.content = "edited".to_string()
        })
        .expect("change");

        let data = repo.snapshot(&id).expect("snapshot");
        assert_eq!(data.updated_by_user_id, "alice");
        assert!(data.update_time > 0);
        assert_eq!(data.created_by_user_id, "bob");

        let events = events.borrow();
        assert_eq!(events.len(), 2);
        match &events[1] {
            StoreEvent::Changed { paths, .. } => {
                assert!(paths.iter().all(ChangedPath::is_timestamp))
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let repo = Repo::new("alice");
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let listener = repo.subscribe(move |_| counter.set(counter.get() + 1));
        repo.create_root("a").expect("create");
        assert_eq!(count.get(), 1);
        assert!(repo.unsubscribe(listener));
        repo.create_root("b").expect("create");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn undo_and_redo_restore_content() {
        let repo = Repo::new("alice");
        let block = repo.create_root("one").expect("create");
        let id = block.id().clone();
        repo.change(&id, &ChangeScope::DOCUMENT, |doc| doc.content = "two".to_string())
            .expect("change");

        assert!(repo.undo(&ChangeScope::DOCUMENT).expect("undo"));
        assert_eq!(repo.snapshot(&id).expect("snapshot").content, "one");

        assert!(repo.redo(&ChangeScope::DOCUMENT).expect("redo"));
        assert_eq!(repo.snapshot(&id).expect("snapshot").content, "two");
    }

    #[test]
    fn undo_only_touches_the_requested_scope() {
        let repo = Repo::new("alice");
        let block = repo.create_root("doc").expect("create");
        let id = block.id().clone();
        repo.change(&id, &ChangeScope::DOCUMENT, |doc| doc.content = "doc-2".to_string())
            .expect("change");
        repo.change(&id, &ChangeScope::UI_STATE, |doc| {
            doc.child_ids.clear();
            doc.content.push('!');
        })
        .expect("change");

        assert!(repo.undo(&ChangeScope::UI_STATE).expect("undo"));
        assert_eq!(repo.snapshot(&id).expect("snapshot").content, "doc-2");
        assert!(!repo.can_undo(&ChangeScope::UI_STATE));
    }

    #[test]
    fn batch_groups_changes_into_one_undo_unit() {
        let repo = Repo::new("alice");
        let a = repo.create_root("a").expect("create");
        let b = repo.create_root("b").expect("create");
        repo.batch(&ChangeScope::DOCUMENT, || {
            repo.change(a.id(), &ChangeScope::DOCUMENT, |doc| doc.content = "a2".into())?;
            repo.change(b.id(), &ChangeScope::DOCUMENT, |doc| doc.content = "b2".into())
        })
        .expect("batch");

        assert!(repo.undo(&ChangeScope::DOCUMENT).expect("undo"));
        assert_eq!(repo.snapshot(a.id()).expect("a").content, "a");
        assert_eq!(repo.snapshot(b.id()).expect("b").content, "b");
    }

    #[test]
    fn undo_of_create_removes_the_document() {
        let repo = Repo::new("alice");
        let block = repo.create_root("temp").expect("create");
        let id = block.id().clone();
        assert!(repo.undo(&ChangeScope::DOCUMENT).expect("undo"));
        assert!(!repo.exists(&id));
        assert!(repo.redo(&ChangeScope::DOCUMENT).expect("redo"));
        assert_eq!(repo.snapshot(&id).expect("snapshot").content, "temp");
    }

    #[test]
    fn sweep_removes_orphans_and_invalidates_cache() {
        let repo = Repo::new("alice");
        let root = repo.create_root("root").expect("root");
        let child = root
            .create_child(BlockSeed::new("child"), crate::block::Position::Last)
            .expect("child");
        let orphan = repo.create_root("orphan").expect("orphan");

        let removed = repo
            .sweep_unreachable(&[root.id().clone()])
            .expect("sweep");
        assert_eq!(removed, vec![orphan.id().clone()]);
        assert!(repo.find(child.id()).is_ok());
        assert!(matches!(
            repo.find(orphan.id()),
            Err(Error::BlockNotFound(_))
        ));
    }

    #[test]
    fn ui_state_undo_keeps_later_document_edit() {
        let repo = Repo::new("alice");
        let block = repo.create_root("a").expect("create");
        block
            .set_property(&crate::properties::collapsed(), true)
            .expect("collapse");
        block.set_content("typed later").expect("edit");

        assert!(repo.undo(&ChangeScope::UI_STATE).expect("undo"));
        assert_eq!(block.content().expect("content"), "typed later");
        assert!(!block.is_collapsed().expect("collapsed"));

        assert!(repo.redo(&ChangeScope::UI_STATE).expect("redo"));
        assert_eq!(block.content().expect("content"), "typed later");
        assert!(block.is_collapsed().expect("collapsed"));
    }

    #[test]
    fn document_undo_keeps_later_ui_state() {
        let repo = Repo::new("alice");
        let block = repo.create_root("a").expect("create");
        block.set_content("edited").expect("edit");
        block
            .set_property(&crate::properties::collapsed(), true)
            .expect("collapse");

        assert!(repo.undo(&ChangeScope::DOCUMENT).expect("undo"));
        assert_eq!(block.content().expect("content"), "a");
        assert!(block.is_collapsed().expect("collapsed"));

        block
            .set_property(&crate::properties::collapsed(), false)
            .expect("expand");
        assert!(repo.redo(&ChangeScope::DOCUMENT).expect("redo"));
        assert_eq!(block.content().expect("content"), "edited");
        assert!(!block.is_collapsed().expect("collapsed"));
    }

    #[test]
    fn undo_restores_only_its_own_property() {
        let repo = Repo::new("alice");
        let block = repo.create_root("a").expect("create");
        block
            .set_property(&crate::properties::collapsed(), true)
            .expect("collapse");
        block
            .set_property(&crate::properties::show_properties(), true)
            .expect("show");
        repo.change(block.id(), &ChangeScope::DOCUMENT, |doc| {
            doc.properties.remove("system:collapsed");
        })
        .expect("drop flag");

        assert!(repo.undo(&ChangeScope::UI_STATE).expect("undo"));
        assert!(!block
            .get_property(&crate::properties::show_properties())
            .expect("show"));
        assert!(!block.is_collapsed().expect("collapsed"));

        assert!(repo.undo(&ChangeScope::DOCUMENT).expect("undo"));
        assert!(block.is_collapsed().expect("collapsed"));
    }

    #[test]
    fn handles_fail_after_repo_is_dropped() {
        let repo = Repo::new("alice");
        let block = repo.create_root("root").expect("create");
        drop(repo);
        assert!(matches!(block.content(), Err(Error::RepoClosed)));
    }
}
