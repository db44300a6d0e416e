//! Document store adapter.
//!
//! Every block is persisted as one [`BlockData`] document. The store itself is
//! an opaque key-addressed map; [`crate::repo::Repo`] layers identity caching,
//! change scopes, history and subscriptions on top of it.

use crate::error::{Error, Result};
use crate::properties::BlockProperty;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        Uuid::parse_str(trimmed).map_err(|_| Error::InvalidBlockId(raw.to_string()))?;
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag attached to a change; groups undo history and keeps local UI state
/// apart from shared document content.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeScope(Cow<'static, str>);

impl ChangeScope {
    pub const DOCUMENT: ChangeScope = ChangeScope(Cow::Borrowed("block-default"));
    pub const UI_STATE: ChangeScope = ChangeScope(Cow::Borrowed("ui-state"));
    pub const USER_SETTINGS: ChangeScope = ChangeScope(Cow::Borrowed("user-settings"));

    pub fn custom(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChangeScope {
    fn default() -> Self {
        Self::DOCUMENT
    }
}

impl std::fmt::Display for ChangeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockData {
    pub id: BlockId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub properties: BTreeMap<String, BlockProperty>,
    #[serde(default)]
    pub child_ids: Vec<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<BlockId>,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
    #[serde(default)]
    pub created_by_user_id: String,
    #[serde(default)]
    pub updated_by_user_id: String,
}

impl BlockData {
    pub fn new(id: BlockId, user_id: &str, now: i64) -> Self {
        Self {
            id,
            content: String::new(),
            properties: BTreeMap::new(),
            child_ids: Vec::new(),
            parent_id: None,
            create_time: now,
            update_time: now,
            created_by_user_id: user_id.to_string(),
            updated_by_user_id: user_id.to_string(),
        }
    }

    pub fn changed_paths(before: &BlockData, after: &BlockData) -> Vec<ChangedPath> {
        let mut paths = Vec::new();
        if before.content != after.content {
            paths.push(ChangedPath::Content);
        }
        let names: BTreeSet<&String> = before
            .properties
            .keys()
            .chain(after.properties.keys())
            .collect();
        for name in names {
            if before.properties.get(name) != after.properties.get(name) {
                paths.push(ChangedPath::Property(name.clone()));
            }
        }
        if before.child_ids != after.child_ids {
            paths.push(ChangedPath::ChildIds);
        }
        if before.parent_id != after.parent_id {
            paths.push(ChangedPath::ParentId);
        }
        if before.create_time != after.create_time
            || before.created_by_user_id != after.created_by_user_id
        {
            paths.push(ChangedPath::Created);
        }
        if before.update_time != after.update_time {
            paths.push(ChangedPath::UpdateTime);
        }
        if before.updated_by_user_id != after.updated_by_user_id {
            paths.push(ChangedPath::UpdatedByUserId);
        }
        paths
    }

    pub fn value_at(&self, path: &ChangedPath) -> PathValue {
        match path {
            ChangedPath::Content => PathValue::Content(self.content.clone()),
            ChangedPath::Property(name) => {
                PathValue::Property(name.clone(), self.properties.get(name).cloned())
            }
            ChangedPath::ChildIds => PathValue::ChildIds(self.child_ids.clone()),
            ChangedPath::ParentId => PathValue::ParentId(self.parent_id.clone()),
            ChangedPath::Created => {
                PathValue::Created(self.create_time, self.created_by_user_id.clone())
            }
            ChangedPath::UpdateTime => PathValue::UpdateTime(self.update_time),
            ChangedPath::UpdatedByUserId => {
                PathValue::UpdatedByUserId(self.updated_by_user_id.clone())
            }
        }
    }

    /// Writes one path, leaving every other field as it is.
    pub fn apply(&mut self, value: PathValue) {
        match value {
            PathValue::Content(content) => self.content = content,
            PathValue::Property(name, Some(property)) => {
                self.properties.insert(name, property);
            }
            PathValue::Property(name, None) => {
                self.properties.remove(&name);
            }
            PathValue::ChildIds(child_ids) => self.child_ids = child_ids,
            PathValue::ParentId(parent_id) => self.parent_id = parent_id,
            PathValue::Created(time, user_id) => {
                self.create_time = time;
                self.created_by_user_id = user_id;
            }
            PathValue::UpdateTime(time) => self.update_time = time,
            PathValue::UpdatedByUserId(user_id) => self.updated_by_user_id = user_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangedPath {
    Content,
    /// One entry of `properties`, by name.
    Property(String),
    ChildIds,
    ParentId,
    Created,
    UpdateTime,
    UpdatedByUserId,
}

impl ChangedPath {
    pub fn is_timestamp(&self) -> bool {
        matches!(self, ChangedPath::UpdateTime | ChangedPath::UpdatedByUserId)
    }
}

/// Value stored at one [`ChangedPath`]. A missing property is `None`.
#[derive(Clone, Debug, PartialEq)]
pub enum PathValue {
    Content(String),
    Property(String, Option<BlockProperty>),
    ChildIds(Vec<BlockId>),
    ParentId(Option<BlockId>),
    Created(i64, String),
    UpdateTime(i64),
    UpdatedByUserId(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    Created {
        id: BlockId,
    },
    Changed {
        id: BlockId,
        paths: Vec<ChangedPath>,
        scope: ChangeScope,
    },
    Deleted {
        id: BlockId,
    },
}

impl StoreEvent {
    pub fn id(&self) -> &BlockId {
        match self {
            StoreEvent::Created { id } | StoreEvent::Changed { id, .. } | StoreEvent::Deleted { id } => {
                id
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathChange {
    pub before: PathValue,
    pub after: PathValue,
}

/// One recorded mutation. Updates keep only the paths they touched, so
/// replaying them leaves the rest of the document alone.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeRecord {
    Created { data: BlockData },
    Updated { id: BlockId, changes: Vec<PathChange> },
}

impl ChangeRecord {
    pub fn between(before: &BlockData, after: &BlockData) -> Self {
        let changes = BlockData::changed_paths(before, after)
            .iter()
            .map(|path| PathChange {
                before: before.value_at(path),
                after: after.value_at(path),
            })
            .collect();
        ChangeRecord::Updated {
            id: after.id.clone(),
            changes,
        }
    }

    pub fn id(&self) -> &BlockId {
        match self {
            ChangeRecord::Created { data } => &data.id,
            ChangeRecord::Updated { id, .. } => id,
        }
    }

    pub fn paths(&self) -> Vec<ChangedPath> {
        match self {
            ChangeRecord::Created { .. } => Vec::new(),
            ChangeRecord::Updated { changes, .. } => {
                changes.iter().map(|change| change.after.path()).collect()
            }
        }
    }
}

impl PathValue {
    pub fn path(&self) -> ChangedPath {
        match self {
            PathValue::Content(_) => ChangedPath::Content,
            PathValue::Property(name, _) => ChangedPath::Property(name.clone()),
            PathValue::ChildIds(_) => ChangedPath::ChildIds,
            PathValue::ParentId(_) => ChangedPath::ParentId,
            PathValue::Created(..) => ChangedPath::Created,
            PathValue::UpdateTime(_) => ChangedPath::UpdateTime,
            PathValue::UpdatedByUserId(_) => ChangedPath::UpdatedByUserId,
        }
    }
}

pub trait DocumentStore {
    fn get(&self, id: &BlockId) -> Option<&BlockData>;

    fn contains(&self, id: &BlockId) -> bool {
        self.get(id).is_some()
    }

    fn insert(&mut self, data: BlockData) -> Result<()>;

    /// Overwrites a document unconditionally. Used when replaying history.
    fn put(&mut self, data: BlockData);

    /// Applies `mutator` atomically. Returns `None` when nothing changed.
    fn change(
        &mut self,
        id: &BlockId,
        mutator: &mut dyn FnMut(&mut BlockData),
    ) -> Result<Option<ChangeRecord>>;

    fn remove(&mut self, id: &BlockId) -> Option<BlockData>;

    fn ids(&self) -> Vec<BlockId>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: HashMap<BlockId, BlockData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, id: &BlockId) -> Option<&BlockData> {
        self.docs.get(id)
    }

    fn insert(&mut self, data: BlockData) -> Result<()> {
        if self.docs.contains_key(&data.id) {
            return Err(Error::DuplicateBlock(data.id));
        }
        self.docs.insert(data.id.clone(), data);
        Ok(())
    }

    fn put(&mut self, data: BlockData) {
        self.docs.insert(data.id.clone(), data);
    }

    fn change(
        &mut self,
        id: &BlockId,
        mutator: &mut dyn FnMut(&mut BlockData),
    ) -> Result<Option<ChangeRecord>> {
        let doc = self
            .docs
            .get_mut(id)
            .ok_or_else(|| Error::BlockNotFound(id.clone()))?;
        let before = doc.clone();
        mutator(doc);
        // the id is the storage key and cannot be rewritten
        doc.id = id.clone();
        if *doc == before {
            return Ok(None);
        }
        Ok(Some(ChangeRecord::between(&before, doc)))
    }

    fn remove(&mut self, id: &BlockId) -> Option<BlockData> {
        self.docs.remove(id)
    }

    fn ids(&self) -> Vec<BlockId> {
        let mut ids: Vec<_> = self.docs.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> BlockData {
        let mut data = BlockData::new(BlockId::generate(), "tester", 1);
        data.content = content.to_string();
        data
    }

    #[test]
    fn parse_rejects_non_uuid_ids() {
        assert!(matches!(
            BlockId::parse("not-an-id"),
            Err(Error::InvalidBlockId(_))
        ));
        let id = BlockId::generate();
        assert_eq!(BlockId::parse(id.as_str()).expect("valid id"), id);
    }

    #[test]
    fn change_reports_paths_and_skips_noops() {
        let mut store = MemoryStore::new();
        let data = doc("hello");
        let id = data.id.clone();
        store.insert(data).expect("insert");

        let unchanged = store
            .change(&id, &mut |doc| doc.content = "hello".to_string())
            .expect("change");
        assert!(unchanged.is_none());

        let record = store
            .change(&id, &mut |doc| {
                doc.content = "world".to_string();
                doc.update_time = 2;
            })
            .expect("change")
            .expect("record");
        assert_eq!(
            record.paths(),
            vec![ChangedPath::Content, ChangedPath::UpdateTime]
        );
        assert_eq!(store.get(&id).map(|doc| doc.content.as_str()), Some("world"));
    }

    #[test]
    fn property_paths_are_tracked_by_name() {
        let before = doc("a");
        let mut after = before.clone();
        after.properties.insert(
            "system:collapsed".to_string(),
            BlockProperty {
                name: "system:collapsed".to_string(),
                kind: crate::properties::PropertyType::Boolean,
                value: serde_json::json!(true),
                change_scope: Some(ChangeScope::UI_STATE),
            },
        );
        assert_eq!(
            BlockData::changed_paths(&before, &after),
            vec![ChangedPath::Property("system:collapsed".to_string())]
        );

        let ChangeRecord::Updated { changes, .. } = ChangeRecord::between(&before, &after) else {
            panic!("expected an update record");
        };
        let mut current = after.clone();
        current.content = "later".to_string();
        current.apply(changes[0].before.clone());
        assert!(current.properties.is_empty());
        assert_eq!(current.content, "later");
    }

    #[test]
    fn change_cannot_rewrite_the_id() {
        let mut store = MemoryStore::new();
        let data = doc("a");
        let id = data.id.clone();
        store.insert(data).expect("insert");
        store
            .change(&id, &mut |doc| doc.id = BlockId::generate())
            .expect("change");
        assert!(store.contains(&id));
        assert_eq!(store.get(&id).map(|doc| doc.id.clone()), Some(id));
    }

    #[test]
    fn insert_rejects_duplicates_and_change_rejects_missing() {
        let mut store = MemoryStore::new();
        let data = doc("a");
        store.insert(data.clone()).expect("insert");
        assert!(matches!(store.insert(data), Err(Error::DuplicateBlock(_))));
        assert!(matches!(
            store.change(&BlockId::generate(), &mut |_| {}),
            Err(Error::BlockNotFound(_))
        ));
    }

    #[test]
    fn block_data_serializes_camel_case() {
        let data = doc("x");
        let json = serde_json::to_value(&data).expect("serialize");
        assert!(json.get("childIds").is_some());
        assert!(json.get("createdByUserId").is_some());
        assert!(json.get("parentId").is_none());
    }
}
