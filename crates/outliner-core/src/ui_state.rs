//! UI state blocks.
//!
//! Transient UI concerns (focus, editing flag, selections, zoom) live on a
//! regular block under `system/users/<userId>/ui-state`, written with the
//! `ui-state` change scope so they never mix with document undo history.

use crate::block::Block;
use crate::error::{Error, Result};
use crate::properties::{self, EditorSelection, SelectionState};
use crate::reconcile::reconcile_list;
use crate::repo::{ListenerId, Repo};
use crate::store::{BlockId, ChangeScope, StoreEvent};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

pub const SYSTEM: &str = "system";
pub const USERS: &str = "users";
pub const UI_STATE: &str = "ui-state";
pub const PANELS: &str = "panels";
pub const RENDERERS: &str = "renderers";
pub const OPENROUTER: &str = "openrouter";

/// Typed accessors over a ui-state block.
#[derive(Clone, Debug, PartialEq)]
pub struct UiState {
    block: Block,
}

impl UiState {
    pub fn new(block: Block) -> Self {
        Self { block }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn repo(&self) -> Result<Repo> {
        self.block.repo()
    }

    pub fn focused_block_id(&self) -> Result<Option<BlockId>> {
        self.block.get_property(&properties::focused_block_id())
    }

    /// Resolves the focused block; a focus id whose document vanished reads
    /// as no focus.
    pub fn focused_block(&self) -> Result<Option<Block>> {
        let Some(id) = self.focused_block_id()? else {
            return Ok(None);
        };
        match self.repo()?.find(&id) {
            Ok(block) => Ok(Some(block)),
            Err(err) => {
                warn!(block = %id, error = %err, "focused block is gone");
                Ok(None)
            }
        }
    }

    /// Moves focus to `block`, placing the caret at `cursor` when given.
    pub fn focus(&self, block: &Block, cursor: Option<usize>) -> Result<()> {
        let repo = self.repo()?;
        repo.batch(&ChangeScope::UI_STATE, || {
            self.block
                .set_property(&properties::focused_block_id(), Some(block.id().clone()))?;
            if let Some(offset) = cursor {
                self.set_editor_selection(Some(EditorSelection::caret(block.id().clone(), offset)))?;
            }
            Ok(())
        })
    }

    pub fn clear_focus(&self) -> Result<()> {
        self.block.set_property(&properties::focused_block_id(), None)
    }

    pub fn is_editing(&self) -> Result<bool> {
        self.block.get_property(&properties::is_editing())
    }

    pub fn set_editing(&self, editing: bool) -> Result<()> {
        self.block.set_property(&properties::is_editing(), editing)
    }

    pub fn editor_selection(&self) -> Result<Option<EditorSelection>> {
        self.block.get_property(&properties::editor_selection())
    }

    pub fn set_editor_selection(&self, selection: Option<EditorSelection>) -> Result<()> {
        self.block
            .set_property(&properties::editor_selection(), selection)
    }

    /// Caret offset inside `block_id`, if the editor selection points there.
    pub fn cursor_offset(&self, block_id: &BlockId) -> Result<Option<usize>> {
        Ok(self
            .editor_selection()?
            .filter(|selection| &selection.block_id == block_id)
            .map(|selection| selection.start))
    }

    pub fn selection(&self) -> Result<SelectionState> {
        self.block.get_property(&properties::selection())
    }

    pub fn set_selection(&self, selection: SelectionState) -> Result<()> {
        self.block.set_property(&properties::selection(), selection)
    }

    pub fn clear_selection(&self) -> Result<()> {
        self.set_selection(SelectionState::default())
    }

    pub fn top_level_block_id(&self) -> Result<Option<BlockId>> {
        self.block.get_property(&properties::top_level_block_id())
    }

    pub fn set_top_level_block(&self, block: &Block) -> Result<()> {
        self.block
            .set_property(&properties::top_level_block_id(), Some(block.id().clone()))
    }

    pub fn show_properties(&self) -> Result<bool> {
        self.block.get_property(&properties::show_properties())
    }

    pub fn toggle_show_properties(&self) -> Result<bool> {
        let next = !self.show_properties()?;
        self.block.set_property(&properties::show_properties(), next)?;
        Ok(next)
    }

    pub fn editing_property(&self) -> Result<Option<String>> {
        self.block.get_property(&properties::editing_property())
    }

    pub fn set_editing_property(&self, name: Option<String>) -> Result<()> {
        self.block.set_property(&properties::editing_property(), name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UiStateKey {
    pub root: BlockId,
    pub user_id: String,
    pub panel_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum CacheKey {
    UiState(UiStateKey),
    Path { root: BlockId, path: Vec<String> },
}

type SystemBlockCache = Rc<RefCell<HashMap<CacheKey, Block>>>;

/// Resolves and caches the conventional system blocks of a document,
/// creating them on first access.
pub struct UiStateRegistry {
    repo: Repo,
    cache: SystemBlockCache,
    listener: ListenerId,
}

impl UiStateRegistry {
    pub fn new(repo: &Repo) -> Self {
        let cache: SystemBlockCache = Rc::default();
        let purge = cache.clone();
        let listener = repo.subscribe(move |event| {
            if let StoreEvent::Deleted { id } = event {
                purge.borrow_mut().retain(|_, block| block.id() != id);
            }
        });
        Self {
            repo: repo.clone(),
            cache,
            listener,
        }
    }

    pub fn ui_state(&self, root: &Block, user_id: &str) -> Result<UiState> {
        let key = CacheKey::UiState(UiStateKey {
            root: root.id().clone(),
            user_id: user_id.to_string(),
            panel_id: None,
        });
        let block = self.resolve(key, root, &[SYSTEM, USERS, user_id, UI_STATE])?;
        Ok(UiState::new(block))
    }

    pub fn panel_state(&self, root: &Block, user_id: &str, panel_id: &str) -> Result<UiState> {
        let key = CacheKey::UiState(UiStateKey {
            root: root.id().clone(),
            user_id: user_id.to_string(),
            panel_id: Some(panel_id.to_string()),
        });
        let block = self.resolve(
            key,
            root,
            &[SYSTEM, USERS, user_id, UI_STATE, PANELS, panel_id],
        )?;
        Ok(UiState::new(block))
    }

    pub fn user_block(&self, root: &Block, user_id: &str) -> Result<Block> {
        self.resolve_path(root, &[SYSTEM, USERS, user_id])
    }

    pub fn renderers_block(&self, root: &Block) -> Result<Block> {
        self.resolve_path(root, &[SYSTEM, RENDERERS])
    }

    /// Per-user settings block, e.g. `system/users/<userId>/openrouter`.
    pub fn user_settings_block(&self, root: &Block, user_id: &str, name: &str) -> Result<Block> {
        self.resolve_path(root, &[SYSTEM, USERS, user_id, name])
    }

    pub fn invalidate(&self, key: &UiStateKey) {
        self.cache
            .borrow_mut()
            .remove(&CacheKey::UiState(key.clone()));
    }

    pub fn cached_len(&self) -> usize {
        self.cache.borrow().len()
    }

    fn resolve_path(&self, root: &Block, path: &[&str]) -> Result<Block> {
        let key = CacheKey::Path {
            root: root.id().clone(),
            path: path.iter().map(|segment| segment.to_string()).collect(),
        };
        self.resolve(key, root, path)
    }

    fn resolve(&self, key: CacheKey, root: &Block, path: &[&str]) -> Result<Block> {
        let cached = self.cache.borrow().get(&key).cloned();
        if let Some(block) = cached {
            if is_linked(&self.repo, &block) {
                return Ok(block);
            }
            debug!(block = %block.id(), "cached system block was unlinked");
        }
        let block = root
            .child_by_content(path, true)?
            .ok_or_else(|| Error::BlockNotFound(root.id().clone()))?;
        self.cache.borrow_mut().insert(key, block.clone());
        Ok(block)
    }
}

impl Drop for UiStateRegistry {
    fn drop(&mut self) {
        self.repo.unsubscribe(self.listener);
    }
}

fn is_linked(repo: &Repo, block: &Block) -> bool {
    let Ok(Some(parent_id)) = block.parent_id() else {
        return false;
    };
    repo.read(&parent_id, |doc| doc.child_ids.contains(block.id()))
        .unwrap_or(false)
}

#[derive(Clone, Debug, PartialEq)]
pub struct PanelState {
    pub panel_id: String,
    pub state: UiState,
}

/// Open panels of one user, kept in step with the desired panel list.
pub struct PanelSet {
    root: Block,
    user_id: String,
    panels: Vec<PanelState>,
}

impl PanelSet {
    pub fn new(root: Block, user_id: impl Into<String>) -> Self {
        Self {
            root,
            user_id: user_id.into(),
            panels: Vec::new(),
        }
    }

    pub fn sync(&mut self, registry: &UiStateRegistry, desired: &[String]) -> Result<()> {
        let root = &self.root;
        let user_id = &self.user_id;
        reconcile_list(
            &mut self.panels,
            desired,
            |panel| &panel.panel_id,
            |panel_id| {
                Ok(PanelState {
                    panel_id: panel_id.clone(),
                    state: registry.panel_state(root, user_id, panel_id)?,
                })
            },
        )
    }

    pub fn panels(&self) -> &[PanelState] {
        &self.panels
    }

    pub fn get(&self, panel_id: &str) -> Option<&PanelState> {
        self.panels.iter().find(|panel| panel.panel_id == panel_id)
    }
}
