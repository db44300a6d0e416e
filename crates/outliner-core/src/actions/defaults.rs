//! Built-in contexts and actions of the outliner.

use super::context::{
    ActionContextConfig, ActionContextType, CommandPaletteDependencies, EditModeDependencies,
    GlobalDependencies, MultiSelectModeDependencies, NormalModeDependencies,
    PropertyEditingDependencies, SharedDraft,
};
use super::key::{EventOptions, EventTarget};
use super::manager::{ActionConfig, ActionManager};
use crate::block::Block;
use crate::error::Result;
use crate::outline::{
    delete_empty_block, delete_selected_blocks, extend_selection, indent_block,
    indent_selected_blocks, move_block, navigate, next_visible_block, outdent_block,
    outdent_selected_blocks, previous_visible_block, select_block, split_block_at_cursor,
    toggle_collapsed, visible_blocks,
};
use crate::store::ChangeScope;
use crate::ui_state::UiState;
use tracing::debug;

const MOVE_UP: &[&str] = &["ctrl+shift+arrowup", "meta+shift+arrowup"];
const MOVE_DOWN: &[&str] = &["ctrl+shift+arrowdown", "meta+shift+arrowdown"];

pub fn register_default_contexts(manager: &mut ActionManager) {
    manager.register_context(ActionContextConfig::new(ActionContextType::Global, "Global"));
    manager.register_context(ActionContextConfig::new(
        ActionContextType::NormalMode,
        "Normal mode",
    ));
    manager.register_context(
        ActionContextConfig::new(ActionContextType::EditMode, "Edit mode")
            .allow_target(EventTarget::Textarea),
    );
    manager.register_context(
        ActionContextConfig::new(ActionContextType::PropertyEditing, "Property editing")
            .allow_target(EventTarget::Input),
    );
    manager.register_context(
        ActionContextConfig::new(ActionContextType::CommandPalette, "Command palette")
            .allow_target(EventTarget::Input)
            .with_event_options(EventOptions {
                prevent_default: None,
                stop_propagation: Some(true),
            }),
    );
    manager.register_context(ActionContextConfig::new(
        ActionContextType::MultiSelectMode,
        "Multi-select",
    ));
}

pub fn register_default_actions(manager: &mut ActionManager) -> Result<()> {
    for action in global_actions()
        .into_iter()
        .chain(normal_mode_actions())
        .chain(edit_mode_actions())
        .chain(multi_select_actions())
        .chain(overlay_actions())
    {
        manager.register_action(action)?;
    }
    Ok(())
}

fn global_actions() -> Vec<ActionConfig> {
    vec![
        ActionConfig::new(
            "global.toggle-command-palette",
            "Toggle command palette",
            |deps: &GlobalDependencies, _| {
                deps.palette.emit();
                Ok(())
            },
        )
        .with_keys(&["ctrl+k", "meta+k"])
        .hidden(),
        ActionConfig::new("global.undo", "Undo", |deps: &GlobalDependencies, _| {
            deps.ui.repo()?.undo(&ChangeScope::DOCUMENT)?;
            Ok(())
        })
        .with_keys(&["ctrl+z", "meta+z"]),
        ActionConfig::new("global.redo", "Redo", |deps: &GlobalDependencies, _| {
            deps.ui.repo()?.redo(&ChangeScope::DOCUMENT)?;
            Ok(())
        })
        .with_keys(&["ctrl+shift+z", "meta+shift+z", "ctrl+y"]),
    ]
}

/// Focused block, or the first visible block below `top_level`.
fn current_block(ui: &UiState, top_level: &Block) -> Result<Option<Block>> {
    if let Some(block) = ui.focused_block()? {
        return Ok(Some(block));
    }
    Ok(visible_blocks(top_level)?.into_iter().nth(1))
}

fn with_current(
    ui: &UiState,
    top_level: &Block,
    f: impl FnOnce(&Block) -> Result<()>,
) -> Result<()> {
    match current_block(ui, top_level)? {
        Some(block) if &block != top_level => f(&block),
        _ => Ok(()),
    }
}

fn step(ui: &UiState, top_level: &Block, down: bool) -> Result<()> {
    match ui.focused_block()? {
        Some(block) => {
            navigate(ui, &block, top_level.id(), down)?;
        }
        None => {
            if let Some(first) = visible_blocks(top_level)?.into_iter().nth(1) {
                ui.focus(&first, None)?;
            }
        }
    }
    Ok(())
}

fn extend(ui: &UiState, top_level: &Block, down: bool) -> Result<()> {
    with_current(ui, top_level, |block| {
        let target = if down {
            next_visible_block(block, top_level.id())?
        } else {
            previous_visible_block(block, top_level.id())?
        };
        let target = target.filter(|target| target != top_level);
        match target {
            Some(target) => extend_selection(ui, target.id()).map(drop),
            None => select_block(ui, block).map(drop),
        }
    })
}

fn normal_mode_actions() -> Vec<ActionConfig> {
    vec![
        ActionConfig::new(
            "normal.select-next",
            "Next block",
            |deps: &NormalModeDependencies, _| step(&deps.ui, &deps.top_level, true),
        )
        .with_keys(&["arrowdown", "j"]),
        ActionConfig::new(
            "normal.select-previous",
            "Previous block",
            |deps: &NormalModeDependencies, _| step(&deps.ui, &deps.top_level, false),
        )
        .with_keys(&["arrowup", "k"]),
        ActionConfig::new(
            "normal.enter-edit-mode",
            "Edit block",
            |deps: &NormalModeDependencies, _| {
                with_current(&deps.ui, &deps.top_level, |block| {
                    let end = block.content()?.chars().count();
                    deps.ui.repo()?.batch(&ChangeScope::UI_STATE, || {
                        deps.ui.focus(block, Some(end))?;
                        deps.ui.set_editing(true)
                    })
                })
            },
        )
        .with_keys(&["enter"]),
        ActionConfig::new(
            "normal.indent",
            "Indent block",
            |deps: &NormalModeDependencies, _| {
                with_current(&deps.ui, &deps.top_level, |block| {
                    indent_block(&deps.ui, block).map(drop)
                })
            },
        )
        .with_keys(&["tab"]),
        ActionConfig::new(
            "normal.outdent",
            "Outdent block",
            |deps: &NormalModeDependencies, _| {
                with_current(&deps.ui, &deps.top_level, |block| {
                    outdent_block(&deps.ui, block).map(drop)
                })
            },
        )
        .with_keys(&["shift+tab"]),
        ActionConfig::new(
            "normal.move-up",
            "Move block up",
            |deps: &NormalModeDependencies, _| {
                with_current(&deps.ui, &deps.top_level, |block| move_block(block, -1).map(drop))
            },
        )
        .with_keys(MOVE_UP),
        ActionConfig::new(
            "normal.move-down",
            "Move block down",
            |deps: &NormalModeDependencies, _| {
                with_current(&deps.ui, &deps.top_level, |block| move_block(block, 1).map(drop))
            },
        )
        .with_keys(MOVE_DOWN),
        ActionConfig::new(
            "normal.toggle-collapse",
            "Collapse or expand block",
            |deps: &NormalModeDependencies, _| {
                with_current(&deps.ui, &deps.top_level, |block| {
                    toggle_collapsed(block).map(drop)
                })
            },
        )
        .with_keys(&["z"]),
        ActionConfig::new(
            "normal.toggle-properties",
            "Toggle properties",
            |deps: &NormalModeDependencies, _| deps.ui.toggle_show_properties().map(drop),
        )
        .with_keys(&["t"]),
        ActionConfig::new(
            "normal.delete-block",
            "Delete block",
            |deps: &NormalModeDependencies, _| {
                with_current(&deps.ui, &deps.top_level, |block| {
                    select_block(&deps.ui, block)?;
                    delete_selected_blocks(&deps.ui, deps.top_level.id()).map(drop)
                })
            },
        )
        .with_keys(&["delete"]),
        ActionConfig::new(
            "normal.extend-selection-up",
            "Extend selection up",
            |deps: &NormalModeDependencies, _| extend(&deps.ui, &deps.top_level, false),
        )
        .with_keys(&["shift+arrowup"]),
        ActionConfig::new(
            "normal.extend-selection-down",
            "Extend selection down",
            |deps: &NormalModeDependencies, _| extend(&deps.ui, &deps.top_level, true),
        )
        .with_keys(&["shift+arrowdown"]),
    ]
}

fn edit_mode_actions() -> Vec<ActionConfig> {
    vec![
        ActionConfig::new(
            "edit.split-block",
            "Split block",
            |deps: &EditModeDependencies, _| {
                deps.flush_draft()?;
                let cursor = match deps.ui.cursor_offset(deps.block.id())? {
                    Some(cursor) => cursor,
                    None => deps.block.content()?.chars().count(),
                };
                split_block_at_cursor(&deps.ui, &deps.block, cursor).map(drop)
            },
        )
        .with_keys(&["enter"])
        .hidden(),
        ActionConfig::new(
            "edit.delete-empty-block",
            "Delete empty block",
            |deps: &EditModeDependencies, _| {
                deps.flush_draft()?;
                let removed = delete_empty_block(&deps.ui, &deps.block, deps.top_level.id())?;
                if removed.is_some() {
                    debug!(block = %deps.block.id(), "deleted empty block");
                }
                Ok(())
            },
        )
        .with_keys(&["backspace"])
        .with_event_options(EventOptions {
            prevent_default: Some(false),
            stop_propagation: None,
        })
        .hidden(),
        ActionConfig::new(
            "edit.exit-edit-mode",
            "Stop editing",
            |deps: &EditModeDependencies, _| {
                deps.flush_draft()?;
                deps.ui.set_editing(false)
            },
        )
        .with_keys(&["escape"]),
        ActionConfig::new("edit.indent", "Indent block", |deps: &EditModeDependencies, _| {
            deps.flush_draft()?;
            indent_block(&deps.ui, &deps.block).map(drop)
        })
        .with_keys(&["tab"]),
        ActionConfig::new(
            "edit.outdent",
            "Outdent block",
            |deps: &EditModeDependencies, _| {
                deps.flush_draft()?;
                outdent_block(&deps.ui, &deps.block).map(drop)
            },
        )
        .with_keys(&["shift+tab"]),
        ActionConfig::new("edit.move-up", "Move block up", |deps: &EditModeDependencies, _| {
            move_block(&deps.block, -1).map(drop)
        })
        .with_keys(MOVE_UP),
        ActionConfig::new(
            "edit.move-down",
            "Move block down",
            |deps: &EditModeDependencies, _| move_block(&deps.block, 1).map(drop),
        )
        .with_keys(MOVE_DOWN),
    ]
}

fn multi_select_actions() -> Vec<ActionConfig> {
    vec![
        ActionConfig::new(
            "multi.clear-selection",
            "Clear selection",
            |deps: &MultiSelectModeDependencies, _| deps.ui.clear_selection(),
        )
        .with_keys(&["escape"]),
        ActionConfig::new(
            "multi.extend-selection-up",
            "Extend selection up",
            |deps: &MultiSelectModeDependencies, _| extend(&deps.ui, &deps.top_level, false),
        )
        .with_keys(&["shift+arrowup"]),
        ActionConfig::new(
            "multi.extend-selection-down",
            "Extend selection down",
            |deps: &MultiSelectModeDependencies, _| extend(&deps.ui, &deps.top_level, true),
        )
        .with_keys(&["shift+arrowdown"]),
        ActionConfig::new(
            "multi.indent",
            "Indent selected blocks",
            |deps: &MultiSelectModeDependencies, _| indent_selected_blocks(&deps.ui).map(drop),
        )
        .with_keys(&["tab"]),
        ActionConfig::new(
            "multi.outdent",
            "Outdent selected blocks",
            |deps: &MultiSelectModeDependencies, _| outdent_selected_blocks(&deps.ui).map(drop),
        )
        .with_keys(&["shift+tab"]),
        ActionConfig::new(
            "multi.delete-selection",
            "Delete selected blocks",
            |deps: &MultiSelectModeDependencies, _| {
                delete_selected_blocks(&deps.ui, deps.top_level.id()).map(drop)
            },
        )
        .with_keys(&["delete", "backspace"]),
    ]
}

fn overlay_actions() -> Vec<ActionConfig> {
    vec![
        ActionConfig::new(
            "palette.close",
            "Close command palette",
            |deps: &CommandPaletteDependencies, _| {
                deps.palette.emit();
                Ok(())
            },
        )
        .with_keys(&["escape"])
        .hidden(),
        ActionConfig::new(
            "property.cancel",
            "Stop editing property",
            |deps: &PropertyEditingDependencies, _| deps.ui.set_editing_property(None),
        )
        .with_keys(&["escape"])
        .hidden(),
    ]
}

/// Activates the mode context that matches the UI state (multi-select when
/// blocks are selected, edit mode while editing a focused block, normal
/// mode otherwise) and deactivates the other two. Returns the active mode.
pub fn sync_mode_contexts(
    manager: &mut ActionManager,
    ui: &UiState,
    top_level: &Block,
    draft: Option<SharedDraft>,
) -> Result<ActionContextType> {
    let mode = if !ui.selection()?.is_empty() {
        manager.activate_context(
            ActionContextType::MultiSelectMode,
            MultiSelectModeDependencies {
                ui: ui.clone(),
                top_level: top_level.clone(),
            },
        )?;
        ActionContextType::MultiSelectMode
    } else {
        let editing = ui.is_editing()?;
        match ui.focused_block()?.filter(|_| editing) {
            Some(block) => {
                manager.activate_context(
                    ActionContextType::EditMode,
                    EditModeDependencies {
                        ui: ui.clone(),
                        block,
                        top_level: top_level.clone(),
                        draft,
                    },
                )?;
                ActionContextType::EditMode
            }
            None => {
                manager.activate_context(
                    ActionContextType::NormalMode,
                    NormalModeDependencies {
                        ui: ui.clone(),
                        top_level: top_level.clone(),
                    },
                )?;
                ActionContextType::NormalMode
            }
        }
    };
    for other in [
        ActionContextType::NormalMode,
        ActionContextType::EditMode,
        ActionContextType::MultiSelectMode,
    ] {
        if other != mode {
            manager.deactivate_context(other);
        }
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::context::Signal;
    use crate::actions::key::KeyEvent;
    use crate::draft::{ContentDraft, DEFAULT_DEBOUNCE};
    use crate::fixtures::{build_outline, contents, ui_state, Outline};
    use crate::properties::EditorSelection;
    use crate::repo::Repo;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Instant;

    struct Harness {
        repo: Repo,
        outline: Outline,
        ui: UiState,
        manager: ActionManager,
    }

    fn harness(rows: &[(&str, usize)]) -> Harness {
        let repo = Repo::new("tester");
        let outline = build_outline(&repo, rows);
        let ui = ui_state(&repo);
        let mut manager = ActionManager::new();
        register_default_contexts(&mut manager);
        register_default_actions(&mut manager).expect("defaults");
        Harness {
            repo,
            outline,
            ui,
            manager,
        }
    }

    impl Harness {
        fn press(&mut self, key: &str, target: EventTarget) -> usize {
            let mut event = KeyEvent::parse(key, target).expect("event");
            let handled = self.manager.handle_key_event(&mut event).expect("dispatch");
            sync_mode_contexts(&mut self.manager, &self.ui, &self.outline.root, None)
                .expect("sync");
            handled
        }

        fn sync(&mut self) -> ActionContextType {
            sync_mode_contexts(&mut self.manager, &self.ui, &self.outline.root, None)
                .expect("sync")
        }
    }

    #[test]
    fn every_action_belongs_to_a_registered_context() {
        let h = harness(&[]);
        for entry in h.manager.palette_actions() {
            assert!(ActionContextType::ALL.contains(&entry.context));
            assert!(!entry.keys.is_empty(), "{} has no keys", entry.id);
        }
        assert!(h.manager.action("edit.split-block").is_some());
    }

    #[test]
    fn normal_mode_navigates_and_enters_edit_mode() {
        let mut h = harness(&[("a", 0), ("b", 0)]);
        assert_eq!(h.sync(), ActionContextType::NormalMode);

        h.press("arrowdown", EventTarget::Body);
        assert_eq!(h.ui.focused_block().expect("focus").as_ref(), Some(h.outline.get("a")));
        h.press("j", EventTarget::Body);
        assert_eq!(h.ui.focused_block().expect("focus").as_ref(), Some(h.outline.get("b")));

        h.press("enter", EventTarget::Body);
        assert!(h.ui.is_editing().expect("editing"));
        assert!(h.manager.is_active(ActionContextType::EditMode));
        assert!(!h.manager.is_active(ActionContextType::NormalMode));
        assert_eq!(h.ui.cursor_offset(h.outline.get("b").id()).expect("cursor"), Some(1));
    }

    #[test]
    fn typing_t_in_textarea_does_not_toggle_properties() {
        let mut h = harness(&[("a", 0)]);
        h.sync();
        assert_eq!(h.press("t", EventTarget::Textarea), 0);
        assert!(!h.ui.show_properties().expect("props"));
        h.press("t", EventTarget::Body);
        assert!(h.ui.show_properties().expect("props"));
    }

    #[test]
    fn edit_mode_enter_splits_at_cursor() {
        let mut h = harness(&[("helloworld", 0)]);
        let block = h.outline.get("helloworld").clone();
        h.ui.focus(&block, None).expect("focus");
        h.ui.set_editing(true).expect("editing");
        h.ui.set_editor_selection(Some(EditorSelection::caret(block.id().clone(), 5)))
            .expect("caret");
        assert_eq!(h.sync(), ActionContextType::EditMode);

        h.press("enter", EventTarget::Textarea);
        assert_eq!(
            contents(&h.outline.root.children().expect("children")),
            vec!["hello", "world"]
        );
        h.press("escape", EventTarget::Textarea);
        assert!(!h.ui.is_editing().expect("editing"));
        assert!(h.manager.is_active(ActionContextType::NormalMode));
    }

    #[test]
    fn pending_draft_is_flushed_before_backspace() {
        let mut h = harness(&[("a", 0), ("b", 0)]);
        let b = h.outline.get("b").clone();
        h.ui.focus(&b, None).expect("focus");
        h.ui.set_editing(true).expect("editing");
        let draft = Rc::new(RefCell::new(ContentDraft::new(b.clone(), DEFAULT_DEBOUNCE)));
        draft.borrow_mut().update("", Instant::now());
        sync_mode_contexts(&mut h.manager, &h.ui, &h.outline.root, Some(draft.clone()))
            .expect("sync");

        let mut event = KeyEvent::parse("backspace", EventTarget::Textarea).expect("event");
        h.manager.handle_key_event(&mut event).expect("dispatch");
        assert!(!event.default_prevented());
        assert_eq!(contents(&h.outline.root.children().expect("children")), vec!["a"]);
        assert_eq!(h.ui.focused_block().expect("focus").as_ref(), Some(h.outline.get("a")));
    }

    #[test]
    fn shift_arrows_switch_to_multi_select() {
        let mut h = harness(&[("a", 0), ("b", 0), ("c", 0)]);
        h.ui.focus(h.outline.get("a"), None).expect("focus");
        h.sync();

        h.press("shift+arrowdown", EventTarget::Body);
        assert_eq!(h.sync(), ActionContextType::MultiSelectMode);
        h.press("shift+arrowdown", EventTarget::Body);
        let selection = h.ui.selection().expect("selection");
        assert_eq!(selection.selected_block_ids.len(), 3);

        h.press("tab", EventTarget::Body);
        assert_eq!(contents(&h.outline.root.children().expect("children")), vec!["a"]);
        assert_eq!(
            contents(&h.outline.get("a").children().expect("children")),
            vec!["b", "c"]
        );

        h.press("escape", EventTarget::Body);
        assert!(h.ui.selection().expect("selection").is_empty());
        assert!(h.manager.is_active(ActionContextType::NormalMode));
    }

    #[test]
    fn global_undo_and_palette_signal() {
        let mut h = harness(&[("a", 0), ("b", 0)]);
        let palette = Signal::new();
        let toggles = Rc::new(Cell::new(0));
        let counter = toggles.clone();
        palette.connect(move || counter.set(counter.get() + 1));
        h.manager
            .activate_context(
                ActionContextType::Global,
                GlobalDependencies {
                    ui: h.ui.clone(),
                    palette,
                },
            )
            .expect("global");
        h.sync();

        h.press("ctrl+k", EventTarget::Textarea);
        assert_eq!(toggles.get(), 1);

        h.outline.get("b").indent().expect("indent");
        h.press("meta+z", EventTarget::Body);
        assert_eq!(
            contents(&h.outline.root.children().expect("children")),
            vec!["a", "b"]
        );
        h.press("ctrl+shift+z", EventTarget::Body);
        assert_eq!(contents(&h.outline.root.children().expect("children")), vec!["a"]);
        assert!(h.repo.can_undo(&ChangeScope::DOCUMENT));
    }
}
