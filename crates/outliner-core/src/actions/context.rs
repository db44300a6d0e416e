//! Action contexts and the dependency bags they are activated with.

use super::key::{EventOptions, EventTarget, KeyEvent};
use crate::block::Block;
use crate::draft::ContentDraft;
use crate::ui_state::UiState;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionContextType {
    Global,
    NormalMode,
    EditMode,
    PropertyEditing,
    CommandPalette,
    MultiSelectMode,
}

impl ActionContextType {
    pub const ALL: [ActionContextType; 6] = [
        ActionContextType::Global,
        ActionContextType::NormalMode,
        ActionContextType::EditMode,
        ActionContextType::PropertyEditing,
        ActionContextType::CommandPalette,
        ActionContextType::MultiSelectMode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionContextType::Global => "global",
            ActionContextType::NormalMode => "normal-mode",
            ActionContextType::EditMode => "edit-mode",
            ActionContextType::PropertyEditing => "property-editing",
            ActionContextType::CommandPalette => "command-palette",
            ActionContextType::MultiSelectMode => "multi-select-mode",
        }
    }
}

impl fmt::Display for ActionContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fire-and-forget notification shared between the engine and UI chrome,
/// e.g. "toggle the command palette".
#[derive(Clone, Default)]
pub struct Signal {
    slots: Rc<RefCell<Vec<Rc<dyn Fn()>>>>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, slot: impl Fn() + 'static) {
        self.slots.borrow_mut().push(Rc::new(slot));
    }

    pub fn emit(&self) {
        let slots: Vec<Rc<dyn Fn()>> = self.slots.borrow().clone();
        for slot in slots {
            slot();
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.slots.borrow().len())
            .finish()
    }
}

pub type SharedDraft = Rc<RefCell<ContentDraft>>;

#[derive(Clone, Debug)]
pub struct GlobalDependencies {
    pub ui: UiState,
    pub palette: Signal,
}

#[derive(Clone, Debug)]
pub struct NormalModeDependencies {
    pub ui: UiState,
    pub top_level: Block,
}

#[derive(Clone)]
pub struct EditModeDependencies {
    pub ui: UiState,
    pub block: Block,
    pub top_level: Block,
    pub draft: Option<SharedDraft>,
}

impl EditModeDependencies {
    /// Commits buffered keystrokes so reads see the latest text.
    pub fn flush_draft(&self) -> crate::error::Result<()> {
        if let Some(draft) = &self.draft {
            draft.borrow_mut().flush()?;
        }
        Ok(())
    }
}

impl fmt::Debug for EditModeDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditModeDependencies")
            .field("ui", &self.ui)
            .field("block", &self.block)
            .field("top_level", &self.top_level)
            .field("draft", &self.draft.is_some())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct PropertyEditingDependencies {
    pub ui: UiState,
    pub block: Block,
    pub property: String,
}

#[derive(Clone, Debug)]
pub struct CommandPaletteDependencies {
    pub palette: Signal,
}

#[derive(Clone, Debug)]
pub struct MultiSelectModeDependencies {
    pub ui: UiState,
    pub top_level: Block,
}

/// Live dependencies of an active context, one variant per context.
#[derive(Clone, Debug)]
pub enum ContextDependencies {
    Global(GlobalDependencies),
    NormalMode(NormalModeDependencies),
    EditMode(EditModeDependencies),
    PropertyEditing(PropertyEditingDependencies),
    CommandPalette(CommandPaletteDependencies),
    MultiSelectMode(MultiSelectModeDependencies),
}

impl ContextDependencies {
    pub fn context_type(&self) -> ActionContextType {
        match self {
            ContextDependencies::Global(_) => ActionContextType::Global,
            ContextDependencies::NormalMode(_) => ActionContextType::NormalMode,
            ContextDependencies::EditMode(_) => ActionContextType::EditMode,
            ContextDependencies::PropertyEditing(_) => ActionContextType::PropertyEditing,
            ContextDependencies::CommandPalette(_) => ActionContextType::CommandPalette,
            ContextDependencies::MultiSelectMode(_) => ActionContextType::MultiSelectMode,
        }
    }
}

/// Typed view of one [`ContextDependencies`] variant.
pub trait Dependencies: 'static {
    const CONTEXT: ActionContextType;

    fn from_bag(bag: &ContextDependencies) -> Option<&Self>;
}

macro_rules! dependencies {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl Dependencies for $ty {
                const CONTEXT: ActionContextType = ActionContextType::$variant;

                fn from_bag(bag: &ContextDependencies) -> Option<&Self> {
                    match bag {
                        ContextDependencies::$variant(deps) => Some(deps),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for ContextDependencies {
                fn from(deps: $ty) -> Self {
                    ContextDependencies::$variant(deps)
                }
            }
        )*
    };
}

dependencies! {
    Global => GlobalDependencies,
    NormalMode => NormalModeDependencies,
    EditMode => EditModeDependencies,
    PropertyEditing => PropertyEditingDependencies,
    CommandPalette => CommandPaletteDependencies,
    MultiSelectMode => MultiSelectModeDependencies,
}

/// Default validator: the bag must be the context's own variant and every
/// block it references must still exist.
pub fn validate_dependencies(context: ActionContextType, bag: &ContextDependencies) -> bool {
    if bag.context_type() != context {
        return false;
    }
    match bag {
        ContextDependencies::Global(deps) => deps.ui.block().exists(),
        ContextDependencies::NormalMode(deps) => {
            deps.ui.block().exists() && deps.top_level.exists()
        }
        ContextDependencies::EditMode(deps) => {
            deps.ui.block().exists() && deps.block.exists() && deps.top_level.exists()
        }
        ContextDependencies::PropertyEditing(deps) => {
            deps.ui.block().exists() && deps.block.exists() && !deps.property.is_empty()
        }
        ContextDependencies::CommandPalette(_) => true,
        ContextDependencies::MultiSelectMode(deps) => {
            deps.ui.block().exists() && deps.top_level.exists()
        }
    }
}

pub type EventFilter = Rc<dyn Fn(&KeyEvent) -> bool>;
pub type Validator = Rc<dyn Fn(&ContextDependencies) -> bool>;

#[derive(Clone)]
pub struct ActionContextConfig {
    pub context: ActionContextType,
    pub display_name: String,
    pub default_event_options: EventOptions,
    /// Opts single-key shortcuts back in for editable targets it accepts.
    pub event_filter: Option<EventFilter>,
    pub validator: Validator,
}

impl ActionContextConfig {
    pub fn new(context: ActionContextType, display_name: impl Into<String>) -> Self {
        Self {
            context,
            display_name: display_name.into(),
            default_event_options: EventOptions::default(),
            event_filter: None,
            validator: Rc::new(move |bag| validate_dependencies(context, bag)),
        }
    }

    pub fn with_event_options(mut self, options: EventOptions) -> Self {
        self.default_event_options = options;
        self
    }

    pub fn with_event_filter(mut self, filter: impl Fn(&KeyEvent) -> bool + 'static) -> Self {
        self.event_filter = Some(Rc::new(filter));
        self
    }

    /// Accepts single-key events whose target is `target`.
    pub fn allow_target(self, target: EventTarget) -> Self {
        self.with_event_filter(move |event| event.target == target)
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&ContextDependencies) -> bool + 'static,
    ) -> Self {
        self.validator = Rc::new(validator);
        self
    }

    pub fn validate(&self, bag: &ContextDependencies) -> bool {
        (self.validator)(bag)
    }

    pub fn accepts_editable(&self, event: &KeyEvent) -> bool {
        self.event_filter
            .as_ref()
            .is_some_and(|filter| filter(event))
    }
}

impl fmt::Debug for ActionContextConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContextConfig")
            .field("context", &self.context)
            .field("display_name", &self.display_name)
            .field("default_event_options", &self.default_event_options)
            .field("event_filter", &self.event_filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{build_outline, ui_state};
    use crate::repo::Repo;
    use std::cell::Cell;

    #[test]
    fn context_names_are_kebab_case() {
        let names: Vec<&str> = ActionContextType::ALL
            .iter()
            .map(ActionContextType::as_str)
            .collect();
        assert_eq!(
            names,
            vec![
                "global",
                "normal-mode",
                "edit-mode",
                "property-editing",
                "command-palette",
                "multi-select-mode"
            ]
        );
        assert_eq!(
            serde_json::to_value(ActionContextType::EditMode).expect("json"),
            "edit-mode"
        );
    }

    #[test]
    fn validator_rejects_foreign_variants_and_stale_blocks() {
        let repo = Repo::new("tester");
        let outline = build_outline(&repo, &[("a", 0)]);
        let ui = ui_state(&repo);
        let normal: ContextDependencies = NormalModeDependencies {
            ui: ui.clone(),
            top_level: outline.root.clone(),
        }
        .into();
        assert!(validate_dependencies(ActionContextType::NormalMode, &normal));
        assert!(!validate_dependencies(ActionContextType::EditMode, &normal));

        let orphan = repo.create_root("orphan").expect("orphan");
        let edit: ContextDependencies = EditModeDependencies {
            ui: ui.clone(),
            block: orphan,
            top_level: outline.root.clone(),
            draft: None,
        }
        .into();
        assert!(validate_dependencies(ActionContextType::EditMode, &edit));
        repo.sweep_unreachable(&[outline.root.id().clone(), ui.block().id().clone()])
            .expect("sweep");
        assert!(ui.block().exists());
        assert!(!validate_dependencies(ActionContextType::EditMode, &edit));
    }

    #[test]
    fn typed_views_match_their_variant() {
        let bag: ContextDependencies = CommandPaletteDependencies {
            palette: Signal::new(),
        }
        .into();
        assert!(CommandPaletteDependencies::from_bag(&bag).is_some());
        assert!(GlobalDependencies::from_bag(&bag).is_none());
    }

    #[test]
    fn signal_reaches_every_slot() {
        let signal = Signal::new();
        let hits = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let hits = hits.clone();
            signal.connect(move || hits.set(hits.get() + 1));
        }
        signal.clone().emit();
        assert_eq!(hits.get(), 2);
    }
}
