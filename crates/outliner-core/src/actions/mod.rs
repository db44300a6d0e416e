//! Keyboard action engine: contexts, bindings and dispatch.

pub mod context;
pub mod defaults;
pub mod key;
pub mod manager;

pub use context::{
    ActionContextConfig, ActionContextType, CommandPaletteDependencies, ContextDependencies,
    Dependencies, EditModeDependencies, GlobalDependencies, MultiSelectModeDependencies,
    NormalModeDependencies, PropertyEditingDependencies, SharedDraft, Signal,
};
pub use defaults::{register_default_actions, register_default_contexts, sync_mode_contexts};
pub use key::{EventOptions, EventTarget, KeyCombo, KeyEvent, Modifiers};
pub use manager::{ActionConfig, ActionHandler, ActionManager, KeyBinding, PaletteEntry};
