//! The action manager: registered contexts, actions and bindings, the set
//! of active contexts, and key event dispatch.
//!
//! Handlers run while the manager is borrowed. They act on the blocks and
//! UI state in their dependency bag; mode switches are expressed through
//! UI state and applied to the manager by the host afterwards (see
//! [`super::defaults::sync_mode_contexts`]).

use super::context::{ActionContextConfig, ActionContextType, ContextDependencies, Dependencies};
use super::key::{EventOptions, KeyCombo, KeyEvent};
use crate::error::{Error, Result, ValidationPhase};
use crate::settings::KeybindingOverride;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

pub type ActionHandler = Rc<dyn Fn(&ContextDependencies, Option<&KeyEvent>) -> Result<()>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBinding {
    pub action: String,
    pub keys: Vec<String>,
    pub event_options: EventOptions,
}

impl KeyBinding {
    pub fn new(action: impl Into<String>, keys: &[&str]) -> Self {
        Self {
            action: action.into(),
            keys: keys.iter().map(|key| key.to_string()).collect(),
            event_options: EventOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EventOptions) -> Self {
        self.event_options = options;
        self
    }
}

#[derive(Clone)]
pub struct ActionConfig {
    pub id: String,
    pub name: String,
    pub context: ActionContextType,
    pub default_keys: Vec<String>,
    pub default_event_options: EventOptions,
    pub hide_from_command_palette: bool,
    handler: ActionHandler,
}

impl ActionConfig {
    /// Builds an action for the context whose dependency type is `D`.
    pub fn new<D: Dependencies>(
        id: impl Into<String>,
        name: impl Into<String>,
        handler: impl Fn(&D, Option<&KeyEvent>) -> Result<()> + 'static,
    ) -> Self {
        let handler: ActionHandler = Rc::new(move |bag, event| {
            let deps = D::from_bag(bag).ok_or(Error::InvalidDependencies {
                context: D::CONTEXT,
                phase: ValidationPhase::Dispatch,
            })?;
            handler(deps, event)
        });
        Self {
            id: id.into(),
            name: name.into(),
            context: D::CONTEXT,
            default_keys: Vec::new(),
            default_event_options: EventOptions::default(),
            hide_from_command_palette: false,
            handler,
        }
    }

    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.default_keys = keys.iter().map(|key| key.to_string()).collect();
        self
    }

    pub fn with_event_options(mut self, options: EventOptions) -> Self {
        self.default_event_options = options;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hide_from_command_palette = true;
        self
    }

    pub fn handler(&self) -> &ActionHandler {
        &self.handler
    }
}

impl fmt::Debug for ActionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("context", &self.context)
            .field("default_keys", &self.default_keys)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaletteEntry {
    pub id: String,
    pub name: String,
    pub context: ActionContextType,
    pub keys: Vec<String>,
    pub active: bool,
}

#[derive(Clone, Debug)]
struct RegisteredBinding {
    action: String,
    combos: Vec<KeyCombo>,
    options: EventOptions,
}

impl RegisteredBinding {
    fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.combos.iter().map(KeyCombo::to_string).collect();
        keys.sort();
        keys
    }
}

/// One wired (action, key) listener.
#[derive(Clone, Debug)]
struct KeyListener {
    action: String,
    combo: KeyCombo,
    options: EventOptions,
}

#[derive(Default)]
pub struct ActionManager {
    contexts: HashMap<ActionContextType, ActionContextConfig>,
    actions: HashMap<String, ActionConfig>,
    action_order: Vec<String>,
    bindings: Vec<RegisteredBinding>,
    active: HashMap<ActionContextType, ContextDependencies>,
    listeners: Vec<KeyListener>,
}

impl ActionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_context(&mut self, config: ActionContextConfig) {
        if self.contexts.contains_key(&config.context) {
            info!(context = %config.context, "overwriting action context");
        }
        self.contexts.insert(config.context, config);
    }

    pub fn register_action(&mut self, action: ActionConfig) -> Result<()> {
        let id = action.id.clone();
        let default_binding = (!action.default_keys.is_empty()).then(|| KeyBinding {
            action: id.clone(),
            keys: action.default_keys.clone(),
            event_options: action.default_event_options,
        });
        if self.actions.insert(id.clone(), action).is_some() {
            info!(action = %id, "overwriting action");
        } else {
            self.action_order.push(id);
        }
        if let Some(binding) = default_binding {
            self.register_binding(binding)?;
        }
        Ok(())
    }

    pub fn register_binding(&mut self, binding: KeyBinding) -> Result<()> {
        let context = self
            .actions
            .get(&binding.action)
            .map(|action| action.context)
            .ok_or_else(|| Error::UnknownAction(binding.action.clone()))?;
        let combos = binding
            .keys
            .iter()
            .map(|key| KeyCombo::parse(key))
            .collect::<Result<Vec<_>>>()?;
        let registered = RegisteredBinding {
            action: binding.action,
            combos,
            options: binding.event_options,
        };

        let keys = registered.sorted_keys();
        let duplicate = self.bindings.iter().any(|existing| {
            existing.action == registered.action && existing.sorted_keys() == keys
        });
        if duplicate {
            debug!(action = %registered.action, ?keys, "skipping duplicate binding");
            return Ok(());
        }

        if self.active.contains_key(&context) {
            self.wire(&registered);
        }
        self.bindings.push(registered);
        Ok(())
    }

    pub fn apply_keybinding_overrides(&mut self, overrides: &[KeybindingOverride]) -> Result<()> {
        for entry in overrides {
            self.register_binding(KeyBinding {
                action: entry.action.clone(),
                keys: entry.keys.clone(),
                event_options: EventOptions {
                    prevent_default: entry.prevent_default,
                    stop_propagation: entry.stop_propagation,
                },
            })?;
        }
        Ok(())
    }

    /// Activates `context` with `dependencies`, replacing any earlier
    /// activation of the same context.
    pub fn activate_context(
        &mut self,
        context: ActionContextType,
        dependencies: impl Into<ContextDependencies>,
    ) -> Result<()> {
        let dependencies = dependencies.into();
        let config = self
            .contexts
            .get(&context)
            .ok_or(Error::UnknownContext(context))?;
        if !config.validate(&dependencies) {
            return Err(Error::InvalidDependencies {
                context,
                phase: ValidationPhase::Activation,
            });
        }

        self.deactivate_context(context);
        self.active.insert(context, dependencies);
        let bindings: Vec<RegisteredBinding> = self
            .bindings
            .iter()
            .filter(|binding| self.context_of(&binding.action) == Some(context))
            .cloned()
            .collect();
        for binding in &bindings {
            self.wire(binding);
        }
        debug!(%context, listeners = self.listeners.len(), "activated context");
        Ok(())
    }

    pub fn deactivate_context(&mut self, context: ActionContextType) -> bool {
        if self.active.remove(&context).is_none() {
            return false;
        }
        let actions = &self.actions;
        self.listeners.retain(|listener| {
            actions.get(&listener.action).map(|action| action.context) != Some(context)
        });
        debug!(%context, "deactivated context");
        true
    }

    /// Deactivates everything and drops all key listeners.
    pub fn shutdown(&mut self) {
        self.active.clear();
        self.listeners.clear();
        debug!("action manager shut down");
    }

    pub fn is_active(&self, context: ActionContextType) -> bool {
        self.active.contains_key(&context)
    }

    pub fn active_contexts(&self) -> Vec<ActionContextType> {
        let mut contexts: Vec<ActionContextType> = self.active.keys().copied().collect();
        contexts.sort();
        contexts
    }

    pub fn dependencies(&self, context: ActionContextType) -> Option<&ContextDependencies> {
        self.active.get(&context)
    }

    pub fn action(&self, id: &str) -> Option<&ActionConfig> {
        self.actions.get(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Key combinations bound to `action`, in registration order.
    pub fn keys_for(&self, action: &str) -> Vec<String> {
        self.bindings
            .iter()
            .filter(|binding| binding.action == action)
            .flat_map(|binding| binding.combos.iter().map(KeyCombo::to_string))
            .collect()
    }

    /// Dispatches `event` to every wired listener for its key combination.
    /// Returns how many handlers ran.
    pub fn handle_key_event(&self, event: &mut KeyEvent) -> Result<usize> {
        if !self.passes_editable_filter(event) {
            debug!(key = %event.combo, "suppressed single-key shortcut in editable target");
            return Ok(0);
        }
        let listeners: Vec<&KeyListener> = self
            .listeners
            .iter()
            .filter(|listener| listener.combo == event.combo)
            .collect();

        let mut handled = 0;
        for listener in listeners {
            let Some(action) = self.actions.get(&listener.action) else {
                continue;
            };
            let Some(config) = self.contexts.get(&action.context) else {
                continue;
            };
            let Some(dependencies) = self.active.get(&action.context) else {
                continue;
            };
            if !config.validate(dependencies) {
                return Err(Error::InvalidDependencies {
                    context: action.context,
                    phase: ValidationPhase::Dispatch,
                });
            }

            let options = listener
                .options
                .or(config.default_event_options)
                .or(EventOptions::GLOBAL_DEFAULT);
            if options.stop_propagation == Some(true) {
                event.stop_propagation();
            }
            if options.prevent_default == Some(true) {
                event.prevent_default();
            }

            debug!(action = %action.id, key = %event.combo, "running action");
            if let Err(err) = (action.handler)(dependencies, Some(&*event)) {
                warn!(action = %action.id, error = %err, "action handler failed");
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Actions offered by the command palette, in registration order.
    pub fn palette_actions(&self) -> Vec<PaletteEntry> {
        self.action_order
            .iter()
            .filter_map(|id| self.actions.get(id))
            .filter(|action| !action.hide_from_command_palette)
            .map(|action| PaletteEntry {
                id: action.id.clone(),
                name: action.name.clone(),
                context: action.context,
                keys: self.keys_for(&action.id),
                active: self.is_active(action.context),
            })
            .collect()
    }

    /// Runs `id` outside of key dispatch, e.g. from the command palette.
    pub fn run_action(&self, id: &str) -> Result<()> {
        let action = self
            .actions
            .get(id)
            .ok_or_else(|| Error::UnknownAction(id.to_string()))?;
        let dependencies = self
            .active
            .get(&action.context)
            .ok_or(Error::ContextInactive(action.context))?;
        let config = self
            .contexts
            .get(&action.context)
            .ok_or(Error::UnknownContext(action.context))?;
        if !config.validate(dependencies) {
            return Err(Error::InvalidDependencies {
                context: action.context,
                phase: ValidationPhase::Dispatch,
            });
        }
        (action.handler)(dependencies, None)
    }

    fn context_of(&self, action: &str) -> Option<ActionContextType> {
        self.actions.get(action).map(|action| action.context)
    }

    /// Single-key shortcuts are ignored in editable targets unless an
    /// active context's filter accepts the event.
    fn passes_editable_filter(&self, event: &KeyEvent) -> bool {
        if !(event.target.is_editable() && event.combo.is_single_key()) {
            return true;
        }
        self.active
            .keys()
            .filter_map(|context| self.contexts.get(context))
            .any(|config| config.accepts_editable(event))
    }

    fn wire(&mut self, binding: &RegisteredBinding) {
        for combo in &binding.combos {
            let wired = self
                .listeners
                .iter()
                .any(|listener| listener.action == binding.action && &listener.combo == combo);
            if wired {
                continue;
            }
            self.listeners.push(KeyListener {
                action: binding.action.clone(),
                combo: combo.clone(),
                options: binding.options,
            });
        }
    }
}
