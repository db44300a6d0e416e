//! Typed block properties.
//!
//! A property is stored on the block document as a [`BlockProperty`] record
//! and read back through a [`PropertyDescriptor`], which supplies the name,
//! the default and the change scope used when writing it.

use crate::error::Result;
use crate::store::{BlockId, ChangeScope};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Object,
}

impl PropertyType {
    /// `null` is accepted for every type and reads as "unset".
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (PropertyType::String, Value::String(_)) => true,
            (PropertyType::Number, Value::Number(_)) => true,
            (PropertyType::Boolean, Value::Bool(_)) => true,
            (PropertyType::Object, Value::Object(_) | Value::Array(_)) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_scope: Option<ChangeScope>,
}

pub trait PropertyValue: Serialize + DeserializeOwned {
    const KIND: PropertyType;
}

impl PropertyValue for bool {
    const KIND: PropertyType = PropertyType::Boolean;
}

impl PropertyValue for String {
    const KIND: PropertyType = PropertyType::String;
}

impl PropertyValue for f64 {
    const KIND: PropertyType = PropertyType::Number;
}

impl PropertyValue for i64 {
    const KIND: PropertyType = PropertyType::Number;
}

impl PropertyValue for Option<String> {
    const KIND: PropertyType = PropertyType::String;
}

impl PropertyValue for Option<BlockId> {
    const KIND: PropertyType = PropertyType::String;
}

#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescriptor<T> {
    pub name: &'static str,
    pub default: T,
    pub change_scope: Option<ChangeScope>,
}

impl<T: PropertyValue> PropertyDescriptor<T> {
    pub fn new(name: &'static str, default: T) -> Self {
        Self {
            name,
            default,
            change_scope: None,
        }
    }

    pub fn scoped(mut self, scope: ChangeScope) -> Self {
        self.change_scope = Some(scope);
        self
    }

    pub fn record(&self, value: &T) -> Result<BlockProperty> {
        Ok(BlockProperty {
            name: self.name.to_string(),
            kind: T::KIND,
            value: serde_json::to_value(value)?,
            change_scope: self.change_scope.clone(),
        })
    }

    /// Decodes a stored record, falling back to the default when the record
    /// is missing or does not match the descriptor's type.
    pub fn read(&self, stored: Option<&BlockProperty>) -> T
    where
        T: Clone,
    {
        let Some(stored) = stored else {
            return self.default.clone();
        };
        if stored.kind != T::KIND || !T::KIND.accepts(&stored.value) {
            warn!(property = self.name, "stored property has unexpected type");
            return self.default.clone();
        }
        match serde_json::from_value(stored.value.clone()) {
            Ok(value) => value,
            Err(err) => {
                warn!(property = self.name, error = %err, "could not decode property");
                self.default.clone()
            }
        }
    }
}

pub fn collapsed() -> PropertyDescriptor<bool> {
    PropertyDescriptor::new("system:collapsed", false).scoped(ChangeScope::UI_STATE)
}

pub fn focused_block_id() -> PropertyDescriptor<Option<BlockId>> {
    PropertyDescriptor::new("system:focusedBlockId", None).scoped(ChangeScope::UI_STATE)
}

pub fn is_editing() -> PropertyDescriptor<bool> {
    PropertyDescriptor::new("system:isEditing", false).scoped(ChangeScope::UI_STATE)
}

pub fn editor_selection() -> PropertyDescriptor<Option<EditorSelection>> {
    PropertyDescriptor::new("system:editorSelection", None).scoped(ChangeScope::UI_STATE)
}

pub fn selection() -> PropertyDescriptor<SelectionState> {
    PropertyDescriptor::new("system:selection", SelectionState::default())
        .scoped(ChangeScope::UI_STATE)
}

pub fn top_level_block_id() -> PropertyDescriptor<Option<BlockId>> {
    PropertyDescriptor::new("system:topLevelBlockId", None).scoped(ChangeScope::UI_STATE)
}

pub fn show_properties() -> PropertyDescriptor<bool> {
    PropertyDescriptor::new("system:showProperties", false).scoped(ChangeScope::UI_STATE)
}

pub fn editing_property() -> PropertyDescriptor<Option<String>> {
    PropertyDescriptor::new("system:editingProperty", None).scoped(ChangeScope::UI_STATE)
}

/// Text cursor inside the block being edited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSelection {
    pub block_id: BlockId,
    pub start: usize,
    pub end: usize,
}

impl EditorSelection {
    pub fn caret(block_id: BlockId, offset: usize) -> Self {
        Self {
            block_id,
            start: offset,
            end: offset,
        }
    }
}

impl PropertyValue for Option<EditorSelection> {
    const KIND: PropertyType = PropertyType::Object;
}

/// Block range selection: the anchor where the selection started and the
/// validated, hierarchy-free list of selected blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    #[serde(default)]
    pub anchor_block_id: Option<BlockId>,
    #[serde(default)]
    pub selected_block_ids: Vec<BlockId>,
}

impl SelectionState {
    pub fn is_empty(&self) -> bool {
        self.selected_block_ids.is_empty()
    }
}

impl PropertyValue for SelectionState {
    const KIND: PropertyType = PropertyType::Object;
}
