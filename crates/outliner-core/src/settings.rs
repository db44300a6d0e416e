use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Extra key combinations for a registered action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeybindingOverride {
    pub action: String,
    pub keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_propagation: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub user_id: String,
    pub content_debounce_ms: u64,
    pub keybindings: Vec<KeybindingOverride>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            content_debounce_ms: DEFAULT_DEBOUNCE_MS,
            keybindings: Vec::new(),
        }
    }
}

impl Settings {
    pub fn content_debounce(&self) -> Duration {
        Duration::from_millis(self.content_debounce_ms)
    }
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_store() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("app", "outliner", "Outliner").ok_or(Error::ProjectDir)?;
        Ok(Self::new(project_dirs.config_dir().join("settings.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    /// Loads settings, assigning and persisting a user id on first run.
    pub fn load_or_init(&self) -> Result<Settings> {
        let mut settings = self.load()?;
        if settings.user_id.is_empty() {
            settings.user_id = Uuid::new_v4().to_string();
            self.save(&settings)?;
        }
        Ok(settings)
    }
}
