//! Typed settings built on top of the preference store

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::defaults::*;
use super::store::PreferenceStore;

// ============================================
// THEME MODE
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Dark,
    Light,
    #[default]
    System,
}

impl ThemeMode {
    /// Parse a stored value; unknown values fall back to `System`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "dark" => ThemeMode::Dark,
            "light" => ThemeMode::Light,
            _ => ThemeMode::System,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Dark => "dark",
            ThemeMode::Light => "light",
            ThemeMode::System => "system",
        }
    }
}

// ============================================
// FOLDER SET
// ============================================

/// Ordered set of registered root folders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderSet {
    folders: Vec<PathBuf>,
}

impl FolderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from paths, dropping later duplicates
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut set = Self::new();
        for path in paths {
            set.add(path);
        }
        set
    }

    /// Append a folder. Returns false if it was already registered.
    pub fn add(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.contains(&path) {
            return false;
        }
        self.folders.push(path);
        true
    }

    /// Remove a folder. Returns false if it was not registered.
    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.folders.len();
        self.folders.retain(|f| f != path);
        self.folders.len() != before
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.folders.iter().any(|f| f == path)
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.folders
    }

    pub fn to_vec(&self) -> Vec<PathBuf> {
        self.folders.clone()
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Serialize as a JSON array of strings
    pub fn to_json(&self) -> String {
        let strings: Vec<String> = self
            .folders
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        serde_json::to_string(&strings).unwrap_or_else(|_| "[]".to_string())
    }

    /// Parse a JSON array of strings
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let strings: Vec<String> = serde_json::from_str(json)?;
        Ok(Self::from_paths(strings))
    }
}

// ============================================
// SETTINGS
// ============================================

/// Application settings read from and written to a `PreferenceStore`
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Application-wide default interpreter (empty = unset)
    pub default_interpreter: String,
    pub folders: FolderSet,
    pub icon_size: f64,
    pub font_size: f64,
    pub ui_scale: f64,
    pub theme_mode: ThemeMode,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_interpreter: DEFAULT_PYTHON_PATH.to_string(),
            folders: FolderSet::new(),
            icon_size: DEFAULT_ICON_SIZE,
            font_size: DEFAULT_FONT_SIZE,
            ui_scale: DEFAULT_UI_SCALE,
            theme_mode: ThemeMode::System,
        }
    }
}

impl Settings {
    /// Load settings, substituting defaults for anything missing or malformed
    pub fn load(store: &dyn PreferenceStore) -> Self {
        let folders = match store.string(KEY_REGISTERED_FOLDERS) {
            Some(json) if !json.trim().is_empty() => match FolderSet::from_json(&json) {
                Ok(folders) => folders,
                Err(e) => {
                    warn!(error = %e, "Registered folder list is not valid JSON, starting empty");
                    FolderSet::new()
                }
            },
            _ => FolderSet::new(),
        };

        Settings {
            default_interpreter: store.string_with_fallback(KEY_PYTHON_PATH, DEFAULT_PYTHON_PATH),
            folders,
            icon_size: store.float_with_fallback(KEY_ICON_SIZE, DEFAULT_ICON_SIZE),
            font_size: store.float_with_fallback(KEY_FONT_SIZE, DEFAULT_FONT_SIZE),
            ui_scale: store.float_with_fallback(KEY_UI_SCALE, DEFAULT_UI_SCALE),
            theme_mode: ThemeMode::parse(
                &store.string_with_fallback(KEY_THEME_MODE, ThemeMode::System.as_str()),
            ),
        }
    }

    /// Write every setting back into the store (the caller decides when to persist)
    pub fn save(&self, store: &mut dyn PreferenceStore) {
        store.set_string(KEY_PYTHON_PATH, &self.default_interpreter);
        store.set_float(KEY_ICON_SIZE, self.icon_size);
        store.set_float(KEY_FONT_SIZE, self.font_size);
        store.set_float(KEY_UI_SCALE, self.ui_scale);
        store.set_string(KEY_THEME_MODE, self.theme_mode.as_str());
        store.set_string(KEY_REGISTERED_FOLDERS, &self.folders.to_json());
    }
}
