//! Key-value preference stores
//!
//! The launcher only needs get/set of strings, floats and booleans with
//! fallbacks. `JsonPreferenceStore` keeps them in a flat JSON object on disk;
//! `MemoryPreferenceStore` keeps them in memory for tests and throwaway runs.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use super::defaults::{DEFAULT_PREFERENCES_PATH, PREFERENCES_PATH_ENV};

/// Opaque key-value preference store
pub trait PreferenceStore: Send {
    fn string(&self, key: &str) -> Option<String>;
    fn float(&self, key: &str) -> Option<f64>;
    fn bool(&self, key: &str) -> Option<bool>;

    fn set_string(&mut self, key: &str, value: &str);
    fn set_float(&mut self, key: &str, value: f64);
    fn set_bool(&mut self, key: &str, value: bool);

    /// Persist pending changes
    fn save(&mut self) -> Result<()>;

    /// Re-read values another process may have written. In-memory stores have nothing to do.
    fn reload(&mut self) -> Result<()> {
        Ok(())
    }

    fn string_with_fallback(&self, key: &str, fallback: &str) -> String {
        self.string(key).unwrap_or_else(|| fallback.to_string())
    }

    fn float_with_fallback(&self, key: &str, fallback: f64) -> f64 {
        self.float(key).unwrap_or(fallback)
    }

    fn bool_with_fallback(&self, key: &str, fallback: bool) -> bool {
        self.bool(key).unwrap_or(fallback)
    }
}

fn value_as_string(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn float_value(value: f64) -> Value {
    // NaN/infinite can't be represented in JSON
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

// ============================================
// JSON FILE STORE
// ============================================

/// Preference store persisted as a flat JSON object
#[derive(Debug, Clone)]
pub struct JsonPreferenceStore {
    values: Map<String, Value>,
    file_path: PathBuf,
    dirty: bool,
}

impl JsonPreferenceStore {
    /// Create an empty store at the default path (honours `QUICKBOX_PREFS`)
    pub fn new() -> Self {
        Self::with_path(Self::default_path())
    }

    /// Create an empty store at a custom path
    pub fn with_path(path: PathBuf) -> Self {
        JsonPreferenceStore {
            values: Map::new(),
            file_path: path,
            dirty: false,
        }
    }

    /// Create a store at `path` and load it
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut store = Self::with_path(path);
        store.load()?;
        Ok(store)
    }

    pub fn default_path() -> PathBuf {
        match std::env::var(PREFERENCES_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                PathBuf::from(shellexpand::tilde(&path).as_ref())
            }
            _ => PathBuf::from(shellexpand::tilde(DEFAULT_PREFERENCES_PATH).as_ref()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Load preferences from disk. A missing file is an empty store.
    #[instrument(name = "preferences_load", skip(self), fields(path = %self.file_path.display()))]
    pub fn load(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            info!("Preferences file not found, starting fresh");
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.file_path).with_context(|| {
            format!("Failed to read preferences file: {}", self.file_path.display())
        })?;

        self.values = if content.trim().is_empty() {
            Map::new()
        } else {
            serde_json::from_str(&content).with_context(|| "Failed to parse preferences JSON")?
        };

        debug!(key_count = self.values.len(), "Loaded preferences");
        self.dirty = false;
        Ok(())
    }

    fn set(&mut self, key: &str, value: Value) {
        if self.values.get(key) != Some(&value) {
            self.values.insert(key.to_string(), value);
            self.dirty = true;
        }
    }
}

impl Default for JsonPreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn string(&self, key: &str) -> Option<String> {
        value_as_string(self.values.get(key))
    }

    fn float(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.set(key, Value::String(value.to_string()));
    }

    fn set_float(&mut self, key: &str, value: f64) {
        self.set(key, float_value(value));
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, Value::Bool(value));
    }

    fn reload(&mut self) -> Result<()> {
        self.load()
    }

    /// Save using atomic write (write temp + rename)
    #[instrument(name = "preferences_save", skip(self), fields(path = %self.file_path.display()))]
    fn save(&mut self) -> Result<()> {
        if !self.dirty {
            debug!("No preference changes to save");
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&self.values)
            .context("Failed to serialize preferences")?;

        let temp_path = self.file_path.with_extension("json.tmp");
        std::fs::write(&temp_path, &json).with_context(|| {
            format!("Failed to write temp preferences file: {}", temp_path.display())
        })?;
        std::fs::rename(&temp_path, &self.file_path).with_context(|| {
            format!("Failed to rename temp file to {}", self.file_path.display())
        })?;

        info!(key_count = self.values.len(), bytes = json.len(), "Saved preferences (atomic)");
        self.dirty = false;
        Ok(())
    }
}

// ============================================
// IN-MEMORY STORE
// ============================================

/// Preference store that never touches disk
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferenceStore {
    values: Map<String, Value>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn string(&self, key: &str) -> Option<String> {
        value_as_string(self.values.get(key))
    }

    fn float(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.values
            .insert(key.to_string(), Value::String(value.to_string()));
    }

    fn set_float(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), float_value(value));
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), Value::Bool(value));
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }
}
