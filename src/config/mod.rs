//! Configuration module - Application settings and user preferences
//!
//! This module provides functionality for:
//! - A key-value preference store abstraction (get/set with fallbacks)
//! - A JSON file-backed store at ~/.quickbox/preferences.json
//! - Typed settings (default interpreter, registered folders, UI values)
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values and preference keys
//! - `store` - `PreferenceStore` trait and its JSON / in-memory implementations
//! - `types` - Typed settings (`Settings`, `FolderSet`, `ThemeMode`)

mod defaults;
mod store;
mod types;

pub use defaults::*;
pub use store::{JsonPreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use types::{FolderSet, Settings, ThemeMode};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
