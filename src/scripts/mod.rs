//! Scripts module - discovery and metadata of launchable scripts
//!
//! This module provides functionality for:
//! - Parsing `#pqr` header lines from script files
//! - Scanning registered folders into a category -> entries map
//! - Holding the latest scan in a shared registry
//! - Filtering entries by name
//!
//! # Module Structure
//!
//! - `types` - Core data types (ScriptEntry, ScanResult)
//! - `header` - Header comment parsing (both dialects)
//! - `loader` - Folder scanning and icon lookup
//! - `registry` - Shared, wholesale-replaced scan state
//! - `search` - Name filtering

mod header;
mod loader;
mod registry;
mod search;
mod types;

pub use header::{
    classify_marker_line, is_marker_line, parse_header_file, parse_header_str,
    read_header_source, LegacyField, MarkerLine, ScriptHeader, MARKER,
};
pub use loader::{
    entry_from_path, is_script_file, resolve_icon, scan_folders, DEFAULT_ICON, ICON_DIR,
};
pub use registry::Registry;
pub use search::filter_entries;
pub use types::{ScanResult, ScriptEntry, ALL_CATEGORY, SCRIPT_EXTENSION, UNCATEGORIZED};

#[cfg(test)]
pub(crate) use search::contains_ignore_case;
#[cfg(test)]
pub(crate) use types::finalize_categories;

#[cfg(test)]
#[path = "../scripts_tests.rs"]
mod tests;
