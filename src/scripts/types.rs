//! Script entry and scan result types

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::header::ScriptHeader;

/// File extension of launchable scripts
pub const SCRIPT_EXTENSION: &str = "py";

/// Category assigned when a script declares none
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Pseudo-category selecting every entry
pub const ALL_CATEGORY: &str = "All";

/// A discovered script together with its parsed metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    /// File name without the extension
    pub name: String,
    pub path: PathBuf,
    /// Never empty - falls back to "Uncategorized"
    pub category: String,
    pub icon: Option<PathBuf>,
    pub interp_mac: String,
    pub interp_win: String,
    pub interp_linux: String,
    /// Legacy / default interpreter from `def=`
    pub interp_default: String,
    pub terminal: bool,
}

impl ScriptEntry {
    pub fn from_header(path: PathBuf, header: ScriptHeader, icon: Option<PathBuf>) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let category = if header.category.trim().is_empty() {
            UNCATEGORIZED.to_string()
        } else {
            header.category
        };

        ScriptEntry {
            name,
            path,
            category,
            icon,
            interp_mac: header.interp_mac,
            interp_win: header.interp_win,
            interp_linux: header.interp_linux,
            interp_default: header.interp_default,
            terminal: header.terminal,
        }
    }

    /// The metadata portion of this entry, e.g. as a starting point for edits
    pub fn header(&self) -> ScriptHeader {
        ScriptHeader {
            category: self.category.clone(),
            interp_mac: self.interp_mac.clone(),
            interp_win: self.interp_win.clone(),
            interp_linux: self.interp_linux.clone(),
            terminal: self.terminal,
            interp_default: self.interp_default.clone(),
        }
    }
}

/// Result of one full scan: category -> entries, plus the display order of categories
#[derive(Clone, Debug, Default)]
pub struct ScanResult {
    /// Alphabetical, with "Uncategorized" moved to the end
    pub categories: Vec<String>,
    pub scripts: HashMap<String, Vec<Arc<ScriptEntry>>>,
}

impl ScanResult {
    /// Entries of a category sorted case-insensitively by name.
    /// `ALL_CATEGORY` returns every entry.
    pub fn entries_in(&self, category: &str) -> Vec<Arc<ScriptEntry>> {
        if category == ALL_CATEGORY {
            return self.all_entries();
        }
        let mut entries = self.scripts.get(category).cloned().unwrap_or_default();
        sort_by_name(&mut entries);
        entries
    }

    /// Every entry, category by category in display order
    pub fn all_entries(&self) -> Vec<Arc<ScriptEntry>> {
        self.categories
            .iter()
            .flat_map(|category| self.entries_in(category))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scripts.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find an entry by name, case-insensitively. First match in display order wins.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<ScriptEntry>> {
        let wanted = name.to_lowercase();
        self.all_entries()
            .into_iter()
            .find(|entry| entry.name.to_lowercase() == wanted)
    }

    pub fn find_by_path(&self, path: &std::path::Path) -> Option<Arc<ScriptEntry>> {
        self.scripts
            .values()
            .flatten()
            .find(|entry| entry.path == path)
            .cloned()
    }
}

pub(crate) fn sort_by_name(entries: &mut [Arc<ScriptEntry>]) {
    entries.sort_by_cached_key(|entry| entry.name.to_lowercase());
}

/// Sort categories alphabetically and relocate "Uncategorized" to the end
pub(crate) fn finalize_categories<I>(categories: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut sorted: Vec<String> = categories.into_iter().collect();
    sorted.sort();
    sorted.dedup();

    let before = sorted.len();
    sorted.retain(|c| c != UNCATEGORIZED);
    if sorted.len() != before {
        sorted.push(UNCATEGORIZED.to_string());
    }
    sorted
}
