//! Script discovery from registered folders
//!
//! Each registered folder is listed non-recursively; every `.py` file becomes
//! a `ScriptEntry`. Missing or unreadable folders are skipped so a scan always
//! returns whatever it could read.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::header::parse_header_file;
use super::types::{finalize_categories, ScanResult, ScriptEntry, SCRIPT_EXTENSION};
use crate::error::LauncherError;

/// Per-folder icon directory
pub const ICON_DIR: &str = "icon";

/// Icon used when a script has no icon of its own
pub const DEFAULT_ICON: &str = "default.png";

/// Scan folders and group the scripts found by category
#[instrument(level = "debug", skip_all, fields(folder_count = folders.len()))]
pub fn scan_folders<P: AsRef<Path>>(folders: &[P]) -> ScanResult {
    let mut scripts: HashMap<String, Vec<Arc<ScriptEntry>>> = HashMap::new();

    for folder in folders {
        for entry in read_scripts_from_dir(folder.as_ref()) {
            scripts
                .entry(entry.category.clone())
                .or_default()
                .push(Arc::new(entry));
        }
    }

    let categories = finalize_categories(scripts.keys().cloned());
    debug!(
        category_count = categories.len(),
        script_count = scripts.values().map(Vec::len).sum::<usize>(),
        "Scanned script folders"
    );

    ScanResult {
        categories,
        scripts,
    }
}

/// Read the scripts directly inside one folder
pub(crate) fn read_scripts_from_dir(folder: &Path) -> Vec<ScriptEntry> {
    let dir_entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(source) => {
            let err = LauncherError::FolderUnreadable {
                path: folder.to_path_buf(),
                source: Arc::new(source),
            };
            debug!(error = %err, "Skipping folder");
            return Vec::new();
        }
    };

    let mut scripts = Vec::new();
    for dir_entry in dir_entries.flatten() {
        let path = dir_entry.path();
        if !is_script_file(&path) || !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let icon = resolve_icon(folder, stem);
        let header = parse_header_file(&path);
        scripts.push(ScriptEntry::from_header(path, header, icon));
    }
    scripts
}

/// Whether a path has the script extension
pub fn is_script_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(SCRIPT_EXTENSION)
}

/// `<folder>/icon/<stem>.png`, else `<folder>/icon/default.png`, else None
pub fn resolve_icon(folder: &Path, stem: &str) -> Option<PathBuf> {
    let icon_dir = folder.join(ICON_DIR);
    let specific = icon_dir.join(format!("{}.png", stem));
    if specific.exists() {
        return Some(specific);
    }
    let fallback = icon_dir.join(DEFAULT_ICON);
    fallback.exists().then_some(fallback)
}

/// Build an entry for an arbitrary script path, e.g. a CLI argument or a dropped file
pub fn entry_from_path(path: &Path) -> Result<ScriptEntry, LauncherError> {
    if !is_script_file(path) {
        return Err(LauncherError::NotAScript(path.to_path_buf()));
    }
    let icon = match (path.parent(), path.file_stem().and_then(|s| s.to_str())) {
        (Some(folder), Some(stem)) => resolve_icon(folder, stem),
        _ => None,
    };
    Ok(ScriptEntry::from_header(
        path.to_path_buf(),
        parse_header_file(path),
        icon,
    ))
}
