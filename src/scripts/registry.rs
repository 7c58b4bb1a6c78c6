//! Shared registry state
//!
//! The registry holds the result of the latest scan. A rebuild replaces the
//! whole state; nothing mutates it piecemeal. Rebuilds may race (manual
//! refresh vs. watcher) and the last one to finish wins.

use parking_lot::RwLock;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::loader::scan_folders;
use super::types::{ScanResult, ScriptEntry};
use crate::logging;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    state: Arc<RwLock<ScanResult>>,
    generation: Arc<AtomicU64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `folders` and replace the current state with the result
    pub fn rebuild<P: AsRef<Path>>(&self, folders: &[P], trigger: &str) -> ScanResult {
        let start = Instant::now();
        let result = scan_folders(folders);
        *self.state.write() = result.clone();
        self.generation.fetch_add(1, Ordering::SeqCst);

        logging::log_scan_event(
            trigger,
            folders.len(),
            result.len(),
            start.elapsed().as_millis() as u64,
        );
        result
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ScanResult {
        self.state.read().clone()
    }

    pub fn categories(&self) -> Vec<String> {
        self.state.read().categories.clone()
    }

    pub fn entries_in(&self, category: &str) -> Vec<Arc<ScriptEntry>> {
        self.state.read().entries_in(category)
    }

    /// Number of completed rebuilds
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
