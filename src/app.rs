//! Application context
//!
//! `AppContext` ties preferences, the registry and the dispatcher together.
//! Front ends hold one context and call into it; nothing here is global.
//! While watching, the context keeps the folder watcher in step with the
//! registered folders.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::{PreferenceStore, Settings};
use crate::error::{LauncherError, Result};
use crate::executor::{Dispatcher, LaunchHandle, LaunchReport};
use crate::metadata_writer::write_header;
use crate::scripts::{
    entry_from_path, is_script_file, Registry, ScanResult, ScriptEntry, ScriptHeader,
};
use crate::watcher::{ScriptReloadEvent, ScriptWatcher, DEBOUNCE_MS};

pub struct AppContext {
    store: Box<dyn PreferenceStore>,
    settings: Settings,
    registry: Registry,
    dispatcher: Dispatcher,
    watcher: Option<ScriptWatcher>,
    debounce_ms: u64,
}

impl AppContext {
    /// Load settings from `store` and build the registry and dispatcher.
    /// `echo_output` selects foreground over background launches.
    pub fn new(
        store: Box<dyn PreferenceStore>,
        echo_output: bool,
    ) -> (Self, async_channel::Receiver<LaunchReport>) {
        let settings = Settings::load(store.as_ref());
        let (dispatcher, reports) = Dispatcher::new(settings.default_interpreter.clone());
        let context = AppContext {
            store,
            settings,
            registry: Registry::new(),
            dispatcher: dispatcher.with_echo(echo_output),
            watcher: None,
            debounce_ms: DEBOUNCE_MS,
        };
        (context, reports)
    }

    /// Swap the dispatcher, e.g. to pin the host OS
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Quiet period used by watchers started after this call
    pub fn with_debounce(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn folders(&self) -> Vec<PathBuf> {
        self.settings.folders.to_vec()
    }

    /// Rescan all registered folders
    pub fn refresh(&self, trigger: &str) -> ScanResult {
        self.registry.rebuild(self.settings.folders.as_slice(), trigger)
    }

    /// Register a folder, persist, rescan. Returns the new folder list.
    #[instrument(skip(self))]
    pub fn add_folder(&mut self, folder: PathBuf) -> Result<Vec<PathBuf>> {
        if self.settings.folders.add(folder) {
            self.persist()?;
            self.sync_watcher();
            self.refresh("folder_added");
        } else {
            info!("Folder already registered");
        }
        Ok(self.folders())
    }

    /// Unregister a folder, persist, rescan. Returns the new folder list.
    #[instrument(skip(self))]
    pub fn remove_folder(&mut self, folder: &Path) -> Result<Vec<PathBuf>> {
        if self.settings.folders.remove(folder) {
            self.persist()?;
            self.sync_watcher();
            self.refresh("folder_removed");
        } else {
            info!("Folder was not registered");
        }
        Ok(self.folders())
    }

    pub fn set_default_interpreter(&mut self, interpreter: &str) -> Result<()> {
        let interpreter = interpreter.trim().to_string();
        self.dispatcher.set_default_interpreter(interpreter.clone());
        self.settings.default_interpreter = interpreter;
        self.persist()
    }

    /// Look up a registered entry by name, or parse a script path directly
    pub fn find_entry(&self, name_or_path: &str) -> Result<Arc<ScriptEntry>> {
        let path = Path::new(name_or_path);
        if is_script_file(path) && path.is_file() {
            if let Some(entry) = self.registry.snapshot().find_by_path(path) {
                return Ok(entry);
            }
            return entry_from_path(path).map(Arc::new);
        }
        self.registry
            .snapshot()
            .find_by_name(name_or_path)
            .ok_or_else(|| LauncherError::ScriptNotFound(name_or_path.to_string()))
    }

    pub fn run_entry(&self, entry: &ScriptEntry) -> Result<LaunchHandle> {
        self.dispatcher.run(entry)
    }

    /// Run a script file that may live outside any registered folder
    pub fn run_path(&self, path: &Path) -> Result<LaunchHandle> {
        let entry = entry_from_path(path)?;
        self.dispatcher.run(&entry)
    }

    /// Write new metadata into a script and rescan
    pub fn update_metadata(&self, path: &Path, header: &ScriptHeader) -> Result<()> {
        write_header(path, header)?;
        self.refresh("metadata_updated");
        Ok(())
    }

    /// Watch the registered folders. Any previous watcher is stopped first.
    pub fn start_watching(&mut self) -> Result<Receiver<ScriptReloadEvent>> {
        self.stop_watching();
        let (mut watcher, events) = ScriptWatcher::with_debounce(self.folders(), self.debounce_ms);
        watcher
            .start()
            .map_err(|e| LauncherError::FileWatch(e.to_string()))?;
        self.watcher = Some(watcher);
        Ok(events)
    }

    pub fn stop_watching(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
    }

    /// True while a started watcher loop is still alive
    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(ScriptWatcher::is_running)
    }

    /// Re-read preferences from the store. Returns the new scan when the
    /// registered folders changed.
    #[instrument(skip(self))]
    pub fn reload_settings(&mut self) -> Result<Option<ScanResult>> {
        self.store
            .reload()
            .map_err(|e| LauncherError::Preferences(format!("{:#}", e)))?;
        let settings = Settings::load(self.store.as_ref());
        if settings == self.settings {
            return Ok(None);
        }

        let folders_changed = settings.folders != self.settings.folders;
        self.dispatcher
            .set_default_interpreter(settings.default_interpreter.clone());
        self.settings = settings;
        if !folders_changed {
            return Ok(None);
        }

        info!(folder_count = self.settings.folders.len(), "Registered folders changed on disk");
        self.sync_watcher();
        Ok(Some(self.refresh("preferences_reloaded")))
    }

    fn sync_watcher(&mut self) {
        let folders = self.folders();
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.update_folders(folders);
        }
    }

    fn persist(&mut self) -> Result<()> {
        self.settings.save(self.store.as_mut());
        self.store
            .save()
            .map_err(|e| LauncherError::Preferences(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        JsonPreferenceStore, MemoryPreferenceStore, KEY_PYTHON_PATH, KEY_REGISTERED_FOLDERS,
    };
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn context() -> AppContext {
        AppContext::new(Box::new(MemoryPreferenceStore::new()), false).0
    }

    #[test]
    fn test_add_folder_persists_and_scans() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.py"), "#pqr cat=Games\n").unwrap();

        let mut ctx = context();
        let folders = ctx.add_folder(temp.path().to_path_buf()).unwrap();
        assert_eq!(folders, vec![temp.path().to_path_buf()]);
        assert_eq!(ctx.registry().categories(), vec!["Games"]);

        let stored = ctx.store.string(KEY_REGISTERED_FOLDERS).unwrap();
        assert!(stored.contains(&*temp.path().to_string_lossy()));
    }

    #[test]
    fn test_add_folder_twice_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context();
        ctx.add_folder(temp.path().to_path_buf()).unwrap();
        let folders = ctx.add_folder(temp.path().to_path_buf()).unwrap();
        assert_eq!(folders.len(), 1);
    }

    #[test]
    fn test_remove_folder_clears_entries() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.py"), "").unwrap();
        let mut ctx = context();
        ctx.add_folder(temp.path().to_path_buf()).unwrap();
        assert_eq!(ctx.registry().snapshot().len(), 1);

        let folders = ctx.remove_folder(temp.path()).unwrap();
        assert!(folders.is_empty());
        assert!(ctx.registry().snapshot().is_empty());
    }

    #[test]
    fn test_settings_loaded_from_store() {
        let temp = TempDir::new().unwrap();
        let mut store = MemoryPreferenceStore::new();
        store.set_string(KEY_PYTHON_PATH, "/custom/python");
        store.set_string(
            KEY_REGISTERED_FOLDERS,
            &serde_json::to_string(&vec![temp.path()]).unwrap(),
        );

        let (ctx, _rx) = AppContext::new(Box::new(store), false);
        assert_eq!(ctx.dispatcher().default_interpreter(), "/custom/python");
        assert_eq!(ctx.folders(), vec![temp.path().to_path_buf()]);
    }

    #[test]
    fn test_set_default_interpreter() {
        let mut ctx = context();
        ctx.set_default_interpreter(" /opt/py ").unwrap();
        assert_eq!(ctx.settings().default_interpreter, "/opt/py");
        assert_eq!(ctx.dispatcher().default_interpreter(), "/opt/py");
        assert_eq!(ctx.store.string(KEY_PYTHON_PATH).as_deref(), Some("/opt/py"));
    }

    #[test]
    fn test_find_entry_by_name_and_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Tool.py");
        fs::write(&path, "#pqr cat=T\n").unwrap();
        let outside = TempDir::new().unwrap();
        let loose = outside.path().join("loose.py");
        fs::write(&loose, "#pqr cat=Loose\n").unwrap();

        let mut ctx = context();
        ctx.add_folder(temp.path().to_path_buf()).unwrap();

        assert_eq!(ctx.find_entry("tool").unwrap().path, path);
        assert_eq!(ctx.find_entry(path.to_str().unwrap()).unwrap().category, "T");
        assert_eq!(ctx.find_entry(loose.to_str().unwrap()).unwrap().category, "Loose");
        assert!(matches!(
            ctx.find_entry("missing"),
            Err(LauncherError::ScriptNotFound(_))
        ));
    }

    #[test]
    fn test_run_path_rejects_non_scripts() {
        let ctx = context();
        let err = ctx.run_path(Path::new("/tmp/readme.txt")).unwrap_err();
        assert!(matches!(err, LauncherError::NotAScript(_)));
    }

    #[test]
    fn test_update_metadata_rescans() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.py");
        fs::write(&path, "print(1)\n").unwrap();
        let mut ctx = context();
        ctx.add_folder(temp.path().to_path_buf()).unwrap();
        assert_eq!(ctx.registry().categories(), vec![crate::scripts::UNCATEGORIZED]);

        let header = ScriptHeader {
            category: "Moved".to_string(),
            ..ScriptHeader::default()
        };
        ctx.update_metadata(&path, &header).unwrap();
        assert_eq!(ctx.registry().categories(), vec!["Moved"]);
    }

    #[test]
    fn test_added_folder_is_watched() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let (ctx, _reports) = AppContext::new(Box::new(MemoryPreferenceStore::new()), false);
        let mut ctx = ctx.with_debounce(100);
        ctx.add_folder(first.path().to_path_buf()).unwrap();

        let events = ctx.start_watching().unwrap();
        assert!(ctx.is_watching());
        ctx.add_folder(second.path().to_path_buf()).unwrap();
        std::thread::sleep(Duration::from_millis(300));

        fs::write(second.path().join("late.py"), "#pqr cat=Late\n").unwrap();
        let ScriptReloadEvent::Rescan { paths } =
            events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(paths.iter().any(|p| p.ends_with("late.py")));

        ctx.refresh("watcher");
        assert!(ctx.registry().categories().contains(&"Late".to_string()));
        ctx.stop_watching();
        assert!(!ctx.is_watching());
    }

    #[test]
    fn test_removed_folder_is_unwatched() {
        let temp = TempDir::new().unwrap();
        let (ctx, _reports) = AppContext::new(Box::new(MemoryPreferenceStore::new()), false);
        let mut ctx = ctx.with_debounce(100);
        ctx.add_folder(temp.path().to_path_buf()).unwrap();

        let events = ctx.start_watching().unwrap();
        ctx.remove_folder(temp.path()).unwrap();
        std::thread::sleep(Duration::from_millis(300));

        fs::write(temp.path().join("ignored.py"), "").unwrap();
        assert!(events.recv_timeout(Duration::from_millis(800)).is_err());
    }

    #[test]
    fn test_reload_settings_picks_up_folders_from_other_process() {
        let prefs = TempDir::new().unwrap();
        let scripts = TempDir::new().unwrap();
        fs::write(scripts.path().join("shared.py"), "#pqr cat=Shared\n").unwrap();
        let path = prefs.path().join("prefs.json");

        let store = JsonPreferenceStore::open(path.clone()).unwrap();
        let (mut watching, _reports) = AppContext::new(Box::new(store), false);
        assert!(watching.reload_settings().unwrap().is_none());

        let other = JsonPreferenceStore::open(path).unwrap();
        let (mut other, _other_reports) = AppContext::new(Box::new(other), false);
        other.add_folder(scripts.path().to_path_buf()).unwrap();

        let scan = watching.reload_settings().unwrap().unwrap();
        assert_eq!(scan.entries_in(crate::scripts::ALL_CATEGORY).len(), 1);
        assert_eq!(watching.folders(), vec![scripts.path().to_path_buf()]);
        assert!(watching.reload_settings().unwrap().is_none());
    }
}
