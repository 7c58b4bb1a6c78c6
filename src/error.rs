use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, warn};

/// Error severity, used by front ends to decide whether to surface an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,    // Silent - logged only
    Warning, // Recoverable, worth a status message
    Error,   // A launch or write failed
}

/// Domain-specific errors for QuickBox
///
/// I/O sources are kept behind `Arc` so an error can be returned to the
/// caller and also delivered on the launch report channel.
#[derive(Error, Debug, Clone)]
pub enum LauncherError {
    #[error("Folder '{path}' could not be read: {source}")]
    FolderUnreadable {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Header of '{path}' could not be read: {source}")]
    HeaderUnreadable {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Failed to start '{interpreter}' for '{script}': {source}")]
    SpawnFailure {
        interpreter: String,
        script: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Script '{script}' exited abnormally (code: {code:?})")]
    RuntimeFailure {
        script: PathBuf,
        code: Option<i32>,
        output: String,
    },

    #[error("No supported terminal emulator found (tried: {tried})")]
    NoTerminalFound { tried: String },

    #[error("Failed to write metadata to '{path}': {source}")]
    MetadataWrite {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Metadata field '{field}' cannot hold {value:?}: line breaks and ';' are not allowed")]
    InvalidMetadata { field: &'static str, value: String },

    #[error("'{0}' is not a .py script")]
    NotAScript(PathBuf),

    #[error("No registered script named '{0}'")]
    ScriptNotFound(String),

    #[error("Preferences error: {0}")]
    Preferences(String),

    #[error("File watch error: {0}")]
    FileWatch(String),
}

impl LauncherError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::FolderUnreadable { .. } => ErrorSeverity::Info,
            Self::HeaderUnreadable { .. } => ErrorSeverity::Info,
            Self::SpawnFailure { .. } => ErrorSeverity::Error,
            Self::RuntimeFailure { .. } => ErrorSeverity::Error,
            Self::NoTerminalFound { .. } => ErrorSeverity::Error,
            Self::MetadataWrite { .. } => ErrorSeverity::Error,
            Self::InvalidMetadata { .. } => ErrorSeverity::Warning,
            Self::NotAScript(_) => ErrorSeverity::Warning,
            Self::ScriptNotFound(_) => ErrorSeverity::Warning,
            Self::Preferences(_) => ErrorSeverity::Warning,
            Self::FileWatch(_) => ErrorSeverity::Warning,
        }
    }

    /// Whether a front end should show this error to the user
    pub fn is_user_facing(&self) -> bool {
        self.severity() != ErrorSeverity::Info
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::FolderUnreadable { path, .. } => {
                format!("Skipped unreadable folder {}", path.display())
            }
            Self::HeaderUnreadable { path, .. } => {
                format!("Using default settings for {}", path.display())
            }
            Self::SpawnFailure {
                interpreter,
                source,
                ..
            } => format!("Could not start interpreter '{}': {}", interpreter, source),
            Self::RuntimeFailure { code, output, .. } => {
                let status = match code {
                    Some(code) => format!("Script failed with exit code {}", code),
                    None => "Script was terminated by a signal".to_string(),
                };
                if output.trim().is_empty() {
                    status
                } else {
                    format!("{}\n\n{}", status, output.trim_end())
                }
            }
            Self::NoTerminalFound { tried } => {
                format!("No supported terminal found. Install one of: {}", tried)
            }
            Self::MetadataWrite { path, source } => {
                format!("Could not save {}: {}", path.display(), source)
            }
            Self::InvalidMetadata { field, .. } => {
                format!("The {} value may not contain line breaks or ';'", field)
            }
            Self::NotAScript(path) => format!("Only .py files can be run: {}", path.display()),
            Self::ScriptNotFound(name) => {
                format!("No script named '{}' in registered folders", name)
            }
            Self::Preferences(msg) => format!("Settings issue: {}", msg),
            Self::FileWatch(msg) => format!("File watcher issue: {}", msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the user doesn't need to know.
///
/// # Examples
///
/// ```ignore
/// use quickbox::error::ResultExt;
///
/// // Keep going with defaults if the preferences file is corrupt
/// let loaded = store.load().warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error(kind: std::io::ErrorKind) -> Arc<std::io::Error> {
        Arc::new(std::io::Error::from(kind))
    }

    #[test]
    fn test_scan_errors_are_silent() {
        let folder = LauncherError::FolderUnreadable {
            path: PathBuf::from("/missing"),
            source: io_error(std::io::ErrorKind::NotFound),
        };
        let header = LauncherError::HeaderUnreadable {
            path: PathBuf::from("/missing/a.py"),
            source: io_error(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(folder.severity(), ErrorSeverity::Info);
        assert_eq!(header.severity(), ErrorSeverity::Info);
        assert!(!folder.is_user_facing());
        assert!(!header.is_user_facing());
    }

    #[test]
    fn test_launch_errors_are_user_facing() {
        let spawn = LauncherError::SpawnFailure {
            interpreter: "/nope/python".to_string(),
            script: PathBuf::from("/a.py"),
            source: io_error(std::io::ErrorKind::NotFound),
        };
        let terminal = LauncherError::NoTerminalFound {
            tried: "xterm".to_string(),
        };
        assert!(spawn.is_user_facing());
        assert!(terminal.is_user_facing());
        assert!(spawn.user_message().contains("/nope/python"));
        assert!(terminal.user_message().contains("xterm"));
    }

    #[test]
    fn test_runtime_failure_message_includes_output() {
        let err = LauncherError::RuntimeFailure {
            script: PathBuf::from("/a.py"),
            code: Some(2),
            output: "Traceback: boom\n".to_string(),
        };
        let msg = err.user_message();
        assert!(msg.contains("exit code 2"));
        assert!(msg.ends_with("Traceback: boom"));
    }

    #[test]
    fn test_runtime_failure_message_without_output() {
        let err = LauncherError::RuntimeFailure {
            script: PathBuf::from("/a.py"),
            code: None,
            output: "  \n".to_string(),
        };
        assert_eq!(err.user_message(), "Script was terminated by a signal");
    }

    #[test]
    fn test_error_is_cloneable_for_reporting() {
        let err = LauncherError::MetadataWrite {
            path: PathBuf::from("/a.py"),
            source: io_error(std::io::ErrorKind::PermissionDenied),
        };
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }

    #[test]
    fn test_result_ext_returns_values() {
        let ok: std::result::Result<u32, String> = Ok(7);
        assert_eq!(ok.log_err(), Some(7));
        let err: std::result::Result<u32, String> = Err("bad".to_string());
        assert_eq!(err.warn_on_err(), None);
    }
}
