//! Interpreter resolution
//!
//! Picks the interpreter for an entry on a given host. Precedence, first
//! non-blank wins:
//!
//! 1. the entry's override for the host OS (`mac=`, `win=`, `linux=`)
//! 2. the entry's `def=` value
//! 3. the application-wide default interpreter preference
//! 4. a hard-coded per-OS fallback

use std::fmt;

use crate::scripts::ScriptEntry;

/// Operating system family the launcher runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    MacOs,
    Windows,
    Linux,
    /// BSDs and anything else. Launched like Linux, but no header field applies
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else if cfg!(target_os = "windows") {
            HostOs::Windows
        } else if cfg!(target_os = "linux") {
            HostOs::Linux
        } else {
            HostOs::Other
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostOs::MacOs => "macos",
            HostOs::Windows => "windows",
            HostOs::Linux => "linux",
            HostOs::Other => "other",
        }
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Last-resort interpreter when nothing else is configured
pub fn fallback_interpreter(host: HostOs) -> &'static str {
    match host {
        HostOs::Windows => "python",
        _ => "/usr/bin/python3",
    }
}

/// The entry's per-OS override for `host`; empty for hosts without a header field
pub fn os_override(entry: &ScriptEntry, host: HostOs) -> &str {
    match host {
        HostOs::MacOs => &entry.interp_mac,
        HostOs::Windows => &entry.interp_win,
        HostOs::Linux => &entry.interp_linux,
        HostOs::Other => "",
    }
}

/// Resolve the interpreter for `entry` on `host`
pub fn resolve_interpreter(entry: &ScriptEntry, host: HostOs, app_default: &str) -> String {
    let candidates = [
        os_override(entry, host),
        entry.interp_default.as_str(),
        app_default,
    ];
    candidates
        .into_iter()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_else(|| fallback_interpreter(host))
        .to_string()
}
