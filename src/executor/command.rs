//! Launch command construction
//!
//! Every strategy is expressed as an explicit program + argument list. The
//! only string that passes through a shell is the Linux `bash -c` command,
//! and every path in it is single-quoted.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::LauncherError;
use crate::interpreter::HostOs;
use crate::scripts::ScriptEntry;

/// Environment variable forcing unbuffered interpreter output
pub const UNBUFFERED_ENV: (&str, &str) = ("PYTHONUNBUFFERED", "1");

/// Linux terminal emulators in lookup order, with the flag that precedes the command
pub const LINUX_TERMINALS: &[(&str, &str)] = &[
    ("gnome-terminal", "--"),
    ("konsole", "-e"),
    ("xfce4-terminal", "-x"),
    ("xterm", "-e"),
    ("x-terminal-emulator", "-e"),
];

/// Resolves a binary name to a path; `which::which` outside of tests
pub type TerminalLookup = fn(&str) -> Option<PathBuf>;

pub fn which_lookup(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// Output captured but not shown
    Background,
    /// Output captured and echoed to our own stdout/stderr
    Foreground,
    /// Runs inside a new terminal window, which owns the output
    Terminal,
}

impl LaunchStrategy {
    pub fn for_entry(entry: &ScriptEntry, echo_output: bool) -> Self {
        match (entry.terminal, echo_output) {
            (true, _) => LaunchStrategy::Terminal,
            (false, true) => LaunchStrategy::Foreground,
            (false, false) => LaunchStrategy::Background,
        }
    }

    pub fn captures_output(&self) -> bool {
        !matches!(self, LaunchStrategy::Terminal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchStrategy::Background => "background",
            LaunchStrategy::Foreground => "foreground",
            LaunchStrategy::Terminal => "terminal",
        }
    }
}

/// A fully resolved process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
    pub strategy: LaunchStrategy,
}

impl LaunchCommand {
    fn new(program: impl Into<OsString>, strategy: LaunchStrategy) -> Self {
        LaunchCommand {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            strategy,
        }
    }

    fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Build a `std::process::Command`; stdio is left to the caller
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Human readable form for logs
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Build the launch command for `entry` using `which` to find terminals
pub fn build_command(
    entry: &ScriptEntry,
    interpreter: &str,
    host: HostOs,
    echo_output: bool,
) -> Result<LaunchCommand, LauncherError> {
    build_command_with(entry, interpreter, host, echo_output, which_lookup)
}

pub fn build_command_with(
    entry: &ScriptEntry,
    interpreter: &str,
    host: HostOs,
    echo_output: bool,
    lookup: TerminalLookup,
) -> Result<LaunchCommand, LauncherError> {
    let strategy = LaunchStrategy::for_entry(entry, echo_output);
    if strategy != LaunchStrategy::Terminal {
        let mut cmd = LaunchCommand::new(interpreter, strategy).arg(&entry.path);
        cmd.envs.push((UNBUFFERED_ENV.0.into(), UNBUFFERED_ENV.1.into()));
        cmd.current_dir = entry.path.parent().map(Path::to_path_buf);
        return Ok(cmd);
    }

    let dir = script_dir(&entry.path);
    let cmd = match host {
        HostOs::MacOs => {
            let shell_line = format!(
                "cd {} && {} {}",
                shell_quote(&dir.to_string_lossy()),
                shell_quote(interpreter),
                shell_quote(&entry.path.to_string_lossy())
            );
            LaunchCommand::new("osascript", strategy)
                .arg("-e")
                .arg(format!(
                    "tell application \"Terminal\" to do script \"{}\"",
                    applescript_escape(&shell_line)
                ))
                .arg("-e")
                .arg("tell application \"Terminal\" to activate")
        }
        // An empty title keeps `start` from treating a quoted interpreter path as the window title
        HostOs::Windows => LaunchCommand::new("cmd", strategy)
            .arg("/C")
            .arg("start")
            .arg("")
            .arg("cmd")
            .arg("/k")
            .arg(interpreter)
            .arg(&entry.path),
        HostOs::Linux | HostOs::Other => {
            let (terminal, flag) = LINUX_TERMINALS
                .iter()
                .find_map(|(name, flag)| lookup(name).map(|path| (path, *flag)))
                .ok_or_else(|| LauncherError::NoTerminalFound {
                    tried: LINUX_TERMINALS
                        .iter()
                        .map(|(name, _)| *name)
                        .collect::<Vec<_>>()
                        .join(", "),
                })?;
            LaunchCommand::new(terminal, strategy)
                .arg(flag)
                .arg("bash")
                .arg("-c")
                .arg(linux_shell_line(&dir, interpreter, &entry.path))
        }
    };
    Ok(cmd)
}

fn script_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

const WAIT_FOR_KEY: &str = "read -n 1 -s -r -p 'Press any key to close...'";

/// `cd` into the script folder, run it, show the exit code, wait for a key
pub(crate) fn linux_shell_line(dir: &Path, interpreter: &str, script: &Path) -> String {
    format!(
        "cd {} && {} {}; code=$?; echo; echo \"Exit Code: $code\"; {}",
        shell_quote(&dir.to_string_lossy()),
        shell_quote(interpreter),
        shell_quote(&script.to_string_lossy()),
        WAIT_FOR_KEY
    )
}

/// POSIX single-quote a string: `it's` -> `'it'\''s'`
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Escape for embedding inside an AppleScript double-quoted string
pub(crate) fn applescript_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
