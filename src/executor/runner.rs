//! Script dispatch
//!
//! `Dispatcher::run` never blocks on the script. It spawns the process, hands
//! the child to a waiter thread, and returns a handle. The waiter sends
//! exactly one `LaunchReport` per launch on the dispatcher's channel. Spawn
//! failures are returned to the caller and also reported on the channel.
//!
//! Dispatch is unbounded: each launch gets its own waiter thread and nothing
//! limits how many run at once. Launched processes are never killed or
//! timed out.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use super::command::{
    build_command_with, which_lookup, LaunchCommand, LaunchStrategy, TerminalLookup,
};
use super::output_buffer::{spawn_output_reader, Echo, OutputBuffer};
use crate::error::LauncherError;
use crate::interpreter::{resolve_interpreter, HostOs};
use crate::logging;
use crate::scripts::ScriptEntry;

/// Lifecycle of one launch: Idle -> Spawning -> Running -> Exited | SpawnFailed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchState {
    Idle,
    Spawning,
    Running,
    Exited(i32),
    SpawnFailed(String),
}

impl LaunchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LaunchState::Exited(_) | LaunchState::SpawnFailed(_))
    }
}

/// Returned by `Dispatcher::run` for a successfully spawned process
#[derive(Debug, Clone)]
pub struct LaunchHandle {
    pub id: u64,
    pub pid: u32,
    pub script_path: PathBuf,
    pub interpreter: String,
    pub strategy: LaunchStrategy,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum LaunchOutcome {
    /// Process finished normally. For terminal launches this is the wrapper's exit code.
    Exited { code: i32 },
    Failed(LauncherError),
}

impl LaunchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LaunchOutcome::Exited { code: 0 })
    }
}

/// One per launch, sent when it reaches a terminal state
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub id: u64,
    pub script_path: PathBuf,
    pub outcome: LaunchOutcome,
    pub duration: Duration,
}

type StateTable = Arc<Mutex<HashMap<u64, (PathBuf, LaunchState)>>>;

pub struct Dispatcher {
    default_interpreter: String,
    host: HostOs,
    echo_output: bool,
    terminal_lookup: TerminalLookup,
    reports: async_channel::Sender<LaunchReport>,
    states: StateTable,
    next_id: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher for the current OS and the receiving end of its report channel
    pub fn new(
        default_interpreter: impl Into<String>,
    ) -> (Self, async_channel::Receiver<LaunchReport>) {
        Self::with_host(default_interpreter, HostOs::current())
    }

    pub fn with_host(
        default_interpreter: impl Into<String>,
        host: HostOs,
    ) -> (Self, async_channel::Receiver<LaunchReport>) {
        let (reports, receiver) = async_channel::unbounded();
        let dispatcher = Dispatcher {
            default_interpreter: default_interpreter.into(),
            host,
            echo_output: false,
            terminal_lookup: which_lookup,
            reports,
            states: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        };
        (dispatcher, receiver)
    }

    /// Echo captured output to our own stdout/stderr (foreground launches)
    pub fn with_echo(mut self, echo_output: bool) -> Self {
        self.echo_output = echo_output;
        self
    }

    pub fn with_terminal_lookup(mut self, lookup: TerminalLookup) -> Self {
        self.terminal_lookup = lookup;
        self
    }

    pub fn set_default_interpreter(&mut self, interpreter: impl Into<String>) {
        self.default_interpreter = interpreter.into();
    }

    pub fn default_interpreter(&self) -> &str {
        &self.default_interpreter
    }

    pub fn host(&self) -> HostOs {
        self.host
    }

    /// The interpreter `run` would use for `entry`
    pub fn interpreter_for(&self, entry: &ScriptEntry) -> String {
        resolve_interpreter(entry, self.host, &self.default_interpreter)
    }

    /// Current state for a script path; `Running` wins over `Spawning` when launched more than once
    pub fn state_of(&self, path: &Path) -> LaunchState {
        let states = self.states.lock();
        let mut found = LaunchState::Idle;
        for (state_path, state) in states.values() {
            if state_path != path {
                continue;
            }
            match state {
                LaunchState::Running => return LaunchState::Running,
                state => found = state.clone(),
            }
        }
        found
    }

    /// Number of launches not yet reported
    pub fn active_count(&self) -> usize {
        self.states.lock().len()
    }

    /// Launch a script. Returns once the process is spawned.
    #[instrument(skip_all, fields(script = %entry.path.display()))]
    pub fn run(&self, entry: &ScriptEntry) -> Result<LaunchHandle, LauncherError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        set_state(&self.states, id, &entry.path, LaunchState::Spawning);

        let interpreter = self.interpreter_for(entry);
        let command = build_command_with(
            entry,
            &interpreter,
            self.host,
            self.echo_output,
            self.terminal_lookup,
        )
        .map_err(|e| self.fail_spawn(id, &entry.path, started, e))?;

        debug!(
            command = %command.display(),
            strategy = command.strategy.as_str(),
            "Spawning script"
        );

        let child = spawn_child(&command).map_err(|source| {
            let err = LauncherError::SpawnFailure {
                interpreter: command.program.to_string_lossy().into_owned(),
                script: entry.path.clone(),
                source: Arc::new(source),
            };
            self.fail_spawn(id, &entry.path, started, err)
        })?;

        let pid = child.id();
        set_state(&self.states, id, &entry.path, LaunchState::Running);
        info!(
            pid,
            interpreter = %interpreter,
            strategy = command.strategy.as_str(),
            "Script spawned"
        );
        logging::log_launch_event(&entry.path, "spawned", None, true);

        let handle = LaunchHandle {
            id,
            pid,
            script_path: entry.path.clone(),
            interpreter,
            strategy: command.strategy,
            started_at: Utc::now(),
        };

        let waiter = Waiter {
            id,
            script_path: entry.path.clone(),
            script_name: entry.name.clone(),
            strategy: command.strategy,
            echo_output: self.echo_output,
            started,
            states: Arc::clone(&self.states),
            reports: self.reports.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("launch-{}", id))
            .spawn(move || waiter.wait(child));
        if let Err(e) = spawned {
            // The process is already running; only its report is lost
            error!(error = %e, "Failed to start waiter thread");
            self.states.lock().remove(&id);
        }

        Ok(handle)
    }

    fn fail_spawn(
        &self,
        id: u64,
        path: &Path,
        started: Instant,
        err: LauncherError,
    ) -> LauncherError {
        error!(error = %err, "Launch failed");
        set_state(&self.states, id, path, LaunchState::SpawnFailed(err.to_string()));
        logging::log_launch_event(path, "spawn_failed", None, false);
        send_report(
            &self.states,
            &self.reports,
            LaunchReport {
                id,
                script_path: path.to_path_buf(),
                outcome: LaunchOutcome::Failed(err.clone()),
                duration: started.elapsed(),
            },
        );
        err
    }
}

fn spawn_child(command: &LaunchCommand) -> io::Result<Child> {
    let mut cmd = command.to_command();
    match command.strategy {
        LaunchStrategy::Background => {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }
        LaunchStrategy::Foreground => {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }
        LaunchStrategy::Terminal => {
            cmd.stdin(Stdio::null());
        }
    }
    cmd.spawn()
}

fn set_state(states: &StateTable, id: u64, path: &Path, state: LaunchState) {
    if state.is_terminal() {
        info!(launch_id = id, state = ?state, "Launch finished");
    } else {
        debug!(launch_id = id, state = ?state, "Launch state");
    }
    states.lock().insert(id, (path.to_path_buf(), state));
}

/// Send the launch's report and return it to Idle
fn send_report(
    states: &StateTable,
    reports: &async_channel::Sender<LaunchReport>,
    report: LaunchReport,
) {
    let id = report.id;
    states.lock().remove(&id);
    if reports.try_send(report).is_err() {
        debug!(launch_id = id, "No report receiver");
    }
}

struct Waiter {
    id: u64,
    script_path: PathBuf,
    script_name: String,
    strategy: LaunchStrategy,
    echo_output: bool,
    started: Instant,
    states: StateTable,
    reports: async_channel::Sender<LaunchReport>,
}

impl Waiter {
    fn wait(self, mut child: Child) {
        let buffer = OutputBuffer::default();
        let mut readers: Vec<JoinHandle<()>> = Vec::new();
        if self.strategy.captures_output() {
            let (out_echo, err_echo) = if self.echo_output {
                (Echo::Stdout, Echo::Stderr)
            } else {
                (Echo::None, Echo::None)
            };
            if let Some(stdout) = child.stdout.take() {
                self.start_reader(stdout, &buffer, out_echo, &mut readers);
            }
            if let Some(stderr) = child.stderr.take() {
                self.start_reader(stderr, &buffer, err_echo, &mut readers);
            }
        }

        let status = child.wait();
        for reader in readers {
            if reader.join().is_err() {
                warn!(launch_id = self.id, "Output reader panicked");
            }
        }

        let outcome = self.outcome(status, &buffer);
        let duration = self.started.elapsed();
        let code = match &outcome {
            LaunchOutcome::Exited { code } => *code,
            LaunchOutcome::Failed(LauncherError::RuntimeFailure { code, .. }) => code.unwrap_or(-1),
            LaunchOutcome::Failed(_) => -1,
        };
        set_state(&self.states, self.id, &self.script_path, LaunchState::Exited(code));
        logging::log_launch_event(
            &self.script_path,
            "exited",
            Some(duration.as_millis() as u64),
            outcome.is_success(),
        );

        send_report(
            &self.states,
            &self.reports,
            LaunchReport {
                id: self.id,
                script_path: self.script_path,
                outcome,
                duration,
            },
        );
    }

    fn start_reader<R: io::Read + Send + 'static>(
        &self,
        stream: R,
        buffer: &OutputBuffer,
        echo: Echo,
        readers: &mut Vec<JoinHandle<()>>,
    ) {
        match spawn_output_reader(stream, buffer.clone(), echo, self.script_name.clone()) {
            Ok(handle) => readers.push(handle),
            Err(e) => warn!(launch_id = self.id, error = %e, "Failed to start output reader"),
        }
    }

    fn outcome(&self, status: io::Result<ExitStatus>, buffer: &OutputBuffer) -> LaunchOutcome {
        let status = match status {
            Ok(status) => status,
            Err(e) => {
                error!(launch_id = self.id, error = %e, "Failed waiting for script");
                return LaunchOutcome::Failed(LauncherError::RuntimeFailure {
                    script: self.script_path.clone(),
                    code: None,
                    output: e.to_string(),
                });
            }
        };

        match (status.code(), self.strategy) {
            (Some(0), _) => LaunchOutcome::Exited { code: 0 },
            // The terminal owns the script's output; only the wrapper's code is known
            (Some(code), LaunchStrategy::Terminal) => {
                warn!(launch_id = self.id, code, "Terminal wrapper exited non-zero");
                LaunchOutcome::Exited { code }
            }
            (code, _) => {
                let err = LauncherError::RuntimeFailure {
                    script: self.script_path.clone(),
                    code,
                    output: buffer.contents(),
                };
                warn!(launch_id = self.id, error = %err, "Script failed");
                LaunchOutcome::Failed(err)
            }
        }
    }
}

/// Open the folder containing `path` in the system file manager
pub fn reveal_in_file_manager(path: &Path) -> Result<(), LauncherError> {
    let folder = if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or(path)
    };
    info!(folder = %folder.display(), "Revealing in file manager");
    open::that(folder).map_err(|source| LauncherError::SpawnFailure {
        interpreter: "file manager".to_string(),
        script: path.to_path_buf(),
        source: Arc::new(source),
    })
}
