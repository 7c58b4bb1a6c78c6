use super::*;
use crate::interpreter::HostOs;
use crate::scripts::{ScriptEntry, ScriptHeader};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn entry_at(path: &str, terminal: bool) -> ScriptEntry {
    ScriptEntry::from_header(
        PathBuf::from(path),
        ScriptHeader {
            terminal,
            ..ScriptHeader::default()
        },
        None,
    )
}

fn no_terminals(_: &str) -> Option<PathBuf> {
    None
}

fn only_xterm(name: &str) -> Option<PathBuf> {
    (name == "xterm").then(|| PathBuf::from("/usr/bin/xterm"))
}

fn every_terminal(name: &str) -> Option<PathBuf> {
    Some(PathBuf::from("/usr/bin").join(name))
}

fn args_of(cmd: &LaunchCommand) -> Vec<String> {
    cmd.args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

fn recv_report(rx: &async_channel::Receiver<LaunchReport>) -> LaunchReport {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        match rx.try_recv() {
            Ok(report) => return report,
            Err(_) if std::time::Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(10))
            }
            Err(e) => panic!("no launch report: {:?}", e),
        }
    }
}

// ============================================
// COMMAND CONSTRUCTION
// ============================================

#[test]
fn test_strategy_selection() {
    let plain = entry_at("/s/a.py", false);
    let term = entry_at("/s/a.py", true);
    assert_eq!(LaunchStrategy::for_entry(&plain, false), LaunchStrategy::Background);
    assert_eq!(LaunchStrategy::for_entry(&plain, true), LaunchStrategy::Foreground);
    assert_eq!(LaunchStrategy::for_entry(&term, false), LaunchStrategy::Terminal);
    assert_eq!(LaunchStrategy::for_entry(&term, true), LaunchStrategy::Terminal);
}

#[test]
fn test_direct_command() {
    let entry = entry_at("/home/me/scripts/tool.py", false);
    let cmd = build_command_with(&entry, "/usr/bin/python3", HostOs::Linux, true, no_terminals)
        .unwrap();

    assert_eq!(cmd.program, OsString::from("/usr/bin/python3"));
    assert_eq!(args_of(&cmd), vec!["/home/me/scripts/tool.py"]);
    assert_eq!(
        cmd.envs,
        vec![(OsString::from("PYTHONUNBUFFERED"), OsString::from("1"))]
    );
    assert_eq!(cmd.current_dir, Some(PathBuf::from("/home/me/scripts")));
    assert_eq!(cmd.strategy, LaunchStrategy::Foreground);
}

#[test]
fn test_direct_command_ignores_terminal_lookup() {
    // no terminal is needed for a non-terminal entry on any host
    let entry = entry_at("/s/a.py", false);
    for host in [HostOs::Linux, HostOs::MacOs, HostOs::Windows, HostOs::Other] {
        assert!(build_command_with(&entry, "py", host, false, no_terminals).is_ok());
    }
}

#[test]
fn test_linux_terminal_uses_first_found() {
    let entry = entry_at("/s/tool.py", true);
    let cmd = build_command_with(&entry, "python3", HostOs::Linux, false, every_terminal).unwrap();
    assert_eq!(cmd.program, OsString::from("/usr/bin/gnome-terminal"));
    let args = args_of(&cmd);
    assert_eq!(&args[..3], &["--", "bash", "-c"]);
    assert!(args[3].starts_with("cd '/s' && 'python3' '/s/tool.py';"));
    assert!(args[3].contains("Exit Code: $code"));
    assert!(args[3].contains("read -n 1"));
    assert!(cmd.envs.is_empty());
}

#[test]
fn test_linux_terminal_lookup_order() {
    let entry = entry_at("/s/tool.py", true);
    let cmd = build_command_with(&entry, "python3", HostOs::Linux, false, only_xterm).unwrap();
    assert_eq!(cmd.program, OsString::from("/usr/bin/xterm"));
    assert_eq!(args_of(&cmd)[0], "-e");
}

#[test]
fn test_linux_no_terminal_found() {
    let entry = entry_at("/s/tool.py", true);
    let err = build_command_with(&entry, "python3", HostOs::Linux, false, no_terminals)
        .unwrap_err();
    match err {
        crate::error::LauncherError::NoTerminalFound { tried } => {
            assert!(tried.starts_with("gnome-terminal"));
            assert!(tried.contains("xterm"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_macos_terminal_command() {
    let entry = entry_at("/Users/me/My \"Scripts\"/tool.py", true);
    let cmd = build_command_with(&entry, "/opt/py", HostOs::MacOs, false, no_terminals).unwrap();
    assert_eq!(cmd.program, OsString::from("osascript"));
    let args = args_of(&cmd);
    assert_eq!(args[0], "-e");
    assert!(args[1].starts_with("tell application \"Terminal\" to do script \""));
    assert!(args[1].contains("My \\\"Scripts\\\""));
    assert!(args[1].contains("'/opt/py'"));
    assert_eq!(args[3], "tell application \"Terminal\" to activate");
}

#[test]
fn test_windows_terminal_command() {
    let entry = entry_at("C:\\scripts\\tool.py", true);
    let cmd = build_command_with(&entry, "python", HostOs::Windows, false, no_terminals).unwrap();
    assert_eq!(cmd.program, OsString::from("cmd"));
    assert_eq!(
        args_of(&cmd),
        vec!["/C", "start", "", "cmd", "/k", "python", "C:\\scripts\\tool.py"]
    );
}

#[test]
fn test_shell_quote() {
    assert_eq!(shell_quote("plain"), "'plain'");
    assert_eq!(shell_quote("it's"), "'it'\\''s'");
    assert_eq!(shell_quote("$HOME; rm"), "'$HOME; rm'");
}

#[test]
fn test_applescript_escape() {
    assert_eq!(applescript_escape(r#"a "b" \c"#), r#"a \"b\" \\c"#);
}

#[test]
fn test_linux_shell_line_quotes_every_path() {
    let line = linux_shell_line(Path::new("/it's"), "py thon", Path::new("/it's/x.py"));
    assert!(line.starts_with("cd '/it'\\''s' && 'py thon' '/it'\\''s/x.py';"));
}

#[test]
fn test_command_display() {
    let entry = entry_at("/s/a.py", false);
    let cmd = build_command_with(&entry, "python3", HostOs::Linux, false, no_terminals).unwrap();
    assert_eq!(cmd.display(), "python3 /s/a.py");
}

// ============================================
// DISPATCH
// ============================================

#[test]
fn test_dispatcher_interpreter_resolution() {
    let (dispatcher, _rx) = Dispatcher::with_host("/app/python", HostOs::Linux);
    let entry = entry_at("/s/a.py", false);
    assert_eq!(dispatcher.interpreter_for(&entry), "/app/python");

    let (mut dispatcher, _rx) = Dispatcher::with_host("", HostOs::Windows);
    assert_eq!(dispatcher.interpreter_for(&entry), "python");
    dispatcher.set_default_interpreter("py");
    assert_eq!(dispatcher.interpreter_for(&entry), "py");
}

#[test]
fn test_missing_interpreter_reports_spawn_failure_once() {
    let (dispatcher, rx) = Dispatcher::with_host("/definitely/not/a/python", HostOs::Linux);
    let entry = entry_at("/tmp/whatever.py", false);

    let err = dispatcher.run(&entry).unwrap_err();
    assert!(matches!(err, crate::error::LauncherError::SpawnFailure { .. }));

    let report = recv_report(&rx);
    assert!(matches!(
        report.outcome,
        LaunchOutcome::Failed(crate::error::LauncherError::SpawnFailure { .. })
    ));
    assert!(rx.try_recv().is_err());
    assert_eq!(dispatcher.state_of(&entry.path), LaunchState::Idle);
}

#[test]
fn test_launch_state_terminal_states() {
    assert!(LaunchState::Exited(0).is_terminal());
    assert!(LaunchState::SpawnFailed("missing".to_string()).is_terminal());
    assert!(!LaunchState::Spawning.is_terminal());
    assert!(!LaunchState::Running.is_terminal());
    assert!(!LaunchState::Idle.is_terminal());
}

#[test]
fn test_no_terminal_reported_and_returned() {
    let (dispatcher, rx) = Dispatcher::with_host("python3", HostOs::Linux);
    let dispatcher = dispatcher.with_terminal_lookup(no_terminals);
    let entry = entry_at("/tmp/t.py", true);

    let err = dispatcher.run(&entry).unwrap_err();
    assert!(matches!(err, crate::error::LauncherError::NoTerminalFound { .. }));
    assert!(matches!(
        recv_report(&rx).outcome,
        LaunchOutcome::Failed(crate::error::LauncherError::NoTerminalFound { .. })
    ));
    assert_eq!(dispatcher.active_count(), 0);
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn shell_script(dir: &Path, name: &str, body: &str) -> ScriptEntry {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        entry_at(path.to_str().unwrap(), false)
    }

    #[test]
    fn test_successful_run_reports_exit_zero() {
        let temp = TempDir::new().unwrap();
        let entry = shell_script(temp.path(), "ok.py", "echo hello\n");
        let (dispatcher, rx) = Dispatcher::with_host("/bin/sh", HostOs::Linux);

        let handle = dispatcher.run(&entry).unwrap();
        assert_eq!(handle.script_path, entry.path);
        assert_eq!(handle.interpreter, "/bin/sh");
        assert_eq!(handle.strategy, LaunchStrategy::Background);
        assert!(handle.pid > 0);

        let report = recv_report(&rx);
        assert_eq!(report.id, handle.id);
        assert!(report.outcome.is_success());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_non_zero_exit_reports_output() {
        let temp = TempDir::new().unwrap();
        let entry = shell_script(
            temp.path(),
            "fail.py",
            "echo to-stdout\necho to-stderr >&2\nexit 3\n",
        );
        let (dispatcher, rx) = Dispatcher::with_host("/bin/sh", HostOs::Linux);
        dispatcher.run(&entry).unwrap();

        match recv_report(&rx).outcome {
            LaunchOutcome::Failed(crate::error::LauncherError::RuntimeFailure {
                code,
                output,
                ..
            }) => {
                assert_eq!(code, Some(3));
                assert!(output.contains("to-stdout"));
                assert!(output.contains("to-stderr"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_script_runs_in_its_folder_with_unbuffered_env() {
        let temp = TempDir::new().unwrap();
        let entry = shell_script(
            temp.path(),
            "env.py",
            "test \"$PYTHONUNBUFFERED\" = 1 || exit 7\ntest -f env.py || exit 8\n",
        );
        let (dispatcher, rx) = Dispatcher::with_host("/bin/sh", HostOs::Linux);
        dispatcher.run(&entry).unwrap();
        assert!(recv_report(&rx).outcome.is_success());
    }

    #[test]
    fn test_run_does_not_block_and_tracks_state() {
        let temp = TempDir::new().unwrap();
        let entry = shell_script(temp.path(), "slow.py", "sleep 1\n");
        let (dispatcher, rx) = Dispatcher::with_host("/bin/sh", HostOs::Linux);

        let start = std::time::Instant::now();
        dispatcher.run(&entry).unwrap();
        assert!(start.elapsed() < Duration::from_millis(900));
        assert_eq!(dispatcher.state_of(&entry.path), LaunchState::Running);

        recv_report(&rx);
        assert_eq!(dispatcher.state_of(&entry.path), LaunchState::Idle);
    }

    #[test]
    fn test_concurrent_launches_each_report_once() {
        let temp = TempDir::new().unwrap();
        let entry = shell_script(temp.path(), "quick.py", "exit 0\n");
        let (dispatcher, rx) = Dispatcher::with_host("/bin/sh", HostOs::Linux);

        let ids: Vec<u64> = (0..5).map(|_| dispatcher.run(&entry).unwrap().id).collect();
        let mut reported: Vec<u64> = (0..5).map(|_| recv_report(&rx).id).collect();
        reported.sort();
        assert_eq!(reported, ids);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_utf8_output_does_not_kill_script() {
        let temp = TempDir::new().unwrap();
        let entry = shell_script(
            temp.path(),
            "latin1.py",
            "printf 'caf\\351\\n'\nsleep 0.3\necho still-running\nexit 0\n",
        );
        let (dispatcher, rx) = Dispatcher::with_host("/bin/sh", HostOs::Linux);
        dispatcher.run(&entry).unwrap();

        let report = recv_report(&rx);
        assert!(
            matches!(report.outcome, LaunchOutcome::Exited { code: 0 }),
            "unexpected outcome: {:?}",
            report.outcome
        );
    }

    #[test]
    fn test_output_after_invalid_utf8_is_captured() {
        let temp = TempDir::new().unwrap();
        let entry = shell_script(
            temp.path(),
            "latin1_fail.py",
            "printf 'caf\\351\\n'\necho Traceback-line\nexit 2\n",
        );
        let (dispatcher, rx) = Dispatcher::with_host("/bin/sh", HostOs::Linux);
        dispatcher.run(&entry).unwrap();

        match recv_report(&rx).outcome {
            LaunchOutcome::Failed(crate::error::LauncherError::RuntimeFailure {
                code,
                output,
                ..
            }) => {
                assert_eq!(code, Some(2));
                assert!(output.contains("caf\u{FFFD}"));
                assert!(output.contains("Traceback-line"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_partial_line_output_is_captured() {
        let temp = TempDir::new().unwrap();
        let entry = shell_script(temp.path(), "prompt.py", "printf 'Name: '\nexit 1\n");
        let (dispatcher, rx) = Dispatcher::with_host("/bin/sh", HostOs::Linux);
        let dispatcher = dispatcher.with_echo(true);
        dispatcher.run(&entry).unwrap();

        match recv_report(&rx).outcome {
            LaunchOutcome::Failed(crate::error::LauncherError::RuntimeFailure { output, .. }) => {
                assert_eq!(output, "Name: ");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
