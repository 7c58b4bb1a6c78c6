use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use quickbox::app::AppContext;
use quickbox::config::{JsonPreferenceStore, PREFERENCES_PATH_ENV};
use quickbox::error::ResultExt;
use quickbox::executor::{reveal_in_file_manager, LaunchOutcome, LaunchReport};
use quickbox::interpreter::fallback_interpreter;
use quickbox::logging;
use quickbox::metadata_writer::format_header_line;
use quickbox::scripts::{
    entry_from_path, filter_entries, is_script_file, parse_header_file, ScanResult, ScriptEntry,
    ALL_CATEGORY,
};
use quickbox::watcher::ScriptReloadEvent;

const PREFERENCES_POLL_INTERVAL: Duration = Duration::from_secs(2);
const WATCHER_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Local script launcher
#[derive(Parser)]
#[command(
    name = "quickbox",
    version = env!("CARGO_PKG_VERSION"),
    about = "Launch Python scripts from registered folders",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Preferences file
    #[arg(long, global = true, env = PREFERENCES_PATH_ENV)]
    prefs: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Scripts to run directly
    #[arg(value_name = "SCRIPT")]
    scripts: Vec<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered scripts by category
    List {
        /// Only names containing this text (case-insensitive)
        #[arg(short, long)]
        query: Option<String>,

        /// Only this category
        #[arg(short, long)]
        category: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run a registered script by name, or a script file by path
    Run {
        #[arg(value_name = "NAME|PATH")]
        target: String,
    },

    /// Manage registered folders
    Folders {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Rewrite the #pqr header of a script
    Meta {
        path: PathBuf,

        #[arg(long)]
        cat: Option<String>,

        #[arg(long)]
        mac: Option<String>,

        #[arg(long)]
        win: Option<String>,

        #[arg(long)]
        linux: Option<String>,

        /// Default interpreter for every OS
        #[arg(long = "def")]
        default: Option<String>,

        /// Run inside a terminal window
        #[arg(long)]
        term: Option<bool>,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        setting: ConfigSetting,
    },

    /// Rescan whenever a registered folder changes
    Watch,

    /// Open the folder containing a script
    Reveal { path: PathBuf },
}

#[derive(Subcommand)]
enum FolderAction {
    List,
    Add { path: PathBuf },
    Remove { path: PathBuf },
}

#[derive(Subcommand)]
enum ConfigSetting {
    /// Application-wide default interpreter; empty string clears it
    Interpreter { path: Option<String> },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let prefs_path = cli.prefs.unwrap_or_else(JsonPreferenceStore::default_path);
    let store = JsonPreferenceStore::open(prefs_path)?;
    let (mut ctx, reports) = AppContext::new(Box::new(store), true);

    let Some(command) = cli.command else {
        return run_scripts(&ctx, &reports, &cli.scripts);
    };

    match command {
        Commands::List {
            query,
            category,
            json,
        } => {
            let scan = ctx.refresh("cli");
            print_entries(&scan, category.as_deref(), query.as_deref(), json)?;
        }
        Commands::Run { target } => {
            ctx.refresh("cli");
            let entry = match ctx.find_entry(&target) {
                Ok(entry) => entry,
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    return Ok(ExitCode::FAILURE);
                }
            };
            // Failures are reported through the channel
            let _ = ctx.run_entry(&entry);
            return Ok(exit_code(wait_for_reports(&reports, 1)));
        }
        Commands::Folders { action } => match action {
            FolderAction::List => print_folders(&ctx.folders()),
            FolderAction::Add { path } => {
                let folder = absolute(&path)?;
                if !folder.is_dir() {
                    warn!(folder = %folder.display(), "Registering a folder that does not exist");
                }
                print_folders(&ctx.add_folder(folder)?);
            }
            FolderAction::Remove { path } => {
                let folder = absolute(&path).unwrap_or(path);
                print_folders(&ctx.remove_folder(&folder)?);
            }
        },
        Commands::Meta {
            path,
            cat,
            mac,
            win,
            linux,
            default,
            term,
        } => {
            if !is_script_file(&path) {
                anyhow::bail!("{} is not a .py script", path.display());
            }
            let mut header = parse_header_file(&path);
            let overrides = [
                (&mut header.category, cat),
                (&mut header.interp_mac, mac),
                (&mut header.interp_win, win),
                (&mut header.interp_linux, linux),
                (&mut header.interp_default, default),
            ];
            for (field, value) in overrides {
                if let Some(value) = value {
                    *field = value;
                }
            }
            if let Some(term) = term {
                header.terminal = term;
            }
            ctx.update_metadata(&path, &header)?;
            println!("{}", format_header_line(&header)?);
        }
        Commands::Config { setting } => match setting {
            ConfigSetting::Interpreter { path: Some(path) } => {
                ctx.set_default_interpreter(&path)?;
                print_interpreter(&ctx);
            }
            ConfigSetting::Interpreter { path: None } => print_interpreter(&ctx),
        },
        Commands::Watch => watch(&mut ctx)?,
        Commands::Reveal { path } => reveal_in_file_manager(&path)?,
    }

    Ok(ExitCode::SUCCESS)
}

/// Run loose script files given on the command line
fn run_scripts(
    ctx: &AppContext,
    reports: &async_channel::Receiver<LaunchReport>,
    scripts: &[PathBuf],
) -> Result<ExitCode> {
    let mut launched = 0;
    let mut all_ok = true;

    for path in scripts {
        if !is_script_file(path) {
            warn!(path = %path.display(), "Skipping non-script argument");
            continue;
        }
        match entry_from_path(path) {
            Ok(entry) => {
                let _ = ctx.run_entry(&entry);
                launched += 1;
            }
            Err(e) => {
                eprintln!("{}", e.user_message());
                all_ok = false;
            }
        }
    }

    if launched == 0 && scripts.is_empty() {
        println!("Nothing to run. See `quickbox --help`.");
    }
    let reports_ok = wait_for_reports(reports, launched);
    Ok(exit_code(all_ok && reports_ok))
}

/// Block until `count` launches have reported. Returns true if all succeeded.
fn wait_for_reports(reports: &async_channel::Receiver<LaunchReport>, count: usize) -> bool {
    let mut all_ok = true;
    for _ in 0..count {
        let Ok(report) = reports.recv_blocking() else {
            return false;
        };
        match &report.outcome {
            LaunchOutcome::Exited { code: 0 } => {
                info!(script = %report.script_path.display(), "Script finished");
            }
            LaunchOutcome::Exited { code } => {
                eprintln!(
                    "Terminal for {} exited with code {}",
                    report.script_path.display(),
                    code
                );
                all_ok = false;
            }
            LaunchOutcome::Failed(e) => {
                eprintln!("{}", e.user_message());
                all_ok = false;
            }
        }
    }
    all_ok
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
    std::path::absolute(&expanded)
        .with_context(|| format!("Failed to resolve {}", expanded.display()))
}

fn print_entries(
    scan: &ScanResult,
    category: Option<&str>,
    query: Option<&str>,
    json: bool,
) -> Result<()> {
    let categories: Vec<String> = match category {
        Some(category) => vec![category.to_string()],
        None => scan.categories.clone(),
    };

    if json {
        let all = scan.entries_in(category.unwrap_or(ALL_CATEGORY));
        let entries = filter_entries(&all, query.unwrap_or(""));
        let plain: Vec<&ScriptEntry> = entries.iter().map(|e| e.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&plain)?);
        return Ok(());
    }

    for category in categories {
        let entries = filter_entries(&scan.entries_in(&category), query.unwrap_or(""));
        if entries.is_empty() {
            continue;
        }
        println!("{}", category);
        for entry in entries {
            let mode = if entry.terminal { "terminal" } else { "direct" };
            println!("  {:<24} {:<9} {}", entry.name, mode, entry.path.display());
        }
    }
    Ok(())
}

fn print_folders(folders: &[PathBuf]) {
    if folders.is_empty() {
        println!("No registered folders");
    }
    for folder in folders {
        println!("{}", folder.display());
    }
}

fn print_interpreter(ctx: &AppContext) {
    let configured = &ctx.settings().default_interpreter;
    if configured.is_empty() {
        println!(
            "(not set, falls back to {})",
            fallback_interpreter(ctx.dispatcher().host())
        );
    } else {
        println!("{}", configured);
    }
}

fn print_scan_summary(scan: &ScanResult) {
    println!(
        "{} scripts in {} categories",
        scan.len(),
        scan.categories.len()
    );
}

/// Rescan on folder changes. Preferences are re-read whenever the folders are
/// quiet so folders registered from another shell are picked up.
fn watch(ctx: &mut AppContext) -> Result<()> {
    print_scan_summary(&ctx.refresh("startup"));

    let mut events = ctx.start_watching()?;
    println!("Watching {} folders (Ctrl-C to stop)", ctx.folders().len());

    loop {
        match events.recv_timeout(PREFERENCES_POLL_INTERVAL) {
            Ok(ScriptReloadEvent::Rescan { paths }) => {
                info!(changed = paths.len(), "Folder change detected");
                print_scan_summary(&ctx.refresh("watcher"));
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some(Some(scan)) = ctx.reload_settings().log_err() {
                    println!("Registered folders changed, watching {}", ctx.folders().len());
                    print_scan_summary(&scan);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Script watcher stopped, restarting");
                thread::sleep(WATCHER_RESTART_DELAY);
                events = ctx.start_watching()?;
                print_scan_summary(&ctx.refresh("watcher_restarted"));
            }
        }
    }
}
