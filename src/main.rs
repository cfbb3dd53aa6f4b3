//! ccpane - status emoji for Claude Code panes in tmux
//!
//! Diagnostics and maintenance for the pane state kept by `ccpane-hook`.

use std::collections::HashSet;
use std::path::Path;
use std::process;

use ccpane::config::Config;
use ccpane::debug_log;
use ccpane::hooks::{restore_pane, Context, Outcome};
use ccpane::monitor::{cleanup, tmux_conf};
use ccpane::report::render_status;
use ccpane::store::PaneStore;
use ccpane::tmux::SystemRunner;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DebugAction {
    /// Turn debug logging on
    Enable,
    /// Turn debug logging off
    Disable,
    /// Print whether debug logging is on
    Status,
    /// Print log file sizes as JSON
    Stats,
    /// Delete all log files
    Clear,
}

/// Status emoji for Claude Code panes in tmux.
#[derive(Parser)]
#[command(
    name = "ccpane",
    version,
    about,
    long_about = "\
Status emoji for Claude Code panes in tmux.\n\n\
ccpane-hook puts an emoji in front of the window name of the pane Claude \
runs in when it stops or needs attention, and takes it off again when you \
select the pane or press Enter in it. This command inspects and maintains \
that state.\n\n\
Run without arguments to list tracked panes.\n\n\
Claude Code hooks (~/.claude/settings.json):\n  \
Stop          ccpane-hook stop\n  \
Notification  ccpane-hook notification\n  \
PreToolUse    ccpane-hook pretooluse\n\n\
Environment variables:\n  \
CCPANE_STATE_DIR  Override the state directory\n  \
CCPANE_DEBUG=1    Force debug logging on"
)]
struct Cli {
    /// List tracked panes and exit
    #[arg(short, long)]
    status: bool,

    /// With --status, print the raw records as JSON
    #[arg(long)]
    json: bool,

    /// Forget records of closed panes and revert panes styled for too long
    #[arg(long)]
    cleanup: bool,

    /// Restore a pane's original title and forget it
    #[arg(long, value_name = "PANE_ID")]
    restore: Option<String>,

    /// Manage debug logging
    #[arg(long, value_enum, value_name = "ACTION")]
    debug: Option<DebugAction>,

    /// Print recent debug log lines, optionally for one component (hook, ccpane)
    #[arg(long, value_name = "COMPONENT", num_args = 0..=1, default_missing_value = "")]
    logs: Option<String>,

    /// Number of lines per log file for --logs
    #[arg(long, default_value_t = 50)]
    lines: usize,

    /// Print the tmux.conf lines that wire up pane events
    #[arg(long)]
    tmux_conf: bool,

    /// Print the loaded configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let cli = Cli::parse();
    let state_dir = Config::state_dir();
    debug_log::init(&state_dir, "ccpane");

    let config = match Config::try_load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {:#}, using default config", e);
            Config::default()
        }
    };

    if cli.print_config {
        match toml::to_string_pretty(&config) {
            Ok(text) => print!("{}", text),
            Err(e) => fail(format!("Failed to render config: {}", e)),
        }
        return;
    }

    if cli.tmux_conf {
        print!("{}", tmux_conf(&hook_binary_path()));
        return;
    }

    if let Some(action) = cli.debug {
        run_debug_action(action, &state_dir);
        return;
    }

    if let Some(component) = cli.logs {
        let component = Some(component.as_str()).filter(|c| !c.is_empty());
        show_logs(&Config::logs_dir(), component, cli.lines);
        return;
    }

    let runner = SystemRunner::new(config.tmux.timeout());
    let store = PaneStore::open(&config);
    let ctx = Context::new(runner, store, config);

    if cli.cleanup {
        match cleanup(&ctx, ctx.config.store.max_record_age()) {
            Ok(report) => println!(
                "Removed {} record(s) of closed panes, restored {} stale pane(s)",
                report.removed_dead, report.restored_stale
            ),
            Err(e) => fail(format!("Error during cleanup: {:#}", e)),
        }
        return;
    }

    if let Some(pane_id) = cli.restore {
        match restore_pane(&ctx, &pane_id) {
            Ok(Outcome::Restored { .. }) => println!("Restored {}", pane_id),
            Ok(Outcome::Removed { .. }) => println!("Dropped stale record for {}", pane_id),
            Ok(Outcome::Unchanged) => println!("{} is not tracked", pane_id),
            Ok(other) => fail(format!("Could not restore {}: {}", pane_id, other)),
            Err(e) => fail(format!("Could not restore {}: {:#}", pane_id, e)),
        }
        return;
    }

    if cli.status || cli.json {
        list_panes(&ctx, cli.json);
        return;
    }

    // Default: list tracked panes
    list_panes(&ctx, false);
}

fn fail(message: String) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

/// `ccpane-hook` next to this executable, or bare `ccpane-hook` for PATH lookup.
fn hook_binary_path() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("ccpane-hook")))
        .filter(|path| path.exists())
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_else(|| "ccpane-hook".to_string())
}

fn list_panes(ctx: &Context<SystemRunner>, json: bool) {
    let records = match ctx.store.list() {
        Ok(records) => records,
        Err(e) => fail(format!("Failed to read pane state: {:#}", e)),
    };

    if json {
        let map: serde_json::Map<String, serde_json::Value> = records
            .iter()
            .filter_map(|(id, record)| Some((id.clone(), serde_json::to_value(record).ok()?)))
            .collect();
        match serde_json::to_string_pretty(&map) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(format!("Failed to render records: {}", e)),
        }
        return;
    }

    let panes = ctx.tmux.list_panes();
    let live: Option<HashSet<String>> = if panes.is_empty() {
        None
    } else {
        Some(panes.into_iter().map(|p| p.pane_id).collect())
    };
    print!(
        "{}",
        render_status(&records, live.as_ref(), &ctx.config.emoji)
    );
}

fn run_debug_action(action: DebugAction, state_dir: &Path) {
    match action {
        DebugAction::Enable => match debug_log::set_enabled(state_dir, true) {
            Ok(()) => println!(
                "Debug logging enabled. Logs will be written to: {}",
                state_dir.join("logs").display()
            ),
            Err(e) => fail(format!("Failed to enable debug logging: {:#}", e)),
        },
        DebugAction::Disable => match debug_log::set_enabled(state_dir, false) {
            Ok(()) => println!("Debug logging disabled."),
            Err(e) => fail(format!("Failed to disable debug logging: {:#}", e)),
        },
        DebugAction::Status => {
            let state = if debug_log::is_enabled(state_dir) {
                "enabled"
            } else {
                "disabled"
            };
            println!("Debug logging {}", state);
        }
        DebugAction::Stats => {
            let stats = debug_log::stats(state_dir);
            match serde_json::to_string_pretty(&stats) {
                Ok(text) => println!("{}", text),
                Err(e) => fail(format!("Failed to render stats: {}", e)),
            }
        }
        DebugAction::Clear => {
            let count = debug_log::clear(&Config::logs_dir());
            println!("Cleared {} log file(s).", count);
        }
    }
}

fn show_logs(logs_dir: &Path, component: Option<&str>, lines: usize) {
    if !logs_dir.exists() {
        println!("No logs directory found.");
        return;
    }
    match debug_log::tail(logs_dir, component, lines) {
        Ok(files) => {
            for (name, lines) in files {
                println!("\n=== {} ===", name);
                for line in lines {
                    println!("{}", line);
                }
            }
        }
        Err(e) => fail(format!("{:#}", e)),
    }
}
