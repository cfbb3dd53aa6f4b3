//! ccpane-hook: hook handler binary.
//!
//! Called by Claude Code hooks to put a status emoji on the window of the
//! pane Claude runs in, and by tmux hooks and key bindings to take it off
//! again once the user pays attention to that pane.
//!
//! Usage: ccpane-hook <action> [pane_id]
//!
//! Actions: stop, notification, pretooluse, restore, clear_emoji_on_enter,
//! pane-selected, window-selected, pane-exited

use std::env;
use std::io::{self, IsTerminal, Read};
use std::process;

use ccpane::config::Config;
use ccpane::debug_log;
use ccpane::hooks::{Context, HookAction, HookPayload};
use ccpane::store::PaneStore;
use ccpane::tmux::SystemRunner;

const USAGE: &str = "Usage: ccpane-hook <stop|notification|pretooluse|restore|clear_emoji_on_enter|pane-selected|window-selected|pane-exited> [pane_id]";

/// Reads the JSON payload Claude Code pipes to its hooks.
///
/// tmux runs hooks without a payload; a terminal on stdin means a person is
/// running the command by hand, so don't wait for input.
fn read_payload() -> Option<HookPayload> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return None;
    }
    let mut buf = String::new();
    if let Err(e) = stdin.lock().read_to_string(&mut buf) {
        tracing::debug!(error = %e, "failed to read hook payload");
        return None;
    }
    HookPayload::from_json(&buf)
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Handle --version flag
    if args.len() >= 2 && (args[1] == "--version" || args[1] == "-V") {
        println!("ccpane-hook {}", env!("CARGO_PKG_VERSION"));
        process::exit(0);
    }

    if args.len() < 2 {
        eprintln!("{}", USAGE);
        process::exit(2);
    }

    let action: HookAction = match args[1].parse() {
        Ok(action) => action,
        Err(e) => {
            eprintln!("ccpane-hook: {}", e);
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };
    let pane_arg = args.get(2).map(String::as_str);

    let state_dir = Config::state_dir();
    debug_log::init(&state_dir, "hook");
    tracing::info!(action = %action, pane_arg = ?pane_arg, "ccpane-hook started");

    let config = Config::load();
    let payload = if action.reads_payload() {
        read_payload()
    } else {
        None
    };
    if let Some(payload) = &payload {
        tracing::debug!(payload = ?payload, "hook payload");
    }

    let runner = SystemRunner::new(config.tmux.timeout());
    let store = PaneStore::open(&config);
    let ctx = Context::new(runner, store, config);

    // Past this point failures are logged, never surfaced; exit status stays 0.
    match action.run(&ctx, pane_arg, payload.as_ref()) {
        Ok(outcome) => tracing::info!(action = %action, outcome = %outcome, "hook finished"),
        Err(e) => tracing::error!(action = %action, error = %format!("{:#}", e), "hook failed"),
    }
}
