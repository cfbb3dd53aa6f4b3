//! Status emoji for Claude Code panes in tmux.
//!
//! Claude Code hooks call `ccpane-hook` to prefix the window name of the
//! pane Claude runs in with an emoji; tmux hooks call it again to restore the
//! original name once the user looks at that pane.

pub mod config;
pub mod debug_log;
pub mod hooks;
pub mod monitor;
pub mod notify;
pub mod report;
pub mod store;
pub mod tmux;

pub use config::Config;
pub use hooks::{apply_status, restore_pane, Context, HookAction, HookPayload, Outcome};
pub use monitor::{cleanup, handle_event, CleanupReport, PaneEvent};
pub use store::{Capture, PaneRecord, PaneStore, Status};
pub use tmux::{CommandError, CommandRunner, SystemRunner, Tmux};
