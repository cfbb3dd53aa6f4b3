//! Hook handlers.
//!
//! `ccpane-hook <action>` is invoked by Claude Code hooks (`stop`,
//! `notification`, `pretooluse`) and by tmux hooks and key bindings
//! (`restore`, `clear_emoji_on_enter`, `pane-selected`, ...). Each action
//! maps to one handler taking the same [`Context`].

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{Config, EmojiConfig};
use crate::monitor::{self, PaneEvent};
use crate::notify::{format_message, Notifier};
use crate::store::{Capture, PaneStore, Status};
use crate::tmux::{CommandRunner, Tmux};

/// Everything a handler touches: tmux, the notifier, the store and config.
pub struct Context<R> {
    pub tmux: Tmux<R>,
    pub notifier: Notifier<R>,
    pub store: PaneStore,
    pub config: Config,
}

impl<R: CommandRunner + Clone> Context<R> {
    pub fn new(runner: R, store: PaneStore, config: Config) -> Self {
        Self {
            tmux: Tmux::new(runner.clone(), config.tmux.binary.clone()),
            notifier: Notifier::new(runner, config.notify.clone()),
            store,
            config,
        }
    }
}

/// What a handler did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The pane's title now carries a status emoji
    Applied { pane_id: String, title: String },
    /// The original title was written back and the record removed
    Restored { pane_id: String },
    /// The record was dropped without touching the title
    Removed { pane_id: String },
    /// Nothing to do
    Unchanged,
    /// The action could not run; the reason is for logs only
    Skipped(&'static str),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied { pane_id, title } => write!(f, "applied {:?} to {}", title, pane_id),
            Outcome::Restored { pane_id } => write!(f, "restored {}", pane_id),
            Outcome::Removed { pane_id } => write!(f, "removed record for {}", pane_id),
            Outcome::Unchanged => write!(f, "unchanged"),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

/// Payload Claude Code writes to a hook's stdin.
///
/// Only the fields ccpane uses; all optional so unknown hook shapes parse.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    /// Only present for PreToolUse/PostToolUse
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Only present for Notification
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub notification_type: Option<String>,
}

impl HookPayload {
    /// Parses a payload, returning `None` for empty or malformed input.
    pub fn from_json(input: &str) -> Option<Self> {
        if input.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(input) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparsable hook payload");
                None
            }
        }
    }
}

/// The `ccpane-hook` subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Stop,
    Notification,
    PreToolUse,
    Restore,
    ClearEmojiOnEnter,
    PaneSelected,
    WindowSelected,
    PaneExited,
}

impl HookAction {
    pub const ALL: [HookAction; 8] = [
        HookAction::Stop,
        HookAction::Notification,
        HookAction::PreToolUse,
        HookAction::Restore,
        HookAction::ClearEmojiOnEnter,
        HookAction::PaneSelected,
        HookAction::WindowSelected,
        HookAction::PaneExited,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookAction::Stop => "stop",
            HookAction::Notification => "notification",
            HookAction::PreToolUse => "pretooluse",
            HookAction::Restore => "restore",
            HookAction::ClearEmojiOnEnter => "clear_emoji_on_enter",
            HookAction::PaneSelected => "pane-selected",
            HookAction::WindowSelected => "window-selected",
            HookAction::PaneExited => "pane-exited",
        }
    }

    /// Whether Claude Code invokes this action (and may pipe a payload).
    pub fn reads_payload(&self) -> bool {
        matches!(
            self,
            HookAction::Stop | HookAction::Notification | HookAction::PreToolUse
        )
    }

    /// Runs the handler for this action.
    ///
    /// `pane_arg` is the optional explicit pane id from the command line.
    pub fn run<R: CommandRunner>(
        self,
        ctx: &Context<R>,
        pane_arg: Option<&str>,
        payload: Option<&HookPayload>,
    ) -> Result<Outcome> {
        match self {
            HookAction::Stop => apply_status(ctx, Status::Stop, pane_arg, payload),
            HookAction::Notification => apply_status(ctx, Status::Notification, pane_arg, payload),
            HookAction::PreToolUse => {
                if !needs_permission(payload, &ctx.config.hooks.permission_tools) {
                    return Ok(Outcome::Unchanged);
                }
                apply_status(ctx, Status::Permission, pane_arg, payload)
            }
            HookAction::Restore => match ctx.tmux.active_pane(pane_arg) {
                Some(pane_id) => restore_pane(ctx, &pane_id),
                None => Ok(Outcome::Skipped("no pane to restore")),
            },
            HookAction::ClearEmojiOnEnter => {
                monitor::handle_event(ctx, PaneEvent::EnterPressed(pane_arg.map(String::from)))
            }
            HookAction::PaneSelected | HookAction::WindowSelected => {
                let Some(pane_id) = ctx.tmux.active_pane(pane_arg) else {
                    return Ok(Outcome::Skipped("no selected pane"));
                };
                let event = if self == HookAction::PaneSelected {
                    PaneEvent::PaneSelected(pane_id)
                } else {
                    PaneEvent::WindowSelected(pane_id)
                };
                monitor::handle_event(ctx, event)
            }
            HookAction::PaneExited => match pane_arg {
                Some(pane_id) => monitor::handle_event(ctx, PaneEvent::PaneExited(pane_id.to_string())),
                None => Ok(Outcome::Skipped("pane-exited needs a pane id")),
            },
        }
    }
}

impl fmt::Display for HookAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for HookAction {
    type Err = UnknownAction;

    /// Accepts the ccpane action names and the Claude Code hook event names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Stop" => return Ok(HookAction::Stop),
            "Notification" => return Ok(HookAction::Notification),
            "PreToolUse" => return Ok(HookAction::PreToolUse),
            _ => {}
        }
        HookAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Whether a PreToolUse hook means Claude is waiting on a permission prompt.
///
/// Without a payload there is nothing to go on, so assume it is.
pub fn needs_permission(payload: Option<&HookPayload>, permission_tools: &[String]) -> bool {
    match payload {
        None => true,
        Some(payload) => payload
            .tool_name
            .as_deref()
            .map(|tool| permission_tools.iter().any(|t| t == tool))
            .unwrap_or(false),
    }
}

/// Strips one leading status emoji (and its space) from a title.
///
/// A title captured while still styled, e.g. after a crash between renaming
/// the window and saving the record, would otherwise keep its emoji forever.
pub fn strip_status_prefix<'a>(title: &'a str, emoji: &EmojiConfig) -> &'a str {
    [
        emoji.stop.as_str(),
        emoji.notification.as_str(),
        emoji.permission.as_str(),
    ]
    .iter()
    .filter(|e| !e.is_empty())
    .find_map(|e| title.strip_prefix(*e).and_then(|rest| rest.strip_prefix(' ')))
    .unwrap_or(title)
}

pub fn render_title(emoji: &str, original_title: &str) -> String {
    format!("{} {}", emoji, original_title)
}

/// Overlays `status` on the hook's pane.
///
/// The whole read-modify-write runs under the store lock, so concurrent
/// hooks on one pane apply in lock order and the last one wins.
pub fn apply_status<R: CommandRunner>(
    ctx: &Context<R>,
    status: Status,
    pane_arg: Option<&str>,
    payload: Option<&HookPayload>,
) -> Result<Outcome> {
    let Some(emoji) = status.emoji(&ctx.config.emoji) else {
        return Ok(Outcome::Unchanged);
    };
    let Some(pane_id) = ctx.tmux.active_pane(pane_arg) else {
        tracing::warn!(status = status.as_str(), "could not determine Claude pane id");
        return Ok(Outcome::Skipped("no pane"));
    };

    let mut guard = ctx.store.lock()?;

    let Some(current_title) = ctx.tmux.pane_title(&pane_id) else {
        tracing::warn!(pane_id = %pane_id, "could not read pane title");
        return Ok(Outcome::Skipped("title unavailable"));
    };
    let live_pid = ctx.tmux.pane_pid(&pane_id);
    let window_id = ctx.tmux.window_id(&pane_id);

    let saved = guard
        .get(&pane_id)
        .map(|record| (record.belongs_to(live_pid), record.original_title.clone()));
    let saved_title = match saved {
        Some((true, title)) => Some(title),
        Some((false, _)) => {
            tracing::info!(pane_id = %pane_id, "discarding record left by a previous pane with this id");
            guard.remove(&pane_id);
            None
        }
        None => None,
    };

    let (original_title, capture) = match saved_title {
        Some(title) => {
            tracing::debug!(pane_id = %pane_id, original = %title, "using saved original title");
            (title.clone(), Capture::title(title))
        }
        None => {
            // Another styled pane in this window already holds the window's
            // real name and automatic-rename setting.
            let shared = window_id
                .as_deref()
                .and_then(|window| guard.window_sibling(window, &pane_id))
                .map(|record| (record.original_title.clone(), record.auto_rename));
            let (title, auto_rename) = match shared {
                Some(shared) => {
                    tracing::debug!(pane_id = %pane_id, "sharing capture with window sibling");
                    shared
                }
                None => (
                    strip_status_prefix(&current_title, &ctx.config.emoji).to_string(),
                    // Read before set_pane_title switches it off.
                    ctx.tmux.auto_rename(&pane_id),
                ),
            };
            let capture = Capture {
                original_title: title.clone(),
                auto_rename,
                pane_pid: live_pid,
                window_id,
            };
            (title, capture)
        }
    };

    let title = render_title(emoji, &original_title);
    if !ctx.tmux.set_pane_title(&pane_id, &title) {
        return Ok(Outcome::Skipped("title write failed"));
    }

    guard.upsert(&pane_id, status, capture);
    guard.commit()?;
    tracing::info!(pane_id = %pane_id, status = status.as_str(), title = %title, "pane styled");

    if ctx.notifier.wants(status) {
        let session = ctx
            .tmux
            .session_name(&pane_id)
            .unwrap_or_else(|| "unknown".to_string());
        let detail = payload.and_then(|p| p.message.as_deref());
        let message = format_message(&session, &pane_id, status, detail);
        ctx.notifier.notify(&message, status != Status::Stop);
    }

    Ok(Outcome::Applied { pane_id, title })
}

/// Writes the saved original title back and forgets the pane, along with
/// any other records of the same window since its name is now clean.
///
/// No record means nothing to do. If tmux refuses the rename the record is
/// kept so the next event can try again.
pub fn restore_pane<R: CommandRunner>(ctx: &Context<R>, pane_id: &str) -> Result<Outcome> {
    let mut guard = ctx.store.lock()?;

    let Some(record) = guard.get(pane_id).cloned() else {
        tracing::debug!(pane_id, "no saved state, nothing to restore");
        return Ok(Outcome::Unchanged);
    };

    if record.pane_pid.is_some() && !record.belongs_to(ctx.tmux.pane_pid(pane_id)) {
        tracing::info!(pane_id, "pane id was reused, dropping record without restoring");
        guard.remove(pane_id);
        guard.commit()?;
        return Ok(Outcome::Removed {
            pane_id: pane_id.to_string(),
        });
    }

    if !ctx.tmux.set_pane_title(pane_id, &record.original_title) {
        tracing::warn!(pane_id, "failed to restore pane title, keeping record");
        return Ok(Outcome::Skipped("title write failed"));
    }
    if record.auto_rename {
        ctx.tmux.set_auto_rename(pane_id, true);
    }

    match record.window_id.as_deref() {
        Some(window_id) => {
            let removed = guard.remove_window(window_id);
            tracing::debug!(window_id, panes = ?removed, "forgot window records");
        }
        None => {
            guard.remove(pane_id);
        }
    }
    guard.commit()?;
    tracing::info!(pane_id, title = %record.original_title, "pane restored");

    Ok(Outcome::Restored {
        pane_id: pane_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        for action in HookAction::ALL {
            assert_eq!(action.as_str().parse::<HookAction>().unwrap(), action);
        }
    }

    #[test]
    fn test_parse_claude_event_names() {
        assert_eq!("Stop".parse::<HookAction>().unwrap(), HookAction::Stop);
        assert_eq!(
            "Notification".parse::<HookAction>().unwrap(),
            HookAction::Notification
        );
        assert_eq!(
            "PreToolUse".parse::<HookAction>().unwrap(),
            HookAction::PreToolUse
        );
    }

    #[test]
    fn test_parse_unknown_action() {
        let err = "explode".parse::<HookAction>().unwrap_err();
        assert_eq!(err, UnknownAction("explode".to_string()));
        assert_eq!(err.to_string(), "unknown action: explode");
    }

    #[test]
    fn test_reads_payload() {
        assert!(HookAction::Stop.reads_payload());
        assert!(HookAction::PreToolUse.reads_payload());
        assert!(!HookAction::PaneSelected.reads_payload());
        assert!(!HookAction::ClearEmojiOnEnter.reads_payload());
    }

    #[test]
    fn test_parse_payload() {
        let json = r#"{
            "session_id": "abc123",
            "cwd": "/tmp/test",
            "hook_event_name": "PreToolUse",
            "tool_name": "Bash",
            "tool_input": {"command": "ls"}
        }"#;
        let payload = HookPayload::from_json(json).unwrap();
        assert_eq!(payload.session_id.as_deref(), Some("abc123"));
        assert_eq!(payload.tool_name.as_deref(), Some("Bash"));
        assert!(payload.message.is_none());
    }

    #[test]
    fn test_parse_payload_empty_or_invalid() {
        assert!(HookPayload::from_json("").is_none());
        assert!(HookPayload::from_json("  \n").is_none());
        assert!(HookPayload::from_json("not json").is_none());
    }

    #[test]
    fn test_needs_permission() {
        let tools: Vec<String> = vec!["Bash".to_string(), "Edit".to_string()];
        let bash = HookPayload {
            tool_name: Some("Bash".to_string()),
            ..Default::default()
        };
        let read = HookPayload {
            tool_name: Some("Read".to_string()),
            ..Default::default()
        };

        assert!(needs_permission(None, &tools));
        assert!(needs_permission(Some(&bash), &tools));
        assert!(!needs_permission(Some(&read), &tools));
        assert!(!needs_permission(Some(&HookPayload::default()), &tools));
    }

    #[test]
    fn test_strip_status_prefix() {
        let emoji = EmojiConfig::default();
        assert_eq!(strip_status_prefix("✅ zsh", &emoji), "zsh");
        assert_eq!(strip_status_prefix("📢 vim main.rs", &emoji), "vim main.rs");
        assert_eq!(strip_status_prefix("❓ bash", &emoji), "bash");
        assert_eq!(strip_status_prefix("zsh", &emoji), "zsh");
        // Only one prefix, and only with the separating space.
        assert_eq!(strip_status_prefix("✅ ✅ zsh", &emoji), "✅ zsh");
        assert_eq!(strip_status_prefix("✅zsh", &emoji), "✅zsh");
    }

    #[test]
    fn test_render_title() {
        assert_eq!(render_title("✅", "zsh"), "✅ zsh");
        assert_eq!(render_title("📢", ""), "📢 ");
    }

    #[test]
    fn test_outcome_display() {
        let outcome = Outcome::Restored {
            pane_id: "%3".to_string(),
        };
        assert_eq!(outcome.to_string(), "restored %3");
        assert_eq!(Outcome::Skipped("no pane").to_string(), "skipped: no pane");
    }
}
