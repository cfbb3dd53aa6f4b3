//! Pane activity monitor.
//!
//! Reacts to tmux events: a styled pane is reverted the moment the user
//! looks at it (pane or window selection, Enter) and forgotten when it
//! exits.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{Duration, Utc};

use crate::hooks::{restore_pane, Context, Outcome};
use crate::tmux::CommandRunner;

/// A tmux event concerning one pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneEvent {
    /// `after-select-pane`
    PaneSelected(String),
    /// `after-select-window`; carries the window's active pane
    WindowSelected(String),
    /// `pane-exited`
    PaneExited(String),
    /// Enter pressed; the pane is the one typed into, when tmux passed it
    EnterPressed(Option<String>),
}

pub fn handle_event<R: CommandRunner>(ctx: &Context<R>, event: PaneEvent) -> Result<Outcome> {
    tracing::debug!(event = ?event, "pane event");
    match event {
        PaneEvent::PaneSelected(pane_id) | PaneEvent::WindowSelected(pane_id) => {
            restore_pane(ctx, &pane_id)
        }
        PaneEvent::PaneExited(pane_id) => forget_pane(ctx, &pane_id),
        PaneEvent::EnterPressed(pane_id) => {
            let Some(pane_id) = pane_id.or_else(|| ctx.tmux.focused_pane()) else {
                if !ctx.tmux.send_enter_focused() {
                    tracing::warn!("failed to forward Enter");
                }
                return Ok(Outcome::Skipped("no focused pane"));
            };
            // The key must reach the shell even if the store is unavailable.
            let outcome = restore_pane(ctx, &pane_id).unwrap_or_else(|e| {
                tracing::warn!(pane_id = %pane_id, error = %e, "could not clear pane on Enter");
                Outcome::Skipped("store unavailable")
            });
            if !ctx.tmux.send_enter(&pane_id) {
                tracing::warn!(pane_id = %pane_id, "failed to forward Enter");
            }
            Ok(outcome)
        }
    }
}

/// Drops the record of an exited pane. Its title no longer matters.
fn forget_pane<R: CommandRunner>(ctx: &Context<R>, pane_id: &str) -> Result<Outcome> {
    let mut guard = ctx.store.lock()?;
    if guard.remove(pane_id).is_none() {
        return Ok(Outcome::Unchanged);
    }
    guard.commit()?;
    tracing::info!(pane_id, "forgot exited pane");
    Ok(Outcome::Removed {
        pane_id: pane_id.to_string(),
    })
}

/// tmux configuration that routes pane events to `hook_bin`.
///
/// The Enter binding runs in the foreground so the forwarded key keeps its
/// place relative to whatever the user types next.
pub fn tmux_conf(hook_bin: &str) -> String {
    format!(
        "\
# ccpane: revert status emoji when a pane gets attention
set-hook -g after-select-pane 'run-shell -b \"{bin} pane-selected #{{pane_id}}\"'
set-hook -g after-select-window 'run-shell -b \"{bin} window-selected #{{pane_id}}\"'
set-hook -g pane-exited 'run-shell -b \"{bin} pane-exited #{{hook_pane}}\"'
bind-key -n Enter run-shell \"{bin} clear_emoji_on_enter #{{pane_id}}\"
",
        bin = hook_bin
    )
}

/// Counts from a [`cleanup`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    /// Records whose pane no longer exists
    pub removed_dead: usize,
    /// Live panes styled for longer than the max age, now reverted
    pub restored_stale: usize,
}

/// Removes records of panes that no longer exist and reverts panes that
/// have been styled for longer than `max_age`.
///
/// When tmux reports no panes at all it is treated as unavailable and
/// nothing is removed.
pub fn cleanup<R: CommandRunner>(ctx: &Context<R>, max_age: Duration) -> Result<CleanupReport> {
    let live: HashMap<String, Option<u32>> = ctx
        .tmux
        .list_panes()
        .into_iter()
        .map(|pane| (pane.pane_id, pane.pid))
        .collect();
    let mut report = CleanupReport::default();
    if live.is_empty() {
        tracing::warn!("tmux reported no panes, skipping cleanup");
        return Ok(report);
    }

    let now = Utc::now();
    let mut guard = ctx.store.lock()?;
    for (pane_id, record) in guard.list() {
        // Already reverted along with a sibling in the same window.
        if guard.get(&pane_id).is_none() {
            continue;
        }
        let alive = match live.get(&pane_id) {
            Some(pid) => record.belongs_to(*pid),
            None => false,
        };
        if !alive {
            guard.remove(&pane_id);
            report.removed_dead += 1;
            continue;
        }

        if now.signed_duration_since(record.set_at) > max_age
            && ctx.tmux.set_pane_title(&pane_id, &record.original_title)
        {
            if record.auto_rename {
                ctx.tmux.set_auto_rename(&pane_id, true);
            }
            match record.window_id.as_deref() {
                Some(window_id) => {
                    guard.remove_window(window_id);
                }
                None => {
                    guard.remove(&pane_id);
                }
            }
            report.restored_stale += 1;
        }
    }
    guard.commit()?;

    tracing::info!(
        removed_dead = report.removed_dead,
        restored_stale = report.restored_stale,
        "cleanup finished"
    );
    Ok(report)
}
