//! tmux command gateway.
//!
//! Every interaction with tmux (and the notifier) is a subprocess call made
//! through a [`CommandRunner`]. [`Tmux`] turns failures of those calls into
//! `None`/`false`: a missing binary, a stale pane id or a tmux server that is
//! not running only ever skips the styling action.

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Failure of a single external command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{program} not found")]
    NotFound { program: String },
    #[error("{program} exited with status {status:?}: {stderr}")]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("failed to run {program}: {source}")]
    Io { program: String, source: io::Error },
}

impl CommandError {
    fn spawn_failed(program: &str, e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            CommandError::NotFound {
                program: program.to_string(),
            }
        } else {
            CommandError::Io {
                program: program.to_string(),
                source: e,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CommandError::NotFound { .. })
    }
}

/// Capability to run external programs.
///
/// Tests substitute a fake that records invocations instead of shelling out.
pub trait CommandRunner {
    /// Runs `program` to completion and returns its stdout without the
    /// trailing newline.
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError>;

    /// Starts `program` and returns without waiting for it.
    fn spawn(&self, program: &str, args: &[&str]) -> Result<(), CommandError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        (**self).run(program, args)
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<(), CommandError> {
        (**self).spawn(program, args)
    }
}

/// Runs real subprocesses, killing any that outlive the timeout.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        let io_err = |source: io::Error| CommandError::Io {
            program: program.to_string(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CommandError::spawn_failed(program, e))?;

        // tmux output is a few lines at most, well under the pipe buffer,
        // so polling before draining stdout cannot deadlock.
        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait().map_err(io_err)? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandError::TimedOut {
                    program: program.to_string(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_end(&mut stdout).map_err(io_err)?;
        }
        if let Some(mut err) = child.stderr.take() {
            err.read_to_end(&mut stderr).map_err(io_err)?;
        }

        if status.success() {
            Ok(strip_newline(&String::from_utf8_lossy(&stdout)).to_string())
        } else {
            Err(CommandError::Failed {
                program: program.to_string(),
                status: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            })
        }
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<(), CommandError> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| CommandError::spawn_failed(program, e))
    }
}

/// Drops one trailing line ending. Titles may legitimately end in spaces.
fn strip_newline(s: &str) -> &str {
    let s = s.strip_suffix('\n').unwrap_or(s);
    s.strip_suffix('\r').unwrap_or(s)
}

/// Returns true for ids of the form `%<digits>`.
pub fn is_valid_pane_id(id: &str) -> bool {
    match id.strip_prefix('%') {
        Some(num) => !num.is_empty() && num.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// One row of `tmux list-panes -a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub pane_id: String,
    pub window_id: String,
    /// Name of the window holding the pane
    pub title: String,
    pub active: bool,
    pub pid: Option<u32>,
}

const LIST_PANES_FORMAT: &str = "#{pane_id}\t#{window_id}\t#{pane_active}\t#{pane_pid}\t#{window_name}";

/// Parses `list-panes` output produced with [`LIST_PANES_FORMAT`].
///
/// The title is the last field so tabs inside it survive.
pub fn parse_pane_list(output: &str) -> Vec<PaneInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(5, '\t');
            let pane_id = fields.next()?;
            let window_id = fields.next()?;
            let active = fields.next()?;
            let pid = fields.next()?;
            let title = fields.next()?;
            if !is_valid_pane_id(pane_id) {
                return None;
            }
            Some(PaneInfo {
                pane_id: pane_id.to_string(),
                window_id: window_id.to_string(),
                title: title.to_string(),
                active: active == "1",
                pid: pid.parse().ok(),
            })
        })
        .collect()
}

/// Adapter over the tmux CLI.
pub struct Tmux<R> {
    runner: R,
    binary: String,
    env_pane: Option<String>,
}

impl<R: CommandRunner> Tmux<R> {
    /// Creates the adapter, remembering `$TMUX_PANE` of this process.
    pub fn new(runner: R, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            env_pane: std::env::var("TMUX_PANE").ok(),
        }
    }

    /// Replaces the pane id taken from the environment.
    pub fn with_env_pane(mut self, pane: Option<String>) -> Self {
        self.env_pane = pane;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn run(&self, args: &[&str]) -> Option<String> {
        tracing::debug!(args = ?args, "tmux");
        match self.runner.run(&self.binary, args) {
            Ok(output) => {
                tracing::trace!(output = %output, "tmux output");
                Some(output)
            }
            Err(e) => {
                tracing::warn!(args = ?args, error = %e, "tmux command failed");
                None
            }
        }
    }

    fn display(&self, pane_id: &str, format: &str) -> Option<String> {
        self.run(&["display-message", "-p", "-t", pane_id, format])
    }

    pub fn list_panes(&self) -> Vec<PaneInfo> {
        self.run(&["list-panes", "-a", "-F", LIST_PANES_FORMAT])
            .map(|output| parse_pane_list(&output))
            .unwrap_or_default()
    }

    /// Resolves the pane a hook acts on.
    ///
    /// An explicit id wins, then `$TMUX_PANE` (the pane Claude runs in, not
    /// necessarily the focused one), then whatever pane tmux reports as
    /// focused.
    pub fn active_pane(&self, explicit: Option<&str>) -> Option<String> {
        if let Some(id) = explicit {
            if is_valid_pane_id(id) {
                return Some(id.to_string());
            }
            tracing::warn!(pane_id = id, "ignoring malformed pane id argument");
        }

        if let Some(id) = self.env_pane.as_deref() {
            if is_valid_pane_id(id) {
                return Some(id.to_string());
            }
            tracing::warn!(pane_id = id, "ignoring malformed TMUX_PANE");
        }

        self.focused_pane()
    }

    /// The pane tmux currently has focused.
    pub fn focused_pane(&self) -> Option<String> {
        self.run(&["display-message", "-p", "#{pane_id}"])
            .filter(|id| is_valid_pane_id(id))
    }

    /// Title shown for the pane: the name of its window.
    pub fn pane_title(&self, pane_id: &str) -> Option<String> {
        self.display(pane_id, "#{window_name}")
    }

    /// Renames the pane's window, turning `automatic-rename` off first so
    /// tmux does not immediately overwrite the new name.
    pub fn set_pane_title(&self, pane_id: &str, title: &str) -> bool {
        self.set_auto_rename(pane_id, false);
        self.run(&["rename-window", "-t", pane_id, "--", title])
            .is_some()
    }

    pub fn auto_rename(&self, pane_id: &str) -> bool {
        let local = self
            .run(&["show-options", "-wv", "-t", pane_id, "automatic-rename"])
            .filter(|v| !v.trim().is_empty());
        let value = local.or_else(|| self.run(&["show-options", "-gwv", "automatic-rename"]));
        value.map(|v| v.trim() == "on").unwrap_or(false)
    }

    pub fn set_auto_rename(&self, pane_id: &str, enabled: bool) -> bool {
        let value = if enabled { "on" } else { "off" };
        self.run(&["set-option", "-w", "-t", pane_id, "automatic-rename", value])
            .is_some()
    }

    pub fn pane_pid(&self, pane_id: &str) -> Option<u32> {
        self.display(pane_id, "#{pane_pid}")
            .and_then(|pid| pid.trim().parse().ok())
    }

    /// Id of the window holding the pane, e.g. `@4`.
    pub fn window_id(&self, pane_id: &str) -> Option<String> {
        self.display(pane_id, "#{window_id}")
            .filter(|id| id.starts_with('@'))
    }

    pub fn session_name(&self, pane_id: &str) -> Option<String> {
        self.display(pane_id, "#{session_name}")
    }

    /// Types Enter into the pane.
    pub fn send_enter(&self, pane_id: &str) -> bool {
        self.run(&["send-keys", "-t", pane_id, "Enter"]).is_some()
    }

    /// Types Enter into whatever pane tmux targets by default.
    pub fn send_enter_focused(&self) -> bool {
        self.run(&["send-keys", "Enter"]).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned results and records every call.
    #[derive(Default)]
    struct ScriptedRunner {
        results: RefCell<VecDeque<Result<String, CommandError>>>,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn push(&self, result: Result<&str, CommandError>) {
            self.results
                .borrow_mut()
                .push_back(result.map(|s| s.to_string()));
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.borrow().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().map(|a| a.to_string()));
            self.calls.borrow_mut().push(call);
            self.results
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(CommandError::NotFound {
                    program: program.to_string(),
                }))
        }

        fn spawn(&self, program: &str, args: &[&str]) -> Result<(), CommandError> {
            self.run(program, args).map(|_| ())
        }
    }

    fn failed() -> CommandError {
        CommandError::Failed {
            program: "tmux".to_string(),
            status: Some(1),
            stderr: "can't find pane: %9".to_string(),
        }
    }

    #[test]
    fn test_is_valid_pane_id() {
        assert!(is_valid_pane_id("%0"));
        assert!(is_valid_pane_id("%123"));
        assert!(!is_valid_pane_id("%"));
        assert!(!is_valid_pane_id("3"));
        assert!(!is_valid_pane_id("%3a"));
        assert!(!is_valid_pane_id(""));
        assert!(!is_valid_pane_id("@1"));
    }

    #[test]
    fn test_strip_newline_keeps_trailing_spaces() {
        assert_eq!(strip_newline("zsh\n"), "zsh");
        assert_eq!(strip_newline("zsh  \n"), "zsh  ");
        assert_eq!(strip_newline("zsh\r\n"), "zsh");
        assert_eq!(strip_newline("zsh"), "zsh");
    }

    #[test]
    fn test_parse_pane_list() {
        let output = "%0\t@0\t1\t4242\tzsh\n%1\t@0\t0\t4243\tnode: server\tdev\n";
        let panes = parse_pane_list(output);
        assert_eq!(panes.len(), 2);
        assert_eq!(panes[0].pane_id, "%0");
        assert_eq!(panes[0].window_id, "@0");
        assert!(panes[0].active);
        assert_eq!(panes[0].pid, Some(4242));
        assert_eq!(panes[1].title, "node: server\tdev");
        assert!(!panes[1].active);
    }

    #[test]
    fn test_parse_pane_list_skips_garbage() {
        let panes = parse_pane_list("no tabs here\n\n%x\t@1\t0\t1\tbad id\n");
        assert!(panes.is_empty());
    }

    #[test]
    fn test_active_pane_prefers_explicit_argument() {
        let runner = ScriptedRunner::default();
        let tmux = Tmux::new(&runner, "tmux").with_env_pane(Some("%1".to_string()));
        assert_eq!(tmux.active_pane(Some("%4")), Some("%4".to_string()));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_active_pane_prefers_env_over_focus() {
        let runner = ScriptedRunner::default();
        let tmux = Tmux::new(&runner, "tmux").with_env_pane(Some("%1".to_string()));
        assert_eq!(tmux.active_pane(None), Some("%1".to_string()));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_active_pane_falls_back_to_focused() {
        let runner = ScriptedRunner::default();
        runner.push(Ok("%8"));
        let tmux = Tmux::new(&runner, "tmux").with_env_pane(Some("garbage".to_string()));
        assert_eq!(tmux.active_pane(None), Some("%8".to_string()));
        assert_eq!(
            runner.calls(),
            vec![vec!["tmux", "display-message", "-p", "#{pane_id}"]]
        );
    }

    #[test]
    fn test_active_pane_unavailable() {
        let runner = ScriptedRunner::default();
        let tmux = Tmux::new(&runner, "tmux").with_env_pane(None);
        assert_eq!(tmux.active_pane(None), None);
    }

    #[test]
    fn test_pane_title_failure_is_none() {
        let runner = ScriptedRunner::default();
        runner.push(Err(failed()));
        let tmux = Tmux::new(&runner, "tmux");
        assert_eq!(tmux.pane_title("%9"), None);
    }

    #[test]
    fn test_set_pane_title_disables_auto_rename_first() {
        let runner = ScriptedRunner::default();
        runner.push(Ok(""));
        runner.push(Ok(""));
        let tmux = Tmux::new(&runner, "/usr/bin/tmux");
        assert!(tmux.set_pane_title("%2", "-x title"));

        let calls = runner.calls();
        assert_eq!(
            calls[0],
            vec!["/usr/bin/tmux", "set-option", "-w", "-t", "%2", "automatic-rename", "off"]
        );
        assert_eq!(
            calls[1],
            vec!["/usr/bin/tmux", "rename-window", "-t", "%2", "--", "-x title"]
        );
    }

    #[test]
    fn test_auto_rename_falls_back_to_global() {
        let runner = ScriptedRunner::default();
        runner.push(Ok(""));
        runner.push(Ok("on"));
        let tmux = Tmux::new(&runner, "tmux");
        assert!(tmux.auto_rename("%2"));
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_pane_pid_parses() {
        let runner = ScriptedRunner::default();
        runner.push(Ok("31337"));
        let tmux = Tmux::new(&runner, "tmux");
        assert_eq!(tmux.pane_pid("%2"), Some(31337));
    }

    #[test]
    fn test_window_id() {
        let runner = ScriptedRunner::default();
        runner.push(Ok("@4"));
        runner.push(Ok(""));
        let tmux = Tmux::new(&runner, "tmux");
        assert_eq!(tmux.window_id("%2"), Some("@4".to_string()));
        assert_eq!(tmux.window_id("%2"), None);
        assert_eq!(
            runner.calls()[0],
            vec!["tmux", "display-message", "-p", "-t", "%2", "#{window_id}"]
        );
    }

    #[test]
    fn test_send_enter_focused_has_no_target() {
        let runner = ScriptedRunner::default();
        runner.push(Ok(""));
        let tmux = Tmux::new(&runner, "tmux");
        assert!(tmux.send_enter_focused());
        assert_eq!(runner.calls(), vec![vec!["tmux", "send-keys", "Enter"]]);
    }

    #[test]
    fn test_system_runner_missing_binary() {
        let runner = SystemRunner::new(Duration::from_secs(1));
        let err = runner
            .run("/nonexistent/ccpane-test-binary", &[])
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_stdout() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let out = runner.run("sh", &["-c", "printf 'hello world\\n'"]).unwrap();
        assert_eq!(out, "hello world");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_reports_failure() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let err = runner.run("sh", &["-c", "echo oops >&2; exit 3"]).unwrap_err();
        match err {
            CommandError::Failed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_times_out() {
        let runner = SystemRunner::new(Duration::from_millis(100));
        let started = Instant::now();
        let err = runner.run("sleep", &["5"]).unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
