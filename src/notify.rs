//! Desktop notifications.
//!
//! Fire-and-forget: a missing or failing notifier is logged and otherwise
//! ignored.

use crate::config::NotifyConfig;
use crate::store::Status;
use crate::tmux::CommandRunner;

/// Escape a string for safe interpolation into AppleScript.
fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Builds the notification text for a styled pane.
///
/// `detail` is the message Claude attached to the hook, if any.
pub fn format_message(session: &str, pane_id: &str, status: Status, detail: Option<&str>) -> String {
    let action = match status {
        Status::Stop => "Claude finished",
        Status::Notification => "Claude notification",
        Status::Permission => "Claude needs tool permission",
        Status::Clear => "Claude",
    };
    match detail.map(str::trim).filter(|d| !d.is_empty()) {
        Some(detail) => format!("{}:{} - {}: {}", session, pane_id, action, detail),
        None => format!("{}:{} - {}", session, pane_id, action),
    }
}

pub struct Notifier<R> {
    runner: R,
    config: NotifyConfig,
}

impl<R: CommandRunner> Notifier<R> {
    pub fn new(runner: R, config: NotifyConfig) -> Self {
        Self { runner, config }
    }

    /// Whether a notification should go out when `status` is applied.
    pub fn wants(&self, status: Status) -> bool {
        match status {
            Status::Stop => self.config.on_stop,
            Status::Notification => self.config.on_notification,
            Status::Permission => self.config.on_permission,
            Status::Clear => false,
        }
    }

    /// Sends `message` through the configured command, falling back to the
    /// platform notifier when that command is not installed.
    pub fn notify(&self, message: &str, urgent: bool) -> bool {
        match self.runner.spawn(&self.config.command, &[message]) {
            Ok(()) => {
                tracing::debug!(command = %self.config.command, message, "notification sent");
                true
            }
            Err(e) if e.is_not_found() => self.notify_fallback(message, urgent),
            Err(e) => {
                tracing::warn!(command = %self.config.command, error = %e, "notifier failed");
                false
            }
        }
    }

    fn notify_fallback(&self, message: &str, urgent: bool) -> bool {
        let result = if cfg!(target_os = "macos") {
            let script = format!(
                r#"display notification "{}" with title "{}""#,
                escape_applescript(message),
                escape_applescript(&self.config.title)
            );
            self.runner.spawn("osascript", &["-e", &script])
        } else {
            let urgency = if urgent { "critical" } else { "normal" };
            self.runner
                .spawn("notify-send", &["-u", urgency, &self.config.title, message])
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::info!(error = %e, "no notifier available, skipping notification");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::CommandError;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingRunner {
        installed: Vec<&'static str>,
        spawned: RefCell<Vec<Vec<String>>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, program: &str, _args: &[&str]) -> Result<String, CommandError> {
            Err(CommandError::NotFound {
                program: program.to_string(),
            })
        }

        fn spawn(&self, program: &str, args: &[&str]) -> Result<(), CommandError> {
            if !self.installed.iter().any(|p| *p == program) {
                return Err(CommandError::NotFound {
                    program: program.to_string(),
                });
            }
            let mut call = vec![program.to_string()];
            call.extend(args.iter().map(|a| a.to_string()));
            self.spawned.borrow_mut().push(call);
            Ok(())
        }
    }

    #[test]
    fn test_format_message() {
        assert_eq!(
            format_message("main", "%3", Status::Stop, None),
            "main:%3 - Claude finished"
        );
        assert_eq!(
            format_message("main", "%3", Status::Notification, Some("Claude needs your input")),
            "main:%3 - Claude notification: Claude needs your input"
        );
        assert_eq!(
            format_message("work", "%1", Status::Permission, Some("  ")),
            "work:%1 - Claude needs tool permission"
        );
    }

    #[test]
    fn test_notify_uses_configured_command() {
        let runner = RecordingRunner {
            installed: vec!["notify_windows"],
            ..Default::default()
        };
        let notifier = Notifier::new(&runner, NotifyConfig::default());

        assert!(notifier.notify("hello", false));
        assert_eq!(
            *runner.spawned.borrow(),
            vec![vec!["notify_windows".to_string(), "hello".to_string()]]
        );
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_notify_falls_back_to_notify_send() {
        let runner = RecordingRunner {
            installed: vec!["notify-send"],
            ..Default::default()
        };
        let notifier = Notifier::new(&runner, NotifyConfig::default());

        assert!(notifier.notify("hello", true));
        let spawned = runner.spawned.borrow();
        assert_eq!(spawned[0][0], "notify-send");
        assert_eq!(spawned[0][2], "critical");
    }

    #[test]
    fn test_notify_without_any_notifier_is_silent() {
        let runner = RecordingRunner::default();
        let notifier = Notifier::new(&runner, NotifyConfig::default());
        assert!(!notifier.notify("hello", false));
    }

    #[test]
    fn test_wants_follows_config() {
        let runner = RecordingRunner::default();
        let notifier = Notifier::new(&runner, NotifyConfig::default());
        assert!(!notifier.wants(Status::Stop));
        assert!(notifier.wants(Status::Notification));
        assert!(notifier.wants(Status::Permission));
        assert!(!notifier.wants(Status::Clear));
    }

    #[test]
    fn test_escape_applescript_quotes() {
        assert_eq!(
            escape_applescript(r#"" & do shell script "evil" & ""#),
            r#"\" & do shell script \"evil\" & \""#
        );
    }
}
