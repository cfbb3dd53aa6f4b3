//! Configuration file parsing for ccpane.
//!
//! Reads configuration from `~/.ccpane/config.toml` and provides defaults
//! for missing fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// How tmux is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmuxConfig {
    /// Program name or path of the tmux binary
    pub binary: String,
    /// Upper bound for a single tmux command, in milliseconds
    pub timeout_ms: u64,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
            timeout_ms: 1000,
        }
    }
}

impl TmuxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Pane state store tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long to wait for the store lock before giving up, in milliseconds
    pub lock_timeout_ms: u64,
    /// Records older than this are reverted by `ccpane --cleanup`
    pub max_record_age_hours: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2000,
            max_record_age_hours: 24,
        }
    }
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// `max_record_age_hours` as a duration. Non-positive or out-of-range
    /// values fall back to the default.
    pub fn max_record_age(&self) -> chrono::Duration {
        Some(self.max_record_age_hours)
            .filter(|hours| *hours > 0)
            .and_then(chrono::Duration::try_hours)
            .or_else(|| chrono::Duration::try_hours(Self::default().max_record_age_hours))
            .unwrap_or_else(|| chrono::Duration::days(1))
    }
}

/// Emoji prepended to window titles, one per status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmojiConfig {
    pub stop: String,
    pub notification: String,
    pub permission: String,
}

impl Default for EmojiConfig {
    fn default() -> Self {
        Self {
            stop: "\u{2705}".to_string(),          // ✅
            notification: "\u{1F4E2}".to_string(), // 📢
            permission: "\u{2753}".to_string(),    // ❓
        }
    }
}

/// Desktop notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Notifier invoked as `<command> <message>`
    pub command: String,
    /// Title used by the notify-send / osascript fallbacks
    pub title: String,
    pub on_stop: bool,
    pub on_notification: bool,
    pub on_permission: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            command: "notify_windows".to_string(),
            title: "Claude Tmux".to_string(),
            on_stop: false,
            on_notification: true,
            on_permission: true,
        }
    }
}

/// Hook behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Tools that usually stop Claude for a permission prompt
    pub permission_tools: Vec<String>,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            permission_tools: ["Bash", "Write", "Edit", "MultiEdit"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Main configuration struct for ccpane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tmux: TmuxConfig,
    pub store: StoreConfig,
    pub emoji: EmojiConfig,
    pub notify: NotifyConfig,
    pub hooks: HooksConfig,
}

impl Config {
    /// Load configuration from `~/.ccpane/config.toml`.
    ///
    /// - If the file doesn't exist, returns default configuration.
    /// - If the file can't be read or contains invalid TOML, logs a warning
    ///   and returns default. Nothing is printed: tmux shows the output of
    ///   `run-shell` commands over the pane.
    /// - If some fields are missing, uses defaults for those fields.
    pub fn load() -> Config {
        Self::try_load().unwrap_or_else(|e| {
            tracing::warn!(error = %format!("{:#}", e), "invalid config, using defaults");
            Config::default()
        })
    }

    /// Like [`Config::load`], but returns read and parse errors to the caller.
    pub fn try_load() -> Result<Config> {
        let config_path = match Self::config_path() {
            Some(path) => path,
            None => {
                tracing::warn!("could not determine home directory, using default config");
                return Ok(Config::default());
            }
        };

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read {}", config_path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Invalid TOML in {}", config_path.display()))
    }

    /// Parse configuration from a TOML string.
    ///
    /// Missing fields will use their default values due to `#[serde(default)]`.
    pub fn from_toml(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Returns the path to the config file: `~/.ccpane/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ccpane").join("config.toml"))
    }

    /// Returns the per-user state directory holding the pane store,
    /// the debug flag and the log files.
    ///
    /// Creates the directory if it doesn't exist.
    /// Respects `CCPANE_STATE_DIR` env var override for test isolation.
    pub fn state_dir() -> PathBuf {
        let state_dir = match std::env::var_os("CCPANE_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_state_dir(),
        };

        if !state_dir.exists() {
            if let Err(e) = fs::create_dir_all(&state_dir) {
                tracing::warn!(path = %state_dir.display(), error = %e, "could not create state directory");
            }
        }

        state_dir
    }

    /// Returns the log directory: `<state_dir>/logs/`
    pub fn logs_dir() -> PathBuf {
        Self::state_dir().join("logs")
    }
}

/// `$XDG_RUNTIME_DIR/ccpane-<user>`, or the system temp dir when there is no
/// runtime dir (macOS).
fn default_state_dir() -> PathBuf {
    let base = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
    base.join(format!("ccpane-{}", current_user()))
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty() && !u.contains(std::path::MAIN_SEPARATOR))
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.tmux.binary, "tmux");
        assert_eq!(config.tmux.timeout(), Duration::from_secs(1));
        assert_eq!(config.store.lock_timeout(), Duration::from_secs(2));
        assert_eq!(config.store.max_record_age_hours, 24);
        assert_eq!(config.emoji.stop, "✅");
        assert_eq!(config.emoji.notification, "📢");
        assert_eq!(config.emoji.permission, "❓");
        assert_eq!(config.notify.command, "notify_windows");
        assert!(!config.notify.on_stop);
        assert!(config.notify.on_notification);
    }

    #[test]
    fn test_hooks_config_defaults() {
        let hooks = HooksConfig::default();
        assert_eq!(
            hooks.permission_tools,
            vec!["Bash", "Write", "Edit", "MultiEdit"]
        );
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [tmux]
            binary = "/opt/homebrew/bin/tmux"
            timeout_ms = 250

            [emoji]
            stop = "🟢"

            [notify]
            command = "terminal-notifier"
            on_stop = true
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.tmux.binary, "/opt/homebrew/bin/tmux");
        assert_eq!(config.tmux.timeout_ms, 250);
        assert_eq!(config.emoji.stop, "🟢");
        assert_eq!(config.notify.command, "terminal-notifier");
        assert!(config.notify.on_stop);
    }

    #[test]
    fn test_config_invalid_toml_uses_defaults() {
        let result = Config::from_toml("invalid { toml [");
        assert!(result.is_err());
        // When parsing fails, callers should use default
        let config = result.unwrap_or_default();
        assert_eq!(config.tmux.binary, "tmux");
    }

    #[test]
    fn test_config_partial_toml_uses_defaults_for_missing() {
        let toml = r#"
            [emoji]
            notification = "🔔"
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.emoji.notification, "🔔");
        assert_eq!(config.emoji.stop, "✅"); // default
        assert_eq!(config.emoji.permission, "❓"); // default
        assert_eq!(config.store.lock_timeout_ms, 2000);
    }

    #[test]
    fn test_config_empty_toml_uses_all_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.tmux.binary, "tmux");
        assert_eq!(config.notify.title, "Claude Tmux");
        assert_eq!(config.hooks.permission_tools.len(), 4);
    }

    #[test]
    fn test_config_permission_tools_override() {
        let toml = r#"
            [hooks]
            permission_tools = ["Bash"]
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.hooks.permission_tools, vec!["Bash"]);
    }

    #[test]
    fn test_max_record_age() {
        let mut store = StoreConfig::default();
        assert_eq!(store.max_record_age(), chrono::Duration::hours(24));

        store.max_record_age_hours = 2;
        assert_eq!(store.max_record_age(), chrono::Duration::hours(2));
    }

    #[test]
    fn test_max_record_age_out_of_range_uses_default() {
        let config = Config::from_toml(
            r#"
            [store]
            max_record_age_hours = 9999999999999999
        "#,
        )
        .unwrap();
        assert_eq!(config.store.max_record_age(), chrono::Duration::hours(24));

        let config = Config::from_toml("[store]\nmax_record_age_hours = -3\n").unwrap();
        assert_eq!(config.store.max_record_age(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_default_state_dir_is_per_user() {
        let dir = default_state_dir();
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ccpane-"));
    }

    #[test]
    fn test_config_path_under_home() {
        if let Some(path) = Config::config_path() {
            assert!(path.ends_with(".ccpane/config.toml"));
        }
    }
}
