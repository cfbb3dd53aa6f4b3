//! Debug logging side channel.
//!
//! Logging is off unless enabled with `ccpane --debug enable` (persisted in
//! `debug.json` in the state directory) or `CCPANE_DEBUG=1`. When on, each
//! binary appends to its own file under `<state_dir>/logs/`.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SETTINGS_FILE: &str = "debug.json";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSettings {
    #[serde(default)]
    pub debug_enabled: bool,
}

impl DebugSettings {
    /// Reads the persisted flag; anything unreadable means disabled.
    pub fn load(state_dir: &Path) -> Self {
        fs::read_to_string(state_dir.join(SETTINGS_FILE))
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create directory: {:?}", state_dir))?;
        let path = state_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize debug settings")?;
        fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))
    }
}

fn env_forces_debug() -> bool {
    std::env::var("CCPANE_DEBUG")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Whether debug logging is on, via env var or persisted flag.
pub fn is_enabled(state_dir: &Path) -> bool {
    env_forces_debug() || DebugSettings::load(state_dir).debug_enabled
}

pub fn set_enabled(state_dir: &Path, enabled: bool) -> Result<()> {
    DebugSettings {
        debug_enabled: enabled,
    }
    .save(state_dir)
}

pub fn log_path(logs_dir: &Path, component: &str) -> PathBuf {
    logs_dir.join(format!("{}.log", component))
}

/// Installs a file-backed subscriber for `component` when debug logging is
/// enabled. Returns whether one was installed.
///
/// Failing to open the log file never stops the caller; logging just stays
/// off. `RUST_LOG` overrides the default `debug` level.
pub fn init(state_dir: &Path, component: &str) -> bool {
    if !is_enabled(state_dir) {
        return false;
    }

    let logs_dir = state_dir.join("logs");
    if fs::create_dir_all(&logs_dir).is_err() {
        return false;
    }
    let log_file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path(&logs_dir, component))
    {
        Ok(file) => file,
        Err(_) => return false,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(log_file))
        .try_init()
        .is_ok()
}

/// Log files in `logs_dir`, most recently modified first.
fn log_files(logs_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(logs_dir) else {
        return Vec::new();
    };
    let mut files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "log").unwrap_or(false))
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((path, modified))
        })
        .collect();
    files.sort_by(|a, b| b.1.cmp(&a.1));
    files.into_iter().map(|(path, _)| path).collect()
}

/// Returns the last `lines` lines of each log file, or only of
/// `component`'s file when given, as `(file name, lines)` pairs.
pub fn tail(logs_dir: &Path, component: Option<&str>, lines: usize) -> Result<Vec<(String, Vec<String>)>> {
    let files = match component {
        Some(component) => {
            let path = log_path(logs_dir, component);
            if !path.exists() {
                anyhow::bail!("No log file found for {}", component);
            }
            vec![path]
        }
        None => log_files(logs_dir),
    };

    files
        .into_iter()
        .map(|path| {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let all: Vec<&str> = contents.lines().collect();
            let start = all.len().saturating_sub(lines);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Ok((name, all[start..].iter().map(|l| l.to_string()).collect()))
        })
        .collect()
}

/// Deletes all log files. Returns how many were removed.
pub fn clear(logs_dir: &Path) -> usize {
    log_files(logs_dir)
        .into_iter()
        .filter(|path| fs::remove_file(path).is_ok())
        .count()
}

#[derive(Debug, Clone, Serialize)]
pub struct LogFileStats {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub debug_enabled: bool,
    pub log_files: Vec<LogFileStats>,
    pub total_size: u64,
}

pub fn stats(state_dir: &Path) -> LogStats {
    let log_files: Vec<LogFileStats> = log_files(&state_dir.join("logs"))
        .into_iter()
        .filter_map(|path| {
            let meta = fs::metadata(&path).ok()?;
            Some(LogFileStats {
                name: path.file_name()?.to_string_lossy().to_string(),
                size: meta.len(),
                modified: meta.modified().ok()?.into(),
            })
        })
        .collect();
    let total_size = log_files.iter().map(|f| f.size).sum();

    LogStats {
        debug_enabled: is_enabled(state_dir),
        log_files,
        total_size,
    }
}
