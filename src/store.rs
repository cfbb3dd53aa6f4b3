//! Pane state store.
//!
//! Persists one [`PaneRecord`] per styled tmux pane in a single JSON file
//! (`panes.json`) under the state directory. Every read-modify-write cycle
//! runs inside a [`StoreGuard`], which holds an exclusive advisory lock on
//! the sibling `panes.lock` file until it is dropped. The kernel drops the
//! lock if the process dies, so a killed hook can never wedge the store.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{Config, EmojiConfig};

const STORE_FILE: &str = "panes.json";
const LOCK_FILE: &str = "panes.lock";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Status overlaid on a pane's window title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No overlay
    #[serde(rename = "none")]
    Clear,
    /// Claude finished responding
    Stop,
    /// Claude sent a notification
    Notification,
    /// Claude is waiting for tool permission
    Permission,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Clear => "none",
            Status::Stop => "stop",
            Status::Notification => "notification",
            Status::Permission => "permission",
        }
    }

    /// Returns the emoji for this status, or `None` for [`Status::Clear`].
    pub fn emoji<'a>(&self, emoji: &'a EmojiConfig) -> Option<&'a str> {
        match self {
            Status::Clear => None,
            Status::Stop => Some(&emoji.stop),
            Status::Notification => Some(&emoji.notification),
            Status::Permission => Some(&emoji.permission),
        }
    }
}

/// Saved state for one styled pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneRecord {
    /// Window title before any overlay was applied
    pub original_title: String,
    pub status: Status,
    /// When `status` was last applied
    pub set_at: DateTime<Utc>,
    /// Whether tmux `automatic-rename` was on before the title was overridden
    #[serde(default)]
    pub auto_rename: bool,
    /// Pid of the pane's root process when the title was captured
    #[serde(default)]
    pub pane_pid: Option<u32>,
    /// Window the pane lives in; panes of one window share its title
    #[serde(default)]
    pub window_id: Option<String>,
}

impl PaneRecord {
    /// Whether this record was captured for the pane that now holds its id.
    ///
    /// tmux recycles pane ids, so a different root pid means the original
    /// pane is gone. Unknown pids on either side are given the benefit of
    /// the doubt.
    pub fn belongs_to(&self, live_pid: Option<u32>) -> bool {
        match (self.pane_pid, live_pid) {
            (Some(saved), Some(live)) => saved == live,
            _ => true,
        }
    }
}

/// What to remember about a pane the first time it is styled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub original_title: String,
    pub auto_rename: bool,
    pub pane_pid: Option<u32>,
    pub window_id: Option<String>,
}

impl Capture {
    pub fn title(original_title: impl Into<String>) -> Self {
        Self {
            original_title: original_title.into(),
            auto_rename: false,
            pane_pid: None,
            window_id: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    panes: BTreeMap<String, PaneRecord>,
}

/// Handle to the on-disk store. Cheap to construct; holds no lock by itself.
#[derive(Debug, Clone)]
pub struct PaneStore {
    dir: PathBuf,
    lock_timeout: Duration,
}

impl PaneStore {
    pub fn new(dir: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout,
        }
    }

    /// Opens the store in the configured state directory.
    pub fn open(config: &Config) -> Self {
        Self::new(Config::state_dir(), config.store.lock_timeout())
    }

    /// Path of the JSON file holding the records.
    pub fn path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Takes the store lock and loads the current records.
    ///
    /// Blocks for at most the configured lock timeout.
    pub fn lock(&self) -> Result<StoreGuard<'_>> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory: {:?}", self.dir))?;
        let lock = acquire_lock(&self.lock_path(), self.lock_timeout)?;
        let panes = load_panes(&self.path());
        Ok(StoreGuard {
            store: self,
            lock,
            panes,
            dirty: false,
        })
    }

    pub fn get(&self, pane_id: &str) -> Result<Option<PaneRecord>> {
        Ok(self.lock()?.get(pane_id).cloned())
    }

    pub fn upsert(&self, pane_id: &str, status: Status, capture: Capture) -> Result<()> {
        let mut guard = self.lock()?;
        guard.upsert(pane_id, status, capture);
        guard.commit()
    }

    /// Removes the record for `pane_id`. Returns whether one existed.
    pub fn remove(&self, pane_id: &str) -> Result<bool> {
        let mut guard = self.lock()?;
        let removed = guard.remove(pane_id).is_some();
        guard.commit()?;
        Ok(removed)
    }

    pub fn list(&self) -> Result<Vec<(String, PaneRecord)>> {
        Ok(self.lock()?.list())
    }
}

/// An open read-modify-write cycle on the store.
///
/// Mutations stay in memory until [`StoreGuard::commit`]. Dropping the guard
/// without committing discards them. The lock is released on drop either way.
pub struct StoreGuard<'a> {
    store: &'a PaneStore,
    lock: File,
    panes: BTreeMap<String, PaneRecord>,
    dirty: bool,
}

impl StoreGuard<'_> {
    pub fn get(&self, pane_id: &str) -> Option<&PaneRecord> {
        self.panes.get(pane_id)
    }

    /// Creates the record from `capture` if the pane has none; otherwise
    /// only `status` and `set_at` change and the saved title is kept.
    pub fn upsert(&mut self, pane_id: &str, status: Status, capture: Capture) {
        let now = Utc::now();
        self.panes
            .entry(pane_id.to_string())
            .and_modify(|record| {
                record.status = status;
                record.set_at = now;
            })
            .or_insert_with(|| PaneRecord {
                original_title: capture.original_title,
                status,
                set_at: now,
                auto_rename: capture.auto_rename,
                pane_pid: capture.pane_pid,
                window_id: capture.window_id,
            });
        self.dirty = true;
    }

    pub fn remove(&mut self, pane_id: &str) -> Option<PaneRecord> {
        let removed = self.panes.remove(pane_id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Another pane's record for the same window, if any.
    pub fn window_sibling(&self, window_id: &str, pane_id: &str) -> Option<&PaneRecord> {
        self.panes
            .iter()
            .find(|(id, record)| {
                id.as_str() != pane_id && record.window_id.as_deref() == Some(window_id)
            })
            .map(|(_, record)| record)
    }

    /// Removes every record of `window_id`. Returns the removed pane ids.
    pub fn remove_window(&mut self, window_id: &str) -> Vec<String> {
        let ids: Vec<String> = self
            .panes
            .iter()
            .filter(|(_, record)| record.window_id.as_deref() == Some(window_id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            self.remove(id);
        }
        ids
    }

    /// All records, sorted by pane id.
    pub fn list(&self) -> Vec<(String, PaneRecord)> {
        self.panes
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    /// Writes the records back if anything changed, then releases the lock.
    pub fn commit(self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let file = StoreFile {
            panes: self.panes.clone(),
        };
        write_atomic(&self.store.path(), &file)
    }
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock);
    }
}

fn acquire_lock(path: &Path, timeout: Duration) -> Result<File> {
    // Never truncate: the file is only a lock target.
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file: {:?}", path))?;

    let deadline = Instant::now() + timeout;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                if Instant::now() >= deadline {
                    return Err(anyhow!(
                        "Timed out after {:?} waiting for store lock {:?}",
                        timeout,
                        path
                    ));
                }
                thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to lock {:?}", path));
            }
        }
    }
}

/// Loads records, treating a missing or unreadable file as empty.
fn load_panes(path: &Path) -> BTreeMap<String, PaneRecord> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable pane store, starting empty");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str::<StoreFile>(&contents) {
        Ok(file) => file.panes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt pane store, starting empty");
            BTreeMap::new()
        }
    }
}

/// Writes to a temporary file first, then renames to the final path so a
/// reader never sees a partial file.
fn write_atomic(path: &Path, file: &StoreFile) -> Result<()> {
    let json = serde_json::to_string_pretty(file).context("Failed to serialize pane store")?;
    let temp_path = path.with_extension("json.tmp");

    fs::write(&temp_path, &json)
        .with_context(|| format!("Failed to write temp file: {:?}", temp_path))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to {:?}", path))?;

    Ok(())
}
