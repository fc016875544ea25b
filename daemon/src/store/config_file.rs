//! JSON configuration file holding mappings and settings
//!
//! The file is rewritten in full on every mutation. A missing or corrupt
//! file never prevents startup: defaults are written in its place.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::mappings::normalize_key;

/// Default target window, the hardware editor this tool was written for
pub const DEFAULT_TARGET_WINDOW_TITLE: &str = "Valeton";

/// A screen coordinate in global display space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// User-facing behaviour flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Move the cursor back to where it was after each click
    pub restore_mouse_position: bool,
    /// Only click when the foreground window title matches
    pub require_foreground_window: bool,
    /// Case-insensitive substring the foreground window title must contain
    pub target_window_title: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            restore_mouse_position: true,
            require_foreground_window: false,
            target_window_title: DEFAULT_TARGET_WINDOW_TITLE.to_string(),
        }
    }
}

/// Partial settings update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_mouse_position: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_foreground_window: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_window_title: Option<String>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.restore_mouse_position.is_none()
            && self.require_foreground_window.is_none()
            && self.target_window_title.is_none()
    }

    /// Apply the patch, returning true if anything changed
    pub fn apply_to(self, settings: &mut Settings) -> bool {
        let before = settings.clone();
        if let Some(restore) = self.restore_mouse_position {
            settings.restore_mouse_position = restore;
        }
        if let Some(require) = self.require_foreground_window {
            settings.require_foreground_window = require;
        }
        if let Some(title) = self.target_window_title {
            settings.target_window_title = title;
        }
        *settings != before
    }
}

/// On-disk document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub mappings: BTreeMap<String, Point>,
    pub settings: Settings,
}

/// Errors reading or writing the configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Owns the configuration file and its in-memory copy
///
/// Mutations are staged on a copy and only become visible once the copy
/// has been written, so memory never runs ahead of the file.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    data: ConfigFile,
}

impl ConfigStore {
    /// Load the file at `path`, falling back to defaults
    ///
    /// Defaults are written to disk when the file is missing or unusable.
    /// An unusable file is kept next to the new one with a `.corrupt`
    /// suffix. Only a failure to write the defaults is returned as an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        match Self::read(&path) {
            Ok(Some(mut data)) => {
                let rekeyed = normalize_mapping_keys(&mut data.mappings);
                info!(
                    ?path,
                    mappings = data.mappings.len(),
                    "configuration file loaded"
                );
                let store = Self { path, data };
                if rekeyed {
                    if let Err(e) = store.save() {
                        warn!(error = %e, "could not rewrite normalized key names");
                    }
                }
                return Ok(store);
            }
            Ok(None) => {
                info!(?path, "no configuration file, writing defaults");
            }
            Err(e) => {
                warn!(?path, error = %e, "configuration file unusable, writing defaults");
                Self::set_aside(&path);
            }
        }

        let store = Self {
            path,
            data: ConfigFile::default(),
        };
        store.save()?;
        Ok(store)
    }

    /// In-memory store that is never written, for tests and dry runs
    #[cfg(test)]
    pub fn in_memory(data: ConfigFile) -> Self {
        Self {
            path: PathBuf::new(),
            data,
        }
    }

    fn read(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn set_aside(path: &Path) {
        let mut corrupt = path.as_os_str().to_owned();
        corrupt.push(".corrupt");
        match std::fs::rename(path, &corrupt) {
            Ok(()) => info!(?corrupt, "kept unusable configuration file"),
            Err(e) => debug!(error = %e, "could not move unusable configuration file"),
        }
    }

    /// Write the current state to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        self.write(&self.data)
    }

    /// Write `data` to a sibling temp file, then rename it over the config
    fn write(&self, data: &ConfigFile) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_owned(),
                source,
            })?;
        }

        let mut json = serde_json::to_string_pretty(data)?;
        json.push('\n');

        let tmp_path = self.path.with_extension("json.tmp");
        let written = write_synced(&tmp_path, json.as_bytes())
            .and_then(|()| std::fs::rename(&tmp_path, &self.path));
        if let Err(source) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(ConfigError::Write {
                path: self.path.clone(),
                source,
            });
        }

        debug!(path = ?self.path, "configuration saved");
        Ok(())
    }

    /// Persist `data` and adopt it only if the write succeeded
    fn commit(&mut self, data: ConfigFile) -> Result<(), ConfigError> {
        self.write(&data)?;
        self.data = data;
        Ok(())
    }

    #[cfg(test)]
    pub fn data(&self) -> &ConfigFile {
        &self.data
    }

    pub fn settings(&self) -> &Settings {
        &self.data.settings
    }

    pub fn mappings(&self) -> &BTreeMap<String, Point> {
        &self.data.mappings
    }

    /// Insert or replace a mapping and persist, returning the old point
    pub fn set_mapping(&mut self, key: &str, point: Point) -> Result<Option<Point>, ConfigError> {
        let mut staged = self.data.clone();
        let previous = staged.mappings.insert(key.to_string(), point);
        self.commit(staged)?;
        Ok(previous)
    }

    /// Remove a mapping, persisting only if it existed
    pub fn remove_mapping(&mut self, key: &str) -> Result<bool, ConfigError> {
        if !self.data.mappings.contains_key(key) {
            return Ok(false);
        }
        let mut staged = self.data.clone();
        staged.mappings.remove(key);
        self.commit(staged)?;
        Ok(true)
    }

    /// Apply a settings patch, persisting only if something changed
    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<bool, ConfigError> {
        let mut staged = self.data.clone();
        if !patch.apply_to(&mut staged.settings) {
            return Ok(false);
        }
        self.commit(staged)?;
        Ok(true)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Re-key loaded mappings under their normalized names
///
/// Empty names are dropped. When two names normalize to the same key, an
/// already-normalized entry wins, otherwise the first in sorted order.
/// Returns true if the table changed.
fn normalize_mapping_keys(mappings: &mut BTreeMap<String, Point>) -> bool {
    let mut changed = false;
    let mut normalized = BTreeMap::new();
    let (exact, other): (Vec<_>, Vec<_>) = std::mem::take(mappings)
        .into_iter()
        .partition(|(key, _)| normalize_key(key).ok().as_deref() == Some(key.as_str()));

    for (raw, point) in exact.into_iter().chain(other) {
        let Ok(key) = normalize_key(&raw) else {
            warn!(key = ?raw, "dropping mapping with empty key name");
            changed = true;
            continue;
        };
        if key != raw {
            changed = true;
        }
        match normalized.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(point);
            }
            Entry::Occupied(slot) => {
                warn!(key = ?raw, kept = %slot.key(), "dropping duplicate mapping");
                changed = true;
            }
        }
    }

    *mappings = normalized;
    changed
}
