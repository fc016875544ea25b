//! Key → coordinate mapping table
//!
//! Thin layer over [`ConfigStore`] that normalizes key names so lookups
//! from the listener and edits from the control socket agree.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::config_file::{ConfigError, ConfigStore, Point, Settings, SettingsPatch};

/// Errors from mapping operations
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("key name must not be empty")]
    EmptyKey,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Normalize a key name: trimmed, lowercased, modifier aliases folded
pub fn normalize_key(key: &str) -> Result<String, MappingError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(MappingError::EmptyKey);
    }
    let key = key.to_lowercase();
    Ok(match modifier_alias(&key) {
        Some(canonical) => canonical.to_string(),
        None => key,
    })
}

/// Alternate spellings of modifier names found in older mapping files
fn modifier_alias(key: &str) -> Option<&'static str> {
    let canonical = match key {
        "ctrl" => "ctrl_l",
        "alt" => "alt_l",
        "alt_gr" => "alt_r",
        "shift_l" => "shift",
        "cmd_l" => "cmd",
        _ => return None,
    };
    Some(canonical)
}

/// Result of adding a mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMapping {
    pub key: String,
    pub point: Point,
    /// Coordinate the key pointed at before, if any
    pub replaced: Option<Point>,
}

/// Owns the mapping table and settings, persisting every mutation
#[derive(Debug)]
pub struct MappingManager {
    store: ConfigStore,
}

impl MappingManager {
    pub fn new(store: ConfigStore) -> Self {
        Self { store }
    }

    /// Add or overwrite a mapping
    pub fn add_mapping(&mut self, key: &str, point: Point) -> Result<SavedMapping, MappingError> {
        let key = normalize_key(key)?;
        let replaced = self.store.set_mapping(&key, point)?;

        match replaced {
            Some(old) => info!(%key, from = %old, to = %point, "mapping replaced"),
            None => info!(%key, %point, "mapping added"),
        }

        Ok(SavedMapping {
            key,
            point,
            replaced,
        })
    }

    /// Remove a mapping, returning whether it existed
    pub fn remove_mapping(&mut self, key: &str) -> Result<bool, MappingError> {
        let key = normalize_key(key)?;
        let removed = self.store.remove_mapping(&key)?;
        if removed {
            info!(%key, "mapping removed");
        } else {
            debug!(%key, "no mapping to remove");
        }
        Ok(removed)
    }

    pub fn get_mapping(&self, key: &str) -> Option<Point> {
        let key = normalize_key(key).ok()?;
        self.store.mappings().get(&key).copied()
    }

    pub fn all_mappings(&self) -> &BTreeMap<String, Point> {
        self.store.mappings()
    }

    pub fn len(&self) -> usize {
        self.store.mappings().len()
    }

    pub fn settings(&self) -> &Settings {
        self.store.settings()
    }

    /// Apply a settings patch, returning whether anything changed
    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<bool, MappingError> {
        let changed = self.store.update_settings(patch)?;
        if changed {
            info!(settings = ?self.store.settings(), "settings updated");
        }
        Ok(changed)
    }
}
