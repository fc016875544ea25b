//! Mapping table and settings persistence
//!
//! `ConfigStore` owns the JSON file; `MappingManager` is the API the rest
//! of the daemon uses to read and change it.

mod config_file;
mod mappings;

pub use config_file::{ConfigFile, ConfigStore, Point, Settings, SettingsPatch};
pub use mappings::{normalize_key, MappingError, MappingManager, SavedMapping};
