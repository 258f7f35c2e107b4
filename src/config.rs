//! Configuration management for PlugVault.
//!
//! Configuration is stored as TOML in the platform config directory.
//!
//! ## Example Configuration File (plugvault.toml)
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [backup]
//! backup_root = "D:\\PluginBackups"
//! source_roots = [
//!     "C:\\Program Files\\VSTPlugins",
//!     "E:\\Portable Plugins",
//! ]
//! ```

use crate::error::{Result, VaultError};
use crate::registry::{dedup_preserving_order, default_source_roots};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub backup: BackupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Where backups are written; must be chosen before a run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_root: Option<PathBuf>,

    /// Directories scanned for plugins, in scan order
    pub source_roots: Vec<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            backup_root: None,
            source_roots: default_source_roots(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path, using defaults if it is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| VaultError::Config {
            reason: format!("Failed to parse config: {}", e),
        })
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| VaultError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "plugvault").ok_or_else(|| VaultError::Config {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("plugvault.toml"))
    }

    /// Source roots without duplicates, in configured order.
    pub fn source_roots(&self) -> Vec<PathBuf> {
        dedup_preserving_order(self.backup.source_roots.clone())
    }

    /// Append a source root. Returns `false` if it is already configured.
    pub fn add_source_root(&mut self, path: PathBuf) -> bool {
        if self.backup.source_roots.contains(&path) {
            return false;
        }
        self.backup.source_roots.push(path);
        true
    }

    /// Remove the most recently added root. Default platform roots are never
    /// removed; returns `None` when the last root is one of them.
    pub fn remove_last_source_root(&mut self) -> Option<PathBuf> {
        let last = self.backup.source_roots.last()?;
        if default_source_roots().contains(last) {
            return None;
        }
        self.backup.source_roots.pop()
    }
}
