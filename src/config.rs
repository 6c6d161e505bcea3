//! Bridge Configuration
//!
//! Handles parsing and management of plugbridge.toml configuration files.
//!
//! ```toml
//! module_dir = "plugins"
//! unload_policy = "reject-busy"
//! management_types = true
//! preload = ["calculator.so"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file searched for by [`BridgeConfig::find_and_load`].
pub const CONFIG_FILE_NAME: &str = "plugbridge.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// What unloading does with a module that still has live instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnloadPolicy {
    /// Wait for in-flight calls, then destroy the module's instances
    #[default]
    Drain,
    /// Refuse with `ModuleBusy` while instances are live
    RejectBusy,
}

/// Root configuration structure matching plugbridge.toml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base directory for relative module paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_dir: Option<PathBuf>,

    #[serde(default)]
    pub unload_policy: UnloadPolicy,

    /// Register the PlugBridge.* management types in the ambient space
    #[serde(default = "default_true")]
    pub management_types: bool,

    /// Modules loaded when the bridge is created
    #[serde(default)]
    pub preload: Vec<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            module_dir: None,
            unload_policy: UnloadPolicy::default(),
            management_types: true,
            preload: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory relative module paths resolve against.
    ///
    /// Falls back to the directory of the running executable, then to the
    /// current directory.
    pub fn base_dir(&self) -> PathBuf {
        if let Some(dir) = &self.module_dir {
            return dir.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
