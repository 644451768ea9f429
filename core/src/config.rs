//! Settings loading and management.
//! Uses injected `AppPaths` so front ends control where the file lives.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::discovery::{ConfigDirectory, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_SUFFIX};
use crate::executor::{DEFAULT_SUDO_PATH, ElevationMode, PrivilegedExecutor};
use crate::platform::{AppPaths, CommandRunner, SecretPrompt};
use crate::tool::{DEFAULT_WG, DEFAULT_WG_QUICK, WireGuardTool};
use crate::tunnel::TunnelController;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding `<name>.<config_suffix>` tunnel configurations.
    pub config_dir: PathBuf,
    pub config_suffix: String,
    pub wg_path: PathBuf,
    pub wg_quick_path: PathBuf,
    pub elevation: ElevationMode,
    pub sudo_path: PathBuf,
    /// Kill an external command after this many seconds. Unset waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    /// Background status refresh period for the interactive shell; 0 disables it.
    pub poll_interval_secs: u64,
    /// PATH for spawned commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Settings {
    /// Load settings from the provided paths. Creates a default file if missing.
    pub fn load_with(paths: &dyn AppPaths) -> Result<Self, ConfigError> {
        let config_path = paths.config_path();

        if !config_path.exists() {
            info!(
                "Settings file not found at {:?}, creating default settings",
                config_path
            );
            let defaults = Self::default();
            defaults.save_with(paths)?;
            return Ok(defaults);
        }

        debug!("Loading settings from {:?}", config_path);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?;

        info!(
            "Loaded settings: tunnels from {:?}, elevation {:?}",
            settings.config_dir, settings.elevation
        );
        Ok(settings)
    }

    /// Save settings to the provided paths.
    pub fn save_with(&self, paths: &dyn AppPaths) -> Result<(), ConfigError> {
        let config_path = paths.config_path();
        let write_err = |source| ConfigError::Write {
            path: config_path.clone(),
            source,
        };

        // Create the directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content).map_err(write_err)?;

        info!("Saved settings to {:?}", config_path);
        Ok(())
    }

    /// Return configured PATH or fall back to the current process PATH.
    pub fn get_path(&self) -> String {
        if let Some(path) = &self.path {
            return path.clone();
        }
        std::env::var("PATH").unwrap_or_default()
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }

    pub fn config_directory(&self) -> ConfigDirectory {
        ConfigDirectory::new(&self.config_dir, &self.config_suffix)
    }

    pub fn tool(&self) -> WireGuardTool {
        WireGuardTool::new(&self.wg_path, &self.wg_quick_path)
    }

    /// Wire a controller from these settings.
    pub fn build_controller(
        &self,
        runner: Arc<dyn CommandRunner>,
        prompt: Arc<dyn SecretPrompt>,
    ) -> TunnelController {
        let executor = PrivilegedExecutor::new(runner, prompt, self.elevation)
            .with_sudo_path(&self.sudo_path)
            .with_timeout(self.command_timeout());
        TunnelController::new(self.config_directory(), self.tool(), executor)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            config_suffix: DEFAULT_CONFIG_SUFFIX.to_string(),
            wg_path: PathBuf::from(DEFAULT_WG),
            wg_quick_path: PathBuf::from(DEFAULT_WG_QUICK),
            elevation: ElevationMode::default(),
            sudo_path: PathBuf::from(DEFAULT_SUDO_PATH),
            command_timeout_secs: None,
            poll_interval_secs: 0,
            path: None,
        }
    }
}
