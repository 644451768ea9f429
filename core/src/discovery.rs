//! Discovery of tunnel configurations on disk.
//! The directory is re-read on every call; nothing is cached.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::id::TunnelId;

pub const DEFAULT_CONFIG_DIR: &str = "/etc/wireguard";
pub const DEFAULT_CONFIG_SUFFIX: &str = "conf";

/// A directory holding `<name>.<suffix>` tunnel configuration files.
#[derive(Debug, Clone)]
pub struct ConfigDirectory {
    dir: PathBuf,
    suffix: String,
}

impl ConfigDirectory {
    pub fn new(dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Self {
            dir: dir.into(),
            suffix: suffix.trim_start_matches('.').to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Lists configuration identifiers in directory order.
    /// A missing or unreadable directory yields an empty list.
    pub fn list_configs(&self) -> Vec<TunnelId> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Config directory {:?} does not exist", self.dir);
                return Vec::new();
            }
            Err(e) => {
                warn!("Cannot read config directory {:?}: {}", self.dir, e);
                return Vec::new();
            }
        };

        let extension = format!(".{}", self.suffix);
        let mut configs = Vec::new();

        for entry in entries.flatten() {
            let is_file = entry
                .file_type()
                .map(|t| t.is_file() || t.is_symlink())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                warn!("Skipping non UTF-8 file name {:?}", entry.file_name());
                continue;
            };
            let Some(stem) = file_name.strip_suffix(&extension) else {
                continue;
            };

            match TunnelId::new(stem) {
                Ok(id) => configs.push(id),
                Err(e) => warn!("Skipping {}: {}", file_name, e),
            }
        }

        debug!("Discovered {} configs in {:?}", configs.len(), self.dir);
        configs
    }

    pub fn contains(&self, id: &TunnelId) -> bool {
        self.list_configs().iter().any(|c| c == id)
    }
}

impl Default for ConfigDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_SUFFIX)
    }
}
