use std::path::PathBuf;

use wgctl_core::platform::AppPaths;

#[derive(Default)]
pub struct LinuxPaths;

impl AppPaths for LinuxPaths {
    fn config_path(&self) -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wgctl")
            .join("config.toml")
    }
}
