use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use wgctl_core::config::Settings;
use wgctl_core::credential::TtyPrompt;
use wgctl_core::executor::{ElevationMode, SystemRunner};
use wgctl_core::poller::StatusPoller;
use wgctl_core::tunnel::TunnelController;

use crate::paths::LinuxPaths;

/// Command-line values that take precedence over the settings file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config_dir: Option<PathBuf>,
    pub elevation: Option<ElevationMode>,
    pub timeout_secs: Option<u64>,
}

impl Overrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.config_dir {
            settings.config_dir = dir.clone();
        }
        if let Some(elevation) = self.elevation {
            settings.elevation = elevation;
        }
        if let Some(secs) = self.timeout_secs {
            settings.command_timeout_secs = Some(secs);
        }
    }
}

/// Shared application state for the terminal front end.
pub struct AppState {
    pub controller: Arc<TunnelController>,
    pub poller: Option<Arc<StatusPoller>>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(overrides: &Overrides) -> Self {
        let paths = LinuxPaths;

        let mut settings = match Settings::load_with(&paths) {
            Ok(settings) => {
                info!("Loaded settings successfully");
                settings
            }
            Err(e) => {
                error!("Failed to load settings: {}", e);
                warn!("Using default settings");
                Settings::default()
            }
        };
        overrides.apply(&mut settings);

        let runner = Arc::new(SystemRunner::with_path(Some(settings.get_path())));
        let controller = Arc::new(settings.build_controller(runner, Arc::new(TtyPrompt)));

        let poller = settings
            .poll_interval()
            .map(|interval| Arc::new(StatusPoller::new(controller.clone(), interval)));

        Self {
            controller,
            poller,
            settings,
        }
    }

    pub fn cleanup(&self) {
        if let Some(poller) = &self.poller {
            poller.stop();
        }
    }
}
