//! Fakes shared by the front end's unit tests.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wgctl_core::config::Settings;
use wgctl_core::executor::{ElevationMode, Invocation, RawOutput};
use wgctl_core::platform::{CommandRunner, SecretPrompt};
use wgctl_core::tunnel::TunnelController;

/// Answers `wg show interfaces` with a fixed list and everything else with
/// empty success, recording each invocation.
pub struct ScriptedTool {
    interfaces: String,
    pub calls: Mutex<Vec<Invocation>>,
}

impl ScriptedTool {
    pub fn reporting(interfaces: &str) -> Arc<Self> {
        Arc::new(Self {
            interfaces: interfaces.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl CommandRunner for ScriptedTool {
    fn run(
        &self,
        invocation: &Invocation,
        _stdin: Option<&[u8]>,
        _timeout: Option<Duration>,
    ) -> io::Result<RawOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        if invocation.args == ["show", "interfaces"] {
            Ok(RawOutput::exited(0, self.interfaces.as_str(), ""))
        } else {
            Ok(RawOutput::exited(0, "", ""))
        }
    }
}

/// An operator who presses Enter at every password prompt.
#[derive(Default)]
pub struct EmptyEntry {
    pub prompts: AtomicUsize,
}

impl SecretPrompt for EmptyEntry {
    fn prompt(&self, _message: &str) -> io::Result<String> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(String::new())
    }
}

pub fn controller(
    config_dir: &Path,
    elevation: ElevationMode,
    runner: Arc<ScriptedTool>,
    prompt: Arc<EmptyEntry>,
) -> TunnelController {
    let settings = Settings {
        config_dir: config_dir.to_path_buf(),
        elevation,
        ..Settings::default()
    };
    settings.build_controller(runner, prompt)
}
