//! Tunnel lifecycle control.
//! Tracks which configuration is selected, starts/stops it through the
//! privileged executor and re-derives state from the tool after every action.

use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use thiserror::Error;

use crate::credential::CredentialError;
use crate::discovery::ConfigDirectory;
use crate::executor::{CommandResult, PrivilegedExecutor};
use crate::id::{InvalidTunnelId, TunnelId};
use crate::status::{TunnelStatus, active_from, parse_interfaces, render};
use crate::tool::WireGuardTool;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("elevation credential unavailable: {0}")]
    CredentialUnavailable(String),
    #[error("command failed (code {code:?}): {output}")]
    CommandFailed { code: Option<i32>, output: String },
    #[error("command timed out after {after_secs}s: {output}")]
    CommandTimedOut { after_secs: u64, output: String },
    #[error("no configuration named '{0}'")]
    UnknownConfig(TunnelId),
    #[error(transparent)]
    InvalidId(#[from] InvalidTunnelId),
    #[error("no configuration selected")]
    NoSelection,
}

impl From<CredentialError> for ControlError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::InputUnavailable(reason) => ControlError::CredentialUnavailable(reason),
        }
    }
}

impl CommandResult {
    /// Output on success, the failure as a `ControlError` otherwise.
    pub fn into_result(self) -> Result<String, ControlError> {
        match self {
            CommandResult::Success { output } => Ok(output),
            CommandResult::Failed { code, output } => Err(ControlError::CommandFailed { code, output }),
            CommandResult::TimedOut { output, after } => Err(ControlError::CommandTimedOut {
                after_secs: after.as_secs(),
                output,
            }),
        }
    }
}

/// What a refresh observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub selection: Option<TunnelId>,
    pub active: Option<TunnelId>,
    pub state: TunnelStatus,
    /// `wg show <selection>` output, or its rendered failure.
    pub detail: String,
    /// The up/down command that preceded this refresh, if any.
    pub action: Option<CommandResult>,
}

impl StatusReport {
    pub fn diagnostics(&self) -> Option<String> {
        self.action.as_ref().map(render)
    }
}

struct Slot {
    executor: PrivilegedExecutor,
    selection: Option<TunnelId>,
    state: TunnelStatus,
    last_active: Option<TunnelId>,
}

/// Owns the single tunnel slot. All privileged work is serialized through
/// one lock so the tool never sees overlapping invocations.
pub struct TunnelController {
    configs: ConfigDirectory,
    tool: WireGuardTool,
    slot: Mutex<Slot>,
}

impl TunnelController {
    pub fn new(configs: ConfigDirectory, tool: WireGuardTool, executor: PrivilegedExecutor) -> Self {
        Self {
            configs,
            tool,
            slot: Mutex::new(Slot {
                executor,
                selection: None,
                state: TunnelStatus::Unknown,
                last_active: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config_directory(&self) -> &ConfigDirectory {
        &self.configs
    }

    pub fn list_configs(&self) -> Vec<TunnelId> {
        self.configs.list_configs()
    }

    /// Interface currently reported up by the tool.
    pub fn get_active(&self) -> Result<Option<TunnelId>, ControlError> {
        let mut slot = self.lock();
        let result = slot.executor.run(&self.tool.show_interfaces())?;
        let active = active_from(&result);
        slot.last_active = active.clone();
        Ok(active)
    }

    /// Every interface the tool reports up, in reported order.
    pub fn list_active(&self) -> Result<Vec<TunnelId>, ControlError> {
        let mut slot = self.lock();
        let result = slot.executor.run(&self.tool.show_interfaces())?;
        slot.last_active = active_from(&result);
        Ok(match &result {
            CommandResult::Success { output } => parse_interfaces(output),
            _ => Vec::new(),
        })
    }

    /// Picks the startup selection and performs the first refresh.
    pub fn initialize(&self) -> Result<StatusReport, ControlError> {
        self.select_default()?;
        self.refresh_status()
    }

    /// Applies the startup selection without refreshing. One `show interfaces`.
    pub fn select_default(&self) -> Result<Option<TunnelId>, ControlError> {
        let configs = self.list_configs();
        let active = self.get_active()?;
        let selection = default_selection(&configs, active.as_ref());
        info!(
            "Found {} configs; active: {:?}; selected: {:?}",
            configs.len(),
            active.as_ref().map(TunnelId::as_str),
            selection.as_ref().map(TunnelId::as_str)
        );
        let mut slot = self.lock();
        if slot.selection != selection {
            slot.state = TunnelStatus::Unknown;
        }
        slot.selection = selection.clone();
        Ok(selection)
    }

    /// Changes the selection. Runs no commands.
    pub fn select(&self, name: &str) -> Result<(), ControlError> {
        let id = TunnelId::new(name)?;
        let mut slot = self.lock();
        let known = slot.last_active.as_ref() == Some(&id) || self.configs.contains(&id);
        if !known {
            return Err(ControlError::UnknownConfig(id));
        }

        if slot.selection.as_ref() != Some(&id) {
            debug!("Selection changed to {}", id);
            slot.selection = Some(id);
            slot.state = TunnelStatus::Unknown;
        }
        Ok(())
    }

    pub fn selection(&self) -> Option<TunnelId> {
        self.lock().selection.clone()
    }

    pub fn state(&self) -> TunnelStatus {
        self.lock().state
    }

    pub fn refresh_status(&self) -> Result<StatusReport, ControlError> {
        let mut slot = self.lock();
        self.refresh_locked(&mut slot, None)
    }

    /// `wg-quick up` for the selection, then a refresh whatever the outcome.
    pub fn start(&self) -> Result<StatusReport, ControlError> {
        let mut slot = self.lock();
        let selection = slot.selection.clone().ok_or(ControlError::NoSelection)?;
        info!("Starting tunnel {}", selection);
        let result = slot.executor.run(&self.tool.up(&selection))?;
        self.refresh_locked(&mut slot, Some(result))
    }

    /// `wg-quick down` for the selection, then a refresh whatever the outcome.
    pub fn stop(&self) -> Result<StatusReport, ControlError> {
        let mut slot = self.lock();
        let selection = slot.selection.clone().ok_or(ControlError::NoSelection)?;
        info!("Stopping tunnel {}", selection);
        let result = slot.executor.run(&self.tool.down(&selection))?;
        self.refresh_locked(&mut slot, Some(result))
    }

    fn refresh_locked(
        &self,
        slot: &mut Slot,
        action: Option<CommandResult>,
    ) -> Result<StatusReport, ControlError> {
        let interfaces = slot.executor.run(&self.tool.show_interfaces())?;
        let active = active_from(&interfaces);

        let (state, detail) = match &slot.selection {
            Some(selection) => {
                let state = if active.as_ref() == Some(selection) {
                    TunnelStatus::Up
                } else {
                    TunnelStatus::Down
                };
                let detail = slot.executor.run(&self.tool.show(selection))?;
                (state, render(&detail))
            }
            None => (TunnelStatus::Down, String::new()),
        };

        if slot.state != state {
            info!(
                "Tunnel {} is {} (was {})",
                slot.selection.as_ref().map_or("<none>", TunnelId::as_str),
                state,
                slot.state
            );
        }
        slot.state = state;
        slot.last_active = active.clone();

        Ok(StatusReport {
            selection: slot.selection.clone(),
            active,
            state,
            detail,
            action,
        })
    }
}

/// Startup selection: the active tunnel when it is a known config,
/// otherwise the alphabetically first config.
pub fn default_selection(configs: &[TunnelId], active: Option<&TunnelId>) -> Option<TunnelId> {
    if let Some(active) = active
        && configs.contains(active)
    {
        return Some(active.clone());
    }
    configs.iter().min().cloned()
}
