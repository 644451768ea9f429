//! Command shapes for the WireGuard tools.

use std::path::PathBuf;

use crate::executor::Invocation;
use crate::id::TunnelId;

pub const DEFAULT_WG: &str = "wg";
pub const DEFAULT_WG_QUICK: &str = "wg-quick";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireGuardTool {
    pub wg: PathBuf,
    pub wg_quick: PathBuf,
}

impl WireGuardTool {
    pub fn new(wg: impl Into<PathBuf>, wg_quick: impl Into<PathBuf>) -> Self {
        Self {
            wg: wg.into(),
            wg_quick: wg_quick.into(),
        }
    }

    /// `wg show interfaces`
    pub fn show_interfaces(&self) -> Invocation {
        Invocation::new(&self.wg, ["show", "interfaces"])
    }

    /// `wg show <id>`
    pub fn show(&self, id: &TunnelId) -> Invocation {
        Invocation::new(&self.wg, ["show", id.as_str()])
    }

    /// `wg-quick up <id>`
    pub fn up(&self, id: &TunnelId) -> Invocation {
        Invocation::new(&self.wg_quick, ["up", id.as_str()])
    }

    /// `wg-quick down <id>`
    pub fn down(&self, id: &TunnelId) -> Invocation {
        Invocation::new(&self.wg_quick, ["down", id.as_str()])
    }
}

impl Default for WireGuardTool {
    fn default() -> Self {
        Self::new(DEFAULT_WG, DEFAULT_WG_QUICK)
    }
}
