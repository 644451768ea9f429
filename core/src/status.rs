//! Interpretation of `wg` output. Pure text-to-state mapping, no I/O.

use log::warn;

use crate::executor::CommandResult;
use crate::id::TunnelId;

/// Observed state of the selected tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunnelStatus {
    /// No status query has completed yet.
    #[default]
    Unknown,
    Down,
    Up,
}

impl std::fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TunnelStatus::Unknown => "unknown",
            TunnelStatus::Down => "down",
            TunnelStatus::Up => "up",
        })
    }
}

/// First line of `wg show interfaces` output. Later lines are ignored.
pub fn parse_active(output: &str) -> Option<TunnelId> {
    let first = output.trim().lines().next()?.trim();
    // `wg show interfaces` prints space separated names on some versions.
    let name = first.split_whitespace().next()?;
    match TunnelId::new(name) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Ignoring active interface: {}", e);
            None
        }
    }
}

/// Active interface reported by a "show interfaces" invocation.
/// A failed or timed out invocation means nothing is known to be active.
pub fn active_from(result: &CommandResult) -> Option<TunnelId> {
    match result {
        CommandResult::Success { output } => parse_active(output),
        _ => None,
    }
}

/// Every interface listed, in reported order.
pub fn parse_interfaces(output: &str) -> Vec<TunnelId> {
    output
        .split_whitespace()
        .filter_map(|name| TunnelId::new(name).ok())
        .collect()
}

/// Per-interface status is shown as the tool formats it.
pub fn parse_status(output: &str) -> String {
    output.to_string()
}

/// Operator-facing text for a command outcome.
pub fn render(result: &CommandResult) -> String {
    match result {
        CommandResult::Success { output } => parse_status(output),
        CommandResult::Failed { code, output } => {
            let code = code.map_or_else(|| "none".to_string(), |c| c.to_string());
            format!("Error: {}\nError code: {}", output.trim_end(), code)
        }
        CommandResult::TimedOut { output, after } => {
            format!(
                "Error: {}\nTimed out after {}s",
                output.trim_end(),
                after.as_secs()
            )
        }
    }
}
