pub mod config;
pub mod credential;
pub mod discovery;
pub mod executor;
pub mod id;
pub mod poller;
pub mod status;
pub mod tool;
pub mod tunnel;

pub use id::TunnelId;
pub use status::TunnelStatus;
pub use tunnel::{ControlError, StatusReport, TunnelController};

/// Interfaces that front ends implement (or fake in tests) so the core never
/// talks to the terminal or spawns processes directly.
pub mod platform {
    use std::time::Duration;

    use crate::executor::{Invocation, RawOutput};

    /// Trait for platform-correct settings paths.
    pub trait AppPaths {
        fn config_path(&self) -> std::path::PathBuf;
    }

    /// Trait for asking the operator for a secret without echoing it.
    pub trait SecretPrompt: Send + Sync {
        fn prompt(&self, message: &str) -> std::io::Result<String>;
    }

    /// Trait for spawning a process and waiting for it; allows fake tools in tests.
    pub trait CommandRunner: Send + Sync {
        fn run(
            &self,
            invocation: &Invocation,
            stdin: Option<&[u8]>,
            timeout: Option<Duration>,
        ) -> std::io::Result<RawOutput>;
    }
}
