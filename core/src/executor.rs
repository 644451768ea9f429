//! Privileged command execution.
//! Commands are structured invocations (program + argv); nothing is ever
//! passed through a shell.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::credential::{CredentialCache, CredentialError};
use crate::platform::{CommandRunner, SecretPrompt};

pub const DEFAULT_SUDO_PATH: &str = "sudo";
const REDACTED: &str = "********";
const POLL_STEP: Duration = Duration::from_millis(50);
/// Time a timed-out process group gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a finished (or abandoned) process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Code(i32),
    Signal,
    TimedOut(Duration),
}

impl From<ExitStatus> for ExitState {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitState::Code(code),
            None => ExitState::Signal,
        }
    }
}

/// What a `CommandRunner` hands back for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub exit: ExitState,
    pub stdout: String,
    pub stderr: String,
}

impl RawOutput {
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit: ExitState::Code(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Outcome of one privileged invocation. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Success { output: String },
    Failed { code: Option<i32>, output: String },
    TimedOut { output: String, after: Duration },
}

impl CommandResult {
    pub fn output(&self) -> &str {
        match self {
            CommandResult::Success { output }
            | CommandResult::Failed { output, .. }
            | CommandResult::TimedOut { output, .. } => output,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Success { .. })
    }

    fn from_raw(raw: RawOutput) -> Self {
        let output = raw.combined();
        match raw.exit {
            ExitState::Code(0) => CommandResult::Success { output },
            ExitState::Code(code) => CommandResult::Failed {
                code: Some(code),
                output,
            },
            ExitState::Signal => CommandResult::Failed { code: None, output },
            ExitState::TimedOut(after) => CommandResult::TimedOut { output, after },
        }
    }

    fn redact(self, secret: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        let scrub = |text: String| {
            if text.contains(secret) {
                scrub_secret(&text, secret)
            } else {
                text
            }
        };
        match self {
            CommandResult::Success { output } => CommandResult::Success {
                output: scrub(output),
            },
            CommandResult::Failed { code, output } => CommandResult::Failed {
                code,
                output: scrub(output),
            },
            CommandResult::TimedOut { output, after } => CommandResult::TimedOut {
                output: scrub(output),
                after,
            },
        }
    }
}

/// Replaces lines and whitespace-separated words that are exactly `secret`.
/// Substrings of longer words are left alone so short secrets do not mangle
/// ordinary output.
fn scrub_secret(text: &str, secret: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            let trimmed = line.trim();
            if trimmed == secret {
                line.replacen(trimmed, REDACTED, 1)
            } else {
                scrub_words(line, secret)
            }
        })
        .collect()
}

fn scrub_words(line: &str, secret: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while !rest.is_empty() {
        let start = rest.find(|c: char| !c.is_whitespace()).unwrap_or(rest.len());
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let word = &rest[..end];
        out.push_str(if word == secret { REDACTED } else { word });
        rest = &rest[end..];
    }
    out
}

/// How privileged commands are elevated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElevationMode {
    /// `sudo -S`, fed the cached credential on stdin.
    #[default]
    Sudo,
    /// Run the tool as-is.
    Direct,
    /// `Direct` when already root, `Sudo` otherwise.
    Auto,
}

impl ElevationMode {
    pub fn resolve(self) -> ElevationMode {
        match self {
            ElevationMode::Auto if is_root() => ElevationMode::Direct,
            ElevationMode::Auto => ElevationMode::Sudo,
            other => other,
        }
    }
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Spawns real processes.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner {
    /// PATH for spawned commands; inherited when unset.
    pub path: Option<String>,
}

impl SystemRunner {
    pub fn with_path(path: Option<String>) -> Self {
        Self { path }
    }
}

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        invocation: &Invocation,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> std::io::Result<RawOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group, so a timeout can signal the whole tree.
            .process_group(0);
        if let Some(path) = &self.path {
            cmd.env("PATH", path);
        }

        let mut child = cmd.spawn()?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // The child may exit without reading, e.g. when sudo has a
            // cached timestamp.
            if let Err(e) = pipe.write_all(input) {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(e);
                }
            }
        }

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let exit = match timeout {
            None => ExitState::from(child.wait()?),
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break ExitState::from(status);
                    }
                    if Instant::now() >= deadline {
                        warn!("{} timed out after {:?}; terminating it", invocation, limit);
                        terminate_group(&mut child)?;
                        break ExitState::TimedOut(limit);
                    }
                    thread::sleep(POLL_STEP);
                }
            }
        };

        // Anything still holding the pipes after the group kill is out of
        // reach (e.g. re-parented by sudo); do not block on it forever.
        let reader_deadline = match exit {
            ExitState::TimedOut(_) => Some(Instant::now() + KILL_GRACE),
            _ => None,
        };
        Ok(RawOutput {
            exit,
            stdout: collect(stdout, reader_deadline),
            stderr: collect(stderr, reader_deadline),
        })
    }
}

/// SIGTERM to the child's process group, SIGKILL after `KILL_GRACE`.
/// sudo relays SIGTERM to the root tool it runs and waits for it, so the
/// tool has exited by the time sudo has. Returns once the child is reaped.
fn terminate_group(child: &mut Child) -> std::io::Result<()> {
    let group = child.id() as libc::pid_t;
    signal_group(group, libc::SIGTERM);

    let deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < deadline {
        if child.try_wait()?.is_some() {
            // Members that ignored SIGTERM.
            signal_group(group, libc::SIGKILL);
            return Ok(());
        }
        thread::sleep(POLL_STEP);
    }

    warn!("process group {} ignored SIGTERM; sending SIGKILL", group);
    signal_group(group, libc::SIGKILL);
    let _ = child.kill();
    child.wait()?;
    Ok(())
}

fn signal_group(group: libc::pid_t, signal: libc::c_int) {
    // ESRCH once every member is gone; EPERM for members running as root.
    if unsafe { libc::killpg(group, signal) } != 0 {
        debug!(
            "killpg({}, {}): {}",
            group,
            signal,
            std::io::Error::last_os_error()
        );
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(reader: JoinHandle<String>, deadline: Option<Instant>) -> String {
    if let Some(deadline) = deadline {
        while !reader.is_finished() {
            if Instant::now() >= deadline {
                return String::new();
            }
            thread::sleep(POLL_STEP);
        }
    }
    reader.join().unwrap_or_default()
}

/// Runs invocations with elevated privileges, holding the session credential.
pub struct PrivilegedExecutor {
    runner: Arc<dyn CommandRunner>,
    elevation: ElevationMode,
    sudo_path: PathBuf,
    timeout: Option<Duration>,
    credentials: CredentialCache,
}

impl PrivilegedExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        prompt: Arc<dyn SecretPrompt>,
        elevation: ElevationMode,
    ) -> Self {
        Self {
            runner,
            elevation: elevation.resolve(),
            sudo_path: PathBuf::from(DEFAULT_SUDO_PATH),
            timeout: None,
            credentials: CredentialCache::new(prompt),
        }
    }

    pub fn with_sudo_path(mut self, sudo_path: impl Into<PathBuf>) -> Self {
        self.sudo_path = sudo_path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn elevation(&self) -> ElevationMode {
        self.elevation
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    /// Runs `invocation` elevated. Only a missing credential is an error;
    /// a non-zero exit, a launch failure or a timeout come back as a
    /// `CommandResult`.
    pub fn run(&self, invocation: &Invocation) -> Result<CommandResult, CredentialError> {
        info!("Executing: {}", invocation);

        let (elevated, secret) = match self.elevation {
            ElevationMode::Direct => (invocation.clone(), None),
            _ => {
                let credential = self.credentials.get_credential()?;
                (self.sudo_wrap(invocation), Some(credential))
            }
        };

        let stdin = secret.as_ref().map(|c| format!("{}\n", c.expose()));
        let result = match self.runner.run(
            &elevated,
            stdin.as_deref().map(str::as_bytes),
            self.timeout,
        ) {
            Ok(raw) => CommandResult::from_raw(raw),
            Err(e) => {
                error!("Failed to launch {}: {}", elevated.program.display(), e);
                CommandResult::Failed {
                    code: None,
                    output: format!("failed to launch {}: {}", elevated.program.display(), e),
                }
            }
        };
        let result = match &secret {
            Some(credential) => result.redact(credential.expose()),
            None => result,
        };

        match &result {
            CommandResult::Success { output } => debug!("{} succeeded:\n{}", invocation, output),
            CommandResult::Failed { code, output } => {
                warn!("{} failed (code {:?}):\n{}", invocation, code, output)
            }
            CommandResult::TimedOut { after, .. } => {
                warn!("{} timed out after {:?}", invocation, after)
            }
        }
        Ok(result)
    }

    fn sudo_wrap(&self, invocation: &Invocation) -> Invocation {
        // -p "" keeps sudo's own prompt out of the captured stderr.
        let mut args = vec![
            "-S".to_string(),
            "-p".to_string(),
            String::new(),
            "--".to_string(),
            invocation.program.to_string_lossy().into_owned(),
        ];
        args.extend(invocation.args.iter().cloned());
        Invocation {
            program: self.sudo_path.clone(),
            args,
        }
    }
}
