//! In-memory elevation credential, prompted for once per process.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use thiserror::Error;

use crate::platform::SecretPrompt;

pub const DEFAULT_PROMPT: &str = "Enter your sudo password: ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("credential input unavailable: {0}")]
    InputUnavailable(String),
}

/// Elevation secret. Never printed, never written to disk.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Non-echoing terminal prompt.
#[derive(Debug, Default)]
pub struct TtyPrompt;

impl SecretPrompt for TtyPrompt {
    fn prompt(&self, message: &str) -> std::io::Result<String> {
        rpassword::prompt_password(message)
    }
}

/// Holds the credential for the lifetime of the process.
pub struct CredentialCache {
    prompt: Arc<dyn SecretPrompt>,
    message: String,
    cached: Mutex<Option<Credential>>,
}

impl CredentialCache {
    pub fn new(prompt: Arc<dyn SecretPrompt>) -> Self {
        Self::with_message(prompt, DEFAULT_PROMPT)
    }

    pub fn with_message(prompt: Arc<dyn SecretPrompt>, message: impl Into<String>) -> Self {
        Self {
            prompt,
            message: message.into(),
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached credential, prompting the operator on first use.
    ///
    /// The lock is held across the prompt so concurrent callers wait for the
    /// first answer instead of prompting again. Failures are not cached.
    pub fn get_credential(&self) -> Result<Credential, CredentialError> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(credential) = cached.as_ref() {
            debug!("Using cached credential");
            return Ok(credential.clone());
        }

        info!("Prompting for elevation credential");
        let secret = self.prompt.prompt(&self.message).map_err(|e| {
            warn!("Credential prompt failed: {}", e);
            CredentialError::InputUnavailable(e.to_string())
        })?;

        let secret = secret.trim_end_matches(['\r', '\n']);
        if secret.is_empty() {
            warn!("Empty credential entered");
            return Err(CredentialError::InputUnavailable(
                "empty credential".to_string(),
            ));
        }

        let credential = Credential::new(secret);
        *cached = Some(credential.clone());
        Ok(credential)
    }

    pub fn is_cached(&self) -> bool {
        self.cached
            .lock()
            .map(|c| c.is_some())
            .unwrap_or(false)
    }
}
