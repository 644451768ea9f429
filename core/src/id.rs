//! Tunnel identifiers.
//! An identifier is only ever constructed from a validated name, so anything
//! holding a `TunnelId` can pass it to the external tool as a single argument.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Longest interface name the kernel accepts (IFNAMSIZ - 1).
pub const MAX_ID_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid tunnel identifier '{name}': {reason}")]
pub struct InvalidTunnelId {
    pub name: String,
    pub reason: &'static str,
}

/// Name of a tunnel configuration, e.g. `wg0` for `/etc/wireguard/wg0.conf`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TunnelId(String);

impl TunnelId {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidTunnelId> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("empty name")
        } else if name.len() > MAX_ID_LEN {
            Some("longer than 15 bytes")
        } else if name.starts_with('-') {
            Some("starts with '-'")
        } else if !name.bytes().all(is_id_byte) {
            Some("contains characters outside [A-Za-z0-9_=+.-]")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidTunnelId { name, reason }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Same alphabet wg-quick accepts for interface names.
fn is_id_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'=' | b'+' | b'.' | b'-')
}

impl FromStr for TunnelId {
    type Err = InvalidTunnelId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TunnelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TunnelId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TunnelId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
