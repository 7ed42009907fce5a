//! ClientId: identifies this client's steps in the server's step stream.
//!
//! Numeric on the wire, displayed as an 8-character hex string in logs and
//! on the command line.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientIdError {
    #[error("Invalid client ID format: expected 1-8 hex chars")]
    InvalidFormat,
    #[error("Invalid hex: {0}")]
    InvalidHex(#[from] std::num::ParseIntError),
}

/// The id sent with every batch of steps and echoed back by the server in
/// `clientIDs`.
///
/// # Examples
/// ```
/// use collab_core::ClientId;
///
/// let id = ClientId::generate();
/// let parsed: ClientId = id.to_string().parse().unwrap();
/// assert_eq!(parsed, id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u32);

impl ClientId {
    /// Generate a new random client ID. Never returns zero.
    pub fn generate() -> Self {
        use rand::Rng;
        loop {
            let id: u32 = rand::rng().random();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = ClientIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 8 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ClientIdError::InvalidFormat);
        }
        Ok(Self(u32::from_str_radix(s, 16)?))
    }
}

impl From<u32> for ClientId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
