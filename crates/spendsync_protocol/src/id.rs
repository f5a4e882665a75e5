//! Expense identity.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const PROVISIONAL_PREFIX: &str = "local-";

/// A device-generated placeholder identity.
///
/// Assigned at creation time and used only until the server confirms a
/// permanent [`ServerId`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvisionalToken(Uuid);

impl ProvisionalToken {
    /// Creates a new random token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a token from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProvisionalToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProvisionalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProvisionalToken({})", self.0)
    }
}

impl fmt::Display for ProvisionalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PROVISIONAL_PREFIX}{}", self.0)
    }
}

/// The authoritative identity handed out by the server.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Wraps a server-issued identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh identifier (server side).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerId({})", self.0)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity of an expense record.
///
/// Exactly one form is active at a time. Once a record has been assigned a
/// server identity, that identity permanently supersedes the provisional one.
///
/// Serialized as an externally tagged value:
/// `{"provisional": "<uuid>"}` or `{"assigned": "<server id>"}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseId {
    /// Locally generated, not yet confirmed by the server.
    Provisional(ProvisionalToken),
    /// Assigned by the server.
    Assigned(ServerId),
}

impl ExpenseId {
    /// Creates a fresh provisional identity.
    #[must_use]
    pub fn provisional() -> Self {
        Self::Provisional(ProvisionalToken::new())
    }

    /// Returns the server identity, if one has been assigned.
    #[must_use]
    pub fn server_id(&self) -> Option<&ServerId> {
        match self {
            Self::Assigned(id) => Some(id),
            Self::Provisional(_) => None,
        }
    }

    /// Returns the provisional token, if the record has not been assigned yet.
    #[must_use]
    pub fn provisional_token(&self) -> Option<ProvisionalToken> {
        match self {
            Self::Provisional(token) => Some(*token),
            Self::Assigned(_) => None,
        }
    }

    /// Returns true if this is a provisional identity.
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

impl From<ServerId> for ExpenseId {
    fn from(id: ServerId) -> Self {
        Self::Assigned(id)
    }
}

impl From<ProvisionalToken> for ExpenseId {
    fn from(token: ProvisionalToken) -> Self {
        Self::Provisional(token)
    }
}

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisional(token) => fmt::Display::fmt(token, f),
            Self::Assigned(id) => fmt::Display::fmt(id, f),
        }
    }
}

/// Parses the display form: `local-<uuid>` is provisional, anything else
/// non-empty is a server id.
impl FromStr for ExpenseId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix(PROVISIONAL_PREFIX) {
            let uuid = Uuid::parse_str(rest).map_err(|_| ValidationError::InvalidId(s.into()))?;
            return Ok(Self::Provisional(ProvisionalToken::from_uuid(uuid)));
        }
        if s.is_empty() || s.contains('/') {
            return Err(ValidationError::InvalidId(s.into()));
        }
        Ok(Self::Assigned(ServerId::new(s)))
    }
}
