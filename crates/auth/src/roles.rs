use serde::{Deserialize, Deserializer, Serialize, Serializer};

use inspectra_core::RoleId;

/// Label used for grants synthesized by the escalation path.
pub const EPHEMERAL_ROLE: &str = "ephemeral";

/// The role an effective grant is attributed to.
///
/// Escalation grants are never backed by a stored role row; they carry the
/// synthetic [`GrantRole::Ephemeral`] marker instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GrantRole {
    Stored(RoleId),
    Ephemeral,
}

impl GrantRole {
    pub fn role_id(&self) -> Option<RoleId> {
        match self {
            GrantRole::Stored(id) => Some(*id),
            GrantRole::Ephemeral => None,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, GrantRole::Ephemeral)
    }
}

impl core::fmt::Display for GrantRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            GrantRole::Stored(id) => core::fmt::Display::fmt(id, f),
            GrantRole::Ephemeral => f.write_str(EPHEMERAL_ROLE),
        }
    }
}

impl From<RoleId> for GrantRole {
    fn from(value: RoleId) -> Self {
        GrantRole::Stored(value)
    }
}

impl Serialize for GrantRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GrantRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == EPHEMERAL_ROLE {
            return Ok(GrantRole::Ephemeral);
        }
        raw.parse::<RoleId>()
            .map(GrantRole::Stored)
            .map_err(serde::de::Error::custom)
    }
}
