//! Access scope hierarchy.
//!
//! A scope states *how much tenant data* a principal may see. Scopes form a
//! total order, from most to least permissive:
//!
//! `SYSTEM > GLOBAL > CLIENT > SITE_GROUP > SITE > SELF`

use core::cmp::Ordering;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    /// Platform operators; sees everything, including system-internal records.
    System,
    /// Cross-client visibility (e.g. support staff).
    Global,
    /// Every site of one client.
    Client,
    /// One site and all of its descendant sites.
    SiteGroup,
    /// Exactly one site.
    Site,
    /// Only records owned by the principal; no asset visibility.
    #[serde(rename = "SELF")]
    SelfOnly,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown scope '{0}'")]
pub struct ScopeParseError(pub String);

impl Scope {
    /// All scopes, most permissive first.
    pub const ALL: [Scope; 6] = [
        Scope::System,
        Scope::Global,
        Scope::Client,
        Scope::SiteGroup,
        Scope::Site,
        Scope::SelfOnly,
    ];

    /// Position in the hierarchy; higher is more permissive.
    pub const fn rank(self) -> u8 {
        match self {
            Scope::System => 5,
            Scope::Global => 4,
            Scope::Client => 3,
            Scope::SiteGroup => 2,
            Scope::Site => 1,
            Scope::SelfOnly => 0,
        }
    }

    /// True iff `self` is equal to or more permissive than `required`.
    pub const fn is_at_least(self, required: Scope) -> bool {
        self.rank() >= required.rank()
    }

    /// True iff `self` is strictly more permissive than `other`.
    pub const fn is_broader_than(self, other: Scope) -> bool {
        self.rank() > other.rank()
    }

    /// All scopes from `SYSTEM` down through `self`, inclusive.
    ///
    /// Useful for "any role with at least this scope" lookups.
    pub fn scopes_at_least(self) -> Vec<Scope> {
        Scope::ALL
            .iter()
            .copied()
            .filter(|s| s.is_at_least(self))
            .collect()
    }

    /// Stored/wire label (`"SITE_GROUP"`, `"SELF"`, ...).
    pub const fn as_str(self) -> &'static str {
        match self {
            Scope::System => "SYSTEM",
            Scope::Global => "GLOBAL",
            Scope::Client => "CLIENT",
            Scope::SiteGroup => "SITE_GROUP",
            Scope::Site => "SITE",
            Scope::SelfOnly => "SELF",
        }
    }
}

impl PartialOrd for Scope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by permissiveness: `Scope::System` is the maximum.
impl Ord for Scope {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Scope::ALL
            .iter()
            .copied()
            .find(|scope| scope.as_str() == normalized)
            .ok_or_else(|| ScopeParseError(s.to_string()))
    }
}
