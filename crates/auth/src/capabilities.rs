//! Capabilities: named actions a role permits, independent of scope.
//!
//! Capabilities are a closed enum and a [`CapabilitySet`] is a bitset over it.
//! Roles store them as loosely-typed string arrays, so decoding happens at the
//! storage boundary through [`CapabilitySet::from_stored`] (lenient, logged) or
//! [`CapabilitySet::parse_strict`].

use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Capability {
    ViewAssets,
    ManageAssets,
    ViewInspections,
    PerformInspections,
    ReviewInspections,
    DeleteInspections,
    ManageInspectionTemplates,
    ManageCustomQuestions,
    ViewReports,
    ExportReports,
    ManageProducts,
    ManageCategories,
    ViewSites,
    ManageSites,
    ViewClients,
    ManageClients,
    InviteUsers,
    ManageUsers,
    ManageRoles,
    ViewAuditLog,
    ManageNotifications,
    ManageSystemSettings,
}

impl Capability {
    pub const ALL: [Capability; 22] = [
        Capability::ViewAssets,
        Capability::ManageAssets,
        Capability::ViewInspections,
        Capability::PerformInspections,
        Capability::ReviewInspections,
        Capability::DeleteInspections,
        Capability::ManageInspectionTemplates,
        Capability::ManageCustomQuestions,
        Capability::ViewReports,
        Capability::ExportReports,
        Capability::ManageProducts,
        Capability::ManageCategories,
        Capability::ViewSites,
        Capability::ManageSites,
        Capability::ViewClients,
        Capability::ManageClients,
        Capability::InviteUsers,
        Capability::ManageUsers,
        Capability::ManageRoles,
        Capability::ViewAuditLog,
        Capability::ManageNotifications,
        Capability::ManageSystemSettings,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Capability::ViewAssets => "assets.read",
            Capability::ManageAssets => "assets.write",
            Capability::ViewInspections => "inspections.read",
            Capability::PerformInspections => "inspections.perform",
            Capability::ReviewInspections => "inspections.review",
            Capability::DeleteInspections => "inspections.delete",
            Capability::ManageInspectionTemplates => "inspection_templates.write",
            Capability::ManageCustomQuestions => "custom_questions.write",
            Capability::ViewReports => "reports.read",
            Capability::ExportReports => "reports.export",
            Capability::ManageProducts => "products.write",
            Capability::ManageCategories => "categories.write",
            Capability::ViewSites => "sites.read",
            Capability::ManageSites => "sites.write",
            Capability::ViewClients => "clients.read",
            Capability::ManageClients => "clients.write",
            Capability::InviteUsers => "users.invite",
            Capability::ManageUsers => "users.write",
            Capability::ManageRoles => "roles.write",
            Capability::ViewAuditLog => "audit_log.read",
            Capability::ManageNotifications => "notifications.write",
            Capability::ManageSystemSettings => "system.settings.write",
        }
    }

    const fn bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown capabilities: {}", .0.join(", "))]
pub struct CapabilityParseError(pub Vec<String>);

impl FromStr for Capability {
    type Err = CapabilityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CapabilityParseError(vec![s.to_string()]))
    }
}

/// A fixed-size set of capabilities.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u64);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every known capability (granted to ephemeral escalation grants).
    pub fn full() -> Self {
        Capability::ALL.iter().copied().collect()
    }

    /// Decode a stored, loosely-typed capability array.
    ///
    /// Unknown names are dropped and logged at `warn`; they never fail decoding.
    pub fn from_stored<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::empty();
        for value in values {
            match value.as_ref().parse::<Capability>() {
                Ok(capability) => set.insert(capability),
                Err(_) => tracing::warn!(
                    capability = value.as_ref(),
                    "dropping unknown capability from stored role"
                ),
            }
        }
        set
    }

    /// Decode a capability array, rejecting it if any name is unknown.
    pub fn parse_strict<I, S>(values: I) -> Result<Self, CapabilityParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::empty();
        let mut unknown = Vec::new();
        for value in values {
            match value.as_ref().parse::<Capability>() {
                Ok(capability) => set.insert(capability),
                Err(_) => unknown.push(value.as_ref().to_string()),
            }
        }
        if unknown.is_empty() {
            Ok(set)
        } else {
            Err(CapabilityParseError(unknown))
        }
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    pub fn remove(&mut self, capability: Capability) {
        self.0 &= !capability.bit();
    }

    pub const fn has(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn has_any(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().any(|c| self.has(*c))
    }

    /// True when every listed capability is present (vacuously true for `&[]`).
    pub fn has_all(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().all(|c| self.has(*c))
    }

    pub const fn union(self, other: CapabilitySet) -> CapabilitySet {
        CapabilitySet(self.0 | other.0)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Capabilities in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.iter().copied().filter(|c| self.has(*c))
    }

    pub fn to_names(&self) -> Vec<&'static str> {
        self.iter().map(Capability::as_str).collect()
    }
}

impl core::fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter().map(Capability::as_str)).finish()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        let mut set = Self::empty();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(Capability::as_str))
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        Ok(CapabilitySet::from_stored(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_capability_fits_the_bitset() {
        assert!(Capability::ALL.len() <= 64);
        assert_eq!(CapabilitySet::full().len(), Capability::ALL.len());
    }

    #[test]
    fn names_are_unique_and_parse_back() {
        for capability in Capability::ALL {
            assert_eq!(capability.as_str().parse::<Capability>(), Ok(capability));
        }
        let mut names: Vec<_> = Capability::ALL.iter().map(|c| c.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Capability::ALL.len());
    }

    #[test]
    fn membership_checks() {
        let set: CapabilitySet = [Capability::ViewAssets, Capability::ViewReports]
            .into_iter()
            .collect();

        assert!(set.has(Capability::ViewAssets));
        assert!(!set.has(Capability::ManageAssets));
        assert!(set.has_any(&[Capability::ManageAssets, Capability::ViewReports]));
        assert!(!set.has_any(&[Capability::ManageAssets]));
        assert!(set.has_all(&[Capability::ViewAssets, Capability::ViewReports]));
        assert!(!set.has_all(&[Capability::ViewAssets, Capability::ManageUsers]));
        assert!(set.has_all(&[]));
        assert!(!set.has_any(&[]));
    }

    #[test]
    fn from_stored_drops_unknown_values() {
        let set = CapabilitySet::from_stored(["assets.read", "teleport.everyone", "REPORTS.READ"]);
        assert_eq!(set.len(), 2);
        assert!(set.has(Capability::ViewAssets));
        assert!(set.has(Capability::ViewReports));
    }

    #[test]
    fn parse_strict_reports_every_unknown_value() {
        let err = CapabilitySet::parse_strict(["assets.read", "bogus", "also.bogus"]).unwrap_err();
        assert_eq!(err.0, vec!["bogus".to_string(), "also.bogus".to_string()]);
        assert!(CapabilitySet::parse_strict(["users.invite"]).is_ok());
    }

    #[test]
    fn union_and_remove() {
        let a: CapabilitySet = [Capability::ViewSites].into_iter().collect();
        let b: CapabilitySet = [Capability::ManageSites].into_iter().collect();
        let mut both = a.union(b);
        assert_eq!(both.len(), 2);
        both.remove(Capability::ViewSites);
        assert_eq!(both, b);
        assert!(CapabilitySet::empty().is_empty());
    }

    #[test]
    fn serde_round_trips_through_names() {
        let set: CapabilitySet = [Capability::ManageRoles, Capability::ViewAssets]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["assets.read","roles.write"]"#);

        let decoded: CapabilitySet =
            serde_json::from_str(r#"["roles.write","assets.read","legacy.thing"]"#).unwrap();
        assert_eq!(decoded, set);
    }
}
