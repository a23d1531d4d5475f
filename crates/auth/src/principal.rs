use serde::{Deserialize, Serialize};

use crate::claims::IdentityClaims;

/// Stable subject identifier issued by the identity provider (e.g. `"auth0|123"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdpId(String);

impl IdpId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for IdpId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdpId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for IdpId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An authenticated principal, built from verified identity claims.
///
/// Immutable once constructed; lives for one request or job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    idp_id: IdpId,
    email: String,
    username: String,
    given_name: Option<String>,
    family_name: Option<String>,
    display_name: Option<String>,
}

impl Principal {
    pub fn new(idp_id: impl Into<IdpId>, email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            idp_id: idp_id.into(),
            email: email.into(),
            username: username.into(),
            given_name: None,
            family_name: None,
            display_name: None,
        }
    }

    pub fn from_claims(claims: &IdentityClaims) -> Self {
        let username = claims
            .preferred_username
            .clone()
            .unwrap_or_else(|| claims.email.clone());

        Self {
            idp_id: claims.sub.clone(),
            email: claims.email.clone(),
            username,
            given_name: claims.given_name.clone(),
            family_name: claims.family_name.clone(),
            display_name: claims.name.clone(),
        }
    }

    pub fn with_names(
        mut self,
        given_name: Option<String>,
        family_name: Option<String>,
        display_name: Option<String>,
    ) -> Self {
        self.given_name = given_name;
        self.family_name = family_name;
        self.display_name = display_name;
        self
    }

    pub fn idp_id(&self) -> &IdpId {
        &self.idp_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn given_name(&self) -> Option<&str> {
        self.given_name.as_deref()
    }

    pub fn family_name(&self) -> Option<&str> {
        self.family_name.as_deref()
    }

    /// Display name, falling back to "given family", then the username.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.display_name {
            return name.clone();
        }
        match (&self.given_name, &self.family_name) {
            (Some(g), Some(f)) => format!("{g} {f}"),
            (Some(g), None) => g.clone(),
            (None, Some(f)) => f.clone(),
            (None, None) => self.username.clone(),
        }
    }
}
