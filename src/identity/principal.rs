use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attributes captured for the principal at login time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attrs {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub domain_controller: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Authenticated identity owned by a global session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub attrs: Attrs,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), ..Default::default() }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// User record as resolved by a credential store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SsoUser {
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsoRole {
    pub name: String,
}

impl SsoRole {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }
}

/// Lookup key for identity, role and credential resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserKey(pub String);

impl UserKey {
    pub fn new(id: impl Into<String>) -> Self { UserKey(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for UserKey {
    fn from(s: &str) -> Self { UserKey(s.to_string()) }
}
