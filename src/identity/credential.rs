//! Credential values and the schemes that interpret raw store data.

use std::fmt::{Display, Formatter};

/// A single credential loaded from a store and typed by an authentication scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Username(String),
    /// PHC-encoded password hash as held by the store.
    Password(String),
    /// Domain controller used for NTLM pass-through. Renders empty when unknown.
    DomainController(Option<String>),
}

impl Credential {
    pub fn name(&self) -> &'static str {
        match self {
            Credential::Username(_) => "username",
            Credential::Password(_) => "password",
            Credential::DomainController(_) => "domainController",
        }
    }
}

impl Display for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Username(v) | Credential::Password(v) => f.write_str(v),
            Credential::DomainController(dc) => f.write_str(dc.as_deref().unwrap_or("")),
        }
    }
}

/// Builds scheme-specific credentials from the raw `(name, value)` pairs a store holds.
/// Pairs a scheme does not understand are skipped.
pub trait CredentialProvider: Send + Sync {
    fn scheme(&self) -> &'static str;
    fn new_credential(&self, name: &str, value: Option<&str>) -> Option<Credential>;
}

/// Username/password scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicAuthScheme;

impl CredentialProvider for BasicAuthScheme {
    fn scheme(&self) -> &'static str { "basic-authentication" }

    fn new_credential(&self, name: &str, value: Option<&str>) -> Option<Credential> {
        match (name, value) {
            ("username", Some(v)) => Some(Credential::Username(v.to_string())),
            ("password", Some(v)) => Some(Credential::Password(v.to_string())),
            _ => None,
        }
    }
}

/// NTLM scheme: identifies the user and the domain controller to bind against.
#[derive(Debug, Clone, Copy, Default)]
pub struct NtlmAuthScheme;

impl CredentialProvider for NtlmAuthScheme {
    fn scheme(&self) -> &'static str { "ntlm-authentication" }

    fn new_credential(&self, name: &str, value: Option<&str>) -> Option<Credential> {
        match name {
            "username" => value.map(|v| Credential::Username(v.to_string())),
            "domainController" => Some(Credential::DomainController(value.map(|v| v.to_string()))),
            _ => None,
        }
    }
}
