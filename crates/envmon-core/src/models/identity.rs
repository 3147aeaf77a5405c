use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque bearer token. Never decoded on the client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

// Tokens end up in logs far too easily; keep them out of Debug output.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

/// Account role as assigned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    /// Whether an account with this role may access something that
    /// requires `required`. Admins can do everything a manager can.
    pub fn grants(self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, Role::Admin) | (Role::Admin, Role::Manager) => true,
            (Role::Manager, Role::Manager) => true,
            (Role::Manager, Role::Admin) => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username and role confirmed by the `/api/auth/me` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_grants() {
        assert!(Role::Admin.grants(Role::Admin));
        assert!(Role::Admin.grants(Role::Manager));
        assert!(Role::Manager.grants(Role::Manager));
        assert!(!Role::Manager.grants(Role::Admin));
    }

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""admin""#);
        assert_eq!(Role::Manager.to_string(), "manager");
    }

    #[test]
    fn test_identity_rejects_unknown_role() {
        let ok: Identity = serde_json::from_str(r#"{"id": 3, "username": "bob", "role": "manager"}"#)
            .expect("valid identity");
        assert_eq!(ok.username, "bob");
        assert_eq!(ok.role, Role::Manager);

        let bad = serde_json::from_str::<Identity>(r#"{"username": "eve", "role": "root"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_credential_debug_hides_token() {
        let cred = Credential::new("secret-token-value");
        let shown = format!("{:?}", cred);
        assert!(!shown.contains("secret"));
        assert_eq!(cred.as_str(), "secret-token-value");
        assert!(Credential::new("  ").is_empty());
    }
}
