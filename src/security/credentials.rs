//! Authenticated identity attached to a request.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Key/value bag describing who made a request.
///
/// `username` and `roles` are always present; anything else a user service
/// wants to carry rides along in `extra` and survives token round trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default, alias = "role", skip_serializing_if = "BTreeSet::is_empty")]
    pub roles: BTreeSet<String>,
    /// Issued-at, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// Expiry, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Credentials {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// True when any of `required` is held.
    pub fn has_any_role(&self, required: &BTreeSet<String>) -> bool {
        self.roles.intersection(required).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape() {
        let mut creds = Credentials::new("scott").with_roles(["USER"]);
        creds
            .extra
            .insert("email".into(), serde_json::Value::String("s@example.org".into()));
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["username"], "scott");
        assert_eq!(json["roles"][0], "USER");
        assert_eq!(json["email"], "s@example.org");
        assert!(json.get("exp").is_none());

        let back: Credentials = serde_json::from_value(json).unwrap();
        assert_eq!(back, creds);
    }

    #[test]
    fn accepts_singular_role_key() {
        let creds: Credentials =
            serde_json::from_str(r#"{"username":"x","role":["ADMIN"]}"#).unwrap();
        assert!(creds.has_role("ADMIN"));
    }
}
