use serde::{Deserialize, Serialize};
use std::fmt;

/// Profile of a principal asserted by a signed login token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Identifier assigned by the identity provider
    pub id: String,
    /// Verified email, used as the quota identity key
    pub email: String,
    /// Display name
    pub name: String,
    /// Avatar URL, if the provider returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    /// Identity provider name (e.g. "google")
    pub provider: String,
}

/// The caller of a request
///
/// Resolved once per request and passed explicitly to everything that
/// needs to know who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No valid credential was presented
    Anonymous,
    /// A verified, unexpired token was presented
    Authenticated(UserProfile),
}

impl Identity {
    /// Key under which quota is tracked, `None` for anonymous callers
    pub fn identity_key(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(profile) => Some(&profile.email),
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(profile) => Some(&profile.name),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Anonymous => write!(f, "anonymous"),
            Identity::Authenticated(profile) => write!(f, "{}", profile.email),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key() {
        let user = Identity::Authenticated(UserProfile {
            id: "42".to_string(),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            photo: None,
            provider: "google".to_string(),
        });

        assert_eq!(user.identity_key(), Some("ada@example.com"));
        assert_eq!(user.display_name(), Some("Ada"));
        assert_eq!(Identity::Anonymous.identity_key(), None);
        assert_eq!(Identity::Anonymous.to_string(), "anonymous");
    }
}
