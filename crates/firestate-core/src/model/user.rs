// ── Authenticated user ──

use serde::{Deserialize, Serialize};

/// The principal an auth stream reports. `None` on the stream means
/// "signed out".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default = "default_provider")]
    pub provider_id: String,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub email_verified: bool,
}

fn default_provider() -> String {
    "password".into()
}

impl User {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
            photo_url: None,
            provider_id: default_provider(),
            is_anonymous: false,
            email_verified: false,
        }
    }

    pub fn anonymous(uid: impl Into<String>) -> Self {
        Self {
            provider_id: "anonymous".into(),
            is_anonymous: true,
            ..Self::new(uid)
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let user: User = serde_json::from_value(serde_json::json!({
            "uid": "u1",
            "displayName": "Ada",
        }))
        .unwrap();
        assert_eq!(user.uid, "u1");
        assert_eq!(user.display_name.as_deref(), Some("Ada"));
        assert_eq!(user.provider_id, "password");
        assert!(!user.is_anonymous);
    }

    #[test]
    fn anonymous_user_is_flagged() {
        let user = User::anonymous("guest");
        assert!(user.is_anonymous);
        assert_eq!(user.provider_id, "anonymous");
    }
}
