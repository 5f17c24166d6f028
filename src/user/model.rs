//! User record exchanged with the user service.

use serde::{Deserialize, Serialize};

/// Id carried by the substitute user returned from fallbacks.
pub const DEFAULT_USER_ID: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub user_name: String,
    pub password: String,
}

impl User {
    pub fn new(id: i64, user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id,
            user_name: user_name.into(),
            password: password.into(),
        }
    }

    /// Substitute user handed out when the service cannot be reached.
    pub fn default_user() -> Self {
        Self::new(DEFAULT_USER_ID, "default", "default")
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_USER_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_camel_case() {
        let json = serde_json::to_value(User::default_user()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": -1, "userName": "default", "password": "default"})
        );

        let parsed: User = serde_json::from_str(r#"{"id":7,"userName":"seven","password":"p"}"#).unwrap();
        assert_eq!(parsed, User::new(7, "seven", "p"));
        assert!(!parsed.is_default());
    }
}
