use serde::{Deserialize, Serialize};

use super::user::UserProfile;

/// Username and password posted to the login endpoint.
#[derive(Serialize, Deserialize, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The `data` payload of a login or refresh response.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", try_from = "RawTokenGrant")]
pub struct TokenGrant {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Only login responses carry the profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// Grant as sent by the backend, which may spell each field more than one way
/// within the same payload.
#[derive(Deserialize)]
struct RawTokenGrant {
    token: Option<String>,
    #[serde(rename = "accessToken")]
    access_token_camel: Option<String>,
    access_token: Option<String>,
    #[serde(rename = "refreshToken")]
    refresh_token_camel: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserProfile>,
    #[serde(rename = "userInfo")]
    user_info: Option<UserProfile>,
}

impl TryFrom<RawTokenGrant> for TokenGrant {
    type Error = String;

    fn try_from(raw: RawTokenGrant) -> Result<Self, Self::Error> {
        let token = raw
            .token
            .or(raw.access_token_camel)
            .or(raw.access_token)
            .ok_or_else(|| "missing field `token`".to_string())?;

        Ok(TokenGrant {
            token,
            refresh_token: raw.refresh_token_camel.or(raw.refresh_token),
            user: raw.user.or(raw.user_info),
        })
    }
}

/// Body of the refresh call.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_grant_accepts_alternative_field_names() {
        let grant: TokenGrant =
            serde_json::from_value(json!({"accessToken": "T2", "refresh_token": "R2"}))
                .expect("grant should deserialize");

        assert_eq!(grant.token, "T2");
        assert_eq!(grant.refresh_token.as_deref(), Some("R2"));
        assert!(grant.user.is_none());
    }

    #[test]
    fn test_grant_without_refresh_token() {
        let grant: TokenGrant =
            serde_json::from_value(json!({"token": "T2"})).expect("grant should deserialize");

        assert_eq!(grant.token, "T2");
        assert!(grant.refresh_token.is_none());
    }

    #[test]
    fn test_grant_with_duplicate_spellings_prefers_primary_names() {
        let grant: TokenGrant = serde_json::from_value(json!({
            "token": "T3",
            "accessToken": "T3-alt",
            "refreshToken": "R3",
            "refresh_token": "R3-alt",
            "userInfo": {"id": 5, "role": "teacher", "realName": "Lin", "nickname": "lin"}
        }))
        .expect("grant with duplicate spellings should deserialize");

        assert_eq!(grant.token, "T3");
        assert_eq!(grant.refresh_token.as_deref(), Some("R3"));
        assert_eq!(grant.user.map(|user| user.display_name).as_deref(), Some("Lin"));
    }

    #[test]
    fn test_grant_without_token_is_rejected() {
        let error = serde_json::from_value::<TokenGrant>(json!({"refreshToken": "R1"}))
            .unwrap_err();

        assert!(error.to_string().contains("missing field `token`"));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new("alice", "hunter2");
        let printed = format!("{:?}", credentials);

        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter2"));
    }
}
