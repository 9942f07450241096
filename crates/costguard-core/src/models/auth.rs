//! Request and response bodies for the `/auth/*` endpoints.

use serde::{Deserialize, Serialize};

use super::UserProfile;

#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Body of `/auth/signin` and `/auth/signup`.
///
/// Sign-in always carries `tokens` and `user`. Sign-up may return tokens,
/// only a user / success marker, or nothing usable at all, so every field is
/// optional here and the session manager decides what the shape means.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tokens: Option<Tokens>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub success: Option<bool>,
}

impl AuthResponse {
    /// The access token, if the response carries a non-empty one.
    pub fn access_token(&self) -> Option<&str> {
        self.tokens
            .as_ref()
            .map(|t| t.access_token.as_str())
            .filter(|t| !t.is_empty())
    }

    /// The user, if the response carries one with a userId or email.
    pub fn identified_user(&self) -> Option<&UserProfile> {
        self.user.as_ref().filter(|u| u.has_identity())
    }

    /// Account was created but no session was issued.
    pub fn indicates_created(&self) -> bool {
        self.user.is_some() || self.success == Some(true) || self.message.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub user: UserProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signin_response() {
        let json = r#"{"message":"ok","tokens":{"accessToken":"t1","refreshToken":"r1","expiresIn":3600,"tokenType":"Bearer"},"user":{"userId":"u1","email":"a@b.com"},"cognitoTokens":{"idToken":"x"}}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access_token(), Some("t1"));
        assert_eq!(resp.identified_user().map(|u| u.user_id.as_str()), Some("u1"));
        assert_eq!(resp.tokens.unwrap().refresh_token, "r1");
    }

    #[test]
    fn test_signup_shapes() {
        let created: AuthResponse =
            serde_json::from_str(r#"{"success":true,"message":"Account created"}"#).unwrap();
        assert!(created.access_token().is_none());
        assert!(created.indicates_created());

        let empty_token: AuthResponse =
            serde_json::from_str(r#"{"tokens":{"accessToken":""},"user":{"email":"a@b.com"}}"#).unwrap();
        assert!(empty_token.access_token().is_none());

        let nothing: AuthResponse = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!nothing.indicates_created());
    }

    #[test]
    fn test_signup_request_omits_missing_names() {
        let req = SignUpRequest {
            email: "a@b.com",
            password: "pw",
            first_name: Some("Ada"),
            last_name: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["firstName"], "Ada");
        assert!(json.get("lastName").is_none());
    }
}
