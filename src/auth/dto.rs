use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::{Account, Role, User};

/// Request body for user registration. Password is optional so accounts
/// created through an external provider can exist without one.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for profile updates. Absent fields stay unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

/// Freshly minted access and refresh tokens.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Response returned after login or refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            phone: user.phone.clone(),
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

/// Profile payload: the user plus their roles and linked providers.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: PublicUser,
    pub roles: Vec<Role>,
    pub accounts: Vec<Account>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_serializes_without_password_fields() {
        let user = PublicUser {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            phone: None,
            email_verified: false,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&user).expect("serialize");
        assert!(json.contains("test@example.com"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn register_request_tolerates_missing_optional_fields() {
        let req: RegisterRequest =
            serde_json::from_str(r#"{"email":"a@b.c"}"#).expect("deserialize");
        assert_eq!(req.email, "a@b.c");
        assert!(req.phone.is_none());
        assert!(req.password.is_none());
    }

    #[test]
    fn profile_response_flattens_the_user() {
        let profile = ProfileResponse {
            user: PublicUser {
                id: Uuid::new_v4(),
                email: "p@example.com".into(),
                phone: Some("+15550001".into()),
                email_verified: true,
                created_at: OffsetDateTime::now_utc(),
            },
            roles: vec![Role::Customer],
            accounts: vec![],
        };
        let json = serde_json::to_value(&profile).expect("serialize");
        assert_eq!(json["email"], "p@example.com");
        assert_eq!(json["roles"][0], "CUSTOMER");
    }
}
