use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::User;

/// Type of JWT: access or refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// The identity a token is minted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaim {
    pub subject: Uuid,
    pub username: String,
}

impl From<&User> for IdentityClaim {
    fn from(user: &User) -> Self {
        Self {
            subject: user.id,
            username: user.email.clone(),
        }
    }
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,        // user ID
    pub username: String, // email at mint time
    pub iat: usize,       // issued at (unix timestamp)
    pub exp: usize,       // expires at (unix timestamp)
    pub jti: Uuid,        // unique per mint
    pub kind: TokenKind,  // token type
}
