use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::Result;

pub mod memory;
pub mod postgres;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // absent for externally provisioned accounts
    pub email_verified: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields for creating a user. The password arrives pre-hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
}

/// Partial update of a user record; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
}

/// Persisted refresh token. Keyed by the token string itself.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }
}

/// New refresh token row; `created_at` is filled by the store.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
}

/// Role names assignable to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CUSTOMER" => Some(Role::Customer),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Identity providers a user account can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provider {
    Local,
    Google,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Local => "LOCAL",
            Provider::Google => "GOOGLE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOCAL" => Some(Provider::Local),
            "GOOGLE" => Some(Provider::Google),
            _ => None,
        }
    }
}

/// Provider account linked to a user.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub provider: Provider,
    pub provider_account_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Persistence seam for user records plus their role/account satellites.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Matches on email or, when given, phone. Used as the registration conflict probe.
    async fn find_by_email_or_phone(
        &self,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    /// Returns `AppError::Conflict` on a duplicate email or phone.
    async fn create(&self, new: NewUser) -> Result<User>;
    /// Returns `None` when no user has this id.
    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>>;
    /// Deletes the user and, through cascade, their tokens, roles and accounts.
    async fn delete(&self, id: Uuid) -> Result<Option<User>>;
    /// Creates the role on first use, then assigns it. Idempotent.
    async fn assign_role(&self, user_id: Uuid, role: Role) -> Result<()>;
    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>>;
    async fn link_account(
        &self,
        user_id: Uuid,
        provider: Provider,
        provider_account_id: &str,
    ) -> Result<()>;
    async fn accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>>;
}

/// Persistence seam for refresh tokens.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Atomically drops every token the user holds and inserts the new one.
    /// A token-string collision is an integrity violation, not a business error.
    async fn replace_for_user(&self, new: NewRefreshToken) -> Result<()>;
    /// Point lookup by exact token string. Never mutates.
    async fn find(&self, token: &str) -> Result<Option<RefreshTokenRecord>>;
    /// Returns the number of tokens removed.
    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64>;
}
