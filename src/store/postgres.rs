use async_trait::async_trait;
use sqlx::{error::ErrorKind, PgPool};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::{
    Account, NewRefreshToken, NewUser, Provider, RefreshTokenRecord, RefreshTokenStore, Role, User,
    UserChanges, UserStore,
};

/// Postgres-backed implementation of both store seams.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if matches!(db.kind(), ErrorKind::UniqueViolation))
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email_or_phone(
        &self,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Option<User>> {
        // A NULL phone bind never matches, so this degrades to an email-only probe.
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, phone, password_hash, email_verified, created_at, updated_at
            FROM users
            WHERE email = $1 OR phone = $2
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(phone)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, phone, password_hash, email_verified, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, phone, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, phone, password_hash, email_verified, created_at, updated_at
            "#,
        )
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict
            } else {
                AppError::from(e)
            }
        })?;
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                phone = COALESCE($3, phone),
                password_hash = COALESCE($4, password_hash),
                updated_at = now()
            WHERE id = $1
            RETURNING id, email, phone, password_hash, email_verified, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&changes.email)
        .bind(&changes.phone)
        .bind(&changes.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict
            } else {
                AppError::from(e)
            }
        })?;
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            DELETE FROM users
            WHERE id = $1
            RETURNING id, email, phone, password_hash, email_verified, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn assign_role(&self, user_id: Uuid, role: Role) -> Result<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO roles (name)
            VALUES ($1)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;

        let (role_id,): (Uuid,) = sqlx::query_as(
            r#"
            SELECT id FROM roles WHERE name = $1
            "#,
        )
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO role_assignments (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT r.name
            FROM roles r
            JOIN role_assignments ra ON ra.role_id = r.id
            WHERE ra.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let mut roles = Vec::with_capacity(rows.len());
        for (name,) in rows {
            match Role::parse(&name) {
                Some(role) => roles.push(role),
                None => warn!(role = %name, user_id = %user_id, "unknown role name in store"),
            }
        }
        Ok(roles)
    }

    async fn link_account(
        &self,
        user_id: Uuid,
        provider: Provider,
        provider_account_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, provider, provider_account_id)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(provider.as_str())
        .bind(provider_account_id)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict
            } else {
                AppError::from(e)
            }
        })?;
        Ok(())
    }

    async fn accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>> {
        let rows: Vec<(String, String, OffsetDateTime)> = sqlx::query_as(
            r#"
            SELECT provider, provider_account_id, created_at
            FROM accounts
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for (provider, provider_account_id, created_at) in rows {
            match Provider::parse(&provider) {
                Some(provider) => accounts.push(Account {
                    provider,
                    provider_account_id,
                    created_at,
                }),
                None => warn!(provider = %provider, user_id = %user_id, "unknown provider in store"),
            }
        }
        Ok(accounts)
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    /// Delete-and-insert in one transaction so concurrent refreshes for the
    /// same user cannot leave two live tokens behind.
    async fn replace_for_user(&self, new: NewRefreshToken) -> Result<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM refresh_tokens WHERE user_id = $1
            "#,
        )
        .bind(new.user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&new.token)
        .bind(new.user_id)
        .bind(new.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Integrity(format!("refresh token collision for user {}", new.user_id))
            } else {
                AppError::from(e)
            }
        })?;
        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT token, user_id, expires_at, created_at
            FROM refresh_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }
}
