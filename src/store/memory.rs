use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::{
    Account, NewRefreshToken, NewUser, Provider, RefreshTokenRecord, RefreshTokenStore, Role, User,
    UserChanges, UserStore,
};

/// In-memory implementation of both store seams, used by `AppState::fake()`.
///
/// Mirrors the Postgres schema's behavior: unique email/phone, token string as
/// primary key, and cascade of tokens/roles/accounts when a user is deleted.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    roles: HashMap<Uuid, Vec<Role>>,
    accounts: HashMap<Uuid, Vec<Account>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email_or_phone(
        &self,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Option<User>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .users
            .values()
            .find(|u| u.email == email || (phone.is_some() && u.phone.as_deref() == phone))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.users.get(&id).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User> {
        let mut inner = self.inner.lock().expect("store lock");
        let taken = inner.users.values().any(|u| {
            u.email == new.email
                || (new.phone.is_some() && u.phone.as_deref() == new.phone.as_deref())
        });
        if taken {
            return Err(AppError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            phone: new.phone,
            password_hash: new.password_hash,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>> {
        let mut inner = self.inner.lock().expect("store lock");
        let taken = inner.users.values().any(|u| {
            u.id != id
                && (changes.email.as_deref() == Some(u.email.as_str())
                    || (changes.phone.is_some() && u.phone.as_deref() == changes.phone.as_deref()))
        });
        if taken {
            return Err(AppError::Conflict);
        }
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(phone) = changes.phone {
            user.phone = Some(phone);
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = Some(hash);
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<User>> {
        let mut inner = self.inner.lock().expect("store lock");
        let removed = inner.users.remove(&id);
        if removed.is_some() {
            // same cascade the foreign keys give the Postgres store
            inner.refresh_tokens.retain(|_, r| r.user_id != id);
            inner.roles.remove(&id);
            inner.accounts.remove(&id);
        }
        Ok(removed)
    }

    async fn assign_role(&self, user_id: Uuid, role: Role) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock");
        let roles = inner.roles.entry(user_id).or_default();
        if !roles.contains(&role) {
            roles.push(role);
        }
        Ok(())
    }

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>> {
        let inner = self.inner.lock().expect("store lock");
        let mut roles = inner.roles.get(&user_id).cloned().unwrap_or_default();
        roles.sort_by_key(|r| r.as_str());
        Ok(roles)
    }

    async fn link_account(
        &self,
        user_id: Uuid,
        provider: Provider,
        provider_account_id: &str,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock");
        let taken = inner.accounts.values().flatten().any(|a| {
            a.provider == provider && a.provider_account_id == provider_account_id
        });
        if taken {
            return Err(AppError::Conflict);
        }
        inner.accounts.entry(user_id).or_default().push(Account {
            provider,
            provider_account_id: provider_account_id.to_string(),
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.accounts.get(&user_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn replace_for_user(&self, new: NewRefreshToken) -> Result<()> {
        // One guard across remove + insert keeps the swap atomic.
        let mut inner = self.inner.lock().expect("store lock");
        inner.refresh_tokens.retain(|_, r| r.user_id != new.user_id);
        if inner.refresh_tokens.contains_key(&new.token) {
            return Err(AppError::Integrity(format!(
                "refresh token collision for user {}",
                new.user_id
            )));
        }
        inner.refresh_tokens.insert(
            new.token.clone(),
            RefreshTokenRecord {
                token: new.token,
                user_id: new.user_id,
                expires_at: new.expires_at,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.refresh_tokens.get(token).cloned())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.lock().expect("store lock");
        let before = inner.refresh_tokens.len();
        inner.refresh_tokens.retain(|_, r| r.user_id != user_id);
        Ok((before - inner.refresh_tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn new_user(email: &str, phone: Option<&str>) -> NewUser {
        NewUser {
            email: email.into(),
            phone: phone.map(Into::into),
            password_hash: Some("$argon2id$fake".into()),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email_and_phone() {
        let store = MemoryStore::new();
        store
            .create(new_user("a@example.com", Some("+1555000")))
            .await
            .expect("first create");

        let dup_email = store.create(new_user("a@example.com", None)).await;
        assert!(matches!(dup_email, Err(AppError::Conflict)));

        let dup_phone = store
            .create(new_user("b@example.com", Some("+1555000")))
            .await;
        assert!(matches!(dup_phone, Err(AppError::Conflict)));
    }

    #[tokio::test]
    async fn replace_for_user_keeps_a_single_live_token() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let expires_at = OffsetDateTime::now_utc() + Duration::days(7);

        for token in ["tok-1", "tok-2", "tok-3"] {
            store
                .replace_for_user(NewRefreshToken {
                    token: token.into(),
                    user_id,
                    expires_at,
                })
                .await
                .expect("replace");
        }

        assert!(store.find("tok-1").await.expect("find").is_none());
        assert!(store.find("tok-2").await.expect("find").is_none());
        assert!(store.find("tok-3").await.expect("find").is_some());
        assert_eq!(store.delete_for_user(user_id).await.expect("delete"), 1);
    }

    #[tokio::test]
    async fn token_collision_across_users_is_an_integrity_error() {
        let store = MemoryStore::new();
        let expires_at = OffsetDateTime::now_utc() + Duration::days(7);
        store
            .replace_for_user(NewRefreshToken {
                token: "same-token".into(),
                user_id: Uuid::new_v4(),
                expires_at,
            })
            .await
            .expect("first insert");

        let clash = store
            .replace_for_user(NewRefreshToken {
                token: "same-token".into(),
                user_id: Uuid::new_v4(),
                expires_at,
            })
            .await;
        assert!(matches!(clash, Err(AppError::Integrity(_))));
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_tokens_roles_and_accounts() {
        let store = MemoryStore::new();
        let user = store
            .create(new_user("c@example.com", None))
            .await
            .expect("create");
        store
            .assign_role(user.id, Role::Customer)
            .await
            .expect("assign role");
        store
            .link_account(user.id, Provider::Local, "c@example.com")
            .await
            .expect("link account");
        store
            .replace_for_user(NewRefreshToken {
                token: "cascade-tok".into(),
                user_id: user.id,
                expires_at: OffsetDateTime::now_utc() + Duration::days(7),
            })
            .await
            .expect("token");

        store.delete(user.id).await.expect("delete");

        assert!(store.find("cascade-tok").await.expect("find").is_none());
        assert!(store.roles_for_user(user.id).await.expect("roles").is_empty());
        assert!(store
            .accounts_for_user(user.id)
            .await
            .expect("accounts")
            .is_empty());
    }
}
