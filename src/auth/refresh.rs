use axum::extract::FromRef;
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    state::AppState,
    store::{NewRefreshToken, User},
};

use super::{claims::IdentityClaim, jwt::JwtKeys};

/// Mints a refresh token for `identity` and makes it the user's only live
/// one. Earlier tokens for the user are dropped in the same store call, so
/// a crash cannot leave two usable tokens behind.
#[instrument(skip(st, identity), fields(user_id = %identity.subject))]
pub async fn issue(st: &AppState, identity: &IdentityClaim) -> Result<String> {
    let keys = JwtKeys::from_ref(st);
    let token = keys.sign_refresh(identity)?;
    let expires_at =
        OffsetDateTime::now_utc() + Duration::seconds(keys.refresh_ttl.as_secs() as i64);
    st.refresh_tokens
        .replace_for_user(NewRefreshToken {
            token: token.clone(),
            user_id: identity.subject,
            expires_at,
        })
        .await?;
    info!(user_id = %identity.subject, "refresh token rotated");
    Ok(token)
}

/// Resolves a presented refresh token to its owner.
///
/// Lookup is by exact token string against the store, so a token that was
/// rotated away or revoked stops validating even while its signature and
/// expiry are still good.
#[instrument(skip_all)]
pub async fn validate(st: &AppState, token: &str) -> Result<User> {
    let record = st
        .refresh_tokens
        .find(token)
        .await?
        .ok_or(AppError::RefreshTokenNotFound)?;
    if record.is_expired() {
        warn!(user_id = %record.user_id, "presented refresh token is expired");
        return Err(AppError::RefreshTokenExpired);
    }
    st.users
        .find_by_id(record.user_id)
        .await?
        .ok_or(AppError::RefreshTokenNotFound)
}

/// Drops every stored refresh token for the user, for example after a
/// password change. Returns how many were revoked.
pub async fn revoke_all(st: &AppState, user_id: Uuid) -> Result<u64> {
    let revoked = st.refresh_tokens.delete_for_user(user_id).await?;
    info!(user_id = %user_id, revoked, "refresh tokens revoked");
    Ok(revoked)
}
