use axum::extract::FromRef;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    events,
    state::AppState,
    store::{Account, NewUser, Provider, Role, User, UserChanges},
};

use super::{
    claims::IdentityClaim,
    dto::{RegisterRequest, TokenPair, UpdateUserRequest},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    refresh,
};

/// Creates the user, gives them the default role, links the local provider
/// account and announces the registration. Tokens are not minted here; the
/// client logs in as a second step.
#[instrument(skip(st, req), fields(email = %req.email))]
pub async fn register(st: &AppState, req: RegisterRequest) -> Result<User> {
    if let Some(existing) = st
        .users
        .find_by_email_or_phone(&req.email, req.phone.as_deref())
        .await?
    {
        warn!(user_id = %existing.id, "email or phone already registered");
        return Err(AppError::Conflict);
    }

    let password_hash = match &req.password {
        Some(plain) => Some(hash_password(plain)?),
        None => None,
    };

    let user = st
        .users
        .create(NewUser {
            email: req.email,
            phone: req.phone,
            password_hash,
        })
        .await?;

    st.users.assign_role(user.id, Role::Customer).await?;
    st.users
        .link_account(user.id, Provider::Local, &user.email)
        .await?;

    st.events.emit(
        events::USER_REGISTERED,
        serde_json::json!({ "id": user.id, "email": user.email }),
    );
    info!(user_id = %user.id, "user registered");
    Ok(user)
}

/// Uniform failure: an unknown email and a wrong password both come back as
/// `InvalidCredentials`, so callers cannot probe which emails exist.
pub async fn validate_credentials(st: &AppState, email: &str, password: &str) -> Result<User> {
    let user = st
        .users
        .find_by_email_or_phone(email, None)
        .await?
        .ok_or(AppError::InvalidCredentials)?;
    if !verify_password(password, user.password_hash.as_deref()) {
        warn!(user_id = %user.id, "password mismatch");
        return Err(AppError::InvalidCredentials);
    }
    Ok(user)
}

#[instrument(skip(st, password))]
pub async fn login(st: &AppState, email: &str, password: &str) -> Result<(User, TokenPair)> {
    let user = validate_credentials(st, email, password).await?;
    let tokens = mint_pair(st, &user).await?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, tokens))
}

/// Exchanges a live refresh token for a fresh pair. The presented token is
/// consumed by the rotation, so it cannot be replayed.
#[instrument(skip_all)]
pub async fn refresh_session(st: &AppState, token: &str) -> Result<(User, TokenPair)> {
    let user = refresh::validate(st, token).await?;
    let tokens = mint_pair(st, &user).await?;
    info!(user_id = %user.id, "session refreshed");
    Ok((user, tokens))
}

async fn mint_pair(st: &AppState, user: &User) -> Result<TokenPair> {
    let identity = IdentityClaim::from(user);
    let keys = JwtKeys::from_ref(st);
    let access_token = keys.sign_access(&identity)?;
    let refresh_token = refresh::issue(st, &identity).await?;
    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

pub async fn get_user(st: &AppState, id: Uuid) -> Result<User> {
    st.users.find_by_id(id).await?.ok_or(AppError::UserNotFound)
}

pub async fn profile(st: &AppState, id: Uuid) -> Result<(User, Vec<Role>, Vec<Account>)> {
    let user = get_user(st, id).await?;
    let roles = st.users.roles_for_user(id).await?;
    let accounts = st.users.accounts_for_user(id).await?;
    Ok((user, roles, accounts))
}

#[instrument(skip(st, req))]
pub async fn update_user(st: &AppState, id: Uuid, req: UpdateUserRequest) -> Result<User> {
    let password_hash = match &req.password {
        Some(plain) => Some(hash_password(plain)?),
        None => None,
    };
    let user = st
        .users
        .update(
            id,
            UserChanges {
                email: req.email,
                phone: req.phone,
                password_hash,
            },
        )
        .await?
        .ok_or(AppError::UserNotFound)?;

    st.events.emit(
        events::USER_UPDATED,
        serde_json::json!({ "id": user.id, "email": user.email }),
    );
    info!(user_id = %user.id, "user updated");
    Ok(user)
}

#[instrument(skip(st))]
pub async fn delete_user(st: &AppState, id: Uuid) -> Result<User> {
    let user = st.users.delete(id).await?.ok_or(AppError::UserNotFound)?;
    st.events.emit(
        events::USER_DELETED,
        serde_json::json!({ "id": user.id, "email": user.email }),
    );
    info!(user_id = %user.id, "user deleted");
    Ok(user)
}
