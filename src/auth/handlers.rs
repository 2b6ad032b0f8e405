use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, ProfileResponse, PublicUser, RefreshRequest,
            RegisterRequest, UpdateUserRequest,
        },
        extractors::AuthUser,
        service,
    },
    error::{AppError, Result},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/local/login", post(login))
        .route("/auth/refresh-token", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/profile", get(profile))
        .route("/auth/update-user", put(update_user))
        .route("/auth/delete-user", delete(delete_user))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    Ok(email)
}

fn check_password_len(password: &str) -> Result<()> {
    if password.len() < 8 {
        warn!("password too short");
        return Err(AppError::Validation("Password too short".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>)> {
    payload.email = normalize_email(&payload.email)?;
    if let Some(password) = &payload.password {
        check_password_len(password)?;
    }
    if let Some(phone) = payload.phone.take() {
        let phone = phone.trim().to_string();
        if !phone.is_empty() {
            payload.phone = Some(phone);
        }
    }

    let user = service::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    payload.email = normalize_email(&payload.email)?;

    let (user, tokens) = service::login(&state, &payload.email, &payload.password).await?;
    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>> {
    let (user, tokens) = service::refresh_session(&state, &payload.refresh_token).await?;
    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip(state))]
pub async fn profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>> {
    let (user, roles, accounts) = service::profile(&state, user_id).await?;
    Ok(Json(ProfileResponse {
        user: PublicUser::from(&user),
        roles,
        accounts,
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(mut payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>> {
    if let Some(email) = payload.email.take() {
        payload.email = Some(normalize_email(&email)?);
    }
    if let Some(password) = &payload.password {
        check_password_len(password)?;
    }
    if let Some(phone) = payload.phone.take() {
        let phone = phone.trim().to_string();
        if !phone.is_empty() {
            payload.phone = Some(phone);
        }
    }

    let user = service::update_user(&state, user_id, payload).await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>> {
    let user = service::delete_user(&state, user_id).await?;
    Ok(Json(PublicUser::from(&user)))
}
