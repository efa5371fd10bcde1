use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use crumb_core::{AuthUser, CoreError, NewUser, Role, User};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{claims_for, encode_token, hash_password, verify_password},
    error::AppError,
    extract::JsonBody,
    middleware::auth::AUTH_COOKIE,
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub userid: Uuid,
    pub role: String,
    pub username: String,
    pub exp: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: UserInfo,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub userid: Uuid,
    pub username: String,
    pub role: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            userid: user.id,
            username: user.username,
            role: user.role.as_str().to_string(),
            name: user.name,
            phone: user.phone,
            address: user.address,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub phone_number: Option<String>,
    pub place: Option<String>,
    pub name: Option<String>,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/user/register", post(register))
        .route("/user/login", post(login))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/user/me", get(me))
        .route("/user/settings", put(update_settings))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /user/register
async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(body): JsonBody<Credentials>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AppError> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(AppError::ValidationError("username and password are required".to_string()));
    }

    let password_hash = hash_password(&body.password)?;
    let mut tx = state.store.begin().await?;
    let user = tx
        .insert_user(&NewUser {
            username: username.to_string(),
            password_hash,
            role: Role::Member,
        })
        .await
        .map_err(|e| match CoreError::from(e) {
            CoreError::Conflict(_) => AppError::ConflictError("username already exists".to_string()),
            other => AppError::from(other),
        })?;
    tx.commit().await?;

    info!("Registered user {} ({})", user.username, user.id);
    let (jar, response) = signed_in(&state, jar, &user, "registration successful")?;
    Ok((StatusCode::CREATED, jar, response))
}

/// POST /user/login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(body): JsonBody<Credentials>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let invalid = || AppError::AuthenticationError("invalid username or password".to_string());

    let mut tx = state.store.begin().await?;
    let user = tx
        .find_user_by_username(body.username.trim())
        .await?
        .ok_or_else(invalid)?;
    tx.commit().await?;

    if !verify_password(&body.password, &user.password_hash) {
        return Err(invalid());
    }

    signed_in(&state, jar, &user, "login successful")
}

fn signed_in(
    state: &AppState,
    jar: CookieJar,
    user: &User,
    message: &str,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let claims = claims_for(user, &state.auth);
    let token = encode_token(&claims, &state.auth)?;

    let cookie = Cookie::build((AUTH_COOKIE, token.clone()))
        .http_only(true)
        .path("/");

    Ok((
        jar.add(cookie),
        Json(AuthResponse {
            message: message.to_string(),
            user: UserInfo {
                userid: user.id,
                role: claims.role,
                username: claims.username,
                exp: claims.exp,
            },
            token,
        }),
    ))
}

/// GET /user/me
async fn me(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<ProfileResponse>, AppError> {
    let mut tx = state.store.begin().await?;
    let user = tx
        .find_user(caller.id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("user not found".to_string()))?;
    tx.commit().await?;
    Ok(Json(user.into()))
}

/// PUT /user/settings
async fn update_settings(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    JsonBody(body): JsonBody<SettingsRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    if body.phone_number.is_none() && body.place.is_none() && body.name.is_none() {
        return Err(AppError::ValidationError("no settings provided".to_string()));
    }
    if let Some(phone) = &body.phone_number {
        if phone.len() != 10 || !phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::ValidationError("phone number must be 10 digits".to_string()));
        }
    }
    let place = non_blank(body.place.as_deref(), "place")?;
    let name = non_blank(body.name.as_deref(), "name")?;

    let mut tx = state.store.begin().await?;
    let mut user = tx
        .find_user(caller.id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("user not found".to_string()))?;

    if let Some(phone) = body.phone_number {
        user.phone = Some(phone);
    }
    if let Some(place) = place {
        user.address = Some(place);
    }
    if let Some(name) = name {
        user.name = Some(name);
    }
    tx.update_user_profile(&user).await?;
    tx.commit().await?;

    Ok(Json(user.into()))
}

fn non_blank(value: Option<&str>, field: &str) -> Result<Option<String>, AppError> {
    match value.map(str::trim) {
        Some("") => Err(AppError::ValidationError(format!("{} must not be empty", field))),
        Some(v) => Ok(Some(v.to_string())),
        None => Ok(None),
    }
}
