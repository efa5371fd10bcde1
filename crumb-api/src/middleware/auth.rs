use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use crumb_core::{AuthUser, Role};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Cookie set on login/register carrying the JWT.
pub const AUTH_COOKIE: &str = "Authorization";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: String,
    pub exp: usize,
}

/// Bearer header first, then the auth cookie. Either may carry the
/// `Bearer ` prefix.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            CookieJar::from_headers(headers)
                .get(AUTH_COOKIE)
                .map(|c| c.value().to_string())
        })?;

    let token = raw.strip_prefix("Bearer ").unwrap_or(&raw).trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::AuthenticationError("invalid or expired token".to_string()))
}

// ============================================================================
// Authentication Middleware
// ============================================================================

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers())
        .ok_or_else(|| AppError::AuthenticationError("missing token".to_string()))?;

    let claims = decode_claims(&token, &state.auth.secret)?;
    let role = Role::parse(&claims.role)
        .ok_or_else(|| AppError::AuthenticationError("invalid or expired token".to_string()))?;

    req.extensions_mut().insert(AuthUser { id: claims.sub, role });
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

// ============================================================================
// Admin Middleware (runs after auth_middleware)
// ============================================================================

pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = req
        .extensions()
        .get::<AuthUser>()
        .map(AuthUser::is_admin)
        .unwrap_or(false);

    if !is_admin {
        return Err(AppError::AuthorizationError("admin access required".to_string()));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_header_or_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc"));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; Authorization=xyz"));
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz"));

        assert!(extract_token(&HeaderMap::new()).is_none());
    }
}
