//! Token issuance and password hashing.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{Duration, Utc};
use crumb_core::User;
use jsonwebtoken::{encode, EncodingKey, Header};

use crate::{error::AppError, middleware::auth::Claims, state::AuthConfig};

pub fn claims_for(user: &User, auth: &AuthConfig) -> Claims {
    Claims {
        sub: user.id,
        username: user.username.clone(),
        role: user.role.as_str().to_owned(),
        exp: (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize,
    }
}

pub fn encode_token(claims: &Claims, auth: &AuthConfig) -> Result<String, AppError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::InternalServerError(format!("Failed to hash password: {}", e)))?;

    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::decode_claims;
    use crumb_core::Role;
    use uuid::Uuid;

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("s3cret-loaf").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret-loaf", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret-loaf", "not-a-hash"));
    }

    #[test]
    fn test_token_carries_identity() {
        let auth = AuthConfig {
            secret: "test-secret".to_string(),
            expiration: 3600,
        };
        let user = User {
            id: Uuid::new_v4(),
            username: "baker".to_string(),
            password_hash: String::new(),
            role: Role::Admin,
            name: None,
            phone: None,
            address: None,
            created_at: Utc::now(),
        };

        let claims = claims_for(&user, &auth);
        let token = encode_token(&claims, &auth).unwrap();
        let decoded = decode_claims(&token, &auth.secret).unwrap();

        assert_eq!(decoded.sub, user.id);
        assert_eq!(decoded.role, "Admin");
        assert!(decode_claims(&token, "other-secret").is_err());
    }
}
