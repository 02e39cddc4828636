/// Authentication: password hashing, session tokens and request extractors
use crate::{
    context::AppContext,
    error::{AppError, AppResult},
    models::{PublicUser, User},
};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Hash a password with Argon2id
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored PHC hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 session tokens
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: ttl_secs as i64,
        }
    }

    /// Issue a token for a user
    pub fn issue(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.clone(),
            name: user.name.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Jwt(format!("Failed to sign token: {}", e)))
    }

    /// Validate a token and return its claims
    pub fn validate(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Signed-in user, loaded from the store on every request
#[derive(Debug, Clone)]
pub struct AuthUser(pub PublicUser);

async fn resolve_user(token: &str, state: &AppContext) -> AppResult<PublicUser> {
    let claims = state.sessions.validate(token)?;

    let user = state
        .repository
        .get_user(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Authentication("Account no longer exists".to_string()))?;

    Ok(PublicUser::from(&user))
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        Ok(AuthUser(resolve_user(&token, state).await?))
    }
}

/// Signed-in user if a valid token was sent
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<PublicUser>);

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_bearer_token(&parts.headers) else {
            return Ok(OptionalAuthUser(None));
        };

        match resolve_user(&token, state).await {
            Ok(user) => Ok(OptionalAuthUser(Some(user))),
            Err(AppError::Authentication(_)) => Ok(OptionalAuthUser(None)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "user_1_abc".to_string(),
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            password_hash: String::new(),
            profile_picture: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn test_token_roundtrip() {
        let keys = SessionKeys::new("0123456789abcdef0123456789abcdef", 3600);
        let token = keys.issue(&user()).unwrap();
        let claims = keys.validate(&token).unwrap();
        assert_eq!(claims.sub, "user_1_abc");

        let other = SessionKeys::new("fedcba9876543210fedcba9876543210", 3600);
        assert!(matches!(
            other.validate(&token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("authorization", "Bearer abc.def".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), Some("abc.def".to_string()));

        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
