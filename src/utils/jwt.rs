// src/utils/jwt.rs

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::user::SessionUser};

/// JWT Claims structure, as issued by the backend's auth service.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's role (e.g., 'learner', 'author', 'admin').
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp as i64, 0)
    }
}

/// Reads the claims of a bearer token without checking its signature.
///
/// The client has no signing secret; the server re-validates every request, so
/// the claims here only drive display and client-side ownership checks.
pub fn read_claims(token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AppError::AuthError(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

/// Derives the session user from a bearer token.
pub fn session_user(token: &str) -> Result<SessionUser, AppError> {
    let claims = read_claims(token)?;

    let id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::AuthError(format!("Token subject is not a user id: {}", claims.sub)))?;

    Ok(SessionUser {
        id,
        username: claims.username.unwrap_or_else(|| format!("user-{}", id)),
        avatar_url: claims.avatar_url,
        role: claims.role,
    })
}
