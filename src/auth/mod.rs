pub mod password;

pub use password::PasswordManager;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::database::models::User;
use crate::error::ApiError;
use crate::http::Request;

/// Fixed request header carrying the signed credential. A request without
/// it is anonymous.
pub const TOKEN_HEADER: &str = "JWT";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user: ClaimUser,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimUser {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token generation failed: {0}")]
    TokenGeneration(#[from] jsonwebtoken::errors::Error),
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        ApiError::Internal(error.into())
    }
}

/// Issues and verifies the bearer credentials tying a request to a
/// principal.
pub struct TokenAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenAuth {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Sign a credential for `user`, valid for the configured time to
    /// live.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let claims = Claims {
            user: ClaimUser {
                id: user.id,
                login: user.login.clone(),
                name: user.name.clone(),
            },
            exp: (Utc::now() + self.ttl).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// The principal id carried by the request's credential, or `None`
    /// when the header is absent or the token fails verification in any
    /// way (malformed, tampered, expired, wrong claim shape). Never an
    /// error: an unusable credential just means an anonymous request.
    pub fn principal(&self, request: &Request) -> Option<i64> {
        let token = request.header(TOKEN_HEADER)?;
        let data = decode::<Value>(token, &self.decoding, &self.validation).ok()?;
        data.claims.get("user")?.get("id")?.as_i64()
    }
}
