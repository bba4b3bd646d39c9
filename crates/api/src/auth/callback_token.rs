//! Signed callback tokens.
//!
//! Each task's callback URL embeds an HS256-signed JWT carrying the task
//! kind. Workers are anonymous: holding a valid token for a kind is what
//! authorises a worker to claim and report on tasks of that kind.

use chrono::Duration;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use spotline_core::dispatch::DEFAULT_CALLBACK_TOKEN_DAYS;
use uuid::Uuid;

/// Claims embedded in every callback token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CallbackClaims {
    /// Task kind the bearer may claim.
    pub kind: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier (UUID v4) for audit.
    pub jti: String,
}

/// Configuration for callback token signing and validation.
#[derive(Debug, Clone)]
pub struct CallbackTokenConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Token lifetime in days (default: 7).
    pub expiry_days: i64,
}

impl CallbackTokenConfig {
    /// Load token configuration from environment variables.
    ///
    /// | Env Var               | Required | Default |
    /// |-----------------------|----------|---------|
    /// | `CALLBACK_SECRET`     | **yes**  | --      |
    /// | `CALLBACK_TOKEN_DAYS` | no       | `7`     |
    ///
    /// # Panics
    ///
    /// Panics if `CALLBACK_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let secret = std::env::var("CALLBACK_SECRET")
            .expect("CALLBACK_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "CALLBACK_SECRET must not be empty");

        let expiry_days: i64 = std::env::var("CALLBACK_TOKEN_DAYS")
            .unwrap_or_else(|_| DEFAULT_CALLBACK_TOKEN_DAYS.to_string())
            .parse()
            .expect("CALLBACK_TOKEN_DAYS must be a valid i64");

        Self {
            secret,
            expiry_days,
        }
    }
}

/// Sign a callback token for tasks of `kind`.
pub fn sign(kind: &str, config: &CallbackTokenConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = CallbackClaims {
        kind: kind.to_string(),
        exp: (now + Duration::days(config.expiry_days)).timestamp(),
        iat: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate a callback token and return its claims.
///
/// Rejects bad signatures and expired tokens.
pub fn verify(
    token: &str,
    config: &CallbackTokenConfig,
) -> Result<CallbackClaims, jsonwebtoken::errors::Error> {
    let token_data = decode::<CallbackClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(), // HS256, validates exp
    )?;
    Ok(token_data.claims)
}

/// Callback URL for a token: `{base}/callback/{token}`.
pub fn callback_url(public_base_url: &str, token: &str) -> String {
    format!("{}/callback/{token}", public_base_url.trim_end_matches('/'))
}
