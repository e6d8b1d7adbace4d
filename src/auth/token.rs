//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs. Every token carries a unique `jti` so a single
//! token can be revoked on logout without touching the user's other tokens.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::User;
use crate::error::{AppError, AuthError};

/// Format used for the human-readable expiry fields of the login response.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
    pub iss: String,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Informational only; nothing enforces it.
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    display_offset: FixedOffset,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Result<Self, AppError> {
        let display_offset = FixedOffset::east_opt(config.display_offset_minutes * 60)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "auth.display_offset_minutes out of range: {}",
                    config.display_offset_minutes
                ))
            })?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.leeway = config.leeway_secs;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::minutes(config.refresh_ttl_minutes),
            display_offset,
        })
    }

    pub fn issue(&self, user: &User, issued_at: DateTime<Utc>) -> Result<IssuedToken, AppError> {
        // JWT timestamps have second precision; truncate so exp - iat is exact.
        let issued_at = Utc
            .timestamp_opt(issued_at.timestamp(), 0)
            .single()
            .unwrap_or(issued_at);
        let expires_at = issued_at + self.access_ttl;
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))?;

        Ok(IssuedToken {
            token,
            token_id: claims.jti,
            issued_at,
            expires_at,
            refresh_expires_at: issued_at + self.refresh_ttl,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    pub fn display(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.display_offset)
            .format(DISPLAY_FORMAT)
            .to_string()
    }

    pub fn display_offset(&self) -> FixedOffset {
        self.display_offset
    }
}
