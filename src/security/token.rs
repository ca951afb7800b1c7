//! Signed access and refresh tokens.
//!
//! Both kinds carry the same payload and are HS256-signed with distinct
//! secrets. A `typ` claim is also checked so that an access token cannot be
//! replayed as a refresh token even if an operator misconfigures equal secrets.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::domain::{Role, UserId};

const ACCESS_TYPE: &str = "access";
const REFRESH_TYPE: &str = "refresh";

/// Payload embedded in both token kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub user_id: UserId,
    pub role: Role,
    pub session_id: String,
    pub generation: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    sid: String,
    #[serde(rename = "gen")]
    generation: i32,
    typ: String,
    iat: i64,
    exp: i64,
}

/// Verification never says why a token was rejected.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token invalid")]
    Invalid,

    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenCodec {
    access: Keys,
    refresh: Keys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl TokenCodec {
    #[must_use]
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            access: Keys::from_secret(access_secret),
            refresh: Keys::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
            validation,
        }
    }

    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.access_token_secret,
            &config.refresh_token_secret,
            Duration::minutes(config.access_token_ttl_minutes),
            Duration::days(config.refresh_token_ttl_days),
        )
    }

    #[must_use]
    pub const fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub const fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        sign(payload, ACCESS_TYPE, self.access_ttl, &self.access.encoding)
    }

    pub fn issue_refresh(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        sign(payload, REFRESH_TYPE, self.refresh_ttl, &self.refresh.encoding)
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenPayload, TokenError> {
        self.verify(token, ACCESS_TYPE, &self.access.decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenPayload, TokenError> {
        self.verify(token, REFRESH_TYPE, &self.refresh.decoding)
    }

    fn verify(&self, token: &str, typ: &str, key: &DecodingKey) -> Result<TokenPayload, TokenError> {
        let data =
            decode::<Claims>(token, key, &self.validation).map_err(|_| TokenError::Invalid)?;
        let claims = data.claims;

        if claims.typ != typ {
            return Err(TokenError::Invalid);
        }

        let user_id = claims
            .sub
            .parse::<i32>()
            .ok()
            .filter(|id| *id >= 0)
            .ok_or(TokenError::Invalid)?;

        Ok(TokenPayload {
            user_id: UserId::new(user_id),
            role: claims.role,
            session_id: claims.sid,
            generation: claims.generation,
        })
    }
}

fn sign(
    payload: &TokenPayload,
    typ: &str,
    ttl: Duration,
    key: &EncodingKey,
) -> Result<String, TokenError> {
    let now = Utc::now();
    let claims = Claims {
        sub: payload.user_id.to_string(),
        role: payload.role,
        sid: payload.session_id.clone(),
        generation: payload.generation,
        typ: typ.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    Ok(encode(&Header::new(Algorithm::HS256), &claims, key)?)
}
