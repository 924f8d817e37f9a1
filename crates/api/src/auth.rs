use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::Role;

pub const SESSION_COOKIE: &str = "cv_session";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_minutes: i64,
    /// Organizational email suffix required for invited accounts,
    /// e.g. "@example.com".
    pub invite_email_domain: String,
    /// How long an invitation / reset token stays redeemable.
    pub reset_ttl_hours: i64,
}

impl AuthConfig {
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.jwt_secret.as_bytes())
    }

    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.jwt_secret.as_bytes())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

/// Authenticated caller, resolved once per request from the session token
/// plus a directory lookup (the directory, not the token, is authoritative
/// for the role).
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub role: Role,
}

pub fn issue_token(
    user_id: Uuid,
    role: Role,
    config: &AuthConfig,
) -> jsonwebtoken::errors::Result<String> {
    let now = Utc::now();
    let exp = now
        .checked_add_signed(Duration::minutes(config.session_ttl_minutes))
        .unwrap_or(now)
        .timestamp() as usize;
    let claims = SessionClaims {
        sub: user_id,
        role: role.as_str().to_string(),
        exp,
        iat: now.timestamp() as usize,
    };
    jsonwebtoken::encode(&Header::default(), &claims, &config.encoding_key())
}

pub fn decode_token(
    token: &str,
    config: &AuthConfig,
) -> jsonwebtoken::errors::Result<SessionClaims> {
    jsonwebtoken::decode::<SessionClaims>(token, &config.decoding_key(), &Validation::default())
        .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            session_ttl_minutes: 15,
            invite_email_domain: "@example.com".into(),
            reset_ttl_hours: 48,
        }
    }

    #[test]
    fn tokens_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, Role::Admin, &config()).unwrap();
        let claims = decode_token(&token, &config()).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, "ADMIN");
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let token = issue_token(Uuid::new_v4(), Role::Basic, &config()).unwrap();
        let other = AuthConfig {
            jwt_secret: "other-secret".into(),
            ..config()
        };
        assert!(decode_token(&token, &other).is_err());
    }
}
