//! Caller authentication.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Issuer stamped into and required on every access token.
pub const TOKEN_ISSUER: &str = "video-ingest";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// Resolves a caller token to a principal identifier.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<Uuid, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 JWT validation against a shared secret.
#[derive(Clone)]
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn validate(&self, token: &str) -> Result<Uuid, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AuthError::InvalidToken("subject is not a user id".into()))
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: Option<&str>) -> Option<&str> {
    let value = header_value?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret";

    fn token(sub: &str, issuer: &str, expires_in: Duration, secret: &str) -> String {
        let now = Utc::now();
        let claims = Claims {
            iss: issuer.into(),
            sub: sub.into(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_subject() {
        let user = Uuid::new_v4();
        let auth = JwtAuthenticator::new(SECRET);
        let jwt = token(&user.to_string(), TOKEN_ISSUER, Duration::hours(1), SECRET);
        assert_eq!(auth.validate(&jwt).await.unwrap(), user);
    }

    #[tokio::test]
    async fn rejects_bad_tokens() {
        let user = Uuid::new_v4().to_string();
        let auth = JwtAuthenticator::new(SECRET);

        let wrong_secret = token(&user, TOKEN_ISSUER, Duration::hours(1), "other");
        let expired = token(&user, TOKEN_ISSUER, Duration::hours(-2), SECRET);
        let wrong_issuer = token(&user, "someone-else", Duration::hours(1), SECRET);
        let not_uuid = token("alice", TOKEN_ISSUER, Duration::hours(1), SECRET);

        for jwt in [wrong_secret, expired, wrong_issuer, not_uuid, "garbage".into()] {
            assert!(matches!(
                auth.validate(&jwt).await,
                Err(AuthError::InvalidToken(_))
            ));
        }
        assert!(matches!(
            auth.validate("").await,
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(Some("bearer   abc ")), Some("abc"));
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(None), None);
    }
}
