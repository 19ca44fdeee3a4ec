use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{Duration, Utc};
use gatepass_core::identity::IdentityProvider;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::state::{AppState, AuthConfig};

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub fn issue_token(auth: &AuthConfig, sub: &str, role: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
}

/// Resolves HS256 bearer tokens signed with the service secret.
pub struct JwtIdentityProvider {
    secret: String,
}

impl JwtIdentityProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve(&self, credential: &str) -> Option<String> {
        match decode::<Claims>(
            credential,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(data) => Some(data.claims.sub),
            Err(e) => {
                tracing::debug!("Rejected bearer token: {}", e);
                None
            }
        }
    }
}

// ============================================================================
// Identity Extractor
// ============================================================================

/// Caller identity, if a valid bearer credential was presented.
///
/// Never rejects on its own: operations that need an identity report
/// `NotAuthenticated` themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub Option<String>);

impl Identity {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));

        let Some(credential) = credential else {
            return Ok(Identity(None));
        };
        Ok(Identity(state.identity.resolve(credential).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AuthConfig {
        AuthConfig { secret: "test-secret".to_string(), expiration: 3600 }
    }

    #[tokio::test]
    async fn test_issued_token_resolves_to_subject() {
        let token = issue_token(&auth(), "guest-42", "GUEST").unwrap();
        let provider = JwtIdentityProvider::new("test-secret");

        assert_eq!(provider.resolve(&token).await, Some("guest-42".to_string()));
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let token = issue_token(&auth(), "guest-42", "GUEST").unwrap();
        let provider = JwtIdentityProvider::new("other-secret");

        assert_eq!(provider.resolve(&token).await, None);
        assert_eq!(provider.resolve("not-a-jwt").await, None);
    }
}
