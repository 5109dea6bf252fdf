pub mod user_context;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config;
use crate::pipeline::context::RequestMeta;

pub use user_context::{OrganizationMembership, Role, UserContext};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub session_id: Uuid,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: String, session_id: Uuid) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id,
            email,
            session_id,
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("JWT secret not configured")]
    MissingSecret,
}

/// Mint a signed bearer token for the given claims.
pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(JwtError::MissingSecret);
    }

    let key = EncodingKey::from_secret(secret.as_bytes());
    Ok(encode(&Header::default(), claims, &key)?)
}

/// Everything the identity layer hands the pipeline for one request.
/// `user_context` may be absent even for a cryptographically valid token
/// (user deactivated after issuance, session invalidated server-side).
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub user_id: Uuid,
    pub email: String,
    pub session_id: Uuid,
    pub access_token: String,
    pub user_context: Option<UserContext>,
}

/// External session/identity collaborator. Returns `None` when the request
/// carries no usable session; the pipeline never inspects token
/// cryptography itself.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    async fn validate(&self, request: &RequestMeta) -> Option<ValidatedSession>;
}

/// Supplier of hydrated `UserContext` snapshots keyed by user id. A
/// short-lived cache lives behind this trait, not in the pipeline.
#[async_trait]
pub trait UserContextStore: Send + Sync {
    async fn user_context(&self, user_id: Uuid) -> Option<UserContext>;
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryUserContextStore {
    contexts: RwLock<HashMap<Uuid, UserContext>>,
}

impl MemoryUserContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, ctx: UserContext) {
        self.contexts.write().await.insert(ctx.user_id, ctx);
    }
}

#[async_trait]
impl UserContextStore for MemoryUserContextStore {
    async fn user_context(&self, user_id: Uuid) -> Option<UserContext> {
        self.contexts.read().await.get(&user_id).cloned()
    }
}

/// Default `SessionValidator`: decodes the bearer JWT and hydrates the
/// user context through a `UserContextStore`.
pub struct JwtSessionValidator {
    store: Arc<dyn UserContextStore>,
}

impl JwtSessionValidator {
    pub fn new(store: Arc<dyn UserContextStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionValidator for JwtSessionValidator {
    async fn validate(&self, request: &RequestMeta) -> Option<ValidatedSession> {
        let token = request.bearer_token.as_deref()?;

        let claims = match validate_jwt(token) {
            Ok(claims) => claims,
            Err(reason) => {
                tracing::debug!("JWT validation failed: {}", reason);
                return None;
            }
        };

        let user_context = self.store.user_context(claims.sub).await;

        Some(ValidatedSession {
            user_id: claims.sub,
            email: claims.email,
            session_id: claims.session_id,
            access_token: token.to_string(),
            user_context,
        })
    }
}

/// Validate a JWT and extract its claims.
fn validate_jwt(token: &str) -> Result<Claims, String> {
    let secret = &config::config().security.jwt_secret;

    if secret.is_empty() {
        return Err("JWT secret not configured".to_string());
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| format!("Invalid JWT token: {}", e))?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_token(token: Option<String>) -> RequestMeta {
        let mut meta = RequestMeta::new("GET", "/api/patients", "127.0.0.1");
        meta.bearer_token = token;
        meta
    }

    async fn validator_with(contexts: Vec<UserContext>) -> JwtSessionValidator {
        let store = Arc::new(MemoryUserContextStore::new());
        for ctx in contexts {
            store.insert(ctx).await;
        }
        JwtSessionValidator::new(store)
    }

    #[tokio::test]
    async fn valid_token_round_trips_with_hydrated_context() {
        let user = UserContext::from_roles(Uuid::new_v4(), vec![]);
        let validator = validator_with(vec![user.clone()]).await;

        let claims = Claims::new(user.user_id, "clinician@example.com".into(), Uuid::new_v4());
        let token = generate_jwt(&claims).unwrap();

        let session = validator
            .validate(&request_with_token(Some(token.clone())))
            .await
            .expect("valid token must yield a session");

        assert_eq!(session.user_id, user.user_id);
        assert_eq!(session.email, "clinician@example.com");
        assert_eq!(session.session_id, claims.session_id);
        assert_eq!(session.access_token, token);
        assert_eq!(
            session.user_context.as_ref().map(|c| c.user_id),
            Some(user.user_id)
        );
    }

    #[tokio::test]
    async fn store_miss_yields_session_without_user_context() {
        let validator = validator_with(vec![]).await;

        let claims = Claims::new(Uuid::new_v4(), "gone@example.com".into(), Uuid::new_v4());
        let token = generate_jwt(&claims).unwrap();

        let session = validator
            .validate(&request_with_token(Some(token)))
            .await
            .expect("token is cryptographically valid");
        assert!(session.user_context.is_none());
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let validator = JwtSessionValidator::new(Arc::new(MemoryUserContextStore::new()));
        let session = validator
            .validate(&request_with_token(Some("not.a.jwt".into())))
            .await;
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let validator = JwtSessionValidator::new(Arc::new(MemoryUserContextStore::new()));

        let claims = Claims::new(Uuid::new_v4(), "user@example.com".into(), Uuid::new_v4());
        let mut token = generate_jwt(&claims).unwrap();
        token.push('x');

        assert!(validator.validate(&request_with_token(Some(token))).await.is_none());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let validator = JwtSessionValidator::new(Arc::new(MemoryUserContextStore::new()));

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "late@example.com".into(),
            session_id: Uuid::new_v4(),
            // Expired well past the default decode leeway.
            exp: now - 3600,
            iat: now - 7200,
        };
        let token = generate_jwt(&claims).unwrap();

        assert!(validator.validate(&request_with_token(Some(token))).await.is_none());
    }

    #[tokio::test]
    async fn missing_bearer_token_is_rejected() {
        let validator = JwtSessionValidator::new(Arc::new(MemoryUserContextStore::new()));
        assert!(validator.validate(&request_with_token(None)).await.is_none());
    }

    #[test]
    fn claims_expiry_follows_configured_horizon() {
        let claims = Claims::new(Uuid::new_v4(), "user@example.com".into(), Uuid::new_v4());
        let horizon = config::config().security.jwt_expiry_hours as i64 * 3600;
        assert_eq!(claims.exp - claims.iat, horizon);
    }
}
