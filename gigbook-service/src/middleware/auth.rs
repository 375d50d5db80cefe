//! Caller authentication
//!
//! Handlers and middleware depend on the [`Authenticator`] trait, not on a
//! particular token format. [`StaticTokenAuthenticator`] maps opaque bearer
//! tokens to principals from a fixed table, which covers service-to-service
//! keys and tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject, e.g. `user:42` or `client:billing`
    pub sub: String,

    /// Roles granted to the caller
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Whether the subject is an end user (`user:` prefix)
    pub fn is_user(&self) -> bool {
        self.sub.starts_with("user:")
    }

    /// User id without the `user:` prefix
    pub fn user_id(&self) -> Option<&str> {
        self.sub.strip_prefix("user:")
    }
}

/// Establishes who is calling from the request headers
pub trait Authenticator: Send + Sync {
    /// Resolve the caller, or fail with [`Error::Unauthorized`]
    fn authenticate(&self, headers: &HeaderMap) -> impl Future<Output = Result<Principal>> + Send;
}

/// Extract the token from an `Authorization: Bearer <token>` header
///
/// The scheme is matched case-insensitively.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("Missing Authorization header".to_string()))?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or_else(|| Error::Unauthorized("Invalid Authorization header format".to_string()))?;

    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(Error::Unauthorized(
            "Invalid Authorization header format".to_string(),
        ));
    }

    Ok(token)
}

/// Authenticates opaque bearer tokens against a fixed table
///
/// Meant for service-to-service keys and tests, not for user credentials:
/// tokens are held in plain text and matched with an ordinary map lookup.
/// `Debug` output shows only how many tokens are configured.
#[derive(Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: Arc<HashMap<String, Principal>>,
}

impl std::fmt::Debug for StaticTokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenAuthenticator")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: HashMap<String, Principal>) -> Self {
        Self {
            tokens: Arc::new(tokens),
        }
    }

    /// Add a token, returning the extended table
    #[must_use]
    pub fn with_token(self, token: impl Into<String>, principal: Principal) -> Self {
        let mut tokens = Arc::unwrap_or_clone(self.tokens);
        tokens.insert(token.into(), principal);
        Self::new(tokens)
    }
}

impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal> {
        let token = extract_bearer_token(headers)?;
        self.tokens.get(token).cloned().ok_or_else(|| {
            tracing::debug!("Rejected unknown bearer token");
            Error::Unauthorized("Invalid token".to_string())
        })
    }
}

/// Middleware that authenticates the caller and stores the [`Principal`] in
/// the request extensions
pub async fn auth_middleware<A>(
    State(authenticator): State<Arc<A>>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, Error>
where
    A: Authenticator + 'static,
{
    let principal = authenticator.authenticate(request.headers()).await?;
    tracing::debug!(sub = %principal.sub, "Authenticated request");

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{HeaderValue, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    fn headers(authorization: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(authorization));
        headers
    }

    fn authenticator() -> StaticTokenAuthenticator {
        StaticTokenAuthenticator::default()
            .with_token("s3cret", Principal::new("user:42").with_role("host"))
            .with_token("svc-key", Principal::new("client:billing"))
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(&headers("Bearer abc")).unwrap(), "abc");
        assert_eq!(extract_bearer_token(&headers("bearer  abc ")).unwrap(), "abc");

        for bad in ["Basic dXNlcg==", "Bearer", "Bearer   ", "abc"] {
            let err = extract_bearer_token(&headers(bad)).unwrap_err();
            assert!(matches!(err, Error::Unauthorized(_)), "header {:?}", bad);
        }

        let err = extract_bearer_token(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_principal() {
        let principal = Principal::new("user:42").with_role("host");
        assert!(principal.is_user());
        assert_eq!(principal.user_id(), Some("42"));
        assert!(principal.has_role("host"));
        assert!(!principal.has_role("admin"));
        assert_eq!(Principal::new("client:billing").user_id(), None);
    }

    #[tokio::test]
    async fn test_static_tokens() {
        let auth = authenticator();

        let principal = auth.authenticate(&headers("Bearer s3cret")).await.unwrap();
        assert_eq!(principal.sub, "user:42");

        let err = auth.authenticate(&headers("Bearer nope")).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_debug_hides_tokens() {
        let rendered = format!("{:?}", authenticator());
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("svc-key"));
        assert!(rendered.contains("tokens: 2"));
    }

    async fn whoami(Extension(principal): Extension<Principal>) -> String {
        principal.sub
    }

    #[tokio::test]
    async fn test_middleware_injects_principal() {
        let app = Router::new()
            .route("/me", get(whoami))
            .layer(middleware::from_fn_with_state(
                Arc::new(authenticator()),
                auth_middleware::<StaticTokenAuthenticator>,
            ));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header(header::AUTHORIZATION, "Bearer svc-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"client:billing");

        let response = app
            .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
