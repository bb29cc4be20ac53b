//! Authentication Middleware
//! Mission: Turn the `Authorization: Token ...` header into an explicit identity
//!
//! | token        | verify | required  | optional      |
//! |--------------|--------|-----------|---------------|
//! | absent       | -      | rejected  | anonymous     |
//! | present      | ok     | identity  | identity      |
//! | present      | fails  | rejected  | anonymous     |

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::jwt::TokenIssuer;
use crate::auth::models::{AuthContext, Identity};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

const TOKEN_SCHEME: &str = "Token";

/// Bearer value from `Authorization: Token <value>`. Other schemes count as
/// no token at all.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme == TOKEN_SCHEME && !token.is_empty()).then_some(token)
}

/// Required-mode resolution.
pub async fn authenticate(issuer: &TokenIssuer, token: Option<&str>) -> AuthResult<Identity> {
    let token = token.ok_or(AuthError::Unauthenticated("missing token"))?;
    let claims = issuer.verify(token).await?;
    Ok(Identity {
        user_id: claims.id,
        username: claims.username,
        sign_id: claims.sign_id,
        token: token.to_string(),
    })
}

/// Optional-mode resolution. Never fails.
pub async fn resolve_optional(issuer: &TokenIssuer, token: Option<&str>) -> AuthContext {
    if token.is_none() {
        return AuthContext::Anonymous;
    }
    match authenticate(issuer, token).await {
        Ok(identity) => AuthContext::Authenticated(identity),
        Err(e) if e.is_infrastructure() => {
            warn!("Optional auth degraded to anonymous: {}", e);
            AuthContext::Anonymous
        }
        Err(e) => {
            debug!("Optional auth ignored token: {}", e);
            AuthContext::Anonymous
        }
    }
}

/// Rejects the request unless it carries a valid, unrevoked token. On
/// success the handler receives an [`Identity`] extension.
pub async fn require_auth(
    State(issuer): State<Arc<TokenIssuer>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    // Owned copy: the request body is not Sync, so no borrow of it may live
    // across the await.
    let token = extract_token(req.headers()).map(str::to_owned);
    let identity = authenticate(&issuer, token.as_deref()).await?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Never rejects. The handler receives an [`AuthContext`] extension.
pub async fn optional_auth(
    State(issuer): State<Arc<TokenIssuer>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = extract_token(req.headers()).map(str::to_owned);
    let ctx = resolve_optional(&issuer, token.as_deref()).await;
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::revocation::RevocationTracker;
    use crate::db::Database;
    use axum::{
        body::Body,
        http::{HeaderValue, Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Extension, Router,
    };
    use chrono::Duration;
    use tower::ServiceExt;

    fn issuer_with_ttl(ttl: Duration) -> Arc<TokenIssuer> {
        let db = Database::open_in_memory().unwrap();
        Arc::new(TokenIssuer::new(
            "gateway-secret",
            ttl,
            Arc::new(RevocationTracker::sqlite(db)),
        ))
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_token_scheme() {
        assert_eq!(extract_token(&headers_with("Token abc.def")), Some("abc.def"));
        assert_eq!(extract_token(&headers_with("Bearer abc.def")), None);
        assert_eq!(extract_token(&headers_with("Token ")), None);
        assert_eq!(extract_token(&headers_with("Token")), None);
        assert_eq!(extract_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_required_rejects_missing_expired_revoked_alike() {
        let issuer = issuer_with_ttl(Duration::hours(1));
        let expired_issuer = issuer_with_ttl(Duration::seconds(-60));

        let revoked = issuer.issue(1, "alice").await.unwrap();
        issuer
            .tracker()
            .invalidate(&revoked.claims.sign_id)
            .await
            .unwrap();
        let expired = expired_issuer.issue(1, "alice").await.unwrap();

        let missing = authenticate(&issuer, None).await.unwrap_err();
        let revoked = authenticate(&issuer, Some(&revoked.token)).await.unwrap_err();
        let expired = authenticate(&expired_issuer, Some(&expired.token))
            .await
            .unwrap_err();

        for err in [missing, revoked, expired] {
            assert!(matches!(err, AuthError::Unauthenticated(_)));
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_optional_degrades_to_anonymous() {
        let issuer = issuer_with_ttl(Duration::hours(1));
        let issued = issuer.issue(1, "alice").await.unwrap();

        assert_eq!(resolve_optional(&issuer, None).await, AuthContext::Anonymous);
        assert_eq!(
            resolve_optional(&issuer, Some("garbage")).await,
            AuthContext::Anonymous
        );

        let ctx = resolve_optional(&issuer, Some(&issued.token)).await;
        assert_eq!(ctx.identity().unwrap().sign_id, issued.claims.sign_id);

        issuer
            .tracker()
            .invalidate(&issued.claims.sign_id)
            .await
            .unwrap();
        assert_eq!(
            resolve_optional(&issuer, Some(&issued.token)).await,
            AuthContext::Anonymous
        );
    }

    fn gated_router(issuer: Arc<TokenIssuer>) -> Router {
        let required = Router::new()
            .route(
                "/required",
                get(|Extension(identity): Extension<Identity>| async move { identity.username }),
            )
            .route_layer(from_fn_with_state(issuer.clone(), require_auth));
        let optional = Router::new()
            .route(
                "/optional",
                get(|Extension(ctx): Extension<AuthContext>| async move {
                    match ctx {
                        AuthContext::Anonymous => "anonymous".to_string(),
                        AuthContext::Authenticated(id) => id.username,
                    }
                }),
            )
            .route_layer(from_fn_with_state(issuer, optional_auth));
        required.merge(optional)
    }

    async fn call(router: &Router, path: &str, token: Option<&str>) -> (StatusCode, String) {
        let mut builder = HttpRequest::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Token {token}"));
        }
        let response = router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_middleware_outcomes() {
        let issuer = issuer_with_ttl(Duration::hours(1));
        let router = gated_router(issuer.clone());
        let issued = issuer.issue(3, "carol").await.unwrap();

        assert_eq!(
            call(&router, "/required", Some(&issued.token)).await,
            (StatusCode::OK, "carol".to_string())
        );
        assert_eq!(
            call(&router, "/optional", Some(&issued.token)).await,
            (StatusCode::OK, "carol".to_string())
        );

        let (status, _) = call(&router, "/required", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            call(&router, "/optional", None).await,
            (StatusCode::OK, "anonymous".to_string())
        );

        issuer
            .tracker()
            .invalidate(&issued.claims.sign_id)
            .await
            .unwrap();
        let (status, _) = call(&router, "/required", Some(&issued.token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            call(&router, "/optional", Some(&issued.token)).await,
            (StatusCode::OK, "anonymous".to_string())
        );
    }
}
