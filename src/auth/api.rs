//! Authentication API Endpoints
//! Mission: Signup, login and account endpoints for the Conduit API

use crate::auth::{
    error::AuthError,
    jwt::IssuedToken,
    middleware::{optional_auth, require_auth},
    models::{
        AuthContext, Identity, LoginRequest, ProfileBody, ProfileResponse, SignupRequest,
        UpdateUserRequest, User, UserBody, UserEnvelope, UserResponse,
    },
    service::AuthService,
};
use crate::middleware::request_logging;
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

/// Full HTTP surface of the auth core.
pub fn router(service: AuthService) -> Router {
    let issuer = service.tokens().clone();

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/users", post(signup))
        .route("/api/users/login", post(login));

    let protected_routes = Router::new()
        .route("/api/user", get(get_current_user).put(update_user))
        .route_layer(from_fn_with_state(issuer.clone(), require_auth));

    // Served to everyone; logged-in callers are recognised when possible.
    let optional_routes = Router::new()
        .route("/api/profiles/:username", get(get_profile))
        .route_layer(from_fn_with_state(issuer, optional_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(optional_routes)
        .with_state(service)
        .layer(from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Response carrying the token both in the body and in `Authorization`.
fn with_token(status: StatusCode, user: &User, issued: &IssuedToken) -> Response {
    (
        status,
        [(AUTHORIZATION, format!("Token {}", issued.token))],
        Json(UserBody {
            user: UserResponse::from_user(user, issued.token.clone()),
        }),
    )
        .into_response()
}

/// Signup endpoint - POST /api/users
pub async fn signup(
    State(service): State<AuthService>,
    Json(payload): Json<UserEnvelope<SignupRequest>>,
) -> Result<Response, AuthError> {
    let (user, issued) = service.signup(payload.user).await?;
    Ok(with_token(StatusCode::CREATED, &user, &issued))
}

/// Login endpoint - POST /api/users/login
pub async fn login(
    State(service): State<AuthService>,
    Json(payload): Json<UserEnvelope<LoginRequest>>,
) -> Result<Response, AuthError> {
    let (user, issued) = service.login(payload.user).await?;
    Ok(with_token(StatusCode::CREATED, &user, &issued))
}

/// Current user - GET /api/user
pub async fn get_current_user(
    State(service): State<AuthService>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UserBody>, AuthError> {
    let user = service.current_user(&identity).await?;
    Ok(Json(UserBody {
        user: UserResponse::from_user(&user, identity.token),
    }))
}

/// Update user - PUT /api/user
///
/// Changing the password ends the calling session and answers with a new
/// token; any other change echoes the caller's token.
pub async fn update_user(
    State(service): State<AuthService>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<UserEnvelope<UpdateUserRequest>>,
) -> Result<Response, AuthError> {
    let (user, reissued) = service.update_user(&identity, payload.user).await?;
    match reissued {
        Some(issued) => Ok(with_token(StatusCode::OK, &user, &issued)),
        None => Ok(Json(UserBody {
            user: UserResponse::from_user(&user, identity.token),
        })
        .into_response()),
    }
}

/// Public profile - GET /api/profiles/:username
pub async fn get_profile(
    State(service): State<AuthService>,
    Path(username): Path<String>,
    Extension(viewer): Extension<AuthContext>,
) -> Result<Response, AuthError> {
    debug!(
        authenticated = viewer.is_authenticated(),
        "Profile lookup: {}", username
    );

    let Some(user) = service.profile(&username).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "errors": { "body": ["Profile not found"] } })),
        )
            .into_response());
    };

    Ok(Json(ProfileBody {
        profile: ProfileResponse {
            username: user.username,
            bio: user.bio,
            image: user.image,
        },
    })
    .into_response())
}
