//! HTTP surface for the user store and profile actions.
//!
//! Endpoints:
//! - `GET  /api/v1/health`
//! - `GET|PUT|DELETE /api/v1/users/{user_id}`
//! - `GET  /api/v1/users?is_friend=true`
//! - `GET  /api/v1/users/{user_id}/friendship`
//! - `POST /api/v1/actions/save-profile`
//! - `POST /api/v1/actions/update-friendship`

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use liff_core::{FailureReason, PersistedUser, StoreError, UserRecord, UserRepository};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::actions::{
    self, ActionResult, FriendshipView, SaveUserProfileCommand, UpdateFriendshipCommand,
};

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn UserRepository>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self {
            repository,
            started_at: Instant::now(),
        }
    }
}

/// Build the router. An empty `cors_origins` allows any origin.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/v1/health", get(api_health))
        .route("/api/v1/users", get(api_users_by_friendship))
        .route(
            "/api/v1/users/{user_id}",
            get(api_get_user).put(api_put_user).delete(api_delete_user),
        )
        .route("/api/v1/users/{user_id}/friendship", get(api_user_friendship))
        .route("/api/v1/actions/save-profile", post(api_save_profile))
        .route("/api/v1/actions/update-friendship", post(api_update_friendship))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    layer.allow_origin(AllowOrigin::list(
        origins.iter().filter_map(|o| o.trim().parse().ok()),
    ))
}

// ── Errors ─────────────────────────────────────────────────────────────

struct ApiError(StatusCode, String);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Handlers ───────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

async fn api_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn api_get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<PersistedUser> {
    match actions::get_user_profile(state.repository.as_ref(), &user_id).await? {
        Some(user) => Ok(Json(user)),
        None => Err(ApiError(StatusCode::NOT_FOUND, format!("user {user_id} not found"))),
    }
}

async fn api_put_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(record): Json<UserRecord>,
) -> ApiResult<PersistedUser> {
    if record.user_id != user_id {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            "user_id in body does not match the path".to_string(),
        ));
    }
    let user = state.repository.save(&record).await?;
    tracing::debug!("upserted user {user_id}");
    Ok(Json(user))
}

async fn api_delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.repository.delete(&user_id).await? {
        tracing::info!("deleted user {user_id}");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError(StatusCode::NOT_FOUND, format!("user {user_id} not found")))
    }
}

#[derive(Deserialize)]
struct FriendshipFilter {
    is_friend: bool,
}

async fn api_users_by_friendship(
    State(state): State<AppState>,
    Query(filter): Query<FriendshipFilter>,
) -> ApiResult<Vec<PersistedUser>> {
    Ok(Json(state.repository.find_by_friendship(filter.is_friend).await?))
}

async fn api_user_friendship(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<FriendshipView> {
    match actions::get_user_friendship(state.repository.as_ref(), &user_id).await? {
        Some(view) => Ok(Json(view)),
        None => Err(ApiError(StatusCode::NOT_FOUND, format!("user {user_id} not found"))),
    }
}

async fn api_save_profile(
    State(state): State<AppState>,
    Json(command): Json<SaveUserProfileCommand>,
) -> (StatusCode, Json<ActionResult>) {
    let result = actions::save_user_profile(state.repository.as_ref(), command).await;
    (action_status(&result), Json(result))
}

async fn api_update_friendship(
    State(state): State<AppState>,
    Json(command): Json<UpdateFriendshipCommand>,
) -> (StatusCode, Json<ActionResult>) {
    let repo = state.repository.as_ref();
    let result = actions::update_user_friendship(repo, &command.user_id, command.is_friend).await;
    (action_status(&result), Json(result))
}

fn action_status(result: &ActionResult) -> StatusCode {
    match result.reason {
        None if result.success => StatusCode::OK,
        Some(FailureReason::NotFound) => StatusCode::NOT_FOUND,
        Some(FailureReason::Unavailable) => StatusCode::INTERNAL_SERVER_ERROR,
        Some(FailureReason::Invalid) | None => StatusCode::BAD_REQUEST,
    }
}
