mod admin;
mod stores;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use shelfmap_cache::{LocalCache, SystemClock};
use shelfmap_core::{AppConfig, NotificationDispatcher, ProximityPolicy};
use shelfmap_db::{PgOwnerDirectory, PgStoreRepository};
use shelfmap_lifecycle::{
    LifecycleError, LifecycleManager, LifecyclePorts, LifecycleSettings, StoreDirectory,
};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, request_id, require_admin, require_bearer_auth, AdminAuthState,
    AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub manager: Arc<LifecycleManager>,
    pub directory: Arc<StoreDirectory>,
}

impl AppState {
    /// Wire the lifecycle engine over Postgres and the given cache.
    #[must_use]
    pub fn new(
        pool: PgPool,
        cache: LocalCache,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: &AppConfig,
    ) -> Self {
        let repo = Arc::new(PgStoreRepository::new(pool.clone()));
        let ports = LifecyclePorts {
            stores: repo.clone(),
            outbox: repo.clone(),
            owners: Arc::new(PgOwnerDirectory::new(pool.clone())),
            dispatcher,
            clock: Arc::new(SystemClock),
        };
        let manager = LifecycleManager::new(
            ports,
            cache.clone(),
            LifecycleSettings::from_config(config),
        );
        let directory = StoreDirectory::new(
            repo,
            cache,
            Duration::from_secs(config.store_list_ttl_secs),
            ProximityPolicy::with_default_max_radius(config.default_max_radius_km),
        );
        Self {
            pool,
            manager: Arc::new(manager),
            directory: Arc::new(directory),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Translate an engine failure into the response envelope.
pub(super) fn map_lifecycle_error(request_id: String, error: &LifecycleError) -> ApiError {
    match error {
        LifecycleError::Validation(e) => {
            ApiError::new(request_id, "validation_error", e.to_string())
        }
        LifecycleError::NotFound(id) => {
            ApiError::new(request_id, "not_found", format!("store '{id}' not found"))
        }
        LifecycleError::NoOpTransition { .. }
        | LifecycleError::InvalidTransition { .. }
        | LifecycleError::Conflict { .. } => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        LifecycleError::Persistence(_) => {
            tracing::error!(error = %error, "store persistence failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/stores/nearby", get(stores::list_nearby_stores))
        .route(
            "/api/v1/stores",
            get(stores::list_stores).post(stores::create_store),
        )
        .route(
            "/api/v1/stores/{store_id}",
            get(stores::get_store)
                .patch(stores::update_store)
                .delete(stores::delete_store),
        )
        .route(
            "/api/v1/owners/{owner_id}/stores",
            get(stores::list_owner_stores),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

fn admin_router(admin: AdminAuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/admin/stores/{store_id}/status",
            put(admin::set_store_status),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(admin, require_admin)),
        )
}

pub fn build_app(
    state: AppState,
    auth: AuthState,
    admin: AdminAuthState,
    rate_limit: RateLimitState,
) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit.clone()))
        .merge(admin_router(admin, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match shelfmap_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}
