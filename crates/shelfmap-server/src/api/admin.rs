//! Admin review: `PUT /api/v1/admin/stores/{id}/status`.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use shelfmap_core::{Actor, StoreStatus};
use shelfmap_lifecycle::TransitionOutcome;

use crate::middleware::RequestId;

use super::{map_lifecycle_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct SetStatusRequest {
    pub status: String,
    /// Revision the reviewer looked at; a stale value is a conflict.
    pub expected_revision: Option<i64>,
}

/// Apply a review decision. Notification problems come back as `warnings`
/// on a successful response.
pub(super) async fn set_store_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(actor): Extension<Actor>,
    Path(store_id): Path<String>,
    Json(body): Json<SetStatusRequest>,
) -> Result<Json<ApiResponse<TransitionOutcome>>, ApiError> {
    let status: StoreStatus = body
        .status
        .parse()
        .map_err(|e: shelfmap_core::CoreError| {
            ApiError::new(&req_id.0, "validation_error", e.to_string())
        })?;

    let outcome = state
        .manager
        .set_status_by_id(&store_id, status, &actor, body.expected_revision)
        .await
        .map_err(|e| map_lifecycle_error(req_id.0.clone(), &e))?;

    for warning in &outcome.warnings {
        tracing::warn!(store_id = %store_id, %warning, "status changed with warning");
    }

    Ok(Json(ApiResponse {
        data: outcome,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::test_support::test_state;
    use crate::api::{build_app, default_rate_limit_state};
    use crate::middleware::{AdminAuthState, AuthState};

    fn app(pool: sqlx::PgPool) -> Router {
        let auth = AuthState::from_keys("owner-key", false).expect("auth");
        let admin = AdminAuthState::from_pairs("maria:admin-key", false).expect("admin");
        build_app(test_state(pool), auth, admin, default_rate_limit_state())
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => builder.body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json parse")
        };
        (status, json)
    }

    async fn register(app: &Router, name: &str, lat: f64) -> Value {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/stores",
            "owner-key",
            Some(json!({
                "name": name,
                "address": "Magsaysay Ave",
                "description": null,
                "location": {"latitude": lat, "longitude": 123.88},
                "owner_id": "owner-1",
                "contact_email": "owner@example.com",
                "image_ref": null
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn approval_makes_store_visible_nearby(pool: sqlx::PgPool) {
        let app = app(pool.clone());
        let store = register(&app, "Bayside Mart", 12.6858).await;
        assert_eq!(store["status"], "pending");
        let id = store["id"].as_str().expect("id");

        let (_, before) = send(&app, "GET", "/api/v1/stores/nearby", "owner-key", None).await;
        assert!(before["data"]["stores"].as_array().expect("stores").is_empty());

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/v1/admin/stores/{id}/status"),
            "admin-key",
            Some(json!({"status": "approved", "expected_revision": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["store"]["status"], "approved");
        assert_eq!(body["data"]["store"]["reviewed_by"], "maria");
        assert!(body["data"]["warnings"].as_array().expect("warnings").is_empty());

        let (_, after) = send(
            &app,
            "GET",
            "/api/v1/stores/nearby?lat=12.6858&lng=123.88&radius_km=3",
            "owner-key",
            None,
        )
        .await;
        let stores = after["data"]["stores"].as_array().expect("stores");
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0]["id"], id);
        assert!(stores[0]["distance_km"].as_f64().expect("distance") < 0.01);

        let sent: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_outbox WHERE status = 'sent'",
        )
        .fetch_one(&pool)
        .await
        .expect("count");
        assert_eq!(sent, 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn repeating_a_status_is_a_conflict(pool: sqlx::PgPool) {
        let app = app(pool);
        let store = register(&app, "Bayside Mart", 12.6858).await;
        let uri = format!(
            "/api/v1/admin/stores/{}/status",
            store["id"].as_str().expect("id")
        );

        let (first, _) = send(
            &app,
            "PUT",
            &uri,
            "admin-key",
            Some(json!({"status": "rejected"})),
        )
        .await;
        assert_eq!(first, StatusCode::OK);

        let (second, body) = send(
            &app,
            "PUT",
            &uri,
            "admin-key",
            Some(json!({"status": "rejected"})),
        )
        .await;
        assert_eq!(second, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn stale_revision_is_a_conflict(pool: sqlx::PgPool) {
        let app = app(pool);
        let store = register(&app, "Bayside Mart", 12.6858).await;
        let id = store["id"].as_str().expect("id");

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/api/v1/stores/{id}"),
            "owner-key",
            Some(json!({"name": "Bayside Mini Mart"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/v1/admin/stores/{id}/status"),
            "admin-key",
            Some(json!({"status": "approved", "expected_revision": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn owner_key_cannot_review(pool: sqlx::PgPool) {
        let app = app(pool);
        let store = register(&app, "Bayside Mart", 12.6858).await;
        let uri = format!(
            "/api/v1/admin/stores/{}/status",
            store["id"].as_str().expect("id")
        );

        let (status, body) = send(
            &app,
            "PUT",
            &uri,
            "owner-key",
            Some(json!({"status": "approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "forbidden");

        let (status, _) = send(&app, "PUT", &uri, "", Some(json!({"status": "approved"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn unknown_status_and_store_are_reported(pool: sqlx::PgPool) {
        let app = app(pool);
        let store = register(&app, "Bayside Mart", 12.6858).await;
        let id = store["id"].as_str().expect("id");

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/v1/admin/stores/{id}/status"),
            "admin-key",
            Some(json!({"status": "archived"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");

        let (status, _) = send(
            &app,
            "PUT",
            "/api/v1/admin/stores/not-a-store/status",
            "admin-key",
            Some(json!({"status": "approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn nearby_keeps_only_stores_inside_radius(pool: sqlx::PgPool) {
        let app = app(pool);
        for (name, lat) in [("Near", 12.6858), ("Far", 12.7182)] {
            let store = register(&app, name, lat).await;
            let uri = format!(
                "/api/v1/admin/stores/{}/status",
                store["id"].as_str().expect("id")
            );
            let (status, _) = send(
                &app,
                "PUT",
                &uri,
                "admin-key",
                Some(json!({"status": "approved"})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, body) = send(
            &app,
            "GET",
            "/api/v1/stores/nearby?lat=12.6858&lng=123.88&radius_km=3",
            "owner-key",
            None,
        )
        .await;
        let names: Vec<_> = body["data"]["stores"]
            .as_array()
            .expect("stores")
            .iter()
            .map(|s| s["name"].as_str().expect("name").to_string())
            .collect();
        assert_eq!(names, vec!["Near".to_string()]);
        assert_eq!(body["data"]["effective_radius_km"], 3.0);

        let (_, unfiltered) = send(&app, "GET", "/api/v1/stores/nearby", "owner-key", None).await;
        assert_eq!(unfiltered["data"]["stores"].as_array().expect("stores").len(), 2);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn uppercase_store_id_sees_the_new_status(pool: sqlx::PgPool) {
        let app = app(pool);
        let store = register(&app, "Bayside Mart", 12.6858).await;
        let id = store["id"].as_str().expect("id").to_string();
        let upper = format!("/api/v1/stores/{}", id.to_uppercase());

        let (status, before) = send(&app, "GET", &upper, "owner-key", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(before["data"]["status"], "pending");

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/v1/admin/stores/{id}/status"),
            "admin-key",
            Some(json!({"status": "approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, after) = send(&app, "GET", &upper, "owner-key", None).await;
        assert_eq!(after["data"]["status"], "approved");
        assert_eq!(after["data"]["id"], id.as_str());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn invalid_registration_is_rejected(pool: sqlx::PgPool) {
        let app = app(pool);
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/stores",
            "owner-key",
            Some(json!({
                "name": "   ",
                "address": "Magsaysay Ave",
                "description": null,
                "location": {"latitude": 12.6, "longitude": 123.8},
                "owner_id": "owner-1",
                "contact_email": null,
                "image_ref": null
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }
}
