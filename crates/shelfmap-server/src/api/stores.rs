//! Store read and owner write handlers.
//!
//! - `GET    /api/v1/stores/nearby`             approved stores near a point
//! - `GET    /api/v1/stores`                    all stores, optionally by status
//! - `POST   /api/v1/stores`                    register a store (always pending)
//! - `GET    /api/v1/stores/{id}`               one store
//! - `PATCH  /api/v1/stores/{id}`               owner edit
//! - `DELETE /api/v1/stores/{id}`               remove a store
//! - `GET    /api/v1/owners/{owner_id}/stores`  an owner's stores

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use shelfmap_core::{
    Coordinate, NewStore, ProximityQuery, Store, StorePatch, StoreStatus, ViewRegion,
};

use crate::middleware::RequestId;

use super::{map_lifecycle_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct NearbyQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct NearbyStore {
    #[serde(flatten)]
    store: Store,
    /// Absent when the request carried no origin.
    distance_km: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(super) struct NearbyResponse {
    stores: Vec<NearbyStore>,
    region: ViewRegion,
    effective_radius_km: Option<f64>,
}

fn parse_origin(req_id: &str, query: &NearbyQuery) -> Result<Option<ProximityQuery>, ApiError> {
    match (query.lat, query.lng) {
        (Some(latitude), Some(longitude)) => ProximityQuery::new(
            Coordinate {
                latitude,
                longitude,
            },
            query.radius_km,
        )
        .map(Some)
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string())),
        (None, None) => Ok(None),
        _ => Err(ApiError::new(
            req_id,
            "validation_error",
            "lat and lng must be given together",
        )),
    }
}

fn parse_status_filter(req_id: &str, raw: Option<&str>) -> Result<Option<StoreStatus>, ApiError> {
    raw.map(str::parse::<StoreStatus>)
        .transpose()
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))
}

pub(super) async fn list_nearby_stores(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<ApiResponse<NearbyResponse>>, ApiError> {
    let origin = parse_origin(&req_id.0, &query)?;

    let result = state
        .directory
        .approved_nearby(origin.as_ref())
        .await
        .map_err(|e| map_lifecycle_error(req_id.0.clone(), &e))?;

    let stores = result
        .visible
        .into_iter()
        .map(|nearby| NearbyStore {
            store: nearby.item,
            distance_km: nearby.distance_km,
        })
        .collect();

    Ok(Json(ApiResponse {
        data: NearbyResponse {
            stores,
            region: result.region,
            effective_radius_km: result.effective_radius_km,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_stores(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApiResponse<Vec<Store>>>, ApiError> {
    let status = parse_status_filter(&req_id.0, query.status.as_deref())?;

    let data = state
        .directory
        .stores_by_status(status)
        .await
        .map_err(|e| map_lifecycle_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_owner_stores(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(owner_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Store>>>, ApiError> {
    let data = state
        .directory
        .stores_by_owner(&owner_id)
        .await
        .map_err(|e| map_lifecycle_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_store(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(store_id): Path<String>,
) -> Result<Json<ApiResponse<Store>>, ApiError> {
    let data = state
        .directory
        .store(&store_id)
        .await
        .map_err(|e| map_lifecycle_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn create_store(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<NewStore>,
) -> Result<(StatusCode, Json<ApiResponse<Store>>), ApiError> {
    let data = state
        .manager
        .create_store(body)
        .await
        .map_err(|e| map_lifecycle_error(req_id.0.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data,
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

pub(super) async fn update_store(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(store_id): Path<String>,
    Json(body): Json<StorePatch>,
) -> Result<Json<ApiResponse<Store>>, ApiError> {
    let data = state
        .manager
        .edit_store(&store_id, body)
        .await
        .map_err(|e| map_lifecycle_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn delete_store(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(store_id): Path<String>,
) -> Result<Json<ApiResponse<Store>>, ApiError> {
    let data = state
        .manager
        .delete_store(&store_id)
        .await
        .map_err(|e| map_lifecycle_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
