use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use refuge_db::queries::LocationFilter;
use refuge_types::api::{Claims, CreateLocationRequest, UpdateLocationRequest};
use refuge_types::models::Location;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationQuery {
    #[serde(rename = "type")]
    pub location_type: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

pub async fn list_locations(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> ApiResult<Json<Vec<Location>>> {
    let filter = LocationFilter {
        location_type: query.location_type,
        include_inactive: query.include_inactive,
    };
    let locations = state.blocking(move |db| db.list_locations(&filter)).await?;
    Ok(Json(locations))
}

pub async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Location>> {
    state
        .blocking(move |db| db.get_location(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Location"))
}

pub async fn create_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateLocationRequest>,
) -> ApiResult<impl IntoResponse> {
    require_publisher(&claims)?;
    if req.name.trim().is_empty() || req.address.trim().is_empty() {
        return Err(ApiError::validation("Name and address are required"));
    }
    check_coordinates(Some(req.lat), Some(req.lng))?;

    let created_by = claims.sub;
    let location = state.blocking(move |db| db.create_location(created_by, &req)).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLocationRequest>,
) -> ApiResult<Json<Location>> {
    require_publisher(&claims)?;
    check_coordinates(req.lat, req.lng)?;
    state
        .blocking(move |db| db.update_location(id, &req))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Location"))
}

pub async fn delete_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_publisher(&claims)?;
    if state.blocking(move |db| db.delete_location(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Location"))
    }
}

fn require_publisher(claims: &Claims) -> ApiResult<()> {
    if claims.role.can_publish() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only NGOs can manage the resource directory"))
    }
}

fn check_coordinates(lat: Option<f64>, lng: Option<f64>) -> ApiResult<()> {
    if lat.is_some_and(|v| !(-90.0..=90.0).contains(&v)) {
        return Err(ApiError::validation("Latitude must be between -90 and 90"));
    }
    if lng.is_some_and(|v| !(-180.0..=180.0).contains(&v)) {
        return Err(ApiError::validation("Longitude must be between -180 and 180"));
    }
    Ok(())
}
