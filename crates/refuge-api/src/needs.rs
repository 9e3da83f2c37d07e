use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use refuge_db::queries::NeedFilter;
use refuge_types::api::{Claims, CreateNeedRequest, UpdateNeedRequest};
use refuge_types::models::{Category, Need, NeedStatus, Role};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedQuery {
    pub status: Option<NeedStatus>,
    pub category: Option<Category>,
    pub user_id: Option<Uuid>,
}

pub async fn list_needs(
    State(state): State<AppState>,
    Query(query): Query<NeedQuery>,
) -> ApiResult<Json<Vec<Need>>> {
    let filter = NeedFilter {
        user_id: query.user_id,
        status: query.status,
        category: query.category,
    };
    let needs = state.blocking(move |db| db.list_needs(&filter)).await?;
    Ok(Json(needs))
}

pub async fn get_need(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Need>> {
    state
        .blocking(move |db| db.get_need(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Need"))
}

pub async fn create_need(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(mut req): Json<CreateNeedRequest>,
) -> ApiResult<impl IntoResponse> {
    if !claims.role.can_post_needs() {
        return Err(ApiError::forbidden("Only refugees can post needs"));
    }
    req.title = req.title.trim().to_string();
    if req.title.is_empty() {
        return Err(ApiError::validation("Title is required"));
    }

    let user_id = claims.sub;
    let need = state.blocking(move |db| db.create_need(user_id, &req)).await?;
    info!("{} posted need {} ({})", claims.name, need.id, need.category);
    Ok((StatusCode::CREATED, Json(need)))
}

pub async fn update_need(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateNeedRequest>,
) -> ApiResult<Json<Need>> {
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::validation("Title cannot be empty"));
    }
    let current = ensure_owner(&state, &claims, id).await?;
    if let Some(to) = req.status.filter(|to| !current.status.owner_can_move_to(*to)) {
        return Err(ApiError::Conflict(format!(
            "Cannot move a need from {} to {}",
            current.status, to
        )));
    }

    let expected = current.status;
    state
        .blocking(move |db| db.update_need(id, expected, &req))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::Conflict("Need was updated by someone else".into()))
}

pub async fn delete_need(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    ensure_owner(&state, &claims, id).await?;
    state.blocking(move |db| db.delete_need(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_owner(state: &AppState, claims: &Claims, id: Uuid) -> ApiResult<Need> {
    let need = state
        .blocking(move |db| db.get_need(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Need"))?;
    if need.user_id != claims.sub && claims.role != Role::Admin {
        return Err(ApiError::forbidden("Not your need"));
    }
    Ok(need)
}
