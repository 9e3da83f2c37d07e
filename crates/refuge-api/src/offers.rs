use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use refuge_db::queries::OfferFilter;
use refuge_types::api::{Claims, CreateOfferRequest, UpdateOfferRequest};
use refuge_types::models::{Category, Offer, OfferStatus, Role};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferQuery {
    pub status: Option<OfferStatus>,
    pub category: Option<Category>,
    pub user_id: Option<Uuid>,
}

pub async fn list_offers(
    State(state): State<AppState>,
    Query(query): Query<OfferQuery>,
) -> ApiResult<Json<Vec<Offer>>> {
    let filter = OfferFilter {
        user_id: query.user_id,
        status: query.status,
        category: query.category,
    };
    let offers = state.blocking(move |db| db.list_offers(&filter)).await?;
    Ok(Json(offers))
}

pub async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Offer>> {
    state
        .blocking(move |db| db.get_offer(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Offer"))
}

pub async fn create_offer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(mut req): Json<CreateOfferRequest>,
) -> ApiResult<impl IntoResponse> {
    if !claims.role.can_post_offers() {
        return Err(ApiError::forbidden("Only volunteers and NGOs can post offers"));
    }
    req.title = req.title.trim().to_string();
    if req.title.is_empty() {
        return Err(ApiError::validation("Title is required"));
    }

    let user_id = claims.sub;
    let offer = state.blocking(move |db| db.create_offer(user_id, &req)).await?;
    info!("{} posted offer {} ({})", claims.name, offer.id, offer.category);
    Ok((StatusCode::CREATED, Json(offer)))
}

pub async fn update_offer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOfferRequest>,
) -> ApiResult<Json<Offer>> {
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::validation("Title cannot be empty"));
    }
    let current = ensure_owner(&state, &claims, id).await?;
    if let Some(to) = req.status.filter(|to| !current.status.owner_can_move_to(*to)) {
        return Err(ApiError::Conflict(format!(
            "Cannot move an offer from {} to {}",
            current.status, to
        )));
    }

    let expected = current.status;
    state
        .blocking(move |db| db.update_offer(id, expected, &req))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::Conflict("Offer was updated by someone else".into()))
}

pub async fn delete_offer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    ensure_owner(&state, &claims, id).await?;
    state.blocking(move |db| db.delete_offer(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_owner(state: &AppState, claims: &Claims, id: Uuid) -> ApiResult<Offer> {
    let offer = state
        .blocking(move |db| db.get_offer(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Offer"))?;
    if offer.user_id != claims.sub && claims.role != Role::Admin {
        return Err(ApiError::forbidden("Not your offer"));
    }
    Ok(offer)
}
