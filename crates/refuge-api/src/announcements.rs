use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use refuge_db::queries::AnnouncementFilter;
use refuge_types::api::{
    Claims, CreateAnnouncementRequest, SubscribeRequest, UpdateAnnouncementRequest,
};
use refuge_types::events::GatewayEvent;
use refuge_types::models::{Announcement, Role};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct AnnouncementQuery {
    pub category: Option<String>,
    pub region: Option<String>,
}

pub async fn list_announcements(
    State(state): State<AppState>,
    Query(query): Query<AnnouncementQuery>,
) -> ApiResult<Json<Vec<Announcement>>> {
    let filter = AnnouncementFilter {
        category: query.category,
        region: query.region,
    };
    let announcements = state.blocking(move |db| db.list_announcements(&filter)).await?;
    Ok(Json(announcements))
}

pub async fn get_announcement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Announcement>> {
    state
        .blocking(move |db| db.get_announcement(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Announcement"))
}

pub async fn create_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(mut req): Json<CreateAnnouncementRequest>,
) -> ApiResult<impl IntoResponse> {
    if !claims.role.can_publish() {
        return Err(ApiError::forbidden("Only NGOs can publish announcements"));
    }
    req.title = req.title.trim().to_string();
    if req.title.is_empty() || req.content.trim().is_empty() {
        return Err(ApiError::validation("Title and content are required"));
    }

    let posted_by = claims.sub;
    let (announcement, subscribers) = state
        .blocking(move |db| {
            let a = db.create_announcement(posted_by, &req)?;
            let subscribers = db.subscriptions_matching(&a)?.len();
            Ok((a, subscribers))
        })
        .await?;

    info!("{} published announcement {}", claims.name, announcement.id);
    // Email delivery is handled outside this service.
    debug!("{} subscriptions match announcement {}", subscribers, announcement.id);

    state.dispatcher.broadcast(GatewayEvent::NewAnnouncement {
        announcement: announcement.clone(),
    });
    Ok((StatusCode::CREATED, Json(announcement)))
}

pub async fn update_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAnnouncementRequest>,
) -> ApiResult<Json<Announcement>> {
    ensure_poster(&state, &claims, id).await?;
    state
        .blocking(move |db| db.update_announcement(id, &req))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Announcement"))
}

pub async fn delete_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    ensure_poster(&state, &claims, id).await?;
    state.blocking(move |db| db.delete_announcement(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<impl IntoResponse> {
    if !req.email.contains('@') {
        return Err(ApiError::validation("A valid email is required"));
    }
    let subscription = state.blocking(move |db| db.subscribe(&req)).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<StatusCode> {
    if state.blocking(move |db| db.unsubscribe(&email)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Subscription"))
    }
}

async fn ensure_poster(state: &AppState, claims: &Claims, id: Uuid) -> ApiResult<()> {
    let a = state
        .blocking(move |db| db.get_announcement(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Announcement"))?;
    if a.posted_by_id != claims.sub && claims.role != Role::Admin {
        return Err(ApiError::forbidden("Not your announcement"));
    }
    Ok(())
}
