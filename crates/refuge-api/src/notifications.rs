use axum::{
    Extension, Json,
    extract::State,
};

use refuge_types::api::{Claims, CountResponse, NotificationIdsRequest, UpdateNotificationsRequest};
use refuge_types::events::GatewayEvent;
use refuge_types::models::Notification;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Notification>>> {
    let recipient = claims.sub;
    let notifications = state.blocking(move |db| db.list_notifications(recipient)).await?;
    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<CountResponse>> {
    let recipient = claims.sub;
    let count = state
        .blocking(move |db| db.unread_notification_count(recipient))
        .await?;
    Ok(Json(CountResponse { count }))
}

pub async fn update_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateNotificationsRequest>,
) -> ApiResult<Json<CountResponse>> {
    if req.read.is_none() && req.action_taken.is_none() {
        return Err(ApiError::validation("Nothing to update"));
    }

    let recipient = claims.sub;
    let read = req.read;
    let count = state
        .blocking(move |db| {
            db.update_notifications(recipient, &req.ids, req.read, req.action_taken)
        })
        .await?;

    if count > 0 && read.is_some() {
        announce_read(&state, recipient).await;
    }
    Ok(Json(CountResponse {
        count: count as i64,
    }))
}

pub async fn delete_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NotificationIdsRequest>,
) -> ApiResult<Json<CountResponse>> {
    let recipient = claims.sub;
    let count = state
        .blocking(move |db| db.delete_notifications(recipient, &req.ids))
        .await?;

    if count > 0 {
        announce_read(&state, recipient).await;
    }
    Ok(Json(CountResponse {
        count: count as i64,
    }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<CountResponse>> {
    let recipient = claims.sub;
    let count = state
        .blocking(move |db| db.mark_all_notifications_read(recipient))
        .await?;

    if count > 0 {
        announce_read(&state, recipient).await;
    }
    Ok(Json(CountResponse {
        count: count as i64,
    }))
}

/// Lets the recipient's other sessions refresh their badge.
async fn announce_read(state: &AppState, recipient: uuid::Uuid) {
    state
        .dispatcher
        .send_to_user(recipient, GatewayEvent::NotificationsRead { recipient_id: recipient })
        .await;
}
