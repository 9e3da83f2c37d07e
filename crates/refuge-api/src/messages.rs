use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use refuge_gateway::deliver_message;
use refuge_types::api::{Claims, CountResponse, SendMessageRequest};
use refuge_types::events::GatewayEvent;
use refuge_types::models::{Conversation, Message, Role};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: `created_at` of the oldest message already loaded.
    pub before: Option<DateTime<Utc>>,
}

fn default_limit() -> u32 {
    50
}

const MAX_LIMIT: u32 = 200;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let viewer = claims.sub;
    let conversations = state.blocking(move |db| db.list_conversations(viewer)).await?;
    Ok(Json(conversations))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    let viewer = claims.sub;
    let conversation = state
        .blocking(move |db| {
            if !db.is_participant(id, viewer)? {
                return Ok(None);
            }
            db.get_conversation(id, viewer)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation"))?;
    Ok(Json(conversation))
}

/// Opens the one-to-one conversation with user `other`, creating it on
/// first contact.
pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(other): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if other == claims.sub {
        return Err(ApiError::validation("Cannot start a conversation with yourself"));
    }

    let recipient = state
        .blocking(move |db| db.get_user_by_id(other))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    if claims.role == Role::Refugee && recipient.role == Role::Refugee {
        return Err(ApiError::forbidden("Refugees cannot message other refugees"));
    }

    let me = claims.sub;
    let (conversation, created) = state
        .blocking(move |db| db.get_or_create_conversation(me, other))
        .await?;

    if created {
        debug!("{} opened conversation {} with {}", claims.name, conversation.id, other);
    }
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(conversation)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let viewer = claims.sub;
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let before = query.before;

    let messages = state
        .blocking(move |db| {
            if !db.is_participant(id, viewer)? {
                return Ok(None);
            }
            db.get_messages(id, limit, before).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation"))?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = deliver_message(
        state.db.clone(),
        &state.dispatcher,
        claims.sub,
        req.conversation_id,
        &req.content,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Marks the other participants' messages as read and tells every
/// participant about it.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CountResponse>> {
    let reader = claims.sub;
    let (count, participants) = state
        .blocking(move |db| {
            if !db.is_participant(id, reader)? {
                return Ok(None);
            }
            let count = db.mark_conversation_read(id, reader)?;
            Ok(Some((count, db.participant_ids(id)?)))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation"))?;

    if count > 0 {
        state
            .dispatcher
            .send_to_users(
                &participants,
                GatewayEvent::MessagesRead {
                    conversation_id: id,
                    reader_id: reader,
                },
            )
            .await;
    }

    Ok(Json(CountResponse {
        count: count as i64,
    }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<CountResponse>> {
    let user = claims.sub;
    let count = state.blocking(move |db| db.unread_message_count(user)).await?;
    Ok(Json(CountResponse { count }))
}
