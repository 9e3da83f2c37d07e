use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use refuge_db::queries::{MatchOwners, NewNotification};
use refuge_gateway::delivery::notify;
use refuge_match::lifecycle::{MatchParties, authorize_response};
use refuge_types::api::{Claims, CreateMatchRequest, RespondMatchRequest};
use refuge_types::models::{Match, MatchStatus, NeedStatus, NotificationType, OfferStatus};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

fn parties(m: &Match, owners: MatchOwners) -> MatchParties {
    MatchParties {
        initiated_by: m.initiated_by,
        responded_by: m.responded_by,
        need_owner: owners.need_owner,
        offer_owner: owners.offer_owner,
    }
}

/// Loads a match and everyone with a stake in it.
async fn load(state: &AppState, id: Uuid) -> ApiResult<(Match, MatchParties)> {
    let (m, owners) = state
        .blocking(move |db| {
            let Some(m) = db.get_match(id)? else {
                return Ok(None);
            };
            let owners = db.match_owners(&m)?;
            Ok(Some((m, owners)))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Match"))?;
    let parties = parties(&m, owners);
    Ok((m, parties))
}

pub async fn list_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Match>>> {
    let user_id = claims.sub;
    let matches = state.blocking(move |db| db.list_matches_for_user(user_id)).await?;
    Ok(Json(matches))
}

pub async fn get_match(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Match>> {
    let (m, parties) = load(&state, id).await?;
    if !parties.is_participant(claims.sub) {
        return Err(ApiError::forbidden("Not a participant of this match"));
    }
    Ok(Json(m))
}

/// Proposes a match. Naming both sides means pairing one of your own
/// posts with someone else's; naming one side is a direct request to its
/// owner.
pub async fn create_match(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMatchRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.need_id.is_none() && req.offer_id.is_none() {
        return Err(ApiError::validation("A match needs a need or an offer"));
    }

    let (need_id, offer_id) = (req.need_id, req.offer_id);
    let (need, offer) = state
        .blocking(move |db| {
            let need = need_id.map(|id| db.get_need(id)).transpose()?.flatten();
            let offer = offer_id.map(|id| db.get_offer(id)).transpose()?.flatten();
            Ok((need, offer))
        })
        .await?;

    if need_id.is_some() && need.is_none() {
        return Err(ApiError::not_found("Need"));
    }
    if offer_id.is_some() && offer.is_none() {
        return Err(ApiError::not_found("Offer"));
    }

    if let Some(need) = &need {
        if need.status != NeedStatus::Open {
            return Err(ApiError::Conflict("Need is no longer open".into()));
        }
    }
    if let Some(offer) = &offer {
        if offer.status != OfferStatus::Active {
            return Err(ApiError::Conflict("Offer is not active".into()));
        }
    }

    let owners = MatchOwners {
        need_owner: need.as_ref().map(|n| n.user_id),
        offer_owner: offer.as_ref().map(|o| o.user_id),
    };
    let owns_need = owners.need_owner == Some(claims.sub);
    let owns_offer = owners.offer_owner == Some(claims.sub);
    match (need.is_some(), offer.is_some()) {
        (true, true) if owns_need == owns_offer => {
            return Err(ApiError::forbidden(
                "Pair one of your own posts with someone else's",
            ));
        }
        (true, false) | (false, true) if owns_need || owns_offer => {
            return Err(ApiError::validation("Cannot request a match with yourself"));
        }
        _ => {}
    }

    let initiator = claims.sub;
    let message = req.message.filter(|m| !m.trim().is_empty());
    let m = state
        .blocking(move |db| db.create_match(initiator, need_id, offer_id, message.as_deref()))
        .await?;

    info!("{} proposed match {}", claims.name, m.id);
    notify_counterparts(
        &state,
        &parties(&m, owners),
        claims.sub,
        m.id,
        "New match request",
        format!("{} wants to connect with you", claims.name),
    )
    .await;

    Ok((StatusCode::CREATED, Json(m)))
}

pub async fn respond_match(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<RespondMatchRequest>,
) -> ApiResult<Json<Match>> {
    let (m, parties) = load(&state, id).await?;
    authorize_response(m.status, req.status, &parties, claims.sub)?;

    let (from, to, actor) = (m.status, req.status, claims.sub);
    let message = req.message.filter(|m| !m.trim().is_empty());
    let updated = state
        .blocking(move |db| db.transition_match(id, from, to, actor, message.as_deref()))
        .await?
        .ok_or_else(|| ApiError::Conflict("Match was updated by someone else".into()))?;

    info!("{} moved match {} from {} to {}", claims.name, id, from, to);

    let (title, verb) = match to {
        MatchStatus::Accepted => ("Match accepted", "accepted"),
        MatchStatus::Rejected => ("Match declined", "declined"),
        MatchStatus::Completed => ("Match completed", "completed"),
        MatchStatus::Cancelled => ("Match cancelled", "cancelled"),
        MatchStatus::Pending => ("Match updated", "updated"),
    };
    let mut parties = parties;
    parties.responded_by = updated.responded_by;
    notify_counterparts(
        &state,
        &parties,
        claims.sub,
        id,
        title,
        format!("{} {} the match", claims.name, verb),
    )
    .await;

    Ok(Json(updated))
}

async fn notify_counterparts(
    state: &AppState,
    parties: &MatchParties,
    actor: Uuid,
    match_id: Uuid,
    title: &str,
    description: String,
) {
    for recipient in parties.counterparts(actor) {
        let new = NewNotification {
            recipient_id: recipient,
            title: title.to_string(),
            description: description.clone(),
            notification_type: NotificationType::Match,
            entity_id: Some(match_id),
        };
        if let Err(e) = notify(state.db.clone(), &state.dispatcher, new).await {
            warn!("Failed to notify {} about match {}: {:#}", recipient, match_id, e);
        }
    }
}
