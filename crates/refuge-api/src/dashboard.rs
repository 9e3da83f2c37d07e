//! Per-role dashboard summaries.
//!
//! Handlers load the caller's posts plus the open pool on the other side,
//! then hand everything to pure builders that rank it with `refuge_match`.

use axum::{Extension, Json, extract::State};
use serde::Serialize;
use uuid::Uuid;

use refuge_db::queries::{NeedFilter, OfferFilter};
use refuge_match::ranking::{RECENT_LIMIT, SUGGESTION_LIMIT};
use refuge_match::{MatchStats, Ranked, matching_candidates, rank_candidates};
use refuge_types::api::Claims;
use refuge_types::models::{Match, MatchStatus, Need, NeedStatus, Offer, OfferStatus};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NeedCounts {
    pub open: u64,
    pub matched: u64,
    pub fulfilled: u64,
    pub closed: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OfferCounts {
    pub active: u64,
    pub inactive: u64,
    pub fulfilled: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefugeeDashboard {
    pub needs: NeedCounts,
    pub suggested_offers: Vec<Ranked<Offer>>,
    pub recent_offers: Vec<Ranked<Offer>>,
    pub pending_matches: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerDashboard {
    pub offers: OfferCounts,
    pub suggested_needs: Vec<Ranked<Need>>,
    pub recent_needs: Vec<Ranked<Need>>,
    pub helped_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NgoDashboard {
    #[serde(flatten)]
    pub volunteer: VolunteerDashboard,
    pub match_stats: MatchStats,
    pub success_rate: u8,
}

pub fn refugee_dashboard(
    me: Uuid,
    own_needs: &[Need],
    active_offers: Vec<Offer>,
    matches: &[Match],
) -> RefugeeDashboard {
    let mut needs = NeedCounts::default();
    for need in own_needs {
        match need.status {
            NeedStatus::Open => needs.open += 1,
            NeedStatus::Matched => needs.matched += 1,
            NeedStatus::Fulfilled => needs.fulfilled += 1,
            NeedStatus::Closed => needs.closed += 1,
        }
    }

    let open_categories: Vec<&str> = own_needs
        .iter()
        .filter(|n| n.status == NeedStatus::Open)
        .map(|n| n.category.as_str())
        .collect();
    let all_categories: Vec<&str> = own_needs.iter().map(|n| n.category.as_str()).collect();

    let others: Vec<Offer> = active_offers.into_iter().filter(|o| o.user_id != me).collect();

    RefugeeDashboard {
        needs,
        suggested_offers: matching_candidates(
            &open_categories,
            others.iter().cloned(),
            SUGGESTION_LIMIT,
        ),
        recent_offers: rank_candidates(&all_categories, others, RECENT_LIMIT),
        pending_matches: matches
            .iter()
            .filter(|m| m.status == MatchStatus::Pending)
            .count() as u64,
    }
}

pub fn volunteer_dashboard(
    me: Uuid,
    own_offers: &[Offer],
    open_needs: Vec<Need>,
) -> VolunteerDashboard {
    let mut offers = OfferCounts::default();
    for offer in own_offers {
        match offer.status {
            OfferStatus::Active => offers.active += 1,
            OfferStatus::Inactive => offers.inactive += 1,
            OfferStatus::Fulfilled => offers.fulfilled += 1,
        }
    }

    let active_categories: Vec<&str> = own_offers
        .iter()
        .filter(|o| o.status == OfferStatus::Active)
        .map(|o| o.category.as_str())
        .collect();
    let all_categories: Vec<&str> = own_offers.iter().map(|o| o.category.as_str()).collect();

    let others: Vec<Need> = open_needs.into_iter().filter(|n| n.user_id != me).collect();

    VolunteerDashboard {
        offers,
        suggested_needs: matching_candidates(
            &active_categories,
            others.iter().cloned(),
            SUGGESTION_LIMIT,
        ),
        recent_needs: rank_candidates(&all_categories, others, RECENT_LIMIT),
        helped_count: own_offers.iter().map(|o| o.helped_count).sum(),
    }
}

pub fn ngo_dashboard(volunteer: VolunteerDashboard, matches: &[Match]) -> NgoDashboard {
    let match_stats: MatchStats = matches.iter().map(|m| m.status).collect();
    NgoDashboard {
        volunteer,
        success_rate: match_stats.success_rate(),
        match_stats,
    }
}

pub async fn refugee(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<RefugeeDashboard>> {
    if !claims.role.can_post_needs() {
        return Err(ApiError::forbidden("Refugee dashboard is for refugees"));
    }
    let me = claims.sub;
    let dashboard = state
        .blocking(move |db| {
            let own = db.list_needs(&NeedFilter {
                user_id: Some(me),
                ..Default::default()
            })?;
            let offers = db.list_offers(&OfferFilter {
                status: Some(OfferStatus::Active),
                ..Default::default()
            })?;
            let matches = db.list_matches_for_user(me)?;
            Ok(refugee_dashboard(me, &own, offers, &matches))
        })
        .await?;
    Ok(Json(dashboard))
}

async fn load_volunteer(state: &AppState, me: Uuid) -> ApiResult<(VolunteerDashboard, Vec<Match>)> {
    state
        .blocking(move |db| {
            let own = db.list_offers(&OfferFilter {
                user_id: Some(me),
                ..Default::default()
            })?;
            let needs = db.list_needs(&NeedFilter {
                status: Some(NeedStatus::Open),
                ..Default::default()
            })?;
            let matches = db.list_matches_for_user(me)?;
            Ok((volunteer_dashboard(me, &own, needs), matches))
        })
        .await
}

pub async fn volunteer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<VolunteerDashboard>> {
    if !claims.role.can_post_offers() {
        return Err(ApiError::forbidden("Volunteer dashboard is for volunteers"));
    }
    let (dashboard, _) = load_volunteer(&state, claims.sub).await?;
    Ok(Json(dashboard))
}

pub async fn ngo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<NgoDashboard>> {
    if !claims.role.can_publish() {
        return Err(ApiError::forbidden("NGO dashboard is for NGOs"));
    }
    let (volunteer, matches) = load_volunteer(&state, claims.sub).await?;
    Ok(Json(ngo_dashboard(volunteer, &matches)))
}
