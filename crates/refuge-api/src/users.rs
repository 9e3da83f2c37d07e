use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

use refuge_db::queries::UserFilter;
use refuge_types::api::Claims;
use refuge_types::models::{Role, User};

use crate::auth::AppState;
use crate::error::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
}

/// Everyone except the caller. Refugees never see other refugees.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let filter = visible_to(&claims, query.role);
    let users = state.blocking(move |db| db.list_users(&filter)).await?;
    Ok(Json(users))
}

fn visible_to(claims: &Claims, role: Option<Role>) -> UserFilter {
    UserFilter {
        exclude_id: Some(claims.sub),
        role,
        exclude_role: (claims.role == Role::Refugee).then_some(Role::Refugee),
    }
}
