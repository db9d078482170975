//! Current user endpoint

use axum::{Router, extract::State, response::Json, routing::get};

use super::dto::{LinkedAccountResponse, MeResponse, MembershipResponse};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

pub fn me_router() -> Router<AppState> {
    Router::new().route("/api/me", get(get_me))
}

/// GET /api/me
/// Signed-in user, linked providers and company memberships
async fn get_me(
    State(state): State<AppState>,
    CurrentUser(resolved): CurrentUser,
) -> Result<Json<MeResponse>, AppError> {
    let view = state
        .db
        .get_user_with_relations(&resolved.user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(MeResponse {
        user: view.user,
        session_expires: resolved.session.expires,
        accounts: view.accounts.into_iter().map(LinkedAccountResponse::from).collect(),
        memberships: view
            .company_users
            .into_iter()
            .map(MembershipResponse::from)
            .collect(),
    }))
}
