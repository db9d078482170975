//! Company endpoints
//!
//! Only members can see a company; only owners can change it.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::Utc;

use super::dto::{AddMemberRequest, CompanyResponse, CreateCompanyRequest, MembershipResponse, UpdateCompanyRequest};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{Company, CompanyRole, CompanyUser, EntityId};
use crate::error::AppError;

pub fn companies_router() -> Router<AppState> {
    Router::new()
        .route("/api/companies", post(create_company))
        .route(
            "/api/companies/:id",
            get(get_company).patch(update_company).delete(delete_company),
        )
        .route("/api/companies/:id/members", post(add_member))
}

/// Membership of `user_id` in `company_id`.
///
/// Non-members get `NotFound` so company IDs are not probeable.
async fn membership(
    state: &AppState,
    company_id: &str,
    user_id: &str,
) -> Result<CompanyUser, AppError> {
    state
        .db
        .get_company_user(company_id, user_id)
        .await?
        .ok_or(AppError::NotFound)
}

async fn require_owner(
    state: &AppState,
    company_id: &str,
    user_id: &str,
) -> Result<CompanyUser, AppError> {
    let member = membership(state, company_id, user_id).await?;
    if member.role != CompanyRole::Owner {
        return Err(AppError::Forbidden);
    }
    Ok(member)
}

fn non_empty(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(trimmed.to_string())
}

async fn company_response(state: &AppState, company_id: &str) -> Result<CompanyResponse, AppError> {
    let view = state
        .db
        .get_company_with_members(company_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(CompanyResponse {
        company: view.company,
        members: view.members.into_iter().map(MembershipResponse::from).collect(),
    })
}

/// POST /api/companies
/// Create a company owned by the caller
async fn create_company(
    State(state): State<AppState>,
    CurrentUser(resolved): CurrentUser,
    Json(req): Json<CreateCompanyRequest>,
) -> Result<(StatusCode, Json<CompanyResponse>), AppError> {
    let now = Utc::now();
    let company = Company {
        id: EntityId::new().0,
        name: non_empty(&req.name, "name")?,
        email: req.email,
        phone: req.phone,
        created_at: now,
        updated_at: now,
    };
    state.db.insert_company(&company).await?;

    let owner = CompanyUser {
        company_id: company.id.clone(),
        user_id: resolved.user.id.clone(),
        role: CompanyRole::Owner,
        created_at: now,
        updated_at: now,
    };
    if let Err(error) = state.db.insert_company_user(&owner).await {
        // Avoid leaving an ownerless company behind
        state.db.delete_company(&company.id).await?;
        return Err(error);
    }

    tracing::info!(company_id = %company.id, user_id = %owner.user_id, "Company created");

    Ok((
        StatusCode::CREATED,
        Json(CompanyResponse {
            company,
            members: vec![owner.into()],
        }),
    ))
}

/// GET /api/companies/:id
async fn get_company(
    State(state): State<AppState>,
    CurrentUser(resolved): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<CompanyResponse>, AppError> {
    membership(&state, &id, &resolved.user.id).await?;
    Ok(Json(company_response(&state, &id).await?))
}

/// PATCH /api/companies/:id
async fn update_company(
    State(state): State<AppState>,
    CurrentUser(resolved): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateCompanyRequest>,
) -> Result<Json<CompanyResponse>, AppError> {
    require_owner(&state, &id, &resolved.user.id).await?;

    let mut company = state.db.get_company(&id).await?.ok_or(AppError::NotFound)?;
    if let Some(name) = req.name {
        company.name = non_empty(&name, "name")?;
    }
    if let Some(email) = req.email {
        company.email = Some(email);
    }
    if let Some(phone) = req.phone {
        company.phone = Some(phone);
    }
    company.updated_at = Utc::now();

    if !state.db.update_company(&company).await? {
        return Err(AppError::NotFound);
    }

    Ok(Json(company_response(&state, &id).await?))
}

/// DELETE /api/companies/:id
/// Memberships go with it
async fn delete_company(
    State(state): State<AppState>,
    CurrentUser(resolved): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_owner(&state, &id, &resolved.user.id).await?;

    if !state.db.delete_company(&id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(company_id = %id, "Company deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/companies/:id/members
async fn add_member(
    State(state): State<AppState>,
    CurrentUser(resolved): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<MembershipResponse>), AppError> {
    require_owner(&state, &id, &resolved.user.id).await?;

    let role: CompanyRole = req.role.parse().map_err(AppError::Validation)?;
    if state.db.get_user(&req.user_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let now = Utc::now();
    let member = CompanyUser {
        company_id: id,
        user_id: req.user_id,
        role,
        created_at: now,
        updated_at: now,
    };
    state.db.insert_company_user(&member).await?;

    Ok((StatusCode::CREATED, Json(member.into())))
}
