//! API request and response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{Account, AccountType, Company, CompanyRole, CompanyUser, User};

/// Linked provider identity without token material
#[derive(Debug, Clone, Serialize)]
pub struct LinkedAccountResponse {
    pub provider: String,
    pub provider_account_id: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

impl From<Account> for LinkedAccountResponse {
    fn from(account: Account) -> Self {
        Self {
            provider: account.provider,
            provider_account_id: account.provider_account_id,
            account_type: account.account_type,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MembershipResponse {
    pub company_id: String,
    pub user_id: String,
    pub role: CompanyRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CompanyUser> for MembershipResponse {
    fn from(member: CompanyUser) -> Self {
        Self {
            company_id: member.company_id,
            user_id: member.user_id,
            role: member.role,
            created_at: member.created_at,
            updated_at: member.updated_at,
        }
    }
}

/// GET /api/me
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub session_expires: DateTime<Utc>,
    pub accounts: Vec<LinkedAccountResponse>,
    pub memberships: Vec<MembershipResponse>,
}

/// Company with its member list
#[derive(Debug, Clone, Serialize)]
pub struct CompanyResponse {
    #[serde(flatten)]
    pub company: Company,
    pub members: Vec<MembershipResponse>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Absent fields are left unchanged
#[derive(Debug, Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    /// "owner" or "member"
    pub role: String,
}
