//! Data models
//!
//! Rust structs representing the identity and tenancy tables.
//! Generated IDs are ULIDs; timestamps are chrono UTC values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// User
// =============================================================================

/// Identity record
///
/// Created on first successful sign-in. Deleting a user removes its
/// accounts, sessions, authenticators and company memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    /// Unique across all users when present
    pub email: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    /// Avatar URL
    pub image: Option<String>,
}

/// Fields for creating a user; the ID is generated on insert.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    pub image: Option<String>,
}

// =============================================================================
// Account
// =============================================================================

/// Kind of credential an account row represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AccountType {
    Oauth,
    Oidc,
    Email,
    Webauthn,
}

/// An external provider identity linked to a user
///
/// `(provider, provider_account_id)` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub user_id: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub account_type: AccountType,
    pub provider: String,
    pub provider_account_id: String,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    /// Access token expiry (unix seconds)
    pub expires_at: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
    pub session_state: Option<String>,
}

// =============================================================================
// Session
// =============================================================================

/// A login session, keyed by its token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub session_token: String,
    pub user_id: String,
    pub expires: DateTime<Utc>,
}

impl Session {
    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires <= Utc::now()
    }
}

// =============================================================================
// Verification Token
// =============================================================================

/// Short-lived token for flows such as email verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VerificationToken {
    pub identifier: String,
    pub token: String,
    pub expires: DateTime<Utc>,
}

impl VerificationToken {
    pub fn is_expired(&self) -> bool {
        self.expires <= Utc::now()
    }
}

// =============================================================================
// Authenticator
// =============================================================================

/// WebAuthn / passkey credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Authenticator {
    /// Globally unique credential ID (base64url)
    pub credential_id: String,
    pub user_id: String,
    pub provider_account_id: String,
    pub credential_public_key: String,
    /// Signature counter
    pub counter: i64,
    /// "singleDevice" or "multiDevice"
    pub credential_device_type: String,
    pub credential_backed_up: bool,
    /// Comma separated transport hints (usb, nfc, ble, internal, hybrid)
    pub transports: Option<String>,
}

// =============================================================================
// Company
// =============================================================================

/// A tenant organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Company {
    pub id: String,
    /// Unique across all companies
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role of a user inside a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CompanyRole {
    Owner,
    Member,
}

impl CompanyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }
}

impl std::fmt::Display for CompanyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CompanyRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "member" => Ok(Self::Member),
            _ => Err(format!("Unknown company role: {}", s)),
        }
    }
}

/// Membership linking a user to a company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompanyUser {
    pub company_id: String,
    pub user_id: String,
    pub role: CompanyRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Relation views
// =============================================================================

/// A user together with every row that references it
#[derive(Debug, Clone, Serialize)]
pub struct UserWithRelations {
    pub user: User,
    pub accounts: Vec<Account>,
    pub sessions: Vec<Session>,
    pub authenticators: Vec<Authenticator>,
    pub company_users: Vec<CompanyUser>,
}

/// A company together with its memberships
#[derive(Debug, Clone, Serialize)]
pub struct CompanyWithMembers {
    pub company: Company,
    pub members: Vec<CompanyUser>,
}
