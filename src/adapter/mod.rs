//! Auth adapter
//!
//! The persistence contract the sign-in flow and the request gate depend on.
//! One method per operation; implementations translate each call into a
//! single storage operation without caching or retrying.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::data::{Account, Authenticator, NewUser, Session, User, VerificationToken};
use crate::error::AppError;

pub use sqlite::SqliteAdapter;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthAdapter: Send + Sync {
    // Users

    /// Create a user with a freshly generated ID
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<User>, AppError>;
    /// Replace the stored user; `AppError::NotFound` if the ID is unknown
    async fn update_user(&self, user: &User) -> Result<User, AppError>;
    /// Delete the user and, through cascades, everything it owns
    async fn delete_user(&self, id: &str) -> Result<(), AppError>;

    // Accounts

    async fn link_account(&self, account: Account) -> Result<Account, AppError>;
    async fn unlink_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<(), AppError>;
    async fn get_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<Account>, AppError>;
    /// Refresh token material on an already linked account
    async fn update_account(&self, account: &Account) -> Result<(), AppError>;

    // Sessions

    async fn create_session(&self, session: Session) -> Result<Session, AppError>;
    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> Result<Option<(Session, User)>, AppError>;
    async fn update_session(
        &self,
        session_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<Option<Session>, AppError>;
    async fn delete_session(&self, session_token: &str) -> Result<(), AppError>;

    // Verification tokens

    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> Result<VerificationToken, AppError>;
    /// Consume a token: it is deleted and returned, so it works exactly once
    async fn use_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> Result<Option<VerificationToken>, AppError>;

    // Authenticators (passkeys)

    async fn create_authenticator(
        &self,
        authenticator: Authenticator,
    ) -> Result<Authenticator, AppError>;
    async fn get_authenticator(
        &self,
        credential_id: &str,
    ) -> Result<Option<Authenticator>, AppError>;
    async fn list_authenticators_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Vec<Authenticator>, AppError>;
    async fn update_authenticator_counter(
        &self,
        credential_id: &str,
        counter: i64,
    ) -> Result<Authenticator, AppError>;
    async fn delete_authenticator(&self, user_id: &str, credential_id: &str)
    -> Result<(), AppError>;
}
