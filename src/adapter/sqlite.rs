//! `AuthAdapter` backed by the SQLite `Database`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::AuthAdapter;
use crate::data::{
    Account, Authenticator, Database, EntityId, NewUser, Session, User, VerificationToken,
};
use crate::error::AppError;

pub struct SqliteAdapter {
    db: Arc<Database>,
    passkeys_enabled: bool,
}

impl SqliteAdapter {
    pub fn new(db: Arc<Database>, passkeys_enabled: bool) -> Self {
        Self {
            db,
            passkeys_enabled,
        }
    }

    fn require_passkeys(&self) -> Result<(), AppError> {
        if self.passkeys_enabled {
            Ok(())
        } else {
            Err(AppError::NotImplemented(
                "passkey support is disabled".to_string(),
            ))
        }
    }
}

#[async_trait]
impl AuthAdapter for SqliteAdapter {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let user = User {
            id: EntityId::new().0,
            name: user.name,
            email: user.email,
            email_verified: user.email_verified,
            image: user.image,
        };
        self.db.insert_user(&user).await?;
        tracing::debug!(user_id = %user.id, "User created");
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        self.db.get_user(id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.db.get_user_by_email(email).await
    }

    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<User>, AppError> {
        self.db
            .get_user_by_account(provider, provider_account_id)
            .await
    }

    async fn update_user(&self, user: &User) -> Result<User, AppError> {
        if !self.db.update_user(user).await? {
            return Err(AppError::NotFound);
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: &str) -> Result<(), AppError> {
        if !self.db.delete_user(id).await? {
            return Err(AppError::NotFound);
        }
        tracing::debug!(user_id = %id, "User deleted");
        Ok(())
    }

    async fn link_account(&self, account: Account) -> Result<Account, AppError> {
        self.db.insert_account(&account).await?;
        tracing::debug!(
            user_id = %account.user_id,
            provider = %account.provider,
            "Account linked"
        );
        Ok(account)
    }

    async fn unlink_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<(), AppError> {
        if !self
            .db
            .delete_account(provider, provider_account_id)
            .await?
        {
            return Err(AppError::NotFound);
        }
        tracing::debug!(provider = %provider, "Account unlinked");
        Ok(())
    }

    async fn get_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<Account>, AppError> {
        self.db.get_account(provider, provider_account_id).await
    }

    async fn update_account(&self, account: &Account) -> Result<(), AppError> {
        if !self.db.update_account_tokens(account).await? {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn create_session(&self, session: Session) -> Result<Session, AppError> {
        self.db.insert_session(&session).await?;
        tracing::debug!(user_id = %session.user_id, expires = %session.expires, "Session created");
        Ok(session)
    }

    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> Result<Option<(Session, User)>, AppError> {
        self.db.get_session_and_user(session_token).await
    }

    async fn update_session(
        &self,
        session_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<Option<Session>, AppError> {
        self.db.update_session_expiry(session_token, expires).await
    }

    async fn delete_session(&self, session_token: &str) -> Result<(), AppError> {
        if let Some(session) = self.db.delete_session(session_token).await? {
            tracing::debug!(user_id = %session.user_id, "Session deleted");
        }
        Ok(())
    }

    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> Result<VerificationToken, AppError> {
        self.db.insert_verification_token(&token).await?;
        Ok(token)
    }

    async fn use_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> Result<Option<VerificationToken>, AppError> {
        self.db.take_verification_token(identifier, token).await
    }

    async fn create_authenticator(
        &self,
        authenticator: Authenticator,
    ) -> Result<Authenticator, AppError> {
        self.require_passkeys()?;
        self.db.insert_authenticator(&authenticator).await?;
        tracing::debug!(user_id = %authenticator.user_id, "Authenticator registered");
        Ok(authenticator)
    }

    async fn get_authenticator(
        &self,
        credential_id: &str,
    ) -> Result<Option<Authenticator>, AppError> {
        self.require_passkeys()?;
        self.db.get_authenticator(credential_id).await
    }

    async fn list_authenticators_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Vec<Authenticator>, AppError> {
        self.require_passkeys()?;
        self.db.get_authenticators_by_user(user_id).await
    }

    async fn update_authenticator_counter(
        &self,
        credential_id: &str,
        counter: i64,
    ) -> Result<Authenticator, AppError> {
        self.require_passkeys()?;
        self.db
            .update_authenticator_counter(credential_id, counter)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn delete_authenticator(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<(), AppError> {
        self.require_passkeys()?;
        if !self.db.delete_authenticator(user_id, credential_id).await? {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
