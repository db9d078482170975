//! SQLite database operations
//!
//! All database access goes through this module. Every method is a single
//! statement against the pool; constraint violations are returned unchanged
//! as `AppError::Database`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

use super::models::*;
use super::schema;
use crate::config::DatabaseConfig;
use crate::error::AppError;

/// Database connection pool wrapper
pub struct Database {
    pool: Pool<Sqlite>,
}

/// Flat row for the session/user join
#[derive(sqlx::FromRow)]
struct SessionUserRow {
    session_token: String,
    user_id: String,
    expires: DateTime<Utc>,
    name: Option<String>,
    email: Option<String>,
    email_verified: Option<DateTime<Utc>>,
    image: Option<String>,
}

impl SessionUserRow {
    fn split(self) -> (Session, User) {
        let session = Session {
            session_token: self.session_token,
            user_id: self.user_id.clone(),
            expires: self.expires,
        };
        let user = User {
            id: self.user_id,
            name: self.name,
            email: self.email,
            email_verified: self.email_verified,
            image: self.image,
        };
        (session, user)
    }
}

impl Database {
    /// Connect to the database and run migrations
    ///
    /// Creates the database file if it doesn't exist. Foreign keys are
    /// enabled on every pooled connection so cascades apply.
    ///
    /// # Errors
    /// Returns error if connection, migration or schema verification fails
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        schema::verify(&pool).await?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user row
    ///
    /// # Errors
    /// Unique violation if the email is already taken
    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, email_verified, image)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.image)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Find the user owning the account `(provider, provider_account_id)`
    pub async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            INNER JOIN accounts a ON a.user_id = u.id
            WHERE a.provider = ? AND a.provider_account_id = ?
            "#,
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Overwrite all mutable user fields by ID.
    ///
    /// # Returns
    /// `true` if updated, `false` if no matching user row exists.
    pub async fn update_user(&self, user: &User) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = ?, email = ?, email_verified = ?, image = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.image)
        .bind(&user.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a user; dependent rows are removed by `ON DELETE CASCADE`.
    pub async fn delete_user(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Insert an account row
    ///
    /// # Errors
    /// Unique violation if `(provider, provider_account_id)` is already linked,
    /// foreign key violation if the user does not exist
    pub async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                user_id, type, provider, provider_account_id, refresh_token, access_token,
                expires_at, token_type, scope, id_token, session_state
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.user_id)
        .bind(account.account_type)
        .bind(&account.provider)
        .bind(&account.provider_account_id)
        .bind(&account.refresh_token)
        .bind(&account.access_token)
        .bind(account.expires_at)
        .bind(&account.token_type)
        .bind(&account.scope)
        .bind(&account.id_token)
        .bind(&account.session_state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE provider = ? AND provider_account_id = ?",
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    pub async fn get_accounts_by_user(&self, user_id: &str) -> Result<Vec<Account>, AppError> {
        let accounts = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE user_id = ? ORDER BY provider, provider_account_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    /// Replace the token material of an existing account.
    ///
    /// The owning user is never changed here.
    pub async fn update_account_tokens(&self, account: &Account) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET refresh_token = ?, access_token = ?, expires_at = ?, token_type = ?,
                scope = ?, id_token = ?, session_state = ?
            WHERE provider = ? AND provider_account_id = ?
            "#,
        )
        .bind(&account.refresh_token)
        .bind(&account.access_token)
        .bind(account.expires_at)
        .bind(&account.token_type)
        .bind(&account.scope)
        .bind(&account.id_token)
        .bind(&account.session_state)
        .bind(&account.provider)
        .bind(&account.provider_account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM accounts WHERE provider = ? AND provider_account_id = ?")
                .bind(provider)
                .bind(provider_account_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Insert a session row
    pub async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query("INSERT INTO sessions (session_token, user_id, expires) VALUES (?, ?, ?)")
            .bind(&session.session_token)
            .bind(&session.user_id)
            .bind(session.expires)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Fetch a session and its user in one statement.
    ///
    /// Expired sessions are returned as stored; callers decide validity.
    pub async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> Result<Option<(Session, User)>, AppError> {
        let row = sqlx::query_as::<_, SessionUserRow>(
            r#"
            SELECT s.session_token, s.user_id, s.expires,
                   u.name, u.email, u.email_verified, u.image
            FROM sessions s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.session_token = ?
            "#,
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionUserRow::split))
    }

    pub async fn get_sessions_by_user(&self, user_id: &str) -> Result<Vec<Session>, AppError> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE user_id = ? ORDER BY expires",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Set a new expiry on a session.
    ///
    /// # Returns
    /// The updated session, or `None` if the token is unknown.
    pub async fn update_session_expiry(
        &self,
        session_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            "UPDATE sessions SET expires = ? WHERE session_token = ? RETURNING *",
        )
        .bind(expires)
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Delete a session, returning the removed row if it existed.
    pub async fn delete_session(&self, session_token: &str) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            "DELETE FROM sessions WHERE session_token = ? RETURNING *",
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    // =========================================================================
    // Verification Tokens
    // =========================================================================

    pub async fn insert_verification_token(
        &self,
        token: &VerificationToken,
    ) -> Result<(), AppError> {
        sqlx::query("INSERT INTO verification_tokens (identifier, token, expires) VALUES (?, ?, ?)")
            .bind(&token.identifier)
            .bind(&token.token)
            .bind(token.expires)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete and return a verification token (single use).
    ///
    /// A second call with the same pair returns `None`.
    pub async fn take_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> Result<Option<VerificationToken>, AppError> {
        let taken = sqlx::query_as::<_, VerificationToken>(
            "DELETE FROM verification_tokens WHERE identifier = ? AND token = ? RETURNING *",
        )
        .bind(identifier)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(taken)
    }

    // =========================================================================
    // Authenticators
    // =========================================================================

    pub async fn insert_authenticator(
        &self,
        authenticator: &Authenticator,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO authenticators (
                credential_id, user_id, provider_account_id, credential_public_key,
                counter, credential_device_type, credential_backed_up, transports
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&authenticator.credential_id)
        .bind(&authenticator.user_id)
        .bind(&authenticator.provider_account_id)
        .bind(&authenticator.credential_public_key)
        .bind(authenticator.counter)
        .bind(&authenticator.credential_device_type)
        .bind(authenticator.credential_backed_up)
        .bind(&authenticator.transports)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_authenticator(
        &self,
        credential_id: &str,
    ) -> Result<Option<Authenticator>, AppError> {
        let authenticator = sqlx::query_as::<_, Authenticator>(
            "SELECT * FROM authenticators WHERE credential_id = ?",
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(authenticator)
    }

    pub async fn get_authenticators_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Authenticator>, AppError> {
        let authenticators = sqlx::query_as::<_, Authenticator>(
            "SELECT * FROM authenticators WHERE user_id = ? ORDER BY credential_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(authenticators)
    }

    /// Store a new signature counter.
    ///
    /// # Returns
    /// The updated authenticator, or `None` if the credential is unknown.
    pub async fn update_authenticator_counter(
        &self,
        credential_id: &str,
        counter: i64,
    ) -> Result<Option<Authenticator>, AppError> {
        let authenticator = sqlx::query_as::<_, Authenticator>(
            "UPDATE authenticators SET counter = ? WHERE credential_id = ? RETURNING *",
        )
        .bind(counter)
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(authenticator)
    }

    pub async fn delete_authenticator(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM authenticators WHERE user_id = ? AND credential_id = ?")
                .bind(user_id)
                .bind(credential_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Companies
    // =========================================================================

    /// Insert a company row
    ///
    /// # Errors
    /// Unique violation if the name is already taken
    pub async fn insert_company(&self, company: &Company) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO companies (id, name, email, phone, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&company.id)
        .bind(&company.name)
        .bind(&company.email)
        .bind(&company.phone)
        .bind(company.created_at)
        .bind(company.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_company(&self, id: &str) -> Result<Option<Company>, AppError> {
        let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(company)
    }

    /// Overwrite company fields by ID.
    ///
    /// `updated_at` is written exactly as given; callers refresh it.
    pub async fn update_company(&self, company: &Company) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE companies
            SET name = ?, email = ?, phone = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&company.name)
        .bind(&company.email)
        .bind(&company.phone)
        .bind(company.updated_at)
        .bind(&company.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a company; memberships are removed by `ON DELETE CASCADE`.
    pub async fn delete_company(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM companies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Company Users
    // =========================================================================

    /// Insert a membership row
    ///
    /// # Errors
    /// Foreign key violation if either parent is missing, unique violation if
    /// the user is already a member
    pub async fn insert_company_user(&self, member: &CompanyUser) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO company_users (company_id, user_id, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&member.company_id)
        .bind(&member.user_id)
        .bind(member.role)
        .bind(member.created_at)
        .bind(member.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_company_user(
        &self,
        company_id: &str,
        user_id: &str,
    ) -> Result<Option<CompanyUser>, AppError> {
        let member = sqlx::query_as::<_, CompanyUser>(
            "SELECT * FROM company_users WHERE company_id = ? AND user_id = ?",
        )
        .bind(company_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }

    pub async fn get_company_users(&self, company_id: &str) -> Result<Vec<CompanyUser>, AppError> {
        let members = sqlx::query_as::<_, CompanyUser>(
            "SELECT * FROM company_users WHERE company_id = ? ORDER BY created_at, user_id",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    pub async fn get_user_company_users(
        &self,
        user_id: &str,
    ) -> Result<Vec<CompanyUser>, AppError> {
        let memberships = sqlx::query_as::<_, CompanyUser>(
            "SELECT * FROM company_users WHERE user_id = ? ORDER BY created_at, company_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(memberships)
    }

    // =========================================================================
    // Relation views
    // =========================================================================

    /// Load a user and every row on the many side of its relations
    pub async fn get_user_with_relations(
        &self,
        user_id: &str,
    ) -> Result<Option<UserWithRelations>, AppError> {
        let Some(user) = self.get_user(user_id).await? else {
            return Ok(None);
        };

        Ok(Some(UserWithRelations {
            accounts: self.get_accounts_by_user(&user.id).await?,
            sessions: self.get_sessions_by_user(&user.id).await?,
            authenticators: self.get_authenticators_by_user(&user.id).await?,
            company_users: self.get_user_company_users(&user.id).await?,
            user,
        }))
    }

    pub async fn get_company_with_members(
        &self,
        company_id: &str,
    ) -> Result<Option<CompanyWithMembers>, AppError> {
        let Some(company) = self.get_company(company_id).await? else {
            return Ok(None);
        };
        let members = self.get_company_users(&company.id).await?;

        Ok(Some(CompanyWithMembers { company, members }))
    }
}
