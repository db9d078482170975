//! Database tests

use super::*;
use crate::config::DatabaseConfig;
use crate::error::{AppError, ConstraintViolation};
use chrono::{Duration, Utc};
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", temp_dir.path().join("test.db").display()),
        max_connections: 2,
    };
    let db = Database::connect(&config).await.unwrap();
    (db, temp_dir)
}

fn user(email: Option<&str>) -> User {
    User {
        id: EntityId::new().0,
        name: Some("Test User".to_string()),
        email: email.map(str::to_string),
        email_verified: None,
        image: None,
    }
}

fn account(user_id: &str, provider: &str, provider_account_id: &str) -> Account {
    Account {
        user_id: user_id.to_string(),
        account_type: AccountType::Oidc,
        provider: provider.to_string(),
        provider_account_id: provider_account_id.to_string(),
        refresh_token: None,
        access_token: Some("access".to_string()),
        expires_at: Some(1_700_000_000),
        token_type: Some("Bearer".to_string()),
        scope: Some("openid email profile".to_string()),
        id_token: None,
        session_state: None,
    }
}

fn session(user_id: &str, token: &str) -> Session {
    Session {
        session_token: token.to_string(),
        user_id: user_id.to_string(),
        expires: Utc::now() + Duration::days(30),
    }
}

fn authenticator(user_id: &str, credential_id: &str) -> Authenticator {
    Authenticator {
        credential_id: credential_id.to_string(),
        user_id: user_id.to_string(),
        provider_account_id: "passkey-account".to_string(),
        credential_public_key: "pk".to_string(),
        counter: 0,
        credential_device_type: "singleDevice".to_string(),
        credential_backed_up: false,
        transports: Some("internal".to_string()),
    }
}

fn company(name: &str) -> Company {
    let now = Utc::now();
    Company {
        id: EntityId::new().0,
        name: name.to_string(),
        email: None,
        phone: None,
        created_at: now,
        updated_at: now,
    }
}

fn membership(company_id: &str, user_id: &str, role: CompanyRole) -> CompanyUser {
    let now = Utc::now();
    CompanyUser {
        company_id: company_id.to_string(),
        user_id: user_id.to_string(),
        role,
        created_at: now,
        updated_at: now,
    }
}

fn violation(result: Result<(), AppError>) -> Option<ConstraintViolation> {
    result.expect_err("write should be rejected").constraint_violation()
}

#[tokio::test]
async fn test_database_connection() {
    let (_db, _temp_dir) = create_test_db().await;
}

#[tokio::test]
async fn test_user_crud() {
    let (db, _temp_dir) = create_test_db().await;
    let mut alice = user(Some("alice@example.com"));

    db.insert_user(&alice).await.unwrap();
    assert_eq!(db.get_user(&alice.id).await.unwrap(), Some(alice.clone()));
    assert_eq!(
        db.get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .map(|u| u.id),
        Some(alice.id.clone())
    );

    alice.name = Some("Alice".to_string());
    assert!(db.update_user(&alice).await.unwrap());
    assert_eq!(
        db.get_user(&alice.id).await.unwrap().unwrap().name.as_deref(),
        Some("Alice")
    );

    assert!(db.delete_user(&alice.id).await.unwrap());
    assert!(!db.delete_user(&alice.id).await.unwrap());
    assert!(db.get_user(&alice.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_email_is_unique_violation() {
    let (db, _temp_dir) = create_test_db().await;
    db.insert_user(&user(Some("dup@example.com"))).await.unwrap();

    let result = db.insert_user(&user(Some("dup@example.com"))).await;
    assert_eq!(violation(result), Some(ConstraintViolation::Unique));
}

#[tokio::test]
async fn test_users_without_email_do_not_collide() {
    let (db, _temp_dir) = create_test_db().await;
    db.insert_user(&user(None)).await.unwrap();
    db.insert_user(&user(None)).await.unwrap();
}

#[tokio::test]
async fn test_duplicate_provider_account_is_unique_violation() {
    let (db, _temp_dir) = create_test_db().await;
    let first = user(Some("a@example.com"));
    let second = user(Some("b@example.com"));
    db.insert_user(&first).await.unwrap();
    db.insert_user(&second).await.unwrap();

    db.insert_account(&account(&first.id, "google", "sub-1"))
        .await
        .unwrap();
    let result = db
        .insert_account(&account(&second.id, "google", "sub-1"))
        .await;
    assert_eq!(violation(result), Some(ConstraintViolation::Unique));

    // Same subject on another provider is a different identity
    db.insert_account(&account(&second.id, "github", "sub-1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_account_for_missing_user_is_foreign_key_violation() {
    let (db, _temp_dir) = create_test_db().await;

    let result = db.insert_account(&account("no-such-user", "google", "x")).await;
    assert_eq!(violation(result), Some(ConstraintViolation::ForeignKey));
}

#[tokio::test]
async fn test_user_delete_cascades_to_dependents_only() {
    let (db, _temp_dir) = create_test_db().await;
    let doomed = user(Some("doomed@example.com"));
    let survivor = user(Some("survivor@example.com"));
    db.insert_user(&doomed).await.unwrap();
    db.insert_user(&survivor).await.unwrap();

    let acme = company("Acme");
    db.insert_company(&acme).await.unwrap();

    for owner in [&doomed, &survivor] {
        db.insert_account(&account(&owner.id, "google", &owner.id))
            .await
            .unwrap();
        db.insert_session(&session(&owner.id, &format!("token-{}", owner.id)))
            .await
            .unwrap();
        db.insert_authenticator(&authenticator(&owner.id, &format!("cred-{}", owner.id)))
            .await
            .unwrap();
        db.insert_company_user(&membership(&acme.id, &owner.id, CompanyRole::Member))
            .await
            .unwrap();
    }

    assert!(db.delete_user(&doomed.id).await.unwrap());

    let gone = &doomed.id;
    assert!(db.get_accounts_by_user(gone).await.unwrap().is_empty());
    assert!(db.get_sessions_by_user(gone).await.unwrap().is_empty());
    assert!(db.get_authenticators_by_user(gone).await.unwrap().is_empty());
    assert!(db.get_user_company_users(gone).await.unwrap().is_empty());

    let kept = db
        .get_user_with_relations(&survivor.id)
        .await
        .unwrap()
        .expect("survivor still exists");
    assert_eq!(kept.accounts.len(), 1);
    assert_eq!(kept.sessions.len(), 1);
    assert_eq!(kept.authenticators.len(), 1);
    assert_eq!(kept.company_users.len(), 1);
    assert!(db.get_company(&acme.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_company_delete_cascades_to_memberships_only() {
    let (db, _temp_dir) = create_test_db().await;
    let member = user(Some("member@example.com"));
    db.insert_user(&member).await.unwrap();

    let acme = company("Acme");
    let globex = company("Globex");
    db.insert_company(&acme).await.unwrap();
    db.insert_company(&globex).await.unwrap();
    db.insert_company_user(&membership(&acme.id, &member.id, CompanyRole::Owner))
        .await
        .unwrap();
    db.insert_company_user(&membership(&globex.id, &member.id, CompanyRole::Member))
        .await
        .unwrap();

    assert!(db.delete_company(&acme.id).await.unwrap());

    assert!(db.get_company_user(&acme.id, &member.id).await.unwrap().is_none());
    assert!(db.get_user(&member.id).await.unwrap().is_some());
    let remaining = db.get_user_company_users(&member.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].company_id, globex.id);
}

#[tokio::test]
async fn test_duplicate_company_name_is_unique_violation() {
    let (db, _temp_dir) = create_test_db().await;
    db.insert_company(&company("Acme")).await.unwrap();

    let result = db.insert_company(&company("Acme")).await;
    assert_eq!(violation(result), Some(ConstraintViolation::Unique));
}

#[tokio::test]
async fn test_membership_roles() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = user(Some("owner@example.com"));
    let member = user(Some("member@example.com"));
    db.insert_user(&owner).await.unwrap();
    db.insert_user(&member).await.unwrap();
    let acme = company("Acme");
    db.insert_company(&acme).await.unwrap();

    db.insert_company_user(&membership(&acme.id, &owner.id, CompanyRole::Owner))
        .await
        .unwrap();
    db.insert_company_user(&membership(&acme.id, &member.id, CompanyRole::Member))
        .await
        .unwrap();

    // Any other role string is refused by the table itself
    let result: Result<(), AppError> = sqlx::query(
        "UPDATE company_users SET role = 'admin' WHERE company_id = ? AND user_id = ?",
    )
    .bind(&acme.id)
    .bind(&member.id)
    .execute(db.pool())
    .await
    .map(|_| ())
    .map_err(AppError::from);
    assert_eq!(violation(result), Some(ConstraintViolation::Check));

    // New rows are held to the same roles
    let outsider = user(Some("outsider@example.com"));
    db.insert_user(&outsider).await.unwrap();
    let now = Utc::now();
    let result: Result<(), AppError> = sqlx::query(
        "INSERT INTO company_users (company_id, user_id, role, created_at, updated_at) VALUES (?, ?, 'admin', ?, ?)",
    )
    .bind(&acme.id)
    .bind(&outsider.id)
    .bind(now)
    .bind(now)
    .execute(db.pool())
    .await
    .map(|_| ())
    .map_err(AppError::from);
    assert_eq!(violation(result), Some(ConstraintViolation::Check));
    assert!(db.get_company_user(&acme.id, &outsider.id).await.unwrap().is_none());

    let members = db.get_company_users(&acme.id).await.unwrap();
    assert_eq!(members.len(), 2);
    for m in members {
        let expected = if m.user_id == owner.id { CompanyRole::Owner } else { CompanyRole::Member };
        assert_eq!(m.role, expected);
    }
}

#[tokio::test]
async fn test_duplicate_membership_is_unique_violation() {
    let (db, _temp_dir) = create_test_db().await;
    let member = user(None);
    db.insert_user(&member).await.unwrap();
    let acme = company("Acme");
    db.insert_company(&acme).await.unwrap();

    db.insert_company_user(&membership(&acme.id, &member.id, CompanyRole::Member))
        .await
        .unwrap();
    let result = db
        .insert_company_user(&membership(&acme.id, &member.id, CompanyRole::Owner))
        .await;
    assert_eq!(violation(result), Some(ConstraintViolation::Unique));
}

#[tokio::test]
async fn test_update_company_keeps_created_at() {
    let (db, _temp_dir) = create_test_db().await;
    let mut acme = company("Acme");
    db.insert_company(&acme).await.unwrap();
    let created_at = acme.created_at;

    acme.phone = Some("+1 555 0100".to_string());
    acme.updated_at = created_at + Duration::minutes(5);
    assert!(db.update_company(&acme).await.unwrap());

    let stored = db.get_company(&acme.id).await.unwrap().unwrap();
    assert_eq!(stored.created_at, created_at);
    assert_eq!(stored.updated_at, created_at + Duration::minutes(5));
    assert_eq!(stored.phone.as_deref(), Some("+1 555 0100"));
}

#[tokio::test]
async fn test_session_join_and_expiry_update() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = user(Some("s@example.com"));
    db.insert_user(&owner).await.unwrap();
    db.insert_session(&session(&owner.id, "tok")).await.unwrap();

    let (found, found_user) = db.get_session_and_user("tok").await.unwrap().unwrap();
    assert_eq!(found.user_id, owner.id);
    assert_eq!(found_user, owner);

    let later = Utc::now() + Duration::days(60);
    let updated = db.update_session_expiry("tok", later).await.unwrap().unwrap();
    assert_eq!(updated.expires, later);
    assert!(db.update_session_expiry("missing", later).await.unwrap().is_none());

    assert!(db.delete_session("tok").await.unwrap().is_some());
    assert!(db.delete_session("tok").await.unwrap().is_none());
}

#[tokio::test]
async fn test_verification_token_is_single_use() {
    let (db, _temp_dir) = create_test_db().await;
    let token = VerificationToken {
        identifier: "alice@example.com".to_string(),
        token: "123456".to_string(),
        expires: Utc::now() + Duration::minutes(10),
    };
    db.insert_verification_token(&token).await.unwrap();

    let taken = db
        .take_verification_token("alice@example.com", "123456")
        .await
        .unwrap();
    assert_eq!(taken, Some(token));
    assert!(
        db.take_verification_token("alice@example.com", "123456")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_company_with_members_view() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = user(Some("o@example.com"));
    db.insert_user(&owner).await.unwrap();
    let acme = company("Acme");
    db.insert_company(&acme).await.unwrap();
    db.insert_company_user(&membership(&acme.id, &owner.id, CompanyRole::Owner))
        .await
        .unwrap();

    let view = db.get_company_with_members(&acme.id).await.unwrap().unwrap();
    assert_eq!(view.company.name, "Acme");
    assert_eq!(view.members.len(), 1);
    assert_eq!(view.members[0].role, CompanyRole::Owner);

    assert!(db.get_company_with_members("missing").await.unwrap().is_none());
    assert!(db.get_user_with_relations("missing").await.unwrap().is_none());
}
