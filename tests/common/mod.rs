//! Common test utilities for E2E tests

use std::sync::Arc;

use async_trait::async_trait;
use authgate::auth::session::new_session;
use authgate::auth::{IdentityProvider, ProviderProfile, ProviderSignIn, ProviderTokens, SESSION_COOKIE};
use authgate::data::{AccountType, NewUser, User};
use authgate::error::AppError;
use authgate::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Authorization code the fake provider accepts
pub const GOOD_CODE: &str = "good-code";

/// Identity provider that never leaves the process
///
/// `GOOD_CODE` signs in as `FakeProvider::EMAIL`; any other code fails.
pub struct FakeProvider;

impl FakeProvider {
    pub const SUBJECT: &'static str = "fake-subject-1";
    pub const EMAIL: &'static str = "fake.user@example.com";
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn id(&self) -> &'static str {
        "google"
    }

    fn account_type(&self) -> AccountType {
        AccountType::Oidc
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str, code_challenge: &str) -> String {
        format!(
            "https://idp.test/authorize?redirect_uri={}&state={}&code_challenge={}",
            urlencoding::encode(redirect_uri),
            state,
            code_challenge
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        _redirect_uri: &str,
    ) -> Result<ProviderSignIn, AppError> {
        if code != GOOD_CODE || code_verifier.is_empty() {
            return Err(AppError::IdentityProvider("invalid_grant".to_string()));
        }

        Ok(ProviderSignIn {
            profile: ProviderProfile {
                provider_account_id: Self::SUBJECT.to_string(),
                email: Some(Self::EMAIL.to_string()),
                email_verified: true,
                name: Some("Fake User".to_string()),
                image: None,
            },
            tokens: ProviderTokens {
                access_token: Some("fake-access-token".to_string()),
                token_type: Some("Bearer".to_string()),
                ..ProviderTokens::default()
            },
        })
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig {
                url: format!("sqlite://{}", db_path.display()),
                max_connections: 5,
            },
            auth: config::AuthConfig {
                session_max_age: 2_592_000,
                session_update_age: 86_400,
                debug: false,
                passkeys_enabled: false,
                google: config::GoogleOAuthConfig {
                    client_id: "test-client-id".to_string(),
                    client_secret: "test-client-secret".to_string(),
                },
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let state = AppState::with_provider(config, Arc::new(FakeProvider))
            .await
            .unwrap();

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = authgate::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Insert a user directly through the adapter
    pub async fn create_user(&self, email: &str) -> User {
        self.state
            .adapter
            .create_user(NewUser {
                name: Some(email.split('@').next().unwrap_or(email).to_string()),
                email: Some(email.to_string()),
                ..NewUser::default()
            })
            .await
            .unwrap()
    }

    /// Open a session for `user` and return its token
    pub async fn create_session(&self, user: &User) -> String {
        let session = self
            .state
            .adapter
            .create_session(new_session(&user.id, &self.state.config.auth))
            .await
            .unwrap();
        session.session_token
    }

    /// User plus a `Cookie` header value carrying their session
    pub async fn signed_in(&self, email: &str) -> (User, String) {
        let user = self.create_user(email).await;
        let token = self.create_session(&user).await;
        (user, format!("{}={}", SESSION_COOKIE, token))
    }
}

/// `Location` header of a redirect response
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

/// `name=value` pairs from every `Set-Cookie` header
pub fn set_cookies(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}
