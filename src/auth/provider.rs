//! Identity providers
//!
//! An `IdentityProvider` turns an authorization code into a profile plus
//! token material. Only Google is wired in; the trait keeps the sign-in flow
//! independent of the HTTP exchange.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::GoogleOAuthConfig;
use crate::data::AccountType;
use crate::error::AppError;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_SCOPE: &str = "openid email profile";

/// Profile returned by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Provider-assigned stable account ID
    pub provider_account_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Token material returned by the code exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Unix seconds
    pub expires_at: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

/// Result of a successful code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSignIn {
    pub profile: ProviderProfile,
    pub tokens: ProviderTokens,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name stored in `accounts.provider` (e.g. "google")
    fn id(&self) -> &'static str;

    /// Account type recorded for accounts created by this provider
    fn account_type(&self) -> AccountType;

    /// URL the browser is sent to for consent
    fn authorization_url(&self, redirect_uri: &str, state: &str, code_challenge: &str) -> String;

    /// Exchange an authorization code for profile and tokens
    ///
    /// # Errors
    /// `AppError::IdentityProvider` or `AppError::HttpClient` on any failure;
    /// the exchange is never retried.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<ProviderSignIn, AppError>;
}

/// Random PKCE code verifier (43 chars, base64url)
pub fn generate_code_verifier() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 code challenge for a verifier
pub fn code_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Google OAuth 2.0 / OpenID Connect
pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    token_type: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleProvider {
    pub fn new(config: &GoogleOAuthConfig, http: reqwest::Client) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            http,
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn id(&self) -> &'static str {
        "google"
    }

    fn account_type(&self) -> AccountType {
        AccountType::Oidc
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str, code_challenge: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", GOOGLE_SCOPE)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256")
            .finish();
        format!("{}?{}", GOOGLE_AUTHORIZE_URL, query)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<ProviderSignIn, AppError> {
        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", code_verifier),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = match response.json::<GoogleErrorResponse>().await {
                Ok(body) => match body.error_description {
                    Some(description) => format!("{}: {}", body.error, description),
                    None => body.error,
                },
                Err(_) => format!("token endpoint returned {}", status),
            };
            return Err(AppError::IdentityProvider(message));
        }

        let token: GoogleTokenResponse = response.json().await?;
        let issued_at = Utc::now().timestamp();

        let user_info: GoogleUserInfo = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::IdentityProvider(format!("userinfo request failed: {}", e)))?
            .json()
            .await?;

        Ok(ProviderSignIn {
            profile: ProviderProfile {
                provider_account_id: user_info.sub,
                email: user_info.email,
                email_verified: user_info.email_verified,
                name: user_info.name,
                image: user_info.picture,
            },
            tokens: ProviderTokens {
                access_token: Some(token.access_token),
                refresh_token: token.refresh_token,
                expires_at: token.expires_in.map(|secs| issued_at + secs),
                token_type: Some(token.token_type),
                scope: token.scope,
                id_token: token.id_token,
            },
        })
    }
}
