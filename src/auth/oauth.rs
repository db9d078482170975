//! OAuth sign-in flow
//!
//! Authorization code flow with PKCE against the configured identity
//! provider, followed by user/account persistence through the adapter and
//! creation of a database session.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::middleware::{MaybeUser, SIGN_IN_PATH};
use super::provider::{IdentityProvider, ProviderSignIn, code_challenge, generate_code_verifier};
use super::session::{clear_session_cookie, extract_session_token, new_session, session_cookie};
use crate::AppState;
use crate::adapter::AuthAdapter;
use crate::config::AuthConfig;
use crate::data::{Account, NewUser, Session, User};
use crate::error::AppError;
use crate::metrics::SIGN_INS_TOTAL;

const STATE_COOKIE: &str = "authgate.state";
const PKCE_COOKIE: &str = "authgate.pkce-verifier";
const FLOW_COOKIE_PATH: &str = "/auth";

/// Create authentication router
///
/// Routes:
/// - GET /auth/signin - Sign-in page
/// - GET /auth/signin/:provider - Redirect to the provider
/// - GET /auth/callback/:provider - OAuth callback
/// - GET /auth/error - Failed sign-in page
/// - POST /auth/signout - Sign out
/// - GET /api/auth/session - Current session as JSON
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route(SIGN_IN_PATH, get(signin_page))
        .route("/auth/signin/:provider", get(provider_redirect))
        .route("/auth/callback/:provider", get(provider_callback))
        .route("/auth/error", get(error_page))
        .route("/auth/signout", post(signout))
        .route("/api/auth/session", get(session_info))
}

// =============================================================================
// Pages
// =============================================================================

/// GET /auth/signin
async fn signin_page(State(state): State<AppState>) -> impl IntoResponse {
    let provider = state.provider.id();
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Sign in</title></head>
<body>
    <h1>Sign in</h1>
    <a href="/auth/signin/{provider}">Sign in with {label}</a>
</body>
</html>"#,
        provider = provider,
        label = provider_label(provider),
    ))
}

#[derive(Debug, Deserialize)]
struct ErrorQuery {
    error: Option<String>,
}

/// GET /auth/error
async fn error_page(Query(query): Query<ErrorQuery>) -> impl IntoResponse {
    let code = query.error.unwrap_or_else(|| "Default".to_string());
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Sign-in failed</title></head>
<body>
    <h1>Sign-in failed</h1>
    <p>Error: <code>{}</code></p>
    <a href="{}">Try again</a>
</body>
</html>"#,
        html_escape::encode_text(&code),
        SIGN_IN_PATH,
    ))
}

fn provider_label(provider: &str) -> String {
    let mut chars = provider.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// Provider redirect
// =============================================================================

/// GET /auth/signin/:provider
///
/// # Steps
/// 1. Generate CSRF state and PKCE verifier
/// 2. Store both in short-lived cookies scoped to /auth
/// 3. Redirect to the provider with the S256 challenge
async fn provider_redirect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if provider != state.provider.id() {
        return Err(AppError::NotFound);
    }

    let csrf_state = generate_csrf_state();
    let verifier = generate_code_verifier();
    let location = state.provider.authorization_url(
        &callback_url(&state),
        &csrf_state,
        &code_challenge(&verifier),
    );
    tracing::debug!(provider = %provider, "Redirecting to identity provider");

    let secure = state.config.should_use_secure_cookies();
    let jar = jar
        .add(flow_cookie(STATE_COOKIE, csrf_state, secure))
        .add(flow_cookie(PKCE_COOKIE, verifier, secure));

    Ok((jar, Redirect::to(&location)))
}

fn callback_url(state: &AppState) -> String {
    format!(
        "{}/auth/callback/{}",
        state.config.server.base_url(),
        state.provider.id()
    )
}

// =============================================================================
// Callback
// =============================================================================

/// Query parameters from the provider callback
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Failure reasons surfaced on /auth/error
#[derive(Debug)]
enum CallbackFailure {
    AccessDenied,
    InvalidCheck,
    Provider(AppError),
}

impl CallbackFailure {
    fn code(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::InvalidCheck => "InvalidCheck",
            Self::Provider(AppError::AccountNotLinked) => "OAuthAccountNotLinked",
            Self::Provider(AppError::IdentityProvider(_) | AppError::HttpClient(_)) => {
                "OAuthCallbackError"
            }
            Self::Provider(_) => "CallbackRouteError",
        }
    }
}

/// GET /auth/callback/:provider
///
/// # Steps
/// 1. Verify CSRF state against the cookie
/// 2. Exchange code for profile and tokens
/// 3. Find or create the user and linked account
/// 4. Create session, set cookie, redirect home
///
/// Every failure ends on /auth/error; nothing is retried.
async fn provider_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if provider != state.provider.id() {
        return Err(AppError::NotFound);
    }

    let expected_state = jar.get(STATE_COOKIE).map(|c| c.value().to_owned());
    let verifier = jar.get(PKCE_COOKIE).map(|c| c.value().to_owned());
    let jar = jar
        .remove(clear_flow_cookie(STATE_COOKIE))
        .remove(clear_flow_cookie(PKCE_COOKIE));

    let outcome = handle_callback(&state, query, expected_state, verifier).await;

    match outcome {
        Ok((user, session)) => {
            SIGN_INS_TOTAL
                .with_label_values(&[state.provider.id(), "success"])
                .inc();
            tracing::info!(user_id = %user.id, provider = %provider, "Signed in");

            let cookie = session_cookie(
                session.session_token,
                session.expires,
                state.config.should_use_secure_cookies(),
            );
            Ok((jar.add(cookie), Redirect::to("/")).into_response())
        }
        Err(failure) => {
            SIGN_INS_TOTAL
                .with_label_values(&[state.provider.id(), "failure"])
                .inc();
            let code = failure.code();
            match &failure {
                CallbackFailure::Provider(error) => {
                    tracing::warn!(%error, code, provider = %provider, "Sign-in failed")
                }
                _ => tracing::warn!(code, provider = %provider, "Sign-in rejected"),
            }

            let location = format!("/auth/error?error={}", urlencoding::encode(code));
            Ok((jar, Redirect::to(&location)).into_response())
        }
    }
}

async fn handle_callback(
    state: &AppState,
    query: CallbackQuery,
    expected_state: Option<String>,
    verifier: Option<String>,
) -> Result<(User, Session), CallbackFailure> {
    if let Some(error) = query.error {
        return Err(if error == "access_denied" {
            CallbackFailure::AccessDenied
        } else {
            CallbackFailure::Provider(AppError::IdentityProvider(error))
        });
    }

    verify_csrf_state(query.state.as_deref(), expected_state.as_deref())?;
    let (Some(code), Some(verifier)) = (query.code, verifier) else {
        return Err(CallbackFailure::InvalidCheck);
    };

    let sign_in = state
        .provider
        .exchange_code(&code, &verifier, &callback_url(state))
        .await
        .map_err(CallbackFailure::Provider)?;

    complete_sign_in(
        state.adapter.as_ref(),
        state.provider.as_ref(),
        sign_in,
        &state.config.auth,
    )
    .await
    .map_err(CallbackFailure::Provider)
}

/// Persist the outcome of a provider exchange and open a session.
///
/// 1. Known `(provider, provider_account_id)`: reuse its user and refresh the
///    stored tokens.
/// 2. Unknown account whose email belongs to an existing user:
///    `AppError::AccountNotLinked`.
/// 3. Otherwise create the user and link the account.
///
/// A user created in step 3 is deleted again if linking the account fails.
pub async fn complete_sign_in(
    adapter: &dyn AuthAdapter,
    provider: &dyn IdentityProvider,
    sign_in: ProviderSignIn,
    config: &AuthConfig,
) -> Result<(User, Session), AppError> {
    let ProviderSignIn { profile, tokens } = sign_in;
    let account = Account {
        user_id: String::new(),
        account_type: provider.account_type(),
        provider: provider.id().to_string(),
        provider_account_id: profile.provider_account_id.clone(),
        refresh_token: tokens.refresh_token,
        access_token: tokens.access_token,
        expires_at: tokens.expires_at,
        token_type: tokens.token_type,
        scope: tokens.scope,
        id_token: tokens.id_token,
        session_state: None,
    };

    let user = match adapter
        .get_user_by_account(&account.provider, &account.provider_account_id)
        .await?
    {
        Some(user) => {
            adapter
                .update_account(&Account {
                    user_id: user.id.clone(),
                    ..account
                })
                .await?;
            tracing::debug!(user_id = %user.id, "Existing account signed in");
            user
        }
        None => {
            if let Some(email) = profile.email.as_deref() {
                if adapter.get_user_by_email(email).await?.is_some() {
                    return Err(AppError::AccountNotLinked);
                }
            }

            let user = adapter
                .create_user(NewUser {
                    name: profile.name,
                    email: profile.email,
                    email_verified: profile.email_verified.then(Utc::now),
                    image: profile.image,
                })
                .await?;
            let linked = adapter
                .link_account(Account {
                    user_id: user.id.clone(),
                    ..account
                })
                .await;
            if let Err(error) = linked {
                // An unlinked user holding this email would block every retry
                if let Err(cleanup) = adapter.delete_user(&user.id).await {
                    tracing::error!(%cleanup, user_id = %user.id, "Failed to remove unlinked user");
                }
                return Err(error);
            }
            user
        }
    };

    let session = adapter.create_session(new_session(&user.id, config)).await?;
    Ok((user, session))
}

// =============================================================================
// Sign out / session
// =============================================================================

/// POST /auth/signout
///
/// Deletes the session row, clears the cookie, redirects to sign-in.
async fn signout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = extract_session_token(&headers) {
        state.adapter.delete_session(&token).await?;
    }

    Ok((jar.remove(clear_session_cookie()), Redirect::to(SIGN_IN_PATH)))
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    user: User,
    expires: DateTime<Utc>,
}

/// GET /api/auth/session
///
/// `null` when there is no valid session.
async fn session_info(MaybeUser(resolved): MaybeUser) -> Json<Option<SessionResponse>> {
    Json(resolved.map(|resolved| SessionResponse {
        expires: resolved.session.expires,
        user: resolved.user,
    }))
}

// =============================================================================
// Helpers
// =============================================================================

/// Generate a random CSRF state token
fn generate_csrf_state() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Verify CSRF state from the callback matches the cookie
fn verify_csrf_state(
    received: Option<&str>,
    expected: Option<&str>,
) -> Result<(), CallbackFailure> {
    match (received, expected) {
        (Some(received), Some(expected)) if !expected.is_empty() && received == expected => Ok(()),
        _ => Err(CallbackFailure::InvalidCheck),
    }
}

fn flow_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(FLOW_COOKIE_PATH)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn clear_flow_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path(FLOW_COOKIE_PATH).build();
    cookie.make_removal();
    cookie
}
