//! Session management
//!
//! Sessions are database rows keyed by an opaque random token. The token
//! travels in a cookie (or a bearer header) and is looked up on every
//! gated request.

use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use time::OffsetDateTime;

use crate::adapter::AuthAdapter;
use crate::config::AuthConfig;
use crate::data::{Session, User};
use crate::error::AppError;

pub const SESSION_COOKIE: &str = "authgate.session-token";

/// A valid, unexpired session together with its user
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub user: User,
    pub session: Session,
    /// Expiry was pushed forward during this lookup
    pub extended: bool,
}

/// Generate a random session token (32 bytes, base64url)
pub fn generate_session_token() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build a fresh session row for `user_id`
pub fn new_session(user_id: &str, config: &AuthConfig) -> Session {
    Session {
        session_token: generate_session_token(),
        user_id: user_id.to_string(),
        expires: Utc::now() + Duration::seconds(config.session_max_age),
    }
}

/// Read the session token from the `Authorization: Bearer` header or the
/// session cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            jar.get(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_owned())
        })
        .filter(|token| !token.is_empty())
}

/// Look up a session token and decide whether it is usable.
///
/// - Unknown token: `None`.
/// - Expired session: the row is deleted and `None` is returned.
/// - Session past its update age: expiry is pushed to `now + max_age`.
///   If the row disappears before the update lands, `None`.
pub async fn resolve_session(
    adapter: &dyn AuthAdapter,
    session_token: &str,
    config: &AuthConfig,
) -> Result<Option<ResolvedSession>, AppError> {
    let Some((mut session, user)) = adapter.get_session_and_user(session_token).await? else {
        return Ok(None);
    };

    if session.is_expired() {
        tracing::debug!(user_id = %user.id, "Expired session removed on lookup");
        adapter.delete_session(session_token).await?;
        return Ok(None);
    }

    let now = Utc::now();
    let refresh_after =
        session.expires - Duration::seconds(config.session_max_age - config.session_update_age);
    let extended = now >= refresh_after;
    if extended {
        let expires = now + Duration::seconds(config.session_max_age);
        let Some(updated) = adapter.update_session(session_token, expires).await? else {
            tracing::debug!(user_id = %user.id, "Session removed during extension");
            return Ok(None);
        };
        tracing::debug!(user_id = %user.id, expires = %updated.expires, "Session extended");
        session = updated;
    }

    Ok(Some(ResolvedSession {
        user,
        session,
        extended,
    }))
}

/// Session cookie carrying `token`, expiring with the session row
pub fn session_cookie(token: String, expires: DateTime<Utc>, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .expires(OffsetDateTime::from_unix_timestamp(expires.timestamp()).ok())
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Removal cookie for the session
pub fn clear_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie
}
