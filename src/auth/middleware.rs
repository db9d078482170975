//! Request gate
//!
//! Every request passes through [`session_gate`]. Static assets and probes
//! skip it entirely; the sign-in flow is always reachable; everything else
//! needs a valid session or is redirected to the sign-in page.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, HeaderValue, Request, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use super::session::{
    ResolvedSession, SESSION_COOKIE, extract_session_token, resolve_session, session_cookie,
};
use crate::AppState;
use crate::error::AppError;
use crate::metrics::GATE_DECISIONS_TOTAL;

pub const SIGN_IN_PATH: &str = "/auth/signin";

/// Paths the gate never runs for
const UNGATED_PREFIXES: &[&str] = &[
    "/static",
    "/assets",
    "/favicon.ico",
    "/sitemap.xml",
    "/robots.txt",
    "/health",
    "/metrics",
];

/// Sign-in flow paths, reachable without a session
const EXEMPT_PREFIXES: &[&str] = &["/auth", "/api/auth"];

/// Outcome of the gate for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Redirect(String),
}

impl GateDecision {
    fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Redirect(_) => "redirect",
        }
    }
}

/// `path` equals `prefix` or continues below it as a new segment.
///
/// `/authors` is not under `/auth`.
fn is_under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

pub fn is_ungated(path: &str) -> bool {
    UNGATED_PREFIXES.iter().any(|prefix| is_under(path, prefix))
}

pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PREFIXES.iter().any(|prefix| is_under(path, prefix))
}

/// Decide a gated request.
pub fn evaluate(path: &str, session: Option<&ResolvedSession>) -> GateDecision {
    if is_exempt(path) || session.is_some() {
        GateDecision::Allow
    } else {
        GateDecision::Redirect(SIGN_IN_PATH.to_string())
    }
}

/// Gate middleware
///
/// A valid session is inserted into request extensions for the extractors
/// below. Lookup failures count as "no session". When the lookup extended a
/// cookie-borne session, the cookie is re-issued with the new expiry.
///
/// # Usage
/// ```ignore
/// let app = Router::new()
///     .route("/", get(home))
///     .layer(middleware::from_fn_with_state(state.clone(), session_gate));
/// ```
pub async fn session_gate(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if is_ungated(&path) {
        return next.run(request).await;
    }

    let session = match extract_session_token(request.headers()) {
        Some(token) => {
            match resolve_session(state.adapter.as_ref(), &token, &state.config.auth).await {
                Ok(session) => session,
                Err(error) => {
                    tracing::warn!(%error, path = %path, "Session lookup failed; treating as signed out");
                    None
                }
            }
        }
        None => None,
    };

    let decision = evaluate(&path, session.as_ref());
    GATE_DECISIONS_TOTAL
        .with_label_values(&[decision.label()])
        .inc();

    match decision {
        GateDecision::Allow => {
            let refreshed_cookie = session
                .as_ref()
                .filter(|resolved| {
                    resolved.extended && carries_session_cookie(request.headers(), resolved)
                })
                .map(|resolved| {
                    session_cookie(
                        resolved.session.session_token.clone(),
                        resolved.session.expires,
                        state.config.should_use_secure_cookies(),
                    )
                });
            if let Some(session) = session {
                request.extensions_mut().insert(session);
            }

            let mut response = next.run(request).await;
            if let Some(cookie) = refreshed_cookie {
                match HeaderValue::from_str(&cookie.to_string()) {
                    Ok(value) => {
                        response.headers_mut().append(header::SET_COOKIE, value);
                    }
                    Err(error) => tracing::warn!(%error, "Could not re-issue session cookie"),
                }
            }
            response
        }
        GateDecision::Redirect(location) => {
            tracing::debug!(path = %path, "No session, redirecting to sign-in");
            Redirect::temporary(&location).into_response()
        }
    }
}

/// Bearer-authenticated clients never get a cookie they did not send
fn carries_session_cookie(headers: &HeaderMap, resolved: &ResolvedSession) -> bool {
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .is_some_and(|cookie| cookie.value() == resolved.session.session_token)
}

async fn lookup(parts: &Parts, state: &AppState) -> Result<Option<ResolvedSession>, AppError> {
    match extract_session_token(&parts.headers) {
        Some(token) => resolve_session(state.adapter.as_ref(), &token, &state.config.auth).await,
        None => Ok(None),
    }
}

/// Extractor for the signed-in user
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(resolved): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", resolved.user.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub ResolvedSession);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(resolved) = parts.extensions.get::<ResolvedSession>().cloned() {
            return Ok(CurrentUser(resolved));
        }

        let state = AppState::from_ref(state);
        let resolved = lookup(parts, &state).await?.ok_or(AppError::Unauthorized)?;
        parts.extensions.insert(resolved.clone());

        Ok(CurrentUser(resolved))
    }
}

/// Optional signed-in user
///
/// `None` instead of a rejection when there is no valid session.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<ResolvedSession>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(resolved) = parts.extensions.get::<ResolvedSession>().cloned() {
            return Ok(MaybeUser(Some(resolved)));
        }

        let state = AppState::from_ref(state);
        let resolved = lookup(parts, &state).await.ok().flatten();
        if let Some(resolved) = &resolved {
            parts.extensions.insert(resolved.clone());
        }

        Ok(MaybeUser(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Session, User};
    use chrono::{Duration, Utc};

    fn resolved() -> ResolvedSession {
        ResolvedSession {
            user: User {
                id: "01USER".to_string(),
                name: None,
                email: None,
                email_verified: None,
                image: None,
            },
            session: Session {
                session_token: "token".to_string(),
                user_id: "01USER".to_string(),
                expires: Utc::now() + Duration::hours(1),
            },
            extended: false,
        }
    }

    #[test]
    fn assets_and_probes_skip_the_gate() {
        for path in [
            "/static/app.css",
            "/assets/logo.svg",
            "/favicon.ico",
            "/sitemap.xml",
            "/robots.txt",
            "/health",
            "/metrics",
        ] {
            assert!(is_ungated(path), "{path} should be ungated");
        }
        assert!(!is_ungated("/"));
        assert!(!is_ungated("/statistics"));
        assert!(!is_ungated("/api/me"));
    }

    #[test]
    fn exemption_respects_segment_boundaries() {
        assert!(is_exempt("/auth"));
        assert!(is_exempt("/auth/signin"));
        assert!(is_exempt("/auth/callback/google"));
        assert!(is_exempt("/api/auth/session"));
        assert!(!is_exempt("/authors"));
        assert!(!is_exempt("/api/authority"));
        assert!(!is_exempt("/api/me"));
    }

    #[test]
    fn gated_path_without_session_redirects_to_sign_in() {
        assert_eq!(
            evaluate("/dashboard", None),
            GateDecision::Redirect(SIGN_IN_PATH.to_string())
        );
        assert_eq!(
            evaluate("/", None),
            GateDecision::Redirect(SIGN_IN_PATH.to_string())
        );
    }

    #[test]
    fn gated_path_with_session_is_allowed() {
        assert_eq!(evaluate("/dashboard", Some(&resolved())), GateDecision::Allow);
    }

    #[test]
    fn exempt_path_is_allowed_either_way() {
        assert_eq!(evaluate("/auth/signin", None), GateDecision::Allow);
        assert_eq!(evaluate("/auth/signin", Some(&resolved())), GateDecision::Allow);
        assert_eq!(evaluate("/api/auth/session", None), GateDecision::Allow);
    }
}
