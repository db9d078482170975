//! Authentication
//!
//! Handles:
//! - OAuth sign-in through an identity provider
//! - Database sessions
//! - The request gate

mod middleware;
mod oauth;
pub mod provider;
pub mod session;

pub use middleware::{
    CurrentUser, GateDecision, MaybeUser, SIGN_IN_PATH, evaluate, is_exempt, is_ungated,
    session_gate,
};
pub use oauth::{auth_router, complete_sign_in};
pub use provider::{GoogleProvider, IdentityProvider, ProviderProfile, ProviderSignIn, ProviderTokens};
pub use session::{ResolvedSession, SESSION_COOKIE, resolve_session};
