use std::convert::Infallible;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{debug, warn};

use crate::auth::error::AuthError;
use crate::auth::jwt::JwtKeys;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::User;
use crate::state::AppState;

/// Cookie holding the signed session claim. HTTP-only; the token never
/// appears in a response body.
pub const SESSION_COOKIE: &str = "auth-token";

pub fn session_cookie(token: String, ttl: Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(ttl.as_secs() as i64))
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

/// Resolve a bearer token to a live user. Every failure collapses to `None`
/// so an invalid session degrades to "logged out" instead of an error; the
/// log line keeps the reason visible.
pub async fn resolve_token(state: &AppState, token: &str) -> Option<User> {
    let keys = JwtKeys::from_ref(state);
    let claims = match keys.verify(token) {
        Ok(c) => c,
        Err(e) => {
            debug!(reason = %e, "session token rejected");
            return None;
        }
    };
    match state.store.find_by_id(claims.sub).await {
        Ok(Some(user)) => Some(user),
        Ok(None) => {
            debug!(user_id = %claims.sub, "session user no longer exists");
            None
        }
        Err(e) => {
            warn!(error = %e, "user lookup failed during session resolution");
            None
        }
    }
}

pub async fn resolve_identity(state: &AppState, jar: &CookieJar) -> Option<User> {
    let cookie = jar.get(SESSION_COOKIE)?;
    resolve_token(state, cookie.value()).await
}

/// The caller's identity, if any. Never rejects.
pub struct CurrentUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(CurrentUser(resolve_identity(state, &jar).await))
    }
}

/// The caller's identity, required. Rejects anonymous callers with 401.
pub struct RequireUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        resolve_identity(state, &jar)
            .await
            .map(RequireUser)
            .ok_or(AuthError::NotAuthenticated)
    }
}
