use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::auth::dto::{LoginRequest, SignupRequest, UpdateProfileRequest};
use crate::auth::error::AuthError;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo::{StoreError, UserStore};
use crate::auth::repo_types::{NewUser, User, UserPatch};
use crate::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Legacy address pattern carried over from the first version of the site.
/// It rejects TLDs longer than three characters; kept as-is because clients
/// were built against exactly this behavior.
pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Create an account. The duplicate pre-check gives a fast, friendly error;
/// the store's unique index is what actually guarantees uniqueness under
/// concurrent signups, so a constraint violation from `create` maps to the
/// same `DuplicateEmail`.
pub async fn signup(state: &AppState, payload: SignupRequest) -> Result<User, AuthError> {
    let email = normalize_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(email = %email, "signup with invalid email");
        return Err(AuthError::Validation("Invalid email format".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("signup with short password");
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.store.find_by_email(&email, None).await?.is_some() {
        warn!(email = %email, "signup with registered email");
        return Err(AuthError::DuplicateEmail);
    }

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .store
        .create(NewUser {
            email,
            password_hash,
            name: payload.name,
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok(user)
}

/// Verify credentials. Unknown email and wrong password are deliberately
/// indistinguishable to the caller.
pub async fn login(state: &AppState, payload: LoginRequest) -> Result<User, AuthError> {
    let email = normalize_email(&payload.email);

    let user = match state.store.find_by_email(&email, None).await? {
        Some(u) => u,
        None => {
            warn!(email = %email, "login with unknown email");
            return Err(AuthError::InvalidCredentials);
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(user)
}

/// Apply a partial profile update for an authenticated user.
pub async fn update_profile(
    state: &AppState,
    user: &User,
    payload: UpdateProfileRequest,
) -> Result<User, AuthError> {
    let email = match payload.email {
        Some(raw) => {
            let email = normalize_email(&raw);
            if !is_valid_email(&email) {
                warn!(user_id = %user.id, "profile update with invalid email");
                return Err(AuthError::Validation("Invalid email format".into()));
            }
            if state
                .store
                .find_by_email(&email, Some(user.id))
                .await?
                .is_some()
            {
                warn!(user_id = %user.id, email = %email, "profile update to taken email");
                return Err(AuthError::DuplicateEmail);
            }
            Some(email)
        }
        None => None,
    };

    let patch = UserPatch {
        name: payload.name,
        email,
    };

    let updated = match state.store.update(user.id, patch).await {
        Ok(Some(u)) => u,
        // The record vanished between session resolution and the write.
        Ok(None) => {
            warn!(user_id = %user.id, "profile update target vanished");
            return Err(AuthError::UserNotFound);
        }
        Err(StoreError::DuplicateEmail) => return Err(AuthError::DuplicateEmail),
        Err(StoreError::Other(e)) => return Err(AuthError::Unexpected(e)),
    };

    info!(user_id = %updated.id, "profile updated");
    Ok(updated)
}
