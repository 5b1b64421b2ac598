use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use tracing::instrument;

use crate::auth::{
    dto::{
        AuthResponse, LoginRequest, OkResponse, SessionResponse, SignupRequest,
        UpdateProfileRequest,
    },
    error::AuthError,
    jwt::JwtKeys,
    services,
    session::{clear_session_cookie, session_cookie, CurrentUser, RequireUser},
};
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/session", get(session))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/update-profile", put(update_profile))
}

/// Session check never errors: any resolution failure is an anonymous caller.
#[instrument(skip_all)]
pub async fn session(CurrentUser(user): CurrentUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        user: user.map(Into::into),
    })
}

#[instrument(skip(state, jar, payload))]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AuthError> {
    let user = services::signup(&state, payload).await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, &user.email)?;
    let jar = jar.add(session_cookie(token, keys.session_ttl));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            success: true,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let user = services::login(&state, payload).await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, &user.email)?;
    let jar = jar.add(session_cookie(token, keys.session_ttl));

    Ok((
        jar,
        Json(AuthResponse {
            success: true,
            user: user.into(),
        }),
    ))
}

/// Logout cannot fail; it only clears the cookie.
#[instrument(skip_all)]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<OkResponse>) {
    let jar = jar.add(clear_session_cookie());
    (jar, Json(OkResponse { success: true }))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let updated = services::update_profile(&state, &user, payload).await?;
    Ok(Json(AuthResponse {
        success: true,
        user: updated.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::SESSION_COOKIE;

    fn signup_req(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            email: email.into(),
            password: password.into(),
            name: None,
        }
    }

    #[tokio::test]
    async fn signup_sets_the_session_cookie() {
        let state = AppState::fake();
        let (status, jar, Json(body)) = signup(
            State(state),
            CookieJar::new(),
            Json(signup_req("new@test.com", "abc123")),
        )
        .await
        .expect("signup should succeed");

        assert_eq!(status, StatusCode::CREATED);
        assert!(body.success);
        assert_eq!(body.user.email, "new@test.com");
        let cookie = jar.get(SESSION_COOKIE).expect("session cookie set");
        assert!(!cookie.value().is_empty());
    }

    #[tokio::test]
    async fn login_reissues_the_session_cookie() {
        let state = AppState::fake();
        signup(
            State(state.clone()),
            CookieJar::new(),
            Json(signup_req("l@test.com", "abc123")),
        )
        .await
        .expect("signup should succeed");

        let (jar, Json(body)) = login(
            State(state),
            CookieJar::new(),
            Json(LoginRequest {
                email: "L@Test.com".into(),
                password: "abc123".into(),
            }),
        )
        .await
        .expect("login should succeed");

        assert!(body.success);
        assert!(jar.get(SESSION_COOKIE).is_some());
    }

    #[tokio::test]
    async fn logout_clears_the_cookie_unconditionally() {
        let (jar, Json(body)) = logout(CookieJar::new()).await;
        assert!(body.success);
        let cookie = jar.get(SESSION_COOKIE).expect("clearing cookie present");
        assert_eq!(cookie.value(), "");
    }

    #[tokio::test]
    async fn session_check_reports_anonymous_as_null() {
        let Json(body) = session(CurrentUser(None)).await;
        assert!(body.user.is_none());
    }

    #[tokio::test]
    async fn update_profile_returns_the_public_projection() {
        let state = AppState::fake();
        let user = services::signup(&state, signup_req("u@test.com", "abc123"))
            .await
            .expect("signup should succeed");

        let Json(body) = update_profile(
            State(state),
            RequireUser(user),
            Json(UpdateProfileRequest {
                name: Some("Updated".into()),
                email: None,
            }),
        )
        .await
        .expect("update should succeed");

        assert!(body.success);
        assert_eq!(body.user.name.as_deref(), Some("Updated"));
        let json = serde_json::to_string(&body.user).expect("serialize");
        assert!(!json.contains("password"));
    }
}
