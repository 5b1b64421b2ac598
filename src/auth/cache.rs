use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::FromRef;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::auth::dto::{LoginRequest, PublicUser, SignupRequest, UpdateProfileRequest};
use crate::auth::error::AuthError;
use crate::auth::jwt::JwtKeys;
use crate::auth::services;
use crate::auth::session::resolve_token;
use crate::state::AppState;

/// What the identity cache currently knows about the caller.
#[derive(Debug, Clone)]
pub enum AuthState {
    Unknown,
    Loading,
    Authenticated(PublicUser),
    Anonymous,
}

/// Seam between the identity cache and the network-facing auth operations.
/// A browser frontend implements this over fetch; `SessionGateway` below
/// binds it straight to the service layer for in-process use.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn check_session(&self) -> anyhow::Result<Option<PublicUser>>;
    async fn signup(&self, req: SignupRequest) -> Result<PublicUser, AuthError>;
    async fn login(&self, req: LoginRequest) -> Result<PublicUser, AuthError>;
    async fn logout(&self) -> anyhow::Result<()>;
    async fn update_profile(&self, req: UpdateProfileRequest) -> Result<PublicUser, AuthError>;
}

/// Process-wide current-user state, shared by everything that renders for one
/// client. Initialized once at boot (`Unknown`), refreshed explicitly, never
/// torn down.
pub struct IdentityCache {
    gateway: Arc<dyn AuthGateway>,
    state: RwLock<AuthState>,
}

impl IdentityCache {
    pub fn new(gateway: Arc<dyn AuthGateway>) -> Self {
        Self {
            gateway,
            state: RwLock::new(AuthState::Unknown),
        }
    }

    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    async fn set(&self, next: AuthState) {
        *self.state.write().await = next;
    }

    /// Re-check the session. A failed check is an anonymous caller, never an
    /// error state.
    pub async fn refresh(&self) {
        self.set(AuthState::Loading).await;
        let next = match self.gateway.check_session().await {
            Ok(Some(user)) => AuthState::Authenticated(user),
            Ok(None) => AuthState::Anonymous,
            Err(e) => {
                debug!(error = %e, "session check failed; treating as anonymous");
                AuthState::Anonymous
            }
        };
        self.set(next).await;
    }

    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<PublicUser, AuthError> {
        let user = self
            .gateway
            .signup(SignupRequest {
                email: email.into(),
                password: password.into(),
                name,
            })
            .await?;
        self.set(AuthState::Authenticated(user.clone())).await;
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<PublicUser, AuthError> {
        let user = self
            .gateway
            .login(LoginRequest {
                email: email.into(),
                password: password.into(),
            })
            .await?;
        self.set(AuthState::Authenticated(user.clone())).await;
        Ok(user)
    }

    /// Best effort: the local transition to `Anonymous` happens even when the
    /// server-side clear fails.
    pub async fn logout(&self) {
        if let Err(e) = self.gateway.logout().await {
            warn!(error = %e, "logout request failed; clearing local session anyway");
        }
        self.set(AuthState::Anonymous).await;
    }

    pub async fn update_profile(
        &self,
        req: UpdateProfileRequest,
    ) -> Result<PublicUser, AuthError> {
        let user = self.gateway.update_profile(req).await?;
        self.set(AuthState::Authenticated(user.clone())).await;
        Ok(user)
    }
}

/// In-process gateway over the service layer. Holds the bearer token where a
/// browser would hold the cookie, so the token codec and session resolver are
/// exercised on every check.
pub struct SessionGateway {
    state: AppState,
    token: Mutex<Option<String>>,
}

impl SessionGateway {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            token: Mutex::new(None),
        }
    }

    fn current_token(&self) -> Option<String> {
        self.token.lock().expect("token lock poisoned").clone()
    }

    fn store_token(&self, token: Option<String>) {
        *self.token.lock().expect("token lock poisoned") = token;
    }

    fn issue(&self, user_id: uuid::Uuid, email: &str) -> Result<String, AuthError> {
        let keys = JwtKeys::from_ref(&self.state);
        Ok(keys.sign(user_id, email)?)
    }
}

#[async_trait]
impl AuthGateway for SessionGateway {
    async fn check_session(&self) -> anyhow::Result<Option<PublicUser>> {
        let Some(token) = self.current_token() else {
            return Ok(None);
        };
        Ok(resolve_token(&self.state, &token).await.map(Into::into))
    }

    async fn signup(&self, req: SignupRequest) -> Result<PublicUser, AuthError> {
        let user = services::signup(&self.state, req).await?;
        let token = self.issue(user.id, &user.email)?;
        self.store_token(Some(token));
        Ok(user.into())
    }

    async fn login(&self, req: LoginRequest) -> Result<PublicUser, AuthError> {
        let user = services::login(&self.state, req).await?;
        let token = self.issue(user.id, &user.email)?;
        self.store_token(Some(token));
        Ok(user.into())
    }

    async fn logout(&self) -> anyhow::Result<()> {
        self.store_token(None);
        Ok(())
    }

    async fn update_profile(&self, req: UpdateProfileRequest) -> Result<PublicUser, AuthError> {
        let Some(token) = self.current_token() else {
            return Err(AuthError::NotAuthenticated);
        };
        let user = resolve_token(&self.state, &token)
            .await
            .ok_or(AuthError::NotAuthenticated)?;
        let updated = services::update_profile(&self.state, &user, req).await?;
        Ok(updated.into())
    }
}
