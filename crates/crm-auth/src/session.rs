use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::errors::{ClientError, Result};
use crate::interceptor::Navigator;
use crate::models::{AuthGrant, LoginRequest, RegisterRequest, User};
use crate::service::AuthService;
use crate::store::{TokenSlot, TokenStore};

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// Snapshot of the session as seen by the UI layer
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    phase: SessionPhase,
    user: Option<User>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    is_loading: bool,
    error: Option<String>,
}

impl SessionState {
    fn authenticated(user: User, access_token: String, refresh_token: String) -> Self {
        Self {
            phase: SessionPhase::Authenticated,
            user: Some(user),
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            is_loading: false,
            error: None,
        }
    }

    fn unauthenticated() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// True exactly when a user and an access token are both held
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.access_token.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("phase", &self.phase)
            .field("user", &self.user.as_ref().map(|u| &u.username))
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("is_loading", &self.is_loading)
            .field("error", &self.error)
            .finish()
    }
}

/// Owns the session of one client and keeps it in step with the token store.
///
/// State changes are published on a watch channel; use [`Self::subscribe`]
/// to follow them or [`Self::state`] for a snapshot.
pub struct SessionContext {
    service: AuthService,
    store: Arc<dyn TokenStore>,
    state: watch::Sender<SessionState>,
}

impl SessionContext {
    pub fn new(service: AuthService, store: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self::with_state(service, store, state)
    }

    /// Build on a channel that others may already hold a sender for
    pub(crate) fn with_state(
        service: AuthService,
        store: Arc<dyn TokenStore>,
        state: watch::Sender<SessionState>,
    ) -> Self {
        Self {
            service,
            store,
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn service(&self) -> &AuthService {
        &self.service
    }

    /// Restore a persisted session, if the backend still accepts it.
    ///
    /// Only the first call does any work; later calls return the phase
    /// already reached.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> SessionPhase {
        let claimed = self.state.send_if_modified(|state| {
            if state.phase != SessionPhase::Uninitialized {
                return false;
            }
            state.phase = SessionPhase::Initializing;
            state.is_loading = true;
            true
        });
        if !claimed {
            return self.state.borrow().phase;
        }

        let next = match self.restore().await {
            Some(state) => {
                info!(
                    "Restored session for {}",
                    state.user.as_ref().map(|u| u.username.as_str()).unwrap_or_default()
                );
                state
            }
            None => {
                self.clear_store().await;
                SessionState::unauthenticated()
            }
        };

        let phase = next.phase;
        self.state.send_replace(next);
        phase
    }

    async fn restore(&self) -> Option<SessionState> {
        let access_token = self.store.get(TokenSlot::AccessToken).await;
        let refresh_token = self.store.get(TokenSlot::RefreshToken).await;
        let user_json = self.store.get(TokenSlot::User).await;

        let (Some(_), Some(_), Some(user_json)) = (access_token, refresh_token, user_json) else {
            debug!("No complete session in token store");
            return None;
        };

        let user: User = match serde_json::from_str(&user_json) {
            Ok(user) => user,
            Err(e) => {
                warn!("Stored user is unreadable: {}", e);
                return None;
            }
        };

        if !self.service.validate_token().await {
            info!("Stored session is no longer valid");
            return None;
        }

        // Validation may have refreshed the access token on the way
        let access_token = self.store.get(TokenSlot::AccessToken).await?;
        let refresh_token = self.store.get(TokenSlot::RefreshToken).await?;
        Some(SessionState::authenticated(user, access_token, refresh_token))
    }

    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &LoginRequest) -> Result<User> {
        self.begin_loading();
        let outcome = match self.service.login(credentials).await {
            Ok(grant) => self.establish(grant).await,
            Err(e) => Err(e),
        };
        self.settle(outcome)
    }

    #[instrument(skip(self, profile), fields(username = %profile.username))]
    pub async fn register(&self, profile: &RegisterRequest) -> Result<User> {
        self.begin_loading();
        let outcome = match self.service.register(profile).await {
            Ok(grant) => self.establish(grant).await,
            Err(e) => Err(e),
        };
        self.settle(outcome)
    }

    /// End the session locally. No request is made.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.state.send_replace(SessionState::unauthenticated());
        self.clear_store().await;
        info!("Logged out");
    }

    /// Explicitly renew the access token and re-read the profile.
    ///
    /// Any failure ends the session; the error is still returned so the
    /// caller can report it.
    #[instrument(skip(self))]
    pub async fn refresh_auth(&self) -> Result<User> {
        let Some(refresh_token) = self.store.get(TokenSlot::RefreshToken).await else {
            self.logout().await;
            return Err(ClientError::MissingRefreshToken);
        };

        self.begin_loading();
        match self.renew(refresh_token).await {
            Ok(user) => {
                info!("Session refreshed");
                Ok(user)
            }
            Err(e) => {
                warn!("Session refresh failed: {}", e);
                self.logout().await;
                Err(e)
            }
        }
    }

    async fn renew(&self, refresh_token: String) -> Result<User> {
        let refreshed = self.service.refresh_token(&refresh_token).await?;
        self.store
            .set(TokenSlot::AccessToken, &refreshed.token)
            .await?;

        let user = self.service.get_profile().await?;
        self.store
            .set(TokenSlot::User, &serde_json::to_string(&user)?)
            .await?;

        // The profile call may itself have refreshed again
        let access_token = self
            .store
            .get(TokenSlot::AccessToken)
            .await
            .unwrap_or(refreshed.token);
        self.state.send_replace(SessionState::authenticated(
            user.clone(),
            access_token,
            refresh_token,
        ));
        Ok(user)
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    async fn establish(&self, grant: AuthGrant) -> Result<User> {
        self.store
            .set(TokenSlot::AccessToken, &grant.access_token)
            .await?;
        self.store
            .set(TokenSlot::RefreshToken, &grant.refresh_token)
            .await?;
        self.store
            .set(TokenSlot::User, &serde_json::to_string(&grant.user)?)
            .await?;

        let user = grant.user.clone();
        self.state.send_replace(SessionState::authenticated(
            grant.user,
            grant.access_token,
            grant.refresh_token,
        ));
        Ok(user)
    }

    fn begin_loading(&self) {
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });
    }

    /// Finish a login or registration attempt; on failure the session
    /// keeps its previous phase and records the message.
    fn settle(&self, outcome: Result<User>) -> Result<User> {
        if let Err(e) = &outcome {
            let message = e.user_message();
            self.state.send_modify(|state| {
                state.is_loading = false;
                state.error = Some(message);
            });
        }
        outcome
    }

    async fn clear_store(&self) {
        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear token store: {}", e);
        }
    }
}

/// Ends the in-memory session before handing the route to the wrapped
/// navigator
pub(crate) struct SessionTeardown {
    state: watch::Sender<SessionState>,
    inner: Arc<dyn Navigator>,
}

impl SessionTeardown {
    pub(crate) fn new(state: watch::Sender<SessionState>, inner: Arc<dyn Navigator>) -> Self {
        Self { state, inner }
    }
}

impl Navigator for SessionTeardown {
    fn navigate(&self, route: &str) {
        let was = self.state.send_replace(SessionState::unauthenticated());
        if was.is_authenticated() {
            info!("Session ended after token refresh failed");
        }
        self.inner.navigate(route);
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("service", &self.service)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::CrmConfig;
    use crate::http::{HttpClient, Transport};
    use crate::interceptor::{AuthInterceptor, NoopNavigator};
    use crate::store::MemoryTokenStore;

    fn context(server: &MockServer, store: &MemoryTokenStore) -> SessionContext {
        let url = Url::parse(&server.uri()).unwrap();
        let config = CrmConfig::hosted(url.clone(), url.clone());
        let store: Arc<dyn TokenStore> = Arc::new(store.clone());

        let interceptor = AuthInterceptor::new(
            store.clone(),
            Transport::new(url.clone(), &config).unwrap(),
            Arc::new(NoopNavigator),
            config.login_route.clone(),
        );
        let http = HttpClient::new(url, &config)
            .unwrap()
            .with_interceptor(Arc::new(interceptor));

        SessionContext::new(AuthService::new(http), store)
    }

    fn alice() -> serde_json::Value {
        json!({
            "id": 1,
            "username": "alice",
            "email": "alice@example.com",
            "firstName": "Alice",
            "lastName": "Liddell",
            "primaryRole": "SALES_REP",
            "roles": ["SALES_REP"],
            "enabled": true
        })
    }

    async fn mount_login(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({ "username": "alice", "password": "secret123" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "T1",
                "refreshToken": "R1",
                "user": alice()
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    async fn seed(store: &MemoryTokenStore, user: &str) {
        store.set(TokenSlot::AccessToken, "T1").await.unwrap();
        store.set(TokenSlot::RefreshToken, "R1").await.unwrap();
        store.set(TokenSlot::User, user).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_authenticates_and_persists() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        let store = MemoryTokenStore::new();
        let session = context(&server, &store);

        let user = session
            .login(&LoginRequest::new("alice", "secret123"))
            .await
            .unwrap();
        assert_eq!(user.username, "alice");

        let state = session.state();
        assert!(state.is_authenticated());
        assert_eq!(state.phase(), SessionPhase::Authenticated);
        assert_eq!(state.access_token(), Some("T1"));
        assert!(!state.is_loading());
        assert_eq!(state.error(), None);

        assert_eq!(store.get(TokenSlot::AccessToken).await.as_deref(), Some("T1"));
        assert_eq!(store.get(TokenSlot::RefreshToken).await.as_deref(), Some("R1"));
        let stored: User =
            serde_json::from_str(&store.get(TokenSlot::User).await.unwrap()).unwrap();
        assert_eq!(stored.id, 1);
    }

    #[tokio::test]
    async fn test_failed_login_records_error_and_reraises() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "Invalid username or password"
            })))
            .mount(&server)
            .await;
        let store = MemoryTokenStore::new();
        let session = context(&server, &store);

        let err = session
            .login(&LoginRequest::new("alice", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthFailure { .. }));

        let state = session.state();
        assert!(!state.is_authenticated());
        assert!(!state.is_loading());
        assert_eq!(state.error(), Some("Invalid username or password"));
        assert!(store.is_empty());

        session.clear_error();
        assert_eq!(session.state().error(), None);
    }

    #[tokio::test]
    async fn test_register_mismatch_is_rejected_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let store = MemoryTokenStore::new();
        let session = context(&server, &store);

        let profile = RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "secret123".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            roles: None,
            confirm_password: Some("secret321".to_string()),
        };

        let err = session.register(&profile).await.unwrap_err();
        assert!(matches!(err, ClientError::ValidationFailure { .. }));
        assert_eq!(session.state().error(), Some("Passwords do not match"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_register_authenticates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "message": "User registered successfully",
                "user": alice(),
                "primaryRole": "SALES_REP",
                "roles": ["SALES_REP"],
                "token": "T1",
                "refreshToken": "R1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let store = MemoryTokenStore::new();
        let session = context(&server, &store);

        let profile = RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "secret123".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            roles: None,
            confirm_password: None,
        };

        session.register(&profile).await.unwrap();
        assert!(session.is_authenticated());
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_logout_after_login_clears_everything() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        let store = MemoryTokenStore::new();
        let session = context(&server, &store);
        let mut changes = session.subscribe();

        session
            .login(&LoginRequest::new("alice", "secret123"))
            .await
            .unwrap();
        session.logout().await;

        assert!(changes.has_changed().unwrap());
        let state = changes.borrow_and_update().clone();
        assert_eq!(state.phase(), SessionPhase::Unauthenticated);
        assert!(!state.is_authenticated());
        for slot in TokenSlot::ALL {
            assert_eq!(store.get(slot).await, None);
        }
    }

    #[tokio::test]
    async fn test_initialize_restores_without_logging_in() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/auth/validate"))
            .and(header("authorization", "Bearer T1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .expect(1)
            .mount(&server)
            .await;
        let store = MemoryTokenStore::new();

        let first = context(&server, &store);
        first
            .login(&LoginRequest::new("alice", "secret123"))
            .await
            .unwrap();
        let before = first.state();

        // A fresh context over the same store stands in for a reload
        let reloaded = context(&server, &store);
        assert_eq!(reloaded.initialize().await, SessionPhase::Authenticated);
        assert_eq!(reloaded.state(), before);

        // Runs once
        assert_eq!(reloaded.initialize().await, SessionPhase::Authenticated);
    }

    #[tokio::test]
    async fn test_initialize_clears_rejected_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(false)))
            .expect(1)
            .mount(&server)
            .await;
        let store = MemoryTokenStore::new();
        seed(&store, &alice().to_string()).await;

        let session = context(&server, &store);
        assert_eq!(session.initialize().await, SessionPhase::Unauthenticated);
        assert!(store.is_empty());
        assert!(!session.state().is_loading());
    }

    #[tokio::test]
    async fn test_initialize_clears_unreadable_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .expect(0)
            .mount(&server)
            .await;
        let store = MemoryTokenStore::new();
        seed(&store, "{not json").await;

        let session = context(&server, &store);
        assert_eq!(session.initialize().await, SessionPhase::Unauthenticated);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_with_partial_store() {
        let server = MockServer::start().await;
        let store = MemoryTokenStore::new();
        store.set(TokenSlot::AccessToken, "T1").await.unwrap();

        let session = context(&server, &store);
        assert_eq!(session.initialize().await, SessionPhase::Unauthenticated);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_auth_updates_token_and_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(json!({ "refreshToken": "R1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "T2" })))
            .expect(1)
            .mount(&server)
            .await;
        let mut renamed = alice();
        renamed["firstName"] = json!("Alicia");
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .and(header("authorization", "Bearer T2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(renamed))
            .expect(1)
            .mount(&server)
            .await;
        let store = MemoryTokenStore::new();
        seed(&store, &alice().to_string()).await;

        let session = context(&server, &store);
        let user = session.refresh_auth().await.unwrap();

        assert_eq!(user.first_name, "Alicia");
        let state = session.state();
        assert!(state.is_authenticated());
        assert_eq!(state.access_token(), Some("T2"));
        assert_eq!(state.refresh_token(), Some("R1"));
        assert_eq!(store.get(TokenSlot::AccessToken).await.as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_refresh_auth_without_token_logs_out() {
        let server = MockServer::start().await;
        let store = MemoryTokenStore::new();
        store.set(TokenSlot::AccessToken, "T1").await.unwrap();

        let session = context(&server, &store);
        let err = session.refresh_auth().await.unwrap_err();

        assert!(matches!(err, ClientError::MissingRefreshToken));
        assert_eq!(session.state().phase(), SessionPhase::Unauthenticated);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_auth_failure_logs_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let store = MemoryTokenStore::new();
        seed(&store, &alice().to_string()).await;

        let session = context(&server, &store);
        let err = session.refresh_auth().await.unwrap_err();

        assert!(matches!(err, ClientError::RefreshFailure { .. }));
        assert!(!session.is_authenticated());
        assert!(store.is_empty());
    }
}
