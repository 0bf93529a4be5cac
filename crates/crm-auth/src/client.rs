use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::config::CrmConfig;
use crate::errors::Result;
use crate::http::{HttpClient, Transport};
use crate::interceptor::{AuthInterceptor, Navigator};
use crate::service::AuthService;
use crate::session::{SessionContext, SessionState, SessionTeardown};
use crate::store::TokenStore;

/// Entry point wiring one token store into both backend services.
///
/// The auth service and the customer service each get their own
/// [`HttpClient`], both behind the same [`AuthInterceptor`]. When that
/// interceptor gives up on a refresh, the shared [`SessionContext`] drops to
/// unauthenticated before the navigator is called.
#[derive(Debug, Clone)]
pub struct CrmClient {
    config: CrmConfig,
    auth_http: HttpClient,
    api_http: HttpClient,
    session: Arc<SessionContext>,
}

impl CrmClient {
    pub fn new(
        config: CrmConfig,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let (state, _) = watch::channel(SessionState::default());
        let interceptor = Arc::new(AuthInterceptor::new(
            store.clone(),
            Transport::new(config.auth_url.clone(), &config)?,
            Arc::new(SessionTeardown::new(state.clone(), navigator)),
            config.login_route.clone(),
        ));

        let auth_http = HttpClient::new(config.auth_url.clone(), &config)?
            .with_interceptor(interceptor.clone());
        let api_http =
            HttpClient::new(config.api_url.clone(), &config)?.with_interceptor(interceptor);

        debug!(
            "CRM client ready (auth: {}, api: {})",
            config.auth_url, config.api_url
        );

        let session = Arc::new(SessionContext::with_state(
            AuthService::new(auth_http.clone()),
            store,
            state,
        ));

        Ok(Self {
            config,
            auth_http,
            api_http,
            session,
        })
    }

    pub fn config(&self) -> &CrmConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn auth(&self) -> &AuthService {
        self.session.service()
    }

    /// Intercepted client bound to the auth service
    pub fn auth_http(&self) -> &HttpClient {
        &self.auth_http
    }

    /// Intercepted client bound to the customer service
    pub fn api_http(&self) -> &HttpClient {
        &self.api_http
    }
}
