use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::errors::{ClientError, Result};
use crate::http::{ApiRequest, ApiResponse, Exchange, Interceptor, Transport};
use crate::service::exchange_refresh_token;
use crate::store::{TokenSlot, TokenStore};

/// Receives the route the user must be sent to when the session is lost
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator that ignores navigation requests
#[derive(Debug, Clone, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, route: &str) {
        debug!("Ignoring navigation to {}", route);
    }
}

/// Progress of one request through refresh-and-retry.
///
/// `Retried` only ever advances to `Done`, so a request is resent at most
/// once no matter how the retry turns out.
#[derive(Debug)]
pub enum RetryState {
    Sent(ApiResponse),
    Unauthorized(ApiResponse),
    Refreshing {
        refresh_token: String,
        original: ApiResponse,
    },
    Retried(ApiResponse),
    Done(ApiResponse),
}

impl RetryState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sent(_) => "sent",
            Self::Unauthorized(_) => "unauthorized",
            Self::Refreshing { .. } => "refreshing",
            Self::Retried(_) => "retried",
            Self::Done(_) => "done",
        }
    }
}

/// Attaches the access token to outgoing requests and recovers from an
/// expired token by refreshing it once and resending the request.
pub struct AuthInterceptor {
    store: Arc<dyn TokenStore>,
    /// Uninstrumented transport to the auth service; a 401 on the refresh
    /// call itself is never fed back into this interceptor.
    refresh_transport: Transport,
    navigator: Arc<dyn Navigator>,
    login_route: String,
}

impl AuthInterceptor {
    pub fn new(
        store: Arc<dyn TokenStore>,
        refresh_transport: Transport,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
    ) -> Self {
        Self {
            store,
            refresh_transport,
            navigator,
            login_route: login_route.into(),
        }
    }

    async fn advance(
        &self,
        state: RetryState,
        request: &ApiRequest,
        transport: &Transport,
    ) -> Result<RetryState> {
        match state {
            RetryState::Sent(response) => {
                if response.is_unauthorized() && request.retryable {
                    Ok(RetryState::Unauthorized(response))
                } else {
                    Ok(RetryState::Done(response))
                }
            }
            RetryState::Unauthorized(response) => {
                match self.store.get(TokenSlot::RefreshToken).await {
                    Some(refresh_token) => Ok(RetryState::Refreshing {
                        refresh_token,
                        original: response,
                    }),
                    None => {
                        debug!("No refresh token stored, passing 401 through");
                        Ok(RetryState::Done(response))
                    }
                }
            }
            RetryState::Refreshing {
                refresh_token,
                original,
            } => {
                let outcome =
                    exchange_refresh_token(&self.refresh_transport, &refresh_token).await;
                let refreshed = match outcome {
                    Ok(refreshed) => refreshed,
                    Err(e) => return Err(self.abandon_session(e, &original).await),
                };

                self.store
                    .set(TokenSlot::AccessToken, &refreshed.token)
                    .await?;
                info!("Access token refreshed, resending {} {}", request.method, request.path);

                let mut retry = request.clone();
                retry.set_bearer(&refreshed.token)?;
                let response = transport.send(&retry).await?;
                Ok(RetryState::Retried(response))
            }
            RetryState::Retried(response) => Ok(RetryState::Done(response)),
            done @ RetryState::Done(_) => Ok(done),
        }
    }

    /// Tear down the stored session after a failed refresh
    async fn abandon_session(&self, cause: ClientError, original: &ApiResponse) -> ClientError {
        warn!(
            "Token refresh failed after {} response: {}",
            original.status(),
            cause
        );

        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear token store: {}", e);
        }
        self.navigator.navigate(&self.login_route);

        match cause {
            ClientError::RefreshFailure { .. } => cause,
            other => ClientError::refresh_failure(other.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl Interceptor for AuthInterceptor {
    async fn outgoing(&self, request: &mut ApiRequest) -> Result<()> {
        if let Some(token) = self.store.get(TokenSlot::AccessToken).await {
            request.set_bearer(&token)?;
        }
        Ok(())
    }

    #[instrument(skip(self, exchange), fields(path = %exchange.request.path))]
    async fn incoming(&self, exchange: Exchange<'_>) -> Result<ApiResponse> {
        let Exchange {
            request,
            response,
            transport,
        } = exchange;

        let mut state = RetryState::Sent(response);
        loop {
            if let RetryState::Done(response) = state {
                return Ok(response);
            }
            let from = state.name();
            state = self.advance(state, request, transport).await?;
            debug!("Retry state {} -> {}", from, state.name());
        }
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("refresh_url", &self.refresh_transport.base_url().as_str())
            .field("login_route", &self.login_route)
            .finish_non_exhaustive()
    }
}
