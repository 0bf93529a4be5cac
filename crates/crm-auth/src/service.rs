use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};

use crate::config::endpoints;
use crate::errors::{ClientError, Result};
use crate::http::{ApiRequest, ApiResponse, HttpClient, Transport};
use crate::models::{
    AuthGrant, LoginRequest, LoginResponse, ProfileResponse, RefreshRequest, RefreshResponse,
    RegisterRequest, RegisterResponse, User,
};

const INVALID_CREDENTIALS: &str = "Invalid username or password";
const REGISTRATION_FAILED: &str = "Registration failed";

/// Typed client for the auth service. Holds no session state.
#[derive(Debug, Clone)]
pub struct AuthService {
    http: HttpClient,
}

impl AuthService {
    /// `http` must be bound to the auth service base URL
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthGrant> {
        let request = ApiRequest::post(endpoints::LOGIN)
            .json(credentials)?
            .non_retryable();
        let response = self.http.execute(request).await?;

        match response.status() {
            status if status.is_success() => {
                let body: LoginResponse = response.json()?;
                info!("Logged in as {}", body.user.username);
                Ok(body.into())
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(ClientError::AuthFailure {
                message: response
                    .error_message()
                    .unwrap_or_else(|| INVALID_CREDENTIALS.to_string()),
            }),
            _ => Err(response.into_error()),
        }
    }

    #[instrument(skip(self, profile), fields(username = %profile.username))]
    pub async fn register(&self, profile: &RegisterRequest) -> Result<AuthGrant> {
        profile.validate()?;

        let request = ApiRequest::post(endpoints::REGISTER)
            .json(profile)?
            .non_retryable();
        let response = self.http.execute(request).await?;

        if response.is_success() {
            let body: RegisterResponse = response.json()?;
            info!("Registered account {}", body.user.username);
            return Ok(body.into());
        }
        Err(registration_error(response))
    }

    /// Profile of the account owning the current access token
    #[instrument(skip(self))]
    pub async fn get_profile(&self) -> Result<User> {
        let profile: ProfileResponse = self
            .http
            .send_json(ApiRequest::get(endpoints::PROFILE))
            .await?;
        Ok(profile.into_user())
    }

    /// Whether the current access token is accepted. Never fails; every
    /// failure mode reads as `false`.
    #[instrument(skip(self))]
    pub async fn validate_token(&self) -> bool {
        let response = match self.http.execute(ApiRequest::get(endpoints::VALIDATE)).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Token validation failed: {}", e);
                return false;
            }
        };

        if !response.is_success() {
            debug!("Token rejected with {}", response.status());
            return false;
        }

        // The auth service answers `200 false` for tokens it does not accept
        !matches!(
            serde_json::from_slice::<serde_json::Value>(response.body()),
            Ok(serde_json::Value::Bool(false))
        )
    }

    /// Exchange a refresh token for a new access token
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let response = self.http.execute(refresh_request(refresh_token)?).await?;
        read_refresh_response(response)
    }
}

fn registration_error(response: ApiResponse) -> ClientError {
    let status = response.status();
    let body = response.error_body().unwrap_or_default();
    let message = body
        .message
        .clone()
        .or_else(|| body.error.clone())
        .filter(|m| !m.trim().is_empty());

    match status {
        StatusCode::CONFLICT => ClientError::Conflict {
            message: message.unwrap_or_else(|| "Username or email already exists".to_string()),
        },
        StatusCode::BAD_REQUEST
            if message
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains("already exists")) =>
        {
            ClientError::Conflict {
                message: message.unwrap_or_default(),
            }
        }
        StatusCode::BAD_REQUEST => ClientError::ValidationFailure {
            fields: body.field_errors(),
            message: message.unwrap_or_else(|| REGISTRATION_FAILED.to_string()),
        },
        _ => response.into_error(),
    }
}

fn refresh_request(refresh_token: &str) -> Result<ApiRequest> {
    Ok(ApiRequest::post(endpoints::REFRESH)
        .json(&RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })?
        .non_retryable())
}

fn read_refresh_response(response: ApiResponse) -> Result<RefreshResponse> {
    if !response.is_success() {
        let reason = response
            .error_message()
            .unwrap_or_else(|| format!("auth service answered {}", response.status()));
        return Err(ClientError::refresh_failure(reason));
    }

    let refreshed: RefreshResponse = response
        .json()
        .map_err(|e| ClientError::refresh_failure(format!("malformed refresh response: {e}")))?;
    if refreshed.token.is_empty() {
        return Err(ClientError::refresh_failure("auth service returned an empty token"));
    }
    Ok(refreshed)
}

/// Refresh over a bare transport, outside any interceptor pipeline
pub(crate) async fn exchange_refresh_token(
    transport: &Transport,
    refresh_token: &str,
) -> Result<RefreshResponse> {
    let response = transport.send(&refresh_request(refresh_token)?).await.map_err(|e| {
        warn!("Refresh request did not complete: {}", e);
        ClientError::refresh_failure(e.to_string())
    })?;
    read_refresh_response(response)
}
