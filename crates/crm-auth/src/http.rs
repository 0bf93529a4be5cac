use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::config::{CrmConfig, DEFAULT_USER_AGENT};
use crate::errors::{ClientError, Result};
use crate::models::ApiErrorBody;

const BODY_SNIPPET_LEN: usize = 200;

/// Replayable description of an outgoing request.
///
/// Paths are relative to the base URL of the service the request is sent to.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    /// Whether an authorization failure may be recovered by refreshing
    pub retryable: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            retryable: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Exclude this request from refresh-and-retry
    pub fn non_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// Set or replace the bearer credential
    pub fn set_bearer(&mut self, token: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// Fully buffered response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Structured error body, if the service sent one
    pub fn error_body(&self) -> Option<ApiErrorBody> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Best available human-readable message for a failed response
    pub fn error_message(&self) -> Option<String> {
        self.error_body()
            .and_then(|b| b.message.or(b.error))
            .filter(|m| !m.trim().is_empty())
    }

    pub fn body_snippet(&self) -> String {
        self.text().chars().take(BODY_SNIPPET_LEN).collect()
    }

    /// Generic status mapping for a failed response
    pub fn into_error(self) -> ClientError {
        let body = self.error_body().unwrap_or_default();
        let message = body
            .message
            .clone()
            .or_else(|| body.error.clone())
            .filter(|m| !m.trim().is_empty());

        match self.status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized {
                message: message.unwrap_or_else(|| "Authentication required".to_string()),
            },
            StatusCode::CONFLICT => ClientError::Conflict {
                message: message.unwrap_or_else(|| "Resource already exists".to_string()),
            },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
                if body.details.is_some() =>
            {
                ClientError::ValidationFailure {
                    fields: body.field_errors(),
                    message: message.unwrap_or_else(|| "Invalid request parameters".to_string()),
                }
            }
            status => ClientError::Http {
                status,
                body_snippet: self.body_snippet(),
            },
        }
    }
}

/// Sends requests to one service, without any interception
#[derive(Debug, Clone)]
pub struct Transport {
    base_url: Url,
    http: Client,
}

impl Transport {
    pub fn new(base_url: Url, config: &CrmConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
            .default_headers(default_headers)
            .build()?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a service-relative path, keeping any path prefix of the base URL
    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }

    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.endpoint(&request.path);

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!("Received {} ({} bytes)", status, body.len());
        Ok(ApiResponse::new(status, headers, body))
    }
}

/// What an incoming hook sees: the request as it was finally sent, the
/// response, and the transport it went over (for resending).
pub struct Exchange<'a> {
    pub request: &'a ApiRequest,
    pub response: ApiResponse,
    pub transport: &'a Transport,
}

/// Request pipeline hook
#[async_trait::async_trait]
pub trait Interceptor: Send + Sync {
    /// Inspect or mutate the request before it is sent
    async fn outgoing(&self, _request: &mut ApiRequest) -> Result<()> {
        Ok(())
    }

    /// Inspect, replace or fail the response before the caller sees it
    async fn incoming(&self, exchange: Exchange<'_>) -> Result<ApiResponse> {
        Ok(exchange.response)
    }
}

/// HTTP client for one backend service with an interception pipeline
#[derive(Clone)]
pub struct HttpClient {
    transport: Transport,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl HttpClient {
    pub fn new(base_url: Url, config: &CrmConfig) -> Result<Self> {
        Ok(Self::from_transport(Transport::new(base_url, config)?))
    }

    pub fn from_transport(transport: Transport) -> Self {
        Self {
            transport,
            interceptors: Vec::new(),
        }
    }

    /// Append a hook; outgoing hooks run in insertion order, and so do incoming ones
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Run the full pipeline. Responses of any status are returned as
    /// `Ok`; only transport failures and interceptor errors are `Err`.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        for interceptor in &self.interceptors {
            interceptor.outgoing(&mut request).await?;
        }

        let mut response = self.transport.send(&request).await?;

        for interceptor in &self.interceptors {
            response = interceptor
                .incoming(Exchange {
                    request: &request,
                    response,
                    transport: &self.transport,
                })
                .await?;
        }

        Ok(response)
    }

    /// Execute and decode a successful JSON body, mapping failures generically
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.execute(request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        response.json()
    }

    /// Execute, expecting a success status and ignoring the body
    pub async fn send_empty(&self, request: ApiRequest) -> Result<()> {
        let response = self.execute(request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        Ok(())
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.transport.base_url.as_str())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
