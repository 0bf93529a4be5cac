use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::errors::{ClientError, Result};

/// Auth service endpoints, relative to the auth service base URL
pub mod endpoints {
    pub const LOGIN: &str = "/auth/login";
    pub const REGISTER: &str = "/auth/register";
    pub const PROFILE: &str = "/auth/profile";
    pub const VALIDATE: &str = "/auth/validate";
    pub const REFRESH: &str = "/auth/refresh";
}

/// Service locations used when running against a local stack
pub mod local {
    pub const AUTH_URL: &str = "http://localhost:8085";
    pub const API_URL: &str = "http://localhost:8081/api/v1";
}

/// Environment variables consulted by [`CrmConfig::from_env`]
pub mod env_vars {
    pub const DEPLOYMENT: &str = "CRM_DEPLOYMENT";
    pub const AUTH_URL: &str = "CRM_AUTH_URL";
    pub const API_URL: &str = "CRM_API_URL";
}

/// Route the session is sent back to once it can no longer be recovered
pub const LOGIN_ROUTE: &str = "/auth/login";

pub const DEFAULT_USER_AGENT: &str = "crm-client";

/// Where the backend services live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deployment {
    #[default]
    Local,
    Hosted,
}

impl FromStr for Deployment {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "development" | "dev" => Ok(Self::Local),
            "hosted" | "production" | "prod" => Ok(Self::Hosted),
            other => Err(ClientError::Config(format!(
                "unknown deployment '{other}', expected 'local' or 'hosted'"
            ))),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            request: Duration::from_secs(10),
        }
    }
}

/// Configuration for the CRM service clients
#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub deployment: Deployment,

    /// Base URL of the auth service
    pub auth_url: Url,

    /// Base URL of the customer service
    pub api_url: Url,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,

    /// Route handed to the navigator when the session is torn down
    pub login_route: String,
}

impl CrmConfig {
    /// Config for services running on localhost
    pub fn local() -> Result<Self> {
        Ok(Self::with_urls(
            Deployment::Local,
            Url::parse(local::AUTH_URL)?,
            Url::parse(local::API_URL)?,
        ))
    }

    /// Config for a hosted deployment
    pub fn hosted(auth_url: Url, api_url: Url) -> Self {
        Self::with_urls(Deployment::Hosted, auth_url, api_url)
    }

    fn with_urls(deployment: Deployment, auth_url: Url, api_url: Url) -> Self {
        Self {
            deployment,
            auth_url,
            api_url,
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            login_route: LOGIN_ROUTE.to_string(),
        }
    }

    /// Resolve from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key/value source.
    ///
    /// `CRM_DEPLOYMENT` picks the defaults; `CRM_AUTH_URL` and `CRM_API_URL`
    /// override them. Hosted deployments have no defaults, so both URLs must
    /// be present.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let deployment = match non_empty(env_vars::DEPLOYMENT) {
            Some(value) => value.parse()?,
            None => Deployment::default(),
        };

        let auth_url = non_empty(env_vars::AUTH_URL)
            .map(|v| Url::parse(v.trim()))
            .transpose()?;
        let api_url = non_empty(env_vars::API_URL)
            .map(|v| Url::parse(v.trim()))
            .transpose()?;

        match deployment {
            Deployment::Local => Ok(Self::with_urls(
                Deployment::Local,
                auth_url.map_or_else(|| Url::parse(local::AUTH_URL), Ok)?,
                api_url.map_or_else(|| Url::parse(local::API_URL), Ok)?,
            )),
            Deployment::Hosted => match (auth_url, api_url) {
                (Some(auth_url), Some(api_url)) => Ok(Self::hosted(auth_url, api_url)),
                _ => Err(ClientError::Config(format!(
                    "hosted deployment requires both {} and {}",
                    env_vars::AUTH_URL,
                    env_vars::API_URL
                ))),
            },
        }
    }
}
