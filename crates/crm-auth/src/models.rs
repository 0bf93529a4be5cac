use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ClientError, Result};

/// Account as reported by the auth service.
///
/// Treated as an opaque projection of server state: it is replaced
/// wholesale on refresh and never patched locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub primary_role: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.primary_role == role || self.roles.iter().any(|r| r == role)
    }
}

/// `/auth/login` request
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// `/auth/register` request
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// Form-only confirmation, checked locally and never sent
    #[serde(skip)]
    pub confirm_password: Option<String>,
}

impl RegisterRequest {
    /// Local precondition checked before anything goes over the wire
    pub fn validate(&self) -> Result<()> {
        if let Some(confirm) = &self.confirm_password {
            if confirm != &self.password {
                let mut fields = BTreeMap::new();
                fields.insert(
                    "confirmPassword".to_string(),
                    "Passwords do not match".to_string(),
                );
                return Err(ClientError::ValidationFailure {
                    message: "Passwords do not match".to_string(),
                    fields,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("roles", &self.roles)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// `/auth/login` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub user: User,
    #[serde(default)]
    pub primary_role: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// `/auth/register` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub user: User,
    #[serde(default)]
    pub primary_role: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub token: String,
    pub refresh_token: String,
}

/// `/auth/profile` answers either with the bare user or wrapped in the
/// same envelope as registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ProfileResponse {
    Bare(User),
    Wrapped { user: User },
}

impl ProfileResponse {
    pub(crate) fn into_user(self) -> User {
        match self {
            Self::Bare(user) | Self::Wrapped { user } => user,
        }
    }
}

/// `/auth/refresh` request
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `/auth/refresh` response
#[derive(Clone, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
}

impl fmt::Debug for RefreshResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshResponse")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Credentials and account returned by a successful login or registration
#[derive(Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

impl fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGrant")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("user", &self.user.username)
            .finish()
    }
}

impl From<LoginResponse> for AuthGrant {
    fn from(response: LoginResponse) -> Self {
        Self {
            access_token: response.token,
            refresh_token: response.refresh_token,
            user: response.user,
        }
    }
}

impl From<RegisterResponse> for AuthGrant {
    fn from(response: RegisterResponse) -> Self {
        Self {
            access_token: response.token,
            refresh_token: response.refresh_token,
            user: response.user,
        }
    }
}

/// Error body produced by the backend services
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub details: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ApiErrorBody {
    /// Field errors flattened to strings
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        self.details
            .iter()
            .flatten()
            .map(|(field, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (field.clone(), text)
            })
            .collect()
    }
}
