//! Session and authentication client for the CRM backend services
//!
//! This crate owns everything needed to hold a CRM session on a device:
//! acquiring credentials, persisting them, attaching them to outgoing
//! requests, validating them and transparently renewing them when they
//! expire.
//!
//! # Request Lifecycle
//!
//! Every request goes through an [`HttpClient`] bound to one service. The
//! [`AuthInterceptor`] sits in its pipeline:
//!
//! 1. The stored access token is attached as a bearer credential
//! 2. A 401 on a retryable request triggers one refresh with the stored
//!    refresh token
//! 3. The request is resent once with the new token
//! 4. If the refresh fails, the token store is cleared and the
//!    [`Navigator`] is sent to the login route
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use crm_auth::{CrmClient, CrmConfig, LoginRequest, MemoryTokenStore, NoopNavigator};
//!
//! #[tokio::main]
//! async fn main() -> crm_auth::Result<()> {
//!     let config = CrmConfig::from_env()?;
//!     let client = CrmClient::new(
//!         config,
//!         Arc::new(MemoryTokenStore::new()),
//!         Arc::new(NoopNavigator),
//!     )?;
//!
//!     let session = client.session();
//!     session.initialize().await;
//!
//!     if !session.is_authenticated() {
//!         let user = session
//!             .login(&LoginRequest::new("alice", "secret123"))
//!             .await?;
//!         println!("Logged in as: {}", user.display_name());
//!     }
//!
//!     // Later, renew explicitly if needed
//!     session.refresh_auth().await?;
//!
//!     session.logout().await;
//!     Ok(())
//! }
//! ```
//!
//! # Token Storage
//!
//! Sessions are kept in three slots of a [`TokenStore`]: the access token,
//! the refresh token and the JSON-serialized user.
//!
//! ## In-Memory Storage (Testing)
//!
//! ```
//! use crm_auth::{MemoryTokenStore, TokenSlot, TokenStore};
//!
//! # async fn example() -> crm_auth::Result<()> {
//! let store = MemoryTokenStore::new();
//!
//! store.set(TokenSlot::AccessToken, "T1").await?;
//! assert_eq!(store.get(TokenSlot::AccessToken).await.as_deref(), Some("T1"));
//!
//! store.clear().await?;
//! assert!(store.is_empty());
//! # Ok(())
//! # }
//! # tokio_test::block_on(example()).unwrap();
//! ```
//!
//! ## File-Based Encrypted Storage (Production)
//!
//! ```no_run
//! use crm_auth::{EnvSecretProvider, FileTokenStore, TokenSlot, TokenStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> crm_auth::Result<()> {
//! // OS keyring first, CRM_STORE_PASSPHRASE as fallback
//! let secret_provider = Arc::new(EnvSecretProvider::default());
//! let storage_dir = FileTokenStore::default_storage_dir()?;
//! let store = FileTokenStore::new(storage_dir, secret_provider).await?;
//!
//! // Values are sealed with AES-256-GCM before they reach disk
//! store.set(TokenSlot::RefreshToken, "R1").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Important Notes
//!
//! - Tokens and passwords are never logged; `Debug` output redacts them
//! - Expiry is not tracked locally, it is discovered through a 401
//! - Concurrent 401s each run their own refresh

pub mod client;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod file_store;
pub mod http;
pub mod interceptor;
pub mod key_manager;
pub mod models;
pub mod secret;
pub mod service;
pub mod session;
pub mod store;

// Re-export main types
pub use client::CrmClient;
pub use config::{CrmConfig, Deployment, HttpTimeouts};
pub use errors::{ClientError, ErrorKind, Result};
pub use file_store::FileTokenStore;
pub use http::{ApiRequest, ApiResponse, Exchange, HttpClient, Interceptor, Transport};
pub use interceptor::{AuthInterceptor, Navigator, NoopNavigator, RetryState};
pub use models::{AuthGrant, LoginRequest, RegisterRequest, User};
pub use secret::{EnvSecretProvider, NoSecretProvider, SecretProvider, StaticSecretProvider};
pub use service::AuthService;
pub use session::{SessionContext, SessionPhase, SessionState};
pub use store::{MemoryTokenStore, TokenSlot, TokenStore};
