//! Customer service client for the CRM backend
//!
//! Builds on the [`crm_auth`] request pipeline: every call carries the
//! session's bearer token and survives an access token expiring mid-flight.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use crm_auth::{CrmClient, CrmConfig, MemoryTokenStore, NoopNavigator};
//! use crm_customers::{CustomerClient, PageRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let crm = CrmClient::new(
//!     CrmConfig::local()?,
//!     Arc::new(MemoryTokenStore::new()),
//!     Arc::new(NoopNavigator),
//! )?;
//! crm.session().initialize().await;
//!
//! let customers = CustomerClient::from_crm(&crm);
//! for customer in customers.list(&PageRequest::default()).await?.content {
//!     println!("{} <{}>", customer.full_name(), customer.email);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod errors;
pub mod models;

pub use client::CustomerClient;
pub use errors::{CustomerError, Result};
pub use models::{
    CreateCustomerRequest, Customer, CustomerSource, CustomerStatistics, CustomerStatus, Page,
    PageRequest, SortDirection, UpdateCustomerRequest,
};
