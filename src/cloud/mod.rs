//! Huawei Cloud API interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - token or IAM password authentication with token caching
//! - [`client`] - region/project settings and per-service clients
//! - [`http`] - HTTP utilities for REST API calls
//! - [`job`] - polling of asynchronous jobs
//!
//! # Example
//!
//! ```ignore
//! use hwc_reconcile::cloud::{auth::Credentials, client::{CloudClient, CloudSettings}};
//!
//! async fn example() -> hwc_reconcile::Result<()> {
//!     let settings = CloudSettings::new("cn-north-4", "0123456789abcdef0123456789abcdef");
//!     let client = CloudClient::new(settings, Credentials::from_env()?)?;
//!     let ccm = client.service_client("ccm")?;
//!     let cert = ccm.get("v1/private-certificates/some-id").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod job;

pub use auth::Credentials;
pub use client::{CloudClient, CloudSettings, ServiceClient};
pub use http::{ClientConfig, RawResponse, RequestOpts};
pub use job::{JobPoller, JobStatus, PollConfig};
