//! Declarative reconciliation of Huawei Cloud resources
//!
//! Resources are described by embedded schema descriptors and driven through
//! a shared Create/Read/Update/Delete/Import lifecycle against the cloud's
//! HTTP JSON APIs.
//!
//! # Module Structure
//!
//! - [`cloud`] - authenticated HTTP client, service endpoints and job polling
//! - [`schema`] - attribute descriptors and desired-state validation
//! - [`state`] - desired/observed state, handles, tag sets and change sets
//! - [`resource`] - the lifecycle orchestrator and the resource kinds
//! - [`config`] - persisted settings and credential resolution
//! - [`error`] - the provider error taxonomy

pub mod cloud;
pub mod config;
pub mod error;
pub mod resource;
pub mod schema;
pub mod state;

pub use error::{ApiError, FieldError, ProviderError, Result};
pub use resource::lifecycle::{Lifecycle, ReadOutcome};
pub use resource::{resource_for, Resource};
pub use state::{
    AttrMap, AttributeChange, Attributes, ChangeSet, DesiredState, ObservedState, ResourceHandle,
    TagSet,
};
