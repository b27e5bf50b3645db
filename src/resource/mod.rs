//! Resource abstraction layer
//!
//! Every resource kind implements [`Resource`]: the remote calls specific to
//! the kind. The [`lifecycle::Lifecycle`] orchestrator sequences those calls
//! the same way for every kind (validate, call, tag, read back).
//!
//! # Architecture
//!
//! - [`registry`] - loads resource descriptors from embedded JSON
//! - [`builder`] - desired state to request payloads
//! - [`extract`] - raw responses to observed state
//! - [`tags`] - tag diffing and the tag side-channel endpoints
//! - [`lifecycle`] - the Create/Read/Update/Delete/Import orchestrator
//!
//! # Resource Definitions
//!
//! Descriptors live in JSON files under `src/resources/`:
//! - `ccm.json` - CCM private certificates
//! - `csms.json` - CSMS secrets
//! - `rds.json` - RDS instances

pub mod builder;
pub mod ccm_certificate;
pub mod csms_secret;
pub mod extract;
pub mod lifecycle;
pub mod rds_instance;
pub mod registry;
pub mod tags;

use crate::cloud::ServiceClient;
use crate::error::{ProviderError, Result};
use crate::schema::ResourceDescriptor;
use crate::state::{ChangeSet, DesiredState, ObservedState, ResourceHandle};
use async_trait::async_trait;
use extract::ObservedStateBuilder;
use serde_json::Value;
use tags::TagChannel;

pub use ccm_certificate::PrivateCertificate;
pub use csms_secret::CsmsSecret;
pub use rds_instance::RdsInstance;
pub use registry::{get_all_kinds, get_descriptor, get_registry};

/// Result of parsing an import identifier
#[derive(Debug, Clone, PartialEq)]
pub struct Imported {
    pub handle: ResourceHandle,
    /// Identifying attributes only; a Read fills in the rest
    pub identity: ObservedState,
}

/// Remote operations of one resource kind
#[async_trait]
pub trait Resource: Send + Sync {
    fn descriptor(&self) -> &ResourceDescriptor;

    fn kind(&self) -> &str {
        &self.descriptor().kind
    }

    /// Issue the create call and return the new handle
    async fn create(
        &self,
        client: &ServiceClient,
        desired: &DesiredState,
    ) -> Result<ResourceHandle>;

    /// Fetch the raw remote object
    async fn get(&self, client: &ServiceClient, handle: &ResourceHandle) -> Result<Value>;

    /// Map the raw object onto observed attributes
    fn extract(&self, raw: &Value, handle: &ResourceHandle, out: &mut ObservedStateBuilder<'_>);

    /// Further reads feeding observed state; failures go into `out`
    async fn read_extra(
        &self,
        _client: &ServiceClient,
        _handle: &ResourceHandle,
        _out: &mut ObservedStateBuilder<'_>,
    ) {
    }

    /// Kind-specific checks on a change set, run before any group is applied
    fn check_changes(&self, _changes: &ChangeSet) -> Result<()> {
        Ok(())
    }

    /// Apply one changed update group with a single remote call
    async fn update_group(
        &self,
        client: &ServiceClient,
        handle: &ResourceHandle,
        group: &str,
        desired: &DesiredState,
        changes: &ChangeSet,
    ) -> Result<()>;

    async fn delete(&self, client: &ServiceClient, handle: &ResourceHandle) -> Result<()>;

    /// Tag side-channel, if the kind supports tags
    fn tag_channel(&self, handle: &ResourceHandle) -> Option<TagChannel>;

    /// Whether an error means the remote object is gone
    fn is_not_found(&self, err: &ProviderError) -> bool {
        if err.is_not_found() {
            return true;
        }
        let Some(api) = err.api_error() else {
            return false;
        };
        let rule = &self.descriptor().not_found;
        rule.status_codes.contains(&api.status)
            || api
                .error_code()
                .is_some_and(|code| rule.error_codes.contains(&code))
    }

    /// Parse an import identifier; by default the bare remote id
    fn import(&self, raw_id: &str) -> Result<Imported> {
        let handle = ResourceHandle::new(raw_id.trim()).ok_or_else(|| {
            ProviderError::InvalidIdentifierFormat {
                kind: self.kind().to_string(),
                raw: raw_id.to_string(),
                expected: self.descriptor().id_format.clone(),
            }
        })?;
        Ok(Imported {
            handle,
            identity: ObservedState::new(),
        })
    }
}

/// The built-in implementation of a resource kind
pub fn resource_for(kind: &str) -> Option<Box<dyn Resource>> {
    match kind {
        "ccm_private_certificate" => Some(Box::new(PrivateCertificate::new()?)),
        "csms_secret" => Some(Box::new(CsmsSecret::new()?)),
        "rds_instance" => Some(Box::new(RdsInstance::new()?)),
        _ => None,
    }
}
