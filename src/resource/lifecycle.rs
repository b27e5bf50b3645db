//! Lifecycle orchestrator
//!
//! Sequences the remote calls of a [`Resource`] for one resource instance.
//! Every call is awaited before the next one is issued. Nothing is rolled
//! back: a failed update leaves the groups applied before it in place, and a
//! later read shows them.

use super::extract::ObservedStateBuilder;
use super::{Imported, Resource};
use crate::cloud::{CloudClient, ServiceClient};
use crate::error::{ProviderError, Result};
use crate::state::{Attributes, ChangeSet, DesiredState, ObservedState, ResourceHandle, TagSet};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

/// Outcome of a read
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Present(ObservedState),
    /// The remote object no longer exists; the caller drops it from state
    NotFound,
}

impl ReadOutcome {
    pub fn into_present(self) -> Option<ObservedState> {
        match self {
            Self::Present(state) => Some(state),
            Self::NotFound => None,
        }
    }
}

/// Handle and observed state after a create or update
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub handle: ResourceHandle,
    pub observed: ObservedState,
}

/// Drives one resource kind against one service endpoint
pub struct Lifecycle<'a, R: Resource + ?Sized> {
    resource: &'a R,
    client: ServiceClient,
}

impl<'a, R: Resource + ?Sized> Lifecycle<'a, R> {
    pub fn new(resource: &'a R, client: ServiceClient) -> Self {
        Self { resource, client }
    }

    /// Bind to the endpoint of the service the resource declares
    pub fn for_cloud(resource: &'a R, cloud: &CloudClient) -> Result<Self> {
        let client = cloud.service_client(&resource.descriptor().service)?;
        Ok(Self::new(resource, client))
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    fn span(&self, action: &'static str) -> tracing::Span {
        tracing::info_span!(
            "reconcile",
            op = %Uuid::new_v4(),
            kind = %self.resource.kind(),
            action = action
        )
    }

    /// Validate, create, attach tags (best effort), then read back
    pub async fn create(&self, desired: &DesiredState) -> Result<Reconciled> {
        self.create_inner(desired)
            .instrument(self.span("create"))
            .await
    }

    async fn create_inner(&self, desired: &DesiredState) -> Result<Reconciled> {
        let kind = self.resource.kind();
        self.resource.descriptor().validate(desired)?;

        tracing::info!("Creating {}", kind);
        let handle = self.resource.create(&self.client, desired).await?;
        tracing::info!("Created {} {}", kind, handle);

        let tags = desired.tags();
        if !tags.is_empty() {
            if let Some(channel) = self.resource.tag_channel(&handle) {
                // best effort, unlike update
                if let Err(e) = channel.attach(&self.client, &tags).await {
                    tracing::warn!("Error adding tags to {} {}: {}", kind, handle, e);
                }
            }
        }

        let observed = self.read_present(&handle).await?;
        Ok(Reconciled { handle, observed })
    }

    /// Read the remote object; a recognised not-found becomes [`ReadOutcome::NotFound`]
    pub async fn read(&self, handle: &ResourceHandle) -> Result<ReadOutcome> {
        self.read_inner(handle)
            .instrument(self.span("read"))
            .await
    }

    async fn read_inner(&self, handle: &ResourceHandle) -> Result<ReadOutcome> {
        let kind = self.resource.kind();
        let raw = match self.resource.get(&self.client, handle).await {
            Ok(raw) => raw,
            Err(e) if self.resource.is_not_found(&e) => {
                tracing::info!("{} {} not found, removing from state", kind, handle);
                return Ok(ReadOutcome::NotFound);
            }
            Err(e) => return Err(e),
        };

        let descriptor = self.resource.descriptor();
        let mut builder = ObservedStateBuilder::new(descriptor);
        if descriptor.has_attribute("region") {
            builder.set("region", Value::String(self.client.region.clone()));
        }
        self.resource.extract(&raw, handle, &mut builder);
        self.resource
            .read_extra(&self.client, handle, &mut builder)
            .await;

        if let Some(channel) = self.resource.tag_channel(handle) {
            match channel.list(&self.client).await {
                Ok(tags) => {
                    builder.set("tags", tags.to_value());
                }
                Err(e) => tracing::warn!("Error querying tags of {} {}: {}", kind, handle, e),
            }
        }

        builder.finish().map(ReadOutcome::Present)
    }

    async fn read_present(&self, handle: &ResourceHandle) -> Result<ObservedState> {
        match self.read_inner(handle).await? {
            ReadOutcome::Present(observed) => Ok(observed),
            ReadOutcome::NotFound => Err(ProviderError::ResourceNotFound {
                kind: self.resource.kind().to_string(),
                id: handle.to_string(),
            }),
        }
    }

    /// Diff `old` against `new` and apply the difference
    pub async fn update(
        &self,
        handle: &ResourceHandle,
        old: &DesiredState,
        new: &DesiredState,
    ) -> Result<Reconciled> {
        let changes = ChangeSet::compute(old, new);
        self.apply_changes(handle, new, changes).await
    }

    /// Apply a computed change set: one call per changed group in declared
    /// order, then tags (removals, additions), then a read
    pub async fn apply_changes(
        &self,
        handle: &ResourceHandle,
        new: &DesiredState,
        changes: ChangeSet,
    ) -> Result<Reconciled> {
        self.apply_inner(handle, new, changes)
            .instrument(self.span("update"))
            .await
    }

    async fn apply_inner(
        &self,
        handle: &ResourceHandle,
        new: &DesiredState,
        changes: ChangeSet,
    ) -> Result<Reconciled> {
        let kind = self.resource.kind();
        let descriptor = self.resource.descriptor();
        descriptor.validate(new)?;

        let replace = descriptor.replacement_fields(&changes);
        if !replace.is_empty() {
            return Err(ProviderError::ReplacementRequired {
                kind: kind.to_string(),
                fields: replace,
            });
        }
        self.resource.check_changes(&changes)?;

        for group in descriptor.changed_groups(&changes) {
            tracing::info!("Updating {} of {} {}", group, kind, handle);
            self.resource
                .update_group(&self.client, handle, group, new, &changes)
                .await?;
        }

        if let Some((old_tags, new_tags)) = changes.get_change("tags") {
            if let Some(channel) = self.resource.tag_channel(handle) {
                let diff = channel
                    .reconcile(
                        &self.client,
                        &TagSet::from_value(old_tags),
                        &TagSet::from_value(new_tags),
                    )
                    .await
                    .map_err(|e| {
                        e.with_context(format!("error updating tags of {} {}", kind, handle))
                    })?;
                tracing::info!(
                    "Tags of {} {}: {} removed, {} added",
                    kind,
                    handle,
                    diff.removals.len(),
                    diff.additions.len()
                );
            }
        }

        let observed = self.read_present(handle).await?;
        Ok(Reconciled {
            handle: handle.clone(),
            observed,
        })
    }

    /// Delete; an object that is already gone counts as deleted
    pub async fn delete(&self, handle: &ResourceHandle) -> Result<()> {
        self.delete_inner(handle)
            .instrument(self.span("delete"))
            .await
    }

    async fn delete_inner(&self, handle: &ResourceHandle) -> Result<()> {
        let kind = self.resource.kind();
        tracing::info!("Deleting {} {}", kind, handle);
        match self.resource.delete(&self.client, handle).await {
            Ok(()) => Ok(()),
            Err(e) if self.resource.is_not_found(&e) => {
                tracing::info!("{} {} already deleted", kind, handle);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Parse an import identifier without any remote call
    pub fn import(&self, raw_id: &str) -> Result<Imported> {
        self.resource.import(raw_id)
    }

    /// Import, then read the object the identifier points at
    pub async fn import_and_read(&self, raw_id: &str) -> Result<Reconciled> {
        let imported = self.import(raw_id)?;
        let observed = self
            .read_present(&imported.handle)
            .instrument(self.span("import"))
            .await?;
        Ok(Reconciled {
            handle: imported.handle,
            observed,
        })
    }
}
