//! CSMS secret
//!
//! Served from the KMS endpoint. The handle is `<secret_id>/<name>`; the API
//! addresses secrets by name, tags by id. Secret values are append-only:
//! changing `secret_text` creates a new version.

use super::builder::{value_ignore_empty, PayloadBuilder};
use super::extract::{
    format_epoch_millis_utc, path_f64, path_search, path_str, ObservedStateBuilder,
};
use super::registry::get_descriptor;
use super::tags::{TagApi, TagChannel};
use super::{Imported, Resource};
use crate::cloud::ServiceClient;
use crate::error::{FieldError, ProviderError, Result};
use crate::schema::ResourceDescriptor;
use crate::state::{split_two, Attributes, ChangeSet, DesiredState, ObservedState, ResourceHandle};
use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

const COLLECTION: &str = "v1/{project_id}/secrets";

/// Lowercase hex SHA-256 of a secret, the form kept in observed state
pub fn hash_secret(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

pub struct CsmsSecret {
    descriptor: &'static ResourceDescriptor,
}

impl CsmsSecret {
    pub fn new() -> Option<Self> {
        get_descriptor("csms_secret").map(|descriptor| Self { descriptor })
    }

    fn parts<'h>(&self, handle: &'h ResourceHandle) -> Result<(&'h str, &'h str)> {
        handle
            .split_composite()
            .ok_or_else(|| self.invalid_id(handle.as_str()))
    }

    fn invalid_id(&self, raw: &str) -> ProviderError {
        ProviderError::InvalidIdentifierFormat {
            kind: self.kind().to_string(),
            raw: raw.to_string(),
            expected: self.descriptor.id_format.clone(),
        }
    }

    fn secret_path(name: &str) -> String {
        format!("{}/{}", COLLECTION, urlencoding::encode(name))
    }

    /// Latest version id and its secret value
    async fn latest_version(&self, client: &ServiceClient, name: &str) -> Result<(String, String)> {
        let list = client
            .get(&format!("{}/versions", Self::secret_path(name)))
            .await
            .map_err(|e| e.with_context("failed to query the list of secret versions"))?;

        let mut versions: Vec<&Value> = path_search(&list, "version_metadatas")
            .and_then(Value::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default();
        // newest first
        versions.sort_by(|a, b| {
            let ta = path_f64(a, "create_time").unwrap_or(0.0);
            let tb = path_f64(b, "create_time").unwrap_or(0.0);
            tb.total_cmp(&ta)
        });

        let version_id = versions
            .first()
            .and_then(|v| path_str(v, "id"))
            .ok_or_else(|| ProviderError::MissingIdentifier {
                kind: self.kind().to_string(),
                field: "version_metadatas.0.id".to_string(),
            })?;

        let version = client
            .get(&format!(
                "{}/versions/{}",
                Self::secret_path(name),
                urlencoding::encode(&version_id)
            ))
            .await
            .map_err(|e| e.with_context("failed to query secret version"))?;

        let id = path_str(&version, "version.version_metadata.id").unwrap_or(version_id);
        let text = path_str(&version, "version.secret_string").unwrap_or_default();
        Ok((id, text))
    }
}

/// Create request body
pub fn build_create_body(desired: &DesiredState) -> Value {
    PayloadBuilder::new()
        .required("name", desired.get("name").cloned().unwrap_or(Value::Null))
        .field("kms_key_id", value_ignore_empty(desired.get("kms_key_id")))
        .field("description", value_ignore_empty(desired.get("description")))
        .required(
            "secret_string",
            desired.get("secret_text").cloned().unwrap_or(Value::Null),
        )
        .build()
}

#[async_trait]
impl Resource for CsmsSecret {
    fn descriptor(&self) -> &ResourceDescriptor {
        self.descriptor
    }

    async fn create(
        &self,
        client: &ServiceClient,
        desired: &DesiredState,
    ) -> Result<ResourceHandle> {
        tracing::debug!("Create CSMS secret {:?}", desired.get_str("name"));
        let body = client
            .post(COLLECTION, build_create_body(desired))
            .await
            .map_err(|e| e.with_context("failed to create the CSMS secret"))?;

        let missing = || ProviderError::MissingIdentifier {
            kind: self.kind().to_string(),
            field: "secret.id".to_string(),
        };
        let id = path_str(&body, "secret.id").ok_or_else(missing)?;
        let name = desired.get_str("name").unwrap_or_default();
        ResourceHandle::composite(&id, name).ok_or_else(missing)
    }

    async fn get(&self, client: &ServiceClient, handle: &ResourceHandle) -> Result<Value> {
        let (_, name) = self.parts(handle)?;
        client
            .get(&Self::secret_path(name))
            .await
            .map_err(|e| e.with_context("failed to query CSMS secret details"))
    }

    fn extract(&self, raw: &Value, _handle: &ResourceHandle, out: &mut ObservedStateBuilder<'_>) {
        let create_time = path_f64(raw, "secret.create_time")
            .and_then(format_epoch_millis_utc)
            .map(Value::String)
            .unwrap_or(Value::Null);

        out.copy("secret_id", raw, "secret.id")
            .copy("name", raw, "secret.name")
            .copy("kms_key_id", raw, "secret.kms_key_id")
            .copy("description", raw, "secret.description")
            .copy("status", raw, "secret.state")
            .set("create_time", create_time);
    }

    async fn read_extra(
        &self,
        client: &ServiceClient,
        handle: &ResourceHandle,
        out: &mut ObservedStateBuilder<'_>,
    ) {
        let Some((_, name)) = handle.split_composite() else {
            out.push_error(FieldError::new("latest_version", "invalid handle"));
            return;
        };
        match self.latest_version(client, name).await {
            Ok((version_id, text)) => {
                out.set("secret_text", Value::String(hash_secret(&text)))
                    .set("latest_version", Value::String(version_id));
            }
            Err(e) => {
                out.push_error(FieldError::new("latest_version", e.to_string()));
            }
        }
    }

    async fn update_group(
        &self,
        client: &ServiceClient,
        handle: &ResourceHandle,
        group: &str,
        desired: &DesiredState,
        _changes: &ChangeSet,
    ) -> Result<()> {
        let (_, name) = self.parts(handle)?;
        match group {
            "base_info" => {
                // description is always sent so it can be cleared
                let body = PayloadBuilder::new()
                    .field("kms_key_id", value_ignore_empty(desired.get("kms_key_id")))
                    .required(
                        "description",
                        json!(desired.get_str("description").unwrap_or_default()),
                    )
                    .build();
                client
                    .put(&Self::secret_path(name), body)
                    .await
                    .map_err(|e| e.with_context("failed to update the base-info of CSMS secret"))?;
            }
            "secret_text" => {
                let body = json!({
                    "secret_string": desired.get_str("secret_text").unwrap_or_default()
                });
                client
                    .post(&format!("{}/versions", Self::secret_path(name)), body)
                    .await
                    .map_err(|e| e.with_context("failed to create a new version of CSMS secret"))?;
            }
            other => {
                tracing::warn!("Ignoring unknown update group {} for CSMS secret", other);
            }
        }
        Ok(())
    }

    async fn delete(&self, client: &ServiceClient, handle: &ResourceHandle) -> Result<()> {
        let (_, name) = self.parts(handle)?;
        client
            .delete(&Self::secret_path(name), None)
            .await
            .map(|_| ())
            .map_err(|e| e.with_context("failed to delete CSMS secret"))
    }

    fn tag_channel(&self, handle: &ResourceHandle) -> Option<TagChannel> {
        let (id, _) = handle.split_composite()?;
        Some(TagChannel::new(
            format!("v1/{{project_id}}/csms/{}", id),
            TagApi::Action,
        ))
    }

    fn import(&self, raw_id: &str) -> Result<Imported> {
        let (id, name) = split_two(raw_id).ok_or_else(|| self.invalid_id(raw_id))?;
        let handle = ResourceHandle::composite(id, name).ok_or_else(|| self.invalid_id(raw_id))?;

        let mut identity = ObservedState::new();
        identity.set("secret_id", json!(id));
        identity.set("name", json!(name));
        Ok(Imported { handle, identity })
    }
}
