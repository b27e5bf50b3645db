//! CCM private certificate
//!
//! Every input forces replacement; only tags change in place.

use super::builder::{flatten_block, value_ignore_empty, PayloadBuilder};
use super::extract::{path_search, path_str, rfc3339_at, ObservedStateBuilder};
use super::registry::get_descriptor;
use super::tags::{TagApi, TagChannel};
use super::Resource;
use crate::cloud::ServiceClient;
use crate::error::{ProviderError, Result};
use crate::schema::ResourceDescriptor;
use crate::state::{Attributes, ChangeSet, DesiredState, ResourceHandle};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const COLLECTION: &str = "v1/private-certificates";

const EXTENDED_KEY_USAGES: &[&str] = &[
    "server_auth",
    "client_auth",
    "code_signing",
    "email_protection",
    "time_stamping",
];

const DN_FIELDS: &[&str] = &[
    "common_name",
    "country",
    "state",
    "locality",
    "organization",
    "organizational_unit",
];

pub struct PrivateCertificate {
    descriptor: &'static ResourceDescriptor,
}

impl PrivateCertificate {
    pub fn new() -> Option<Self> {
        get_descriptor("ccm_private_certificate").map(|descriptor| Self { descriptor })
    }

    fn object_path(handle: &ResourceHandle) -> String {
        format!("{}/{}", COLLECTION, handle)
    }
}

/// Create request body
pub fn build_create_body(desired: &DesiredState) -> Value {
    let block_field = |block: Option<&Map<String, Value>>, key: &str| {
        block.and_then(|b| b.get(key)).cloned().unwrap_or(Value::Null)
    };

    let dn = desired.get("distinguished_name").and_then(flatten_block);
    let distinguished_name: Map<String, Value> = DN_FIELDS
        .iter()
        .map(|f| (f.to_string(), block_field(dn, *f)))
        .collect();

    let validity = desired.get("validity").and_then(flatten_block);
    let validity = json!({
        "type": block_field(validity, "type"),
        "value": block_field(validity, "value"),
        "start_from": value_ignore_empty(validity.and_then(|v| v.get("start_at"))),
    });

    let extended_key_usage: Map<String, Value> = EXTENDED_KEY_USAGES
        .iter()
        .filter_map(|f| desired.get(f).map(|v| (f.to_string(), v.clone())))
        .collect();

    let customized_extension = json!({
        "object_identifier": desired.get("object_identifier"),
        "value": desired.get("object_identifier_value"),
    });

    let subject_alternative_names: Vec<Value> = desired
        .get_list("subject_alternative_names")
        .map(|names| {
            names
                .iter()
                .map(|n| json!({"type": n.get("type"), "value": n.get("value")}))
                .collect()
        })
        .unwrap_or_default();

    PayloadBuilder::new()
        .required("issuer_id", desired.get("issuer_id").cloned().unwrap_or(Value::Null))
        .required("key_algorithm", desired.get("key_algorithm").cloned().unwrap_or(Value::Null))
        .required(
            "signature_algorithm",
            desired.get("signature_algorithm").cloned().unwrap_or(Value::Null),
        )
        .field("distinguished_name", Some(Value::Object(distinguished_name)))
        .field("validity", Some(validity))
        .field(
            "enterprise_project_id",
            value_ignore_empty(desired.get("enterprise_project_id")),
        )
        .field("key_usage", desired.get("key_usage").cloned())
        .field("extended_key_usage", Some(Value::Object(extended_key_usage)))
        .field("customized_extension", Some(customized_extension))
        .field(
            "subject_alternative_names",
            Some(Value::Array(subject_alternative_names)),
        )
        .build()
}

fn flatten_distinguished_name(raw: &Value) -> Value {
    let Some(dn) = path_search(raw, "distinguished_name") else {
        return Value::Null;
    };
    Value::Object(
        DN_FIELDS
            .iter()
            .map(|f| (f.to_string(), dn.get(*f).cloned().unwrap_or(Value::Null)))
            .collect(),
    )
}

#[async_trait]
impl Resource for PrivateCertificate {
    fn descriptor(&self) -> &ResourceDescriptor {
        self.descriptor
    }

    async fn create(
        &self,
        client: &ServiceClient,
        desired: &DesiredState,
    ) -> Result<ResourceHandle> {
        let body = client
            .post(COLLECTION, build_create_body(desired))
            .await
            .map_err(|e| e.with_context("error creating CCM private certificate"))?;

        path_str(&body, "certificate_id")
            .and_then(ResourceHandle::new)
            .ok_or_else(|| ProviderError::MissingIdentifier {
                kind: self.kind().to_string(),
                field: "certificate_id".to_string(),
            })
    }

    async fn get(&self, client: &ServiceClient, handle: &ResourceHandle) -> Result<Value> {
        client
            .get(&Self::object_path(handle))
            .await
            .map_err(|e| e.with_context("error retrieving CCM private certificate"))
    }

    fn extract(&self, raw: &Value, _handle: &ResourceHandle, out: &mut ObservedStateBuilder<'_>) {
        out.set("distinguished_name", flatten_distinguished_name(raw))
            .copy("issuer_id", raw, "issuer_id")
            .copy("key_algorithm", raw, "key_algorithm")
            .copy("signature_algorithm", raw, "signature_algorithm")
            .copy("enterprise_project_id", raw, "enterprise_project_id")
            .copy("issuer_name", raw, "issuer_name")
            .copy("status", raw, "status")
            .copy("gen_mode", raw, "gen_mode")
            .set("start_at", rfc3339_at(raw, "not_before"))
            .set("expired_at", rfc3339_at(raw, "not_after"))
            .set("created_at", rfc3339_at(raw, "create_time"));
    }

    async fn update_group(
        &self,
        _client: &ServiceClient,
        _handle: &ResourceHandle,
        _group: &str,
        _desired: &DesiredState,
        changes: &ChangeSet,
    ) -> Result<()> {
        // everything but tags forces replacement
        Err(ProviderError::ReplacementRequired {
            kind: self.kind().to_string(),
            fields: changes.fields().map(str::to_string).collect(),
        })
    }

    async fn delete(&self, client: &ServiceClient, handle: &ResourceHandle) -> Result<()> {
        client
            .delete(&Self::object_path(handle), None)
            .await
            .map(|_| ())
            .map_err(|e| e.with_context("error deleting CCM private certificate"))
    }

    fn tag_channel(&self, handle: &ResourceHandle) -> Option<TagChannel> {
        Some(TagChannel::new(Self::object_path(handle), TagApi::CreateDelete))
    }
}
