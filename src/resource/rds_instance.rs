//! RDS instance
//!
//! Create, resize, volume enlargement and delete run as asynchronous jobs;
//! each of them waits for its job before returning.

use super::builder::{flatten_block, value_ignore_empty, PayloadBuilder};
use super::extract::{path_search, path_str, ObservedStateBuilder};
use super::registry::get_descriptor;
use super::tags::{TagApi, TagChannel};
use super::Resource;
use crate::cloud::{JobPoller, ServiceClient};
use crate::error::{ProviderError, Result};
use crate::schema::ResourceDescriptor;
use crate::state::{Attributes, ChangeSet, DesiredState, ResourceHandle};
use async_trait::async_trait;
use serde_json::{json, Value};

const COLLECTION: &str = "v3/{project_id}/instances";

pub struct RdsInstance {
    descriptor: &'static ResourceDescriptor,
}

impl RdsInstance {
    pub fn new() -> Option<Self> {
        get_descriptor("rds_instance").map(|descriptor| Self { descriptor })
    }

    fn object_path(handle: &ResourceHandle) -> String {
        format!("{}/{}", COLLECTION, handle)
    }

    /// Wait for the job named in a response, if it names one
    async fn wait_for_job(client: &ServiceClient, response: &Value) -> Result<()> {
        match path_str(response, "job_id") {
            Some(job_id) => JobPoller::new(client).wait(&job_id).await,
            None => Ok(()),
        }
    }

    async fn action(
        &self,
        client: &ServiceClient,
        handle: &ResourceHandle,
        body: Value,
        context: &str,
    ) -> Result<()> {
        let response = client
            .post(&format!("{}/action", Self::object_path(handle)), body)
            .await
            .map_err(|e| e.with_context(context))?;
        Self::wait_for_job(client, &response).await
    }

}

/// Create request body; `region` fills in when the desired state has none
pub fn build_create_body(desired: &DesiredState, region: &str) -> Value {
    let datastore = desired.get("datastore").and_then(flatten_block);
    let availability_zone = desired.get_list("availability_zone").map(|zones| {
        zones
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(",")
    });

    PayloadBuilder::new()
        .required("name", json!(desired.get_str("name").unwrap_or_default()))
        .field("datastore", datastore.map(|d| Value::Object(d.clone())))
        .required("flavor_ref", json!(desired.get_str("flavor").unwrap_or_default()))
        .field(
            "volume",
            Some(json!({
                "type": desired.get("volume_type"),
                "size": desired.get("volume_size"),
            })),
        )
        .required(
            "region",
            json!(desired.get_str("region").unwrap_or(region)),
        )
        .field("availability_zone", availability_zone.map(Value::String))
        .field("vpc_id", value_ignore_empty(desired.get("vpc_id")))
        .field("subnet_id", value_ignore_empty(desired.get("subnet_id")))
        .field(
            "security_group_id",
            value_ignore_empty(desired.get("security_group_id")),
        )
        .field("password", value_ignore_empty(desired.get("password")))
        .field(
            "port",
            desired.get_i64("port").map(|p| Value::String(p.to_string())),
        )
        .field("time_zone", value_ignore_empty(desired.get("time_zone")))
        .field(
            "enterprise_project_id",
            value_ignore_empty(desired.get("enterprise_project_id")),
        )
        .build()
}

/// Distinct zones of the instance nodes, in node order
fn node_zones(raw: &Value) -> Value {
    let mut zones: Vec<Value> = Vec::new();
    for node in path_search(raw, "nodes")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let Some(zone) = node.get("availability_zone").filter(|z| z.is_string()) {
            if !zones.contains(zone) {
                zones.push(zone.clone());
            }
        }
    }
    if zones.is_empty() {
        Value::Null
    } else {
        Value::Array(zones)
    }
}

/// `"02:00-06:00"` into begin and end
fn split_window(raw: &Value) -> (Value, Value) {
    path_str(raw, "maintenance_window")
        .and_then(|w| {
            w.split_once('-')
                .map(|(begin, end)| (json!(begin), json!(end)))
        })
        .unwrap_or((Value::Null, Value::Null))
}

fn port_value(raw: &Value) -> Value {
    match path_search(raw, "port") {
        Some(Value::String(s)) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
        Some(v) => v.clone(),
        None => Value::Null,
    }
}

#[async_trait]
impl Resource for RdsInstance {
    fn descriptor(&self) -> &ResourceDescriptor {
        self.descriptor
    }

    async fn create(
        &self,
        client: &ServiceClient,
        desired: &DesiredState,
    ) -> Result<ResourceHandle> {
        let body = build_create_body(desired, &client.region);
        let response = client
            .post(COLLECTION, body)
            .await
            .map_err(|e| e.with_context("error creating RDS instance"))?;

        let handle = path_str(&response, "instance.id")
            .and_then(ResourceHandle::new)
            .ok_or_else(|| ProviderError::MissingIdentifier {
                kind: self.kind().to_string(),
                field: "instance.id".to_string(),
            })?;

        if let Err(e) = Self::wait_for_job(client, &response).await {
            tracing::error!("RDS instance {} was created but its job did not complete", handle);
            return Err(e);
        }
        Ok(handle)
    }

    async fn get(&self, client: &ServiceClient, handle: &ResourceHandle) -> Result<Value> {
        let path = format!("{}?id={}", COLLECTION, urlencoding::encode(handle.as_str()));
        let body = client
            .get(&path)
            .await
            .map_err(|e| e.with_context("error retrieving RDS instance"))?;

        path_search(&body, "instances.0")
            .cloned()
            .ok_or_else(|| ProviderError::ResourceNotFound {
                kind: self.kind().to_string(),
                id: handle.to_string(),
            })
    }

    fn extract(&self, raw: &Value, _handle: &ResourceHandle, out: &mut ObservedStateBuilder<'_>) {
        let datastore = path_search(raw, "datastore")
            .map(|d| {
                json!({
                    "type": d.get("type").cloned().unwrap_or(Value::Null),
                    "version": d.get("version").cloned().unwrap_or(Value::Null),
                })
            })
            .unwrap_or(Value::Null);
        let (maintain_begin, maintain_end) = split_window(raw);

        out.copy("name", raw, "name")
            .copy("flavor", raw, "flavor_ref")
            .copy("volume_type", raw, "volume.type")
            .copy("volume_size", raw, "volume.size")
            .set("datastore", datastore)
            .set("availability_zone", node_zones(raw))
            .copy("vpc_id", raw, "vpc_id")
            .copy("subnet_id", raw, "subnet_id")
            .copy("security_group_id", raw, "security_group_id")
            .copy("description", raw, "alias")
            .set("maintain_begin", maintain_begin)
            .set("maintain_end", maintain_end)
            .set("port", port_value(raw))
            .copy("time_zone", raw, "time_zone")
            .copy("enterprise_project_id", raw, "enterprise_project_id")
            .copy("status", raw, "status")
            .copy("private_ips", raw, "private_ips")
            .copy("public_ips", raw, "public_ips")
            .copy("created", raw, "created");
    }

    /// The volume can only grow
    fn check_changes(&self, changes: &ChangeSet) -> Result<()> {
        let Some((old, new)) = changes.get_change("volume_size") else {
            return Ok(());
        };
        match (old.as_i64(), new.as_i64()) {
            (Some(old), Some(new)) if new < old => Err(ProviderError::Validation {
                kind: self.kind().to_string(),
                violations: vec![format!(
                    "volume_size: cannot shrink the volume from {} to {} GB",
                    old, new
                )],
            }),
            _ => Ok(()),
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
        let path = Self::object_path(handle);
        match group {
            "name" => {
                let response = client
                    .put(
                        &format!("{}/name", path),
                        json!({"name": desired.get_str("name").unwrap_or_default()}),
                    )
                    .await
                    .map_err(|e| e.with_context("error renaming RDS instance"))?;
                Self::wait_for_job(client, &response).await
            }
            "flavor" => {
                let body = json!({"resize_flavor": {
                    "spec_code": desired.get_str("flavor").unwrap_or_default()
                }});
                self.action(client, handle, body, "error resizing RDS instance flavor")
                    .await
            }
            "volume" => {
                let body = json!({"enlarge_volume": {
                    "size": desired.get_i64("volume_size")
                }});
                self.action(client, handle, body, "error enlarging RDS instance volume")
                    .await
            }
            "alias" => client
                .put(
                    &format!("{}/alias", path),
                    json!({"alias": desired.get_str("description").unwrap_or_default()}),
                )
                .await
                .map(|_| ())
                .map_err(|e| e.with_context("error updating RDS instance description")),
            "maintain_window" => {
                let body = PayloadBuilder::new()
                    .field("start_time", value_ignore_empty(desired.get("maintain_begin")))
                    .field("end_time", value_ignore_empty(desired.get("maintain_end")))
                    .build();
                client
                    .put(&format!("{}/ops-window", path), body)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.with_context("error updating RDS maintenance window"))
            }
            "password" => client
                .post(
                    &format!("{}/password", path),
                    json!({"db_user_pwd": desired.get_str("password").unwrap_or_default()}),
                )
                .await
                .map(|_| ())
                .map_err(|e| e.with_context("error resetting RDS instance password")),
            other => {
                tracing::warn!("Ignoring unknown update group {} for RDS instance", other);
                Ok(())
            }
        }
    }

    async fn delete(&self, client: &ServiceClient, handle: &ResourceHandle) -> Result<()> {
        let response = client
            .delete(&Self::object_path(handle), None)
            .await
            .map_err(|e| e.with_context("error deleting RDS instance"))?;
        Self::wait_for_job(client, &response).await
    }

    fn tag_channel(&self, handle: &ResourceHandle) -> Option<TagChannel> {
        Some(TagChannel::new(Self::object_path(handle), TagApi::Action))
    }
}
