//! Tag reconciliation
//!
//! Tags live behind side-channel endpoints next to the resource. Updates
//! send at most two batch calls: removals, then additions.

use crate::cloud::ServiceClient;
use crate::error::Result;
use crate::resource::extract::path_search;
use crate::state::TagSet;
use serde_json::json;

/// Minimal set of tag changes turning `old` into `new`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Old entries whose key is gone or whose value changed
    pub removals: TagSet,
    /// New entries whose key is new or whose value changed
    pub additions: TagSet,
}

impl TagDiff {
    pub fn compute(old: &TagSet, new: &TagSet) -> Self {
        let removals = old
            .iter()
            .filter(|(k, v)| new.get(k) != Some(v.as_str()))
            .collect();
        let additions = new
            .iter()
            .filter(|(k, v)| old.get(k) != Some(v.as_str()))
            .collect();
        Self {
            removals,
            additions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }

    /// Result of applying the diff to `old`
    pub fn apply(&self, old: &TagSet) -> TagSet {
        let mut result = old.clone();
        for (key, _) in self.removals.iter() {
            result.remove(key);
        }
        for (key, value) in self.additions.iter() {
            result.insert(key.clone(), value.clone());
        }
        result
    }
}

/// Shape of a service's tag endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagApi {
    /// `POST {base}/tags/create` and `DELETE {base}/tags/delete`
    CreateDelete,
    /// `POST {base}/tags/action` with `"action": "create" | "delete"`
    Action,
}

/// Tag side-channel of one remote object
#[derive(Debug, Clone)]
pub struct TagChannel {
    base: String,
    api: TagApi,
}

impl TagChannel {
    /// `base` is the object path, relative to the service endpoint
    pub fn new(base: impl Into<String>, api: TagApi) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            api,
        }
    }

    pub async fn attach(&self, client: &ServiceClient, tags: &TagSet) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        tracing::debug!("Attaching {} tags to {}", tags.len(), self.base);
        match self.api {
            TagApi::CreateDelete => {
                let path = format!("{}/tags/create", self.base);
                client.post(&path, json!({ "tags": tags.to_api_list() })).await?;
            }
            TagApi::Action => {
                let path = format!("{}/tags/action", self.base);
                let body = json!({ "action": "create", "tags": tags.to_api_list() });
                client.post(&path, body).await?;
            }
        }
        Ok(())
    }

    pub async fn detach(&self, client: &ServiceClient, tags: &TagSet) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        tracing::debug!("Removing {} tags from {}", tags.len(), self.base);
        match self.api {
            TagApi::CreateDelete => {
                let path = format!("{}/tags/delete", self.base);
                client
                    .delete(&path, Some(json!({ "tags": tags.to_api_list() })))
                    .await?;
            }
            TagApi::Action => {
                let path = format!("{}/tags/action", self.base);
                let body = json!({ "action": "delete", "tags": tags.to_api_list() });
                client.post(&path, body).await?;
            }
        }
        Ok(())
    }

    pub async fn list(&self, client: &ServiceClient) -> Result<TagSet> {
        let body = client.get(&format!("{}/tags", self.base)).await?;
        Ok(path_search(&body, "tags")
            .map(TagSet::from_api_list)
            .unwrap_or_default())
    }

    /// Removals first, then additions; empty batches send nothing
    pub async fn reconcile(
        &self,
        client: &ServiceClient,
        old: &TagSet,
        new: &TagSet,
    ) -> Result<TagDiff> {
        let diff = TagDiff::compute(old, new);
        self.detach(client, &diff.removals).await?;
        self.attach(client, &diff.additions).await?;
        Ok(diff)
    }
}
