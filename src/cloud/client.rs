//! Huawei Cloud Client
//!
//! Combines authentication and HTTP functionality, and resolves the
//! per-service endpoints resources talk to.

use super::auth::{Credentials, TokenProvider};
use super::http::{ClientConfig, HttpClient, RawResponse, RequestOpts};
use super::job::PollConfig;
use crate::error::{ProviderError, Result};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

/// Everything needed to reach one region of one project
#[derive(Debug, Clone)]
pub struct CloudSettings {
    pub region: String,
    pub project_id: String,
    /// Per-service endpoint overrides, keyed by service name
    pub endpoints: HashMap<String, String>,
    pub client: ClientConfig,
    pub poll: PollConfig,
}

impl CloudSettings {
    pub fn new(region: &str, project_id: &str) -> Self {
        Self {
            region: region.to_string(),
            project_id: project_id.to_string(),
            endpoints: HashMap::new(),
            client: ClientConfig::default(),
            poll: PollConfig::default(),
        }
    }

    pub fn with_endpoint(mut self, service: &str, endpoint: &str) -> Self {
        self.endpoints
            .insert(service.to_string(), endpoint.to_string());
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Endpoint for a service, always ending in `/`
    pub fn endpoint(&self, service: &str) -> String {
        let endpoint = self
            .endpoints
            .get(service)
            .cloned()
            .unwrap_or_else(|| format!("https://{}.{}.myhuaweicloud.com/", service, self.region));
        if endpoint.ends_with('/') {
            endpoint
        } else {
            format!("{}/", endpoint)
        }
    }
}

/// Main Huawei Cloud client
#[derive(Clone)]
pub struct CloudClient {
    settings: CloudSettings,
    http: HttpClient,
    auth: TokenProvider,
}

impl CloudClient {
    /// Create a new client; no network call happens until the first request
    pub fn new(settings: CloudSettings, credentials: Credentials) -> Result<Self> {
        let http = HttpClient::new(settings.client.clone())?;
        let iam = checked_endpoint("iam", &settings.endpoint("iam"))?;
        let auth = TokenProvider::new(credentials, http.clone(), &iam, &settings.project_id);

        Ok(Self {
            settings,
            http,
            auth,
        })
    }

    pub fn region(&self) -> &str {
        &self.settings.region
    }

    pub fn project_id(&self) -> &str {
        &self.settings.project_id
    }

    pub fn settings(&self) -> &CloudSettings {
        &self.settings
    }

    /// Client bound to one service endpoint
    pub fn service_client(&self, service: &str) -> Result<ServiceClient> {
        let endpoint = checked_endpoint(service, &self.settings.endpoint(service))?;
        Ok(ServiceClient {
            service: service.to_string(),
            endpoint,
            project_id: self.settings.project_id.clone(),
            region: self.settings.region.clone(),
            http: self.http.clone(),
            auth: self.auth.clone(),
            poll: self.settings.poll.clone(),
        })
    }
}

fn checked_endpoint(service: &str, endpoint: &str) -> Result<String> {
    match Url::parse(endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(endpoint.to_string()),
        Ok(url) => Err(ProviderError::ClientConstruction {
            service: service.to_string(),
            reason: format!("unsupported endpoint scheme {}", url.scheme()),
        }),
        Err(e) => Err(ProviderError::ClientConstruction {
            service: service.to_string(),
            reason: format!("invalid endpoint {}: {}", endpoint, e),
        }),
    }
}

fn is_unauthorized(err: &ProviderError) -> bool {
    err.api_error().is_some_and(|api| api.status == 401)
}

/// Authenticated client for one service
#[derive(Clone)]
pub struct ServiceClient {
    pub service: String,
    pub endpoint: String,
    pub project_id: String,
    pub region: String,
    http: HttpClient,
    auth: TokenProvider,
    poll: PollConfig,
}

impl ServiceClient {
    /// Full URL for a path relative to the endpoint; `{project_id}` is substituted
    pub fn url(&self, path: &str) -> String {
        let path = path.replace("{project_id}", &self.project_id);
        format!("{}{}", self.endpoint, path.trim_start_matches('/'))
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// Issue an authenticated request; an issued token rejected with 401 is
    /// refreshed and the request retried once
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        opts: &RequestOpts,
    ) -> Result<RawResponse> {
        let token = self.auth.get_token().await?;
        let url = self.url(path);
        match self.http.request(method.clone(), &url, Some(&token), opts).await {
            Err(e) if self.auth.can_refresh() && is_unauthorized(&e) => {
                tracing::debug!("Token rejected by {}, refreshing", self.service);
                let token = self.auth.refresh_token().await?;
                self.http.request(method, &url, Some(&token), opts).await
            }
            result => result,
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, &RequestOpts::new())
            .await
            .map(|r| r.body)
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.request(Method::POST, path, &RequestOpts::new().json(body))
            .await
            .map(|r| r.body)
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
        self.request(Method::PUT, path, &RequestOpts::new().json(body))
            .await
            .map(|r| r.body)
    }

    pub async fn delete(&self, path: &str, body: Option<Value>) -> Result<Value> {
        let mut opts = RequestOpts::new();
        if let Some(body) = body {
            opts = opts.json(body);
        }
        self.request(Method::DELETE, path, &opts)
            .await
            .map(|r| r.body)
    }
}
