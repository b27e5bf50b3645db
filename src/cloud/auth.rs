//! Huawei Cloud Authentication
//!
//! Handles authentication with either a pre-issued IAM token or IAM
//! password credentials exchanged for a project-scoped token.

use super::http::{HttpClient, RequestOpts};
use crate::error::{ProviderError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Method;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Default token TTL if the response carries no usable expiry (IAM tokens live 24 hours)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const TOKEN_PATH: &str = "v3/auth/tokens";

/// Where credentials come from
#[derive(Clone)]
pub enum Credentials {
    /// Pre-issued IAM token, used as is
    Token(String),
    /// IAM user credentials exchanged for a token
    Password {
        domain_name: String,
        user_name: String,
        password: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Credentials::Token(***)"),
            Self::Password {
                domain_name,
                user_name,
                ..
            } => write!(f, "Credentials::Password({}/{})", domain_name, user_name),
        }
    }
}

impl Credentials {
    /// Read credentials from `HW_AUTH_TOKEN`, or `HW_DOMAIN_NAME`/`HW_USER_NAME`/`HW_PASSWORD`
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(token) = var("HW_AUTH_TOKEN") {
            return Ok(Self::Token(token));
        }

        match (var("HW_DOMAIN_NAME"), var("HW_USER_NAME"), var("HW_PASSWORD")) {
            (Some(domain_name), Some(user_name), Some(password)) => Ok(Self::Password {
                domain_name,
                user_name,
                password,
            }),
            _ => Err(ProviderError::ClientConstruction {
                service: "iam".to_string(),
                reason: "no credentials: set HW_AUTH_TOKEN, \
                         or HW_DOMAIN_NAME, HW_USER_NAME and HW_PASSWORD"
                    .to_string(),
            }),
        }
    }
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Token source with caching
#[derive(Clone)]
pub struct TokenProvider {
    credentials: Credentials,
    http: HttpClient,
    iam_endpoint: String,
    project_id: String,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl TokenProvider {
    pub fn new(
        credentials: Credentials,
        http: HttpClient,
        iam_endpoint: &str,
        project_id: &str,
    ) -> Self {
        Self {
            credentials,
            http,
            iam_endpoint: iam_endpoint.to_string(),
            project_id: project_id.to_string(),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get a token for API calls
    pub async fn get_token(&self) -> Result<String> {
        let (domain_name, user_name, password) = match &self.credentials {
            Credentials::Token(token) => return Ok(token.clone()),
            Credentials::Password {
                domain_name,
                user_name,
                password,
            } => (domain_name, user_name, password),
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": user_name,
                            "password": password,
                            "domain": {"name": domain_name}
                        }
                    }
                },
                "scope": {"project": {"id": self.project_id}}
            }
        });

        let url = format!("{}{}", self.iam_endpoint, TOKEN_PATH);
        let opts = RequestOpts::new().json(body).ok_codes(&[200, 201]);
        let response = self
            .http
            .request(Method::POST, &url, None, &opts)
            .await
            .map_err(|e| ProviderError::ClientConstruction {
                service: "iam".to_string(),
                reason: format!("failed to get token: {}", e),
            })?;

        let token = response
            .header("X-Subject-Token")
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::ClientConstruction {
                service: "iam".to_string(),
                reason: "X-Subject-Token header missing from token response".to_string(),
            })?;

        let ttl = response
            .body
            .pointer("/token/expires_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .and_then(|exp| (exp.with_timezone(&Utc) - Utc::now()).to_std().ok())
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token)
    }

    /// Whether tokens are issued here and can be re-issued
    pub fn can_refresh(&self) -> bool {
        matches!(self.credentials, Credentials::Password { .. })
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }
        self.get_token().await
    }
}

/// Validate a project ID: 32 lowercase hex characters
pub fn validate_project_id(project: &str) -> bool {
    project.len() == 32
        && project
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Validate a region name such as `cn-north-4` or `ap-southeast-1`
pub fn validate_region(region: &str) -> bool {
    static REGION_RE: OnceLock<Option<Regex>> = OnceLock::new();
    REGION_RE
        .get_or_init(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-[0-9]{1,2}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(region))
}

/// Region from `HW_REGION_NAME`
/// Invalid values are ignored with a warning
pub fn default_region() -> Option<String> {
    let region = std::env::var("HW_REGION_NAME").ok()?;
    if validate_region(&region) {
        return Some(region);
    }
    tracing::warn!("Invalid region format in HW_REGION_NAME");
    None
}

/// Project ID from `HW_PROJECT_ID`
pub fn default_project() -> Option<String> {
    let project = std::env::var("HW_PROJECT_ID").ok()?;
    if validate_project_id(&project) {
        return Some(project);
    }
    tracing::warn!("Invalid project ID format in HW_PROJECT_ID");
    None
}
