//! HTTP utilities for Huawei Cloud REST API calls

use crate::error::{ApiError, ProviderError, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const DEFAULT_USER_AGENT: &str = concat!("hwc-reconcile/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let total = body.chars().count();
    let truncated = if total > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Settings shared by every request a client issues. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    default_headers: BTreeMap<String, String>,
    user_agent: String,
    timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let default_headers = [
            ("Content-Type", "application/json"),
            ("X-Language", "en-us"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            default_headers,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.default_headers
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn default_headers(&self) -> &BTreeMap<String, String> {
        &self.default_headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOpts {
    pub json_body: Option<Value>,
    pub more_headers: Vec<(String, String)>,
    /// Accepted status codes; empty accepts any 2xx
    pub ok_codes: Vec<u16>,
}

impl RequestOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(mut self, body: Value) -> Self {
        self.json_body = Some(body);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.more_headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn ok_codes(mut self, codes: &[u16]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    fn accepts(&self, status: u16) -> bool {
        if self.ok_codes.is_empty() {
            (200..300).contains(&status)
        } else {
            self.ok_codes.contains(&status)
        }
    }
}

/// Accepted response; an empty body reads as null
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
    pub headers: HeaderMap,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// HTTP client wrapper for Huawei Cloud API calls
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::ClientConstruction {
                service: "http".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Issue one request. Non-accepted statuses become [`ProviderError::RemoteCall`].
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        opts: &RequestOpts,
    ) -> Result<RawResponse> {
        tracing::debug!("{} {}", method, url);
        let context = format!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), url);
        for (name, value) in &self.config.default_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        for (name, value) in &opts.more_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(token) = token {
            request = request.header("X-Auth-Token", token);
        }
        if let Some(body) = &opts.json_body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                context: context.clone(),
                source,
            })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|source| ProviderError::Transport {
                context: context.clone(),
                source,
            })?;

        if !opts.accepts(status) {
            // Only log sanitized/truncated error body
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
            return Err(ProviderError::RemoteCall {
                context,
                source: ApiError::new(method.as_str(), url, status, text),
            });
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        Ok(RawResponse {
            status,
            body,
            headers,
        })
    }
}

/// Format a provider error for display
/// Remote failures show the status class and the API's own code, never the raw body
pub fn format_api_error(error: &ProviderError) -> String {
    let Some(api) = error.api_error() else {
        return error.to_string();
    };

    let summary = match api.status {
        401 => "Authentication failed. Check HW_AUTH_TOKEN or the IAM credentials.",
        403 => "Permission denied. Check the IAM policies of the account.",
        404 => "Resource not found.",
        409 => "Resource conflict. The resource may already exist or be in use.",
        429 => "Rate limit exceeded. Please try again later.",
        400 => "Invalid request. Check your parameters.",
        500..=599 => "Service temporarily unavailable. Please try again.",
        _ => "Request failed.",
    };

    match (api.error_code(), api.error_msg()) {
        (Some(code), Some(msg)) => format!("{} [{}] {}", summary, code, sanitize_for_log(&msg)),
        (Some(code), None) => format!("{} [{}]", summary, code),
        _ => summary.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let body = "é".repeat(300);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("[truncated, 600 bytes total]"));
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(sanitize_for_log("a\nb\tc"), "abc");
    }

    #[test]
    fn test_ok_codes() {
        let opts = RequestOpts::new();
        assert!(opts.accepts(200));
        assert!(opts.accepts(204));
        assert!(!opts.accepts(404));

        let opts = RequestOpts::new().ok_codes(&[202]);
        assert!(opts.accepts(202));
        assert!(!opts.accepts(200));
    }

    #[test]
    fn test_client_config_is_built_once() {
        let config = ClientConfig::new()
            .with_header("X-Project-Id", "abc")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(
            config.default_headers().get("X-Language").map(String::as_str),
            Some("en-us")
        );
        assert_eq!(config.default_headers().len(), 3);
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_format_api_error_uses_code() {
        let err = ProviderError::RemoteCall {
            context: "GET x".to_string(),
            source: ApiError::new(
                "GET",
                "x",
                403,
                r#"{"error_code":"APIGW.0302","error_msg":"forbidden"}"#,
            ),
        };
        assert_eq!(
            format_api_error(&err),
            "Permission denied. Check the IAM policies of the account. [APIGW.0302] forbidden"
        );
    }

    #[test]
    fn test_format_non_remote_error() {
        let err = ProviderError::InvalidSettings("region is empty".to_string());
        assert_eq!(format_api_error(&err), "invalid settings: region is empty");
    }
}
