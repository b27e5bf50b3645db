//! Provider error types
//!
//! Every failure a lifecycle operation can surface is a [`ProviderError`].
//! Remote failures keep the raw response in an [`ApiError`] so callers can
//! inspect the structured error code the cloud embeds in the body.

use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Maximum length of a response body kept in error messages
const MAX_BODY_DISPLAY: usize = 200;

/// A non-accepted HTTP response from the remote API
#[derive(Debug, Clone)]
pub struct ApiError {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl ApiError {
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Parsed JSON body, if the body is JSON at all
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// Application level error code (`error_code`, possibly nested under `error`)
    pub fn error_code(&self) -> Option<String> {
        let body = self.json_body()?;
        ["error_code", "error.error_code", "error.code"]
            .iter()
            .find_map(|path| crate::resource::extract::path_str(&body, path))
    }

    /// Human readable message the API attached to the error
    pub fn error_msg(&self) -> Option<String> {
        let body = self.json_body()?;
        ["error_msg", "error.error_msg", "error.message", "message"]
            .iter()
            .find_map(|path| crate::resource::extract::path_str(&body, path))
    }

    /// Whether the body carries the given error code, whatever the HTTP status
    pub fn has_error_code(&self, code: &str) -> bool {
        self.error_code().as_deref() == Some(code)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body: String = self.body.chars().take(MAX_BODY_DISPLAY).collect();
        write!(
            f,
            "{} {} returned {}: {}",
            self.method, self.url, self.status, body
        )?;
        if self.body.chars().count() > MAX_BODY_DISPLAY {
            write!(f, "...")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// One attribute that could not be written into observed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to create {service} client: {reason}")]
    ClientConstruction { service: String, reason: String },

    #[error("{context}: {source}")]
    RemoteCall {
        context: String,
        #[source]
        source: ApiError,
    },

    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{kind} {id} not found")]
    ResourceNotFound { kind: String, id: String },

    #[error("error creating {kind}: {field} is not found in API response")]
    MissingIdentifier { kind: String, field: String },

    #[error("invalid format specified for the ID of {kind} ({raw:?}): format must be {expected}")]
    InvalidIdentifierFormat {
        kind: String,
        raw: String,
        expected: String,
    },

    #[error("failed to set attributes for {kind}: {}", join(.errors))]
    PartialFieldSet {
        kind: String,
        errors: Vec<FieldError>,
    },

    #[error("invalid configuration for {kind}: {}", .violations.join("; "))]
    Validation {
        kind: String,
        violations: Vec<String>,
    },

    #[error("changing {} of {kind} requires replacing the resource", .fields.join(", "))]
    ReplacementRequired { kind: String, fields: Vec<String> },

    #[error("job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("timed out after {}s waiting for job {job_id}", .waited.as_secs())]
    JobTimeout { job_id: String, waited: Duration },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProviderError {
    /// Replace the context of a remote failure, leaving other errors untouched
    pub fn with_context(self, context: impl Into<String>) -> Self {
        match self {
            Self::RemoteCall { source, .. } => Self::RemoteCall {
                context: context.into(),
                source,
            },
            Self::Transport { source, .. } => Self::Transport {
                context: context.into(),
                source,
            },
            other => other,
        }
    }

    /// The remote response behind this error, if any
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::RemoteCall { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound { .. })
    }
}
