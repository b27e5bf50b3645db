//! Configuration Management
//!
//! Handles persistent configuration storage for hwc-reconcile.

use crate::cloud::auth::{default_project, default_region, validate_project_id, validate_region};
use crate::cloud::{CloudSettings, PollConfig};
use crate::error::{ProviderError, Result as ProviderResult};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REGION: &str = "cn-north-4";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Per-service endpoint overrides, e.g. `{"rds": "https://rds.internal/"}`
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub job_poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hwc-reconcile").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load from a given file; a missing or unreadable file gives defaults
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config file {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Set region and save
    pub fn set_region(&mut self, region: &str) -> Result<()> {
        if !validate_region(region) {
            let reason = format!("invalid region {:?}", region);
            return Err(ProviderError::InvalidSettings(reason).into());
        }
        self.region = Some(region.to_string());
        self.save()
    }

    /// Set project and save
    pub fn set_project(&mut self, project_id: &str) -> Result<()> {
        if !validate_project_id(project_id) {
            return Err(ProviderError::InvalidSettings(format!(
                "invalid project id {:?}: expected 32 lowercase hex characters",
                project_id
            ))
            .into());
        }
        self.project_id = Some(project_id.to_string());
        self.save()
    }

    /// Get effective region (CLI > HW_REGION_NAME > config > default)
    pub fn effective_region(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(default_region)
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Get effective project (CLI > HW_PROJECT_ID > config)
    pub fn effective_project(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(default_project)
            .or_else(|| self.project_id.clone())
            .unwrap_or_default()
    }

    fn poll_config(&self) -> PollConfig {
        let mut poll = PollConfig::default();
        if let Some(secs) = self.job_poll_interval_secs {
            poll.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.job_timeout_secs {
            poll.timeout = Duration::from_secs(secs);
        }
        poll
    }

    /// Validated cloud settings for the effective region and project
    pub fn settings(
        &self,
        region_override: Option<&str>,
        project_override: Option<&str>,
    ) -> ProviderResult<CloudSettings> {
        let region = self.effective_region(region_override);
        if !validate_region(&region) {
            return Err(ProviderError::InvalidSettings(format!(
                "invalid region {:?}",
                region
            )));
        }

        let project = self.effective_project(project_override);
        if project.is_empty() {
            return Err(ProviderError::InvalidSettings(
                "no project configured. Set HW_PROJECT_ID or use --project".to_string(),
            ));
        }
        if !validate_project_id(&project) {
            return Err(ProviderError::InvalidSettings(format!(
                "invalid project id {:?}: expected 32 lowercase hex characters",
                project
            )));
        }

        let mut settings = CloudSettings::new(&region, &project).with_poll(self.poll_config());
        for (service, endpoint) in &self.endpoints {
            settings = settings.with_endpoint(service, endpoint);
        }
        if let Some(secs) = self.request_timeout_secs {
            settings.client = settings.client.with_timeout(Duration::from_secs(secs));
        }
        Ok(settings)
    }
}
