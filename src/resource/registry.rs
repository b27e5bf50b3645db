//! Resource Registry - Load resource descriptors from JSON
//!
//! Descriptors for every resource kind are embedded into the binary and
//! parsed once on first access.

use crate::schema::ResourceDescriptor;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/ccm.json"),
    include_str!("../resources/csms.json"),
    include_str!("../resources/rds.json"),
];

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDescriptor>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig {
            resources: BTreeMap::new(),
        };

        for content in RESOURCE_FILES {
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            for (kind, mut descriptor) in partial.resources {
                descriptor.kind = kind.clone();
                final_config.resources.insert(kind, descriptor);
            }
        }

        final_config
    })
}

/// Get a resource descriptor by kind
pub fn get_descriptor(kind: &str) -> Option<&'static ResourceDescriptor> {
    get_registry().resources.get(kind)
}

/// All resource kinds, sorted
pub fn get_all_kinds() -> Vec<&'static str> {
    get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect()
}
