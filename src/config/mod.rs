//! Configuration loading and management
//!
//! Per-collection configuration covers two concerns: which permission rule
//! applies to each logical operation, and the bounds applied to list queries
//! (whitelists, default sort, pagination limits, filter caps).
//!
//! Role and public rules are YAML-loadable; custom predicate rules can only
//! be registered in code via [`CollectionConfig::permission`].

use crate::core::auth::PermissionRule;
use crate::core::filter::FilterLimits;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Operation names a permission rule may be keyed by.
const PERMISSION_OPERATIONS: [&str; 5] = ["read", "create", "update", "patch", "delete"];

/// Bounds and whitelists applied when building list queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    /// Fields clients may filter on; `None` falls back to the schema fields.
    pub allowed_filter_fields: Option<Vec<String>>,

    /// Fields clients may sort on; `None` falls back to the schema fields.
    pub allowed_sort_fields: Option<Vec<String>>,

    /// Sort expression applied when no `sort` parameter is present
    /// (e.g. `"-created_at"`).
    pub default_sort: Option<String>,

    /// Effective limit when none is requested.
    pub default_limit: usize,

    /// Hard ceiling; larger requested limits clamp down to this.
    pub max_limit: usize,

    /// Cap on distinct filter conditions per request.
    pub max_conditions: usize,

    /// Cap on raw `__like` value length.
    pub max_pattern_len: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            allowed_filter_fields: None,
            allowed_sort_fields: None,
            default_sort: None,
            default_limit: 20,
            max_limit: 100,
            max_conditions: 20,
            max_pattern_len: 256,
        }
    }
}

impl ListOptions {
    pub fn filter_limits(&self) -> FilterLimits {
        FilterLimits {
            max_conditions: self.max_conditions,
            max_pattern_len: self.max_pattern_len,
        }
    }
}

/// Resolved runtime configuration for one collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionConfig {
    /// Permission rules keyed by logical operation name
    /// (`read`, `create`, `update`, `patch`, `delete`).
    pub permissions: HashMap<String, PermissionRule>,
    pub list: ListOptions,
}

impl CollectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a permission rule for one logical operation (builder style).
    pub fn permission(mut self, operation: impl Into<String>, rule: PermissionRule) -> Self {
        self.permissions.insert(operation.into(), rule);
        self
    }

    pub fn list_options(mut self, list: ListOptions) -> Self {
        self.list = list;
        self
    }
}

/// YAML shape of a permission rule: the `public` marker or a role list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PermissionSpec {
    Marker(String),
    Roles(Vec<String>),
}

impl PermissionSpec {
    pub fn into_rule(self) -> Result<PermissionRule> {
        match self {
            PermissionSpec::Marker(marker) if marker == "public" => Ok(PermissionRule::Public),
            PermissionSpec::Marker(marker) => {
                bail!("unknown permission marker '{}' (expected 'public' or a role list)", marker)
            }
            PermissionSpec::Roles(roles) => Ok(PermissionRule::Roles(roles)),
        }
    }
}

/// YAML shape of one collection's configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfigFile {
    pub name: String,

    /// Operation name → rule (`read: public`, `delete: [admin]`, ...)
    #[serde(default)]
    pub permissions: HashMap<String, PermissionSpec>,

    #[serde(default)]
    pub list: ListOptions,
}

impl CollectionConfigFile {
    /// Resolve into the runtime configuration, validating operation names.
    pub fn into_config(self) -> Result<(String, CollectionConfig)> {
        let mut permissions = HashMap::new();
        for (operation, spec) in self.permissions {
            if !PERMISSION_OPERATIONS.contains(&operation.as_str()) {
                bail!(
                    "unknown operation '{}' in permissions for collection '{}'",
                    operation,
                    self.name
                );
            }
            permissions.insert(operation, spec.into_rule()?);
        }
        Ok((
            self.name,
            CollectionConfig {
                permissions,
                list: self.list,
            },
        ))
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct CorralConfig {
    /// Replace internal error messages with a generic string on the wire.
    #[serde(default)]
    pub production: bool,

    #[serde(default)]
    pub collections: Vec<CollectionConfigFile>,
}

impl CorralConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
