// warden-core/src/domain/project/configuration.rs

use crate::domain::anomaly::AnomalySettings;
use crate::domain::governance::MaskingStrategy;
use crate::domain::protection::{ColumnMasking, ColumnRef, ProtectionSettings};
use crate::domain::quality::DataSourceDescriptor;
use serde::{Deserialize, Serialize};

/// Worker pool and per-source limits for rule execution.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Hard timeout of one execution, connector call included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Applies to sources without their own `max_in_flight`.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_per_source: usize,
}

fn default_workers() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_in_flight() -> usize {
    2
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            max_in_flight_per_source: default_max_in_flight(),
        }
    }
}

/// One column's masking configuration as declared in the catalog.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CatalogColumn {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub mask_in_ui: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<MaskingStrategy>,
}

impl CatalogColumn {
    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef {
            source: self.source.clone(),
            schema: self.schema.clone(),
            table: self.table.clone(),
            column: self.column.clone(),
        }
    }

    pub fn masking(&self) -> ColumnMasking {
        ColumnMasking {
            mask_in_ui: self.mask_in_ui,
            strategy: self.strategy,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProjectConfig {
    pub name: String,
    pub version: String,
    #[serde(default = "default_profile")]
    pub profile: String,

    #[serde(rename = "rule-paths", default = "default_rule_paths")]
    pub rule_paths: Vec<String>,

    /// JSON snapshot of results, issues and anomaly models.
    #[serde(rename = "state-path", default = "default_state_path")]
    pub state_path: String,

    #[serde(default)]
    pub sources: Vec<DataSourceDescriptor>,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub protection: ProtectionSettings,

    #[serde(default)]
    pub anomaly: AnomalySettings,

    #[serde(default)]
    pub catalog: Vec<CatalogColumn>,
}

impl ProjectConfig {
    pub fn source(&self, id: &str) -> Option<&DataSourceDescriptor> {
        self.sources.iter().find(|s| s.id == id)
    }
}

fn default_rule_paths() -> Vec<String> {
    vec!["rules".to_string()]
}
fn default_state_path() -> String {
    ".warden/state.json".to_string()
}
fn default_profile() -> String {
    "dev".to_string()
}
