// warden-core/src/domain/quality/source.rs

use crate::domain::dialect::{Dialect, EngineFamily};
use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// Where rules run. Resolved at execution time into a connector and the translator's target dialect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSourceDescriptor {
    pub id: String,
    pub engine: EngineFamily,
    /// Overrides the engine family's default dialect (e.g. a Postgres-compatible warehouse).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,
    /// Connection parameter: file path for embedded engines, DSN otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_in_flight: Option<usize>,
}

impl DataSourceDescriptor {
    pub fn new(id: impl Into<String>, engine: EngineFamily) -> Self {
        Self {
            id: id.into(),
            engine,
            dialect: None,
            database: None,
            enabled: true,
            max_in_flight: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect.unwrap_or_else(|| self.engine.dialect())
    }
}
