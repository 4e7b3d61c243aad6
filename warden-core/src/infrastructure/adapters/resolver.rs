// warden-core/src/infrastructure/adapters/resolver.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::domain::dialect::EngineFamily;
use crate::domain::quality::DataSourceDescriptor;
use crate::error::WardenError;
use crate::infrastructure::adapters::duckdb::DuckDBConnector;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::connector::{Connector, ConnectorResolver};

/// Opens one connector per data source on first use and reuses it afterwards.
/// Only embedded DuckDB sources can be opened; other engine families need their own adapter.
pub struct DuckDbResolver {
    project_dir: PathBuf,
    open: Mutex<HashMap<String, Arc<dyn Connector>>>,
}

impl DuckDbResolver {
    /// Relative `database` paths are resolved against `project_dir`.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
            open: Mutex::new(HashMap::new()),
        }
    }

    fn database_path(&self, source: &DataSourceDescriptor) -> String {
        match source.database.as_deref() {
            None | Some("") | Some(":memory:") => ":memory:".to_string(),
            Some(p) if Path::new(p).is_absolute() => p.to_string(),
            Some(p) => self.project_dir.join(p).to_string_lossy().into_owned(),
        }
    }
}

impl ConnectorResolver for DuckDbResolver {
    fn resolve(&self, source: &DataSourceDescriptor) -> Result<Arc<dyn Connector>, WardenError> {
        if source.engine != EngineFamily::Duckdb {
            return Err(InfrastructureError::UnsupportedEngine(source.engine.to_string()).into());
        }

        let mut open = self.open.lock().map_err(|_| {
            WardenError::Infrastructure(InfrastructureError::Io(std::io::Error::other(
                "Resolver Mutex Poisoned",
            )))
        })?;
        if let Some(conn) = open.get(&source.id) {
            return Ok(Arc::clone(conn));
        }

        let path = self.database_path(source);
        debug!(source = %source.id, path = %path, "Opening DuckDB connector");
        let conn: Arc<dyn Connector> = Arc::new(DuckDBConnector::new(&path)?);
        open.insert(source.id.clone(), Arc::clone(&conn));
        Ok(conn)
    }
}

/// Fixed source-id -> connector map, for wiring connectors built elsewhere.
#[derive(Default)]
pub struct StaticResolver {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source_id: &str, connector: Arc<dyn Connector>) -> Self {
        self.connectors.insert(source_id.to_string(), connector);
        self
    }
}

impl ConnectorResolver for StaticResolver {
    fn resolve(&self, source: &DataSourceDescriptor) -> Result<Arc<dyn Connector>, WardenError> {
        self.connectors.get(&source.id).cloned().ok_or_else(|| {
            InfrastructureError::Connection(format!("no connector registered for '{}'", source.id)).into()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reuses_connector_per_source() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let resolver = DuckDbResolver::new(dir.path());
        let mut source = DataSourceDescriptor::new("wh", EngineFamily::Duckdb);
        source.database = Some("wh.duckdb".into());

        let a = resolver.resolve(&source)?;
        a.execute("CREATE TABLE t (x INTEGER)").await?;
        let b = resolver.resolve(&source)?;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(dir.path().join("wh.duckdb").exists());
        Ok(())
    }

    #[test]
    fn test_other_engines_are_connectivity_errors() {
        let resolver = DuckDbResolver::new(".");
        let err = resolver
            .resolve(&DataSourceDescriptor::new("pg", EngineFamily::PostgresWire))
            .err()
            .unwrap();
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_static_resolver_unknown_source() {
        let resolver = StaticResolver::new();
        let err = resolver
            .resolve(&DataSourceDescriptor::new("x", EngineFamily::Duckdb))
            .err()
            .unwrap();
        assert!(err.is_connectivity());
    }
}
