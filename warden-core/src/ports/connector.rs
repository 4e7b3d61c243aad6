// warden-core/src/ports/connector.rs

// What the engine needs from a database, without knowing which one is behind it.
// The resolver picks the implementation from a data-source descriptor at execution time.

use crate::domain::quality::DataSourceDescriptor;
use crate::error::WardenError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

// Struct simple pour décrire une colonne (indépendant de la DB)
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

/// Tabular result of a read query. Values are JSON so that every engine maps onto the same shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// First cell of the first row, if any.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }

    /// Value of `column` in the first row.
    pub fn first_value(&self, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.first().and_then(|r| r.get(idx))
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, column: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |r| r.get(column))
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Read-only query returning rows.
    async fn query(&self, sql: &str) -> Result<QueryOutput, WardenError>;

    /// Statement returning the number of affected rows. Only the auto-fix path mutates data.
    async fn execute(&self, sql: &str) -> Result<u64, WardenError>;

    async fn fetch_columns(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnSchema>, WardenError>;

    fn engine_name(&self) -> &str;
}

/// Picks (or opens) the connector serving a data source.
pub trait ConnectorResolver: Send + Sync {
    fn resolve(&self, source: &DataSourceDescriptor) -> Result<Arc<dyn Connector>, WardenError>;
}
