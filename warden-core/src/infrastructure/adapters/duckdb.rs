// warden-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat};
use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::{Config, Connection};
use serde_json::{Number, Value};
use std::sync::{Arc, Mutex};

// Imports Hexagonaux
use crate::error::WardenError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::connector::{ColumnSchema, Connector, QueryOutput};

pub struct DuckDBConnector {
    conn: Arc<Mutex<Connection>>,
}

fn poisoned() -> WardenError {
    WardenError::Infrastructure(InfrastructureError::Io(std::io::Error::other(
        "DuckDB Mutex Poisoned",
    )))
}

fn db_err(e: duckdb::Error) -> WardenError {
    WardenError::Infrastructure(InfrastructureError::Database(DatabaseError::DuckDB(e)))
}

impl DuckDBConnector {
    pub fn new(db_path: &str) -> Result<Self, InfrastructureError> {
        let config = Config::default();

        let conn = if db_path == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            Connection::open_with_flags(db_path, config)
                .map_err(|e| InfrastructureError::Connection(format!("{}: {}", db_path, e)))?
        };

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `work` on the blocking pool so that the caller's timeout can still fire.
    async fn with_connection<T, F>(&self, work: F) -> Result<T, WardenError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, WardenError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| poisoned())?;
            work(&guard)
        })
        .await
        .map_err(|e| WardenError::InternalError(format!("DuckDB worker failed: {}", e)))?
    }
}

fn number(n: impl Into<Number>) -> Value {
    Value::Number(n.into())
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

fn micros(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000_000),
        TimeUnit::Millisecond => v.saturating_mul(1_000),
        TimeUnit::Microsecond => v,
        TimeUnit::Nanosecond => v / 1_000,
    }
}

/// DuckDB value -> JSON. Timestamps become RFC 3339 strings, decimals become floats.
fn to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => number(i),
        DuckValue::SmallInt(i) => number(i),
        DuckValue::Int(i) => number(i),
        DuckValue::BigInt(i) => number(i),
        DuckValue::HugeInt(i) => i64::try_from(i).map_or_else(|_| float(i as f64), |v| number(v)),
        DuckValue::UTinyInt(i) => number(i),
        DuckValue::USmallInt(i) => number(i),
        DuckValue::UInt(i) => number(i),
        DuckValue::UBigInt(i) => number(i),
        DuckValue::Float(f) => float(f64::from(f)),
        DuckValue::Double(f) => float(f),
        DuckValue::Decimal(d) => d.to_string().parse::<f64>().map_or(Value::Null, float),
        DuckValue::Text(s) => Value::String(s),
        DuckValue::Timestamp(unit, v) => DateTime::from_timestamp_micros(micros(unit, v))
            .map_or(Value::Null, |ts| {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            }),
        DuckValue::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(days))))
            .map_or(Value::Null, |d| Value::String(d.to_string())),
        other => Value::String(format!("{:?}", other)),
    }
}

#[async_trait]
impl Connector for DuckDBConnector {
    async fn query(&self, sql: &str) -> Result<QueryOutput, WardenError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(db_err)?;
            let mut rows = stmt.query([]).map_err(db_err)?;
            let columns: Vec<String> = rows
                .as_ref()
                .map(|s| s.column_names())
                .unwrap_or_default();

            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(db_err)? {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    let v: DuckValue = row.get(i).map_err(db_err)?;
                    values.push(to_json(v));
                }
                out.push(values);
            }
            Ok(QueryOutput::new(columns, out))
        })
        .await
    }

    async fn execute(&self, sql: &str) -> Result<u64, WardenError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let changed = conn.execute(&sql, []).map_err(db_err)?;
            Ok(changed as u64)
        })
        .await
    }

    async fn fetch_columns(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnSchema>, WardenError> {
        let target = match schema {
            Some(s) => format!("{}.{}", s, table),
            None => table.to_string(),
        };
        self.with_connection(move |conn| {
            let mut stmt = conn
                .prepare(&format!("PRAGMA table_info('{}')", target.replace('\'', "''")))
                .map_err(db_err)?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(ColumnSchema {
                        name: row.get("name")?,
                        data_type: row.get("type")?,
                        is_nullable: !row.get::<_, bool>("notnull")?,
                    })
                })
                .map_err(db_err)?;

            let mut columns = Vec::new();
            for row in rows {
                columns.push(row.map_err(db_err)?);
            }
            Ok(columns)
        })
        .await
    }

    fn engine_name(&self) -> &str {
        "duckdb"
    }
}
