// warden-core/src/domain/dialect/mod.rs

pub mod rewrites;
pub mod tokens;
pub mod translator;

pub use translator::{DialectTranslator, IdiomKind, NoteKind, Translation, TranslationNote};

use serde::{Deserialize, Serialize};
use sqlparser::dialect::{
    Dialect as SqlParserDialect, DuckDbDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
    SQLiteDialect, SnowflakeDialect,
};
use std::fmt;

/// SQL syntax variant a query is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    #[serde(alias = "postgresql")]
    Postgres,
    #[serde(alias = "sqlserver")]
    MsSql,
    MySql,
    DuckDb,
    Snowflake,
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 6] = [
        Dialect::Postgres,
        Dialect::MsSql,
        Dialect::MySql,
        Dialect::DuckDb,
        Dialect::Snowflake,
        Dialect::Sqlite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MsSql => "mssql",
            Self::MySql => "mysql",
            Self::DuckDb => "duckdb",
            Self::Snowflake => "snowflake",
            Self::Sqlite => "sqlite",
        }
    }

    /// Tokenizer flavour used to read queries authored in this dialect.
    pub(crate) fn parser_dialect(&self) -> Box<dyn SqlParserDialect> {
        match self {
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::MsSql => Box::new(MsSqlDialect {}),
            Self::MySql => Box::new(MySqlDialect {}),
            Self::DuckDb => Box::new(DuckDbDialect {}),
            Self::Snowflake => Box::new(SnowflakeDialect {}),
            Self::Sqlite => Box::new(SQLiteDialect {}),
        }
    }

    /// Opening delimiter for quoted identifiers.
    pub fn identifier_quote(&self) -> char {
        match self {
            Self::MsSql => '[',
            Self::MySql => '`',
            _ => '"',
        }
    }

    pub fn quote_ident(&self, name: &str) -> String {
        match self.identifier_quote() {
            '[' => format!("[{}]", name.replace(']', "]]")),
            '`' => format!("`{}`", name.replace('`', "``")),
            _ => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// `schema.table` with each part quoted.
    pub fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(s) if !s.is_empty() => format!("{}.{}", self.quote_ident(s), self.quote_ident(table)),
            _ => self.quote_ident(table),
        }
    }

    // --- CAPABILITIES ---

    pub fn supports_filter_clause(&self) -> bool {
        matches!(self, Self::Postgres | Self::DuckDb | Self::Sqlite)
    }

    pub fn supports_double_colon_cast(&self) -> bool {
        matches!(self, Self::Postgres | Self::DuckDb | Self::Snowflake)
    }

    /// `||` means string concatenation (MySQL reads it as OR, SQL Server has no such operator).
    pub fn supports_concat_operator(&self) -> bool {
        !matches!(self, Self::MySql | Self::MsSql)
    }

    pub fn supports_concat_function(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    pub fn supports_ilike(&self) -> bool {
        matches!(self, Self::Postgres | Self::DuckDb | Self::Snowflake)
    }

    pub fn supports_limit(&self) -> bool {
        !matches!(self, Self::MsSql)
    }

    pub fn supports_top(&self) -> bool {
        matches!(self, Self::MsSql | Self::Snowflake)
    }

    pub fn supports_fetch_first(&self) -> bool {
        matches!(self, Self::MsSql | Self::Postgres | Self::Snowflake)
    }

    pub fn supports_boolean_literals(&self) -> bool {
        !matches!(self, Self::MsSql)
    }

    // --- QUERY BUILDING HELPERS ---

    /// Wraps `SELECT <projection> FROM <from_clause>` with a row limit in the dialect's idiom.
    pub fn select_limited(&self, projection: &str, from_clause: &str, limit: u64) -> String {
        if self.supports_limit() {
            format!("SELECT {} FROM {} LIMIT {}", projection, from_clause, limit)
        } else {
            format!("SELECT TOP {} {} FROM {}", limit, projection, from_clause)
        }
    }

    pub fn random_function(&self) -> &'static str {
        match self {
            Self::MySql => "RAND()",
            Self::MsSql => "NEWID()",
            _ => "RANDOM()",
        }
    }

    /// Hex-encoded SHA-256 of a column rendered as text, if the engine has one built in.
    pub fn sha256_expression(&self, column: &str) -> Option<String> {
        match self {
            Self::DuckDb => Some(format!("sha256(CAST({} AS VARCHAR))", column)),
            Self::Postgres => Some(format!(
                "encode(sha256(convert_to(CAST({} AS TEXT), 'UTF8')), 'hex')",
                column
            )),
            Self::MySql | Self::Snowflake => Some(format!("SHA2({}, 256)", column)),
            Self::MsSql => Some(format!(
                "CONVERT(VARCHAR(64), HASHBYTES('SHA2_256', CAST({} AS NVARCHAR(MAX))), 2)",
                column
            )),
            Self::Sqlite => None,
        }
    }

    pub fn text_type(&self) -> &'static str {
        match self {
            Self::MsSql => "NVARCHAR(MAX)",
            Self::MySql => "CHAR",
            Self::Postgres | Self::Sqlite => "TEXT",
            Self::DuckDb | Self::Snowflake => "VARCHAR",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mssql" | "sqlserver" | "tsql" => Ok(Self::MsSql),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "duckdb" => Ok(Self::DuckDb),
            "snowflake" => Ok(Self::Snowflake),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(format!("Unknown SQL dialect: {}", s)),
        }
    }
}

/// Wire protocol / engine family of a data source. Picks both the connector and the dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineFamily {
    PostgresWire,
    Tds,
    MysqlWire,
    Duckdb,
    Snowflake,
    Sqlite,
}

impl EngineFamily {
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::PostgresWire => Dialect::Postgres,
            Self::Tds => Dialect::MsSql,
            Self::MysqlWire => Dialect::MySql,
            Self::Duckdb => Dialect::DuckDb,
            Self::Snowflake => Dialect::Snowflake,
            Self::Sqlite => Dialect::Sqlite,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostgresWire => "postgres_wire",
            Self::Tds => "tds",
            Self::MysqlWire => "mysql_wire",
            Self::Duckdb => "duckdb",
            Self::Snowflake => "snowflake",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
