pub mod duckdb;
pub mod resolver;

pub use self::duckdb::DuckDBConnector;
pub use resolver::{DuckDbResolver, StaticResolver};
