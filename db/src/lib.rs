pub mod latency;
pub mod policy;
pub mod provision;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use policy::QueryPolicy;
pub use sqlite::SqliteDatabase;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("could not open database {path}: {source}")]
    Connect { path: String, source: sqlx::Error },
    #[error("table '{0}' does not exist")]
    TableNotFound(String),
    #[error("{0}")]
    Query(#[from] sqlx::Error),
    #[error("{0}")]
    Syntax(String),
    #[error("only single read-only statements are allowed: {0}")]
    ReadOnlyViolation(String),
}

/// Trait defining the interface for database operations
#[async_trait]
pub trait Database: Send {
    /// Names of user tables and views, sorted.
    async fn list_tables(&mut self) -> Result<Vec<String>, DbError>;

    /// Column names and declared types of `table`.
    async fn describe_table(&mut self, table: &str) -> Result<TableDescription, DbError>;

    /// Up to `limit` rows of `table`.
    async fn sample_rows(&mut self, table: &str, limit: usize) -> Result<DatabaseResult, DbError>;

    /// Execute a query and return its rows.
    /// Headers are `(column_name, column_type)` pairs taken from the first row.
    async fn get_results(&mut self, query: &str) -> Result<DatabaseResult, DbError>;

    /// Compile `query` without running it.
    async fn check_syntax(&mut self, query: &str) -> Result<(), DbError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatabaseResult {
    pub headers: Vec<(String, String)>,
    pub rows: Vec<Vec<Value>>,
}

impl DatabaseResult {
    pub fn column_names(&self) -> Vec<&str> {
        self.headers.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescription {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}
