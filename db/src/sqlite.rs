use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Row, TypeInfo, ValueRef};

use super::Database;
use crate::policy::{self, QueryPolicy};
use crate::{ColumnInfo, DatabaseResult, DbError, TableDescription};

#[derive(Debug)]
pub struct SqliteDatabase {
    connection: SqliteConnection,
    policy: QueryPolicy,
}

impl SqliteDatabase {
    /// Opens an existing database file. Read-only policies also open the file
    /// with SQLite's read-only flag.
    pub async fn open(path: impl AsRef<Path>, policy: QueryPolicy) -> Result<Self, DbError> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .read_only(policy.is_read_only());
        Self::connect(options, path, policy).await
    }

    /// Creates the file if needed and opens it for writing. Used for provisioning.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options, path, QueryPolicy::ReadWrite).await
    }

    pub async fn in_memory(policy: QueryPolicy) -> Result<Self, DbError> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|source| DbError::Connect {
                path: ":memory:".to_string(),
                source,
            })?;
        Self::connect(options, Path::new(":memory:"), policy).await
    }

    async fn connect(
        options: SqliteConnectOptions,
        path: &Path,
        policy: QueryPolicy,
    ) -> Result<Self, DbError> {
        let connection = options
            .connect()
            .await
            .map_err(|source| DbError::Connect {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self { connection, policy })
    }

    /// Runs every statement of `script` in order. Not subject to the query
    /// policy; statements that already ran are not rolled back on failure.
    pub async fn execute_script(&mut self, script: &str) -> Result<(), DbError> {
        sqlx::raw_sql(script).execute(&mut self.connection).await?;
        Ok(())
    }

    fn rows_to_result(rows: &[SqliteRow]) -> DatabaseResult {
        let mut results = DatabaseResult::default();

        let Some(first) = rows.first() else {
            return results;
        };

        for col in first.columns() {
            results
                .headers
                .push((col.name().to_string(), col.type_info().name().to_string()));
        }

        for row in rows {
            let row_data = (0..row.columns().len())
                .map(|i| decode_value(row, i))
                .collect();
            results.rows.push(row_data);
        }

        results
    }
}

/// Decodes by the storage class of the value itself; SQLite column
/// declarations are only affinities.
fn decode_value(row: &SqliteRow, i: usize) -> Value {
    let type_name = match row.try_get_raw(i) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(i)
            .map(Value::from)
            .unwrap_or(Value::Null),

        "REAL" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(i)
            .map(Value::from)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(i)
            .map(|bytes| Value::from(format!("<{} bytes>", bytes.len())))
            .unwrap_or(Value::Null),

        _ => row
            .try_get_unchecked::<String, _>(i)
            .map(Value::from)
            .unwrap_or(Value::Null),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait::async_trait]
impl Database for SqliteDatabase {
    async fn list_tables(&mut self) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query(
            r#"SELECT name FROM sqlite_master
               WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
               ORDER BY name"#,
        )
        .fetch_all(&mut self.connection)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(DbError::from))
            .collect()
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableDescription, DbError> {
        let rows = sqlx::query(r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1)"#)
            .bind(table)
            .fetch_all(&mut self.connection)
            .await?;

        if rows.is_empty() {
            return Err(DbError::TableNotFound(table.to_string()));
        }

        let columns = rows
            .iter()
            .map(|row| -> Result<ColumnInfo, sqlx::Error> {
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    declared_type: row.try_get("type")?,
                    not_null: row.try_get::<i64, _>("notnull")? != 0,
                    primary_key: row.try_get::<i64, _>("pk")? != 0,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(TableDescription {
            table: table.to_string(),
            columns,
        })
    }

    async fn sample_rows(&mut self, table: &str, limit: usize) -> Result<DatabaseResult, DbError> {
        let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_identifier(table));
        let rows = sqlx::query(&sql).fetch_all(&mut self.connection).await?;
        Ok(Self::rows_to_result(&rows))
    }

    async fn get_results(&mut self, query: &str) -> Result<DatabaseResult, DbError> {
        self.policy.check(query)?;

        let rows = sqlx::query(query).fetch_all(&mut self.connection).await?;
        Ok(Self::rows_to_result(&rows))
    }

    async fn check_syntax(&mut self, query: &str) -> Result<(), DbError> {
        self.policy.check(query)?;
        if policy::statement_count(query) != 1 {
            return Err(DbError::Syntax(
                "expected exactly one SQL statement".to_string(),
            ));
        }

        let statement = query.trim().trim_end_matches(';');
        let explain = if policy::leading_keyword(statement).as_deref() == Some("EXPLAIN") {
            statement.to_string()
        } else {
            format!("EXPLAIN {statement}")
        };
        sqlx::query(&explain).fetch_all(&mut self.connection).await?;
        Ok(())
    }
}
