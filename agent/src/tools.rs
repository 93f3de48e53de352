use std::fmt;
use std::sync::Arc;

use ai::{AiError, ChatModel, Message, Tool, Value, create_tool, json};
use async_trait::async_trait;
use db::{Database, DatabaseResult, DbError, TableDescription};
use serde::Serialize;
use tokio::sync::Mutex;

pub const LIST_TABLES: &str = "list_tables";
pub const DESCRIBE_TABLE: &str = "describe_table";
pub const EXECUTE_QUERY: &str = "execute_query";
pub const VALIDATE_QUERY: &str = "validate_query";

const SAMPLE_ROW_COUNT: usize = 3;
const DEFAULT_MAX_ROWS: usize = 100;

const QUERY_CHECKER_PROMPT: &str = "You review SQLite queries before they run. \
Check the query for common mistakes: NOT IN against columns that may be NULL, \
UNION where UNION ALL was meant, BETWEEN used for an exclusive range, data type \
mismatches in predicates, unquoted identifiers that need quoting, wrong argument \
counts for functions, missing casts, and joins on the wrong columns. \
If you find a mistake, rewrite the query. Otherwise repeat the original query. \
Reply with the final SQL query only.";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found.")]
    NotFound(String),
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("query checker failed: {0}")]
    Checker(#[from] AiError),
}

/// The capabilities the decision loop can hand to the model.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn definitions(&self) -> Vec<Tool>;

    async fn invoke(&self, name: &str, arguments: &Value) -> Result<String, ToolError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub message: String,
}

/// Tools backed by a single shared database handle. Calls are serialized on it.
pub struct QueryToolSet {
    db: Mutex<Box<dyn Database>>,
    checker: Arc<dyn ChatModel>,
    max_rows: usize,
}

impl fmt::Debug for QueryToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryToolSet")
            .field("max_rows", &self.max_rows)
            .finish_non_exhaustive()
    }
}

impl QueryToolSet {
    pub fn new(db: Box<dyn Database>, checker: Arc<dyn ChatModel>) -> Self {
        Self {
            db: Mutex::new(db),
            checker,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub async fn list_tables(&self) -> Result<Vec<String>, ToolError> {
        Ok(self.db.lock().await.list_tables().await?)
    }

    pub async fn describe_table(
        &self,
        table: &str,
    ) -> Result<(TableDescription, DatabaseResult), ToolError> {
        let mut db = self.db.lock().await;
        let description = db.describe_table(table).await?;
        let sample = db.sample_rows(table, SAMPLE_ROW_COUNT).await?;
        Ok((description, sample))
    }

    pub async fn execute_query(&self, query: &str) -> Result<DatabaseResult, ToolError> {
        Ok(self.db.lock().await.get_results(query).await?)
    }

    /// Compiles the query locally, then asks the checker model to review it.
    pub async fn validate_query(&self, query: &str) -> Result<ValidationReport, ToolError> {
        let syntax = self.db.lock().await.check_syntax(query).await;
        if let Err(err) = syntax {
            return Ok(ValidationReport {
                valid: false,
                message: err.to_string(),
            });
        }

        let review = [Message::system(QUERY_CHECKER_PROMPT), Message::user(query)];
        let reply = self.checker.complete(&review, &[]).await?;

        Ok(ValidationReport {
            valid: true,
            message: reply.content.trim().to_string(),
        })
    }
}

#[async_trait]
impl ToolExecutor for QueryToolSet {
    fn definitions(&self) -> Vec<Tool> {
        vec![
            list_tables_tool(),
            describe_table_tool(),
            query_tool(),
            validate_query_tool(),
        ]
    }

    async fn invoke(&self, name: &str, arguments: &Value) -> Result<String, ToolError> {
        match name {
            LIST_TABLES => {
                let tables = self.list_tables().await?;
                if tables.is_empty() {
                    return Ok("No tables found.".to_string());
                }
                Ok(tables.join(", "))
            }
            DESCRIBE_TABLE => {
                let table = string_arg(name, arguments, "table")?;
                let (description, sample) = self.describe_table(table).await?;
                Ok(render_description(&description, &sample))
            }
            EXECUTE_QUERY => {
                let query = string_arg(name, arguments, "query")?;
                let result = self.execute_query(query).await?;
                Ok(render_rows(&result, self.max_rows))
            }
            VALIDATE_QUERY => {
                let query = string_arg(name, arguments, "query")?;
                let report = self.validate_query(query).await?;
                Ok(json!(report).to_string())
            }
            _ => Err(ToolError::NotFound(name.to_string())),
        }
    }
}

fn string_arg<'a>(tool: &str, arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("expected a non-empty string parameter '{key}', got {arguments}"),
        })
}

fn render_rows(result: &DatabaseResult, max_rows: usize) -> String {
    if result.is_empty() {
        return "Query returned no rows.".to_string();
    }

    let mut out = format!("columns: {}\n", result.column_names().join(", "));
    for row in result.rows.iter().take(max_rows) {
        out.push_str(&Value::Array(row.clone()).to_string());
        out.push('\n');
    }
    if result.rows.len() > max_rows {
        out.push_str(&format!(
            "... {} more rows not shown\n",
            result.rows.len() - max_rows
        ));
    }
    out
}

fn render_description(description: &TableDescription, sample: &DatabaseResult) -> String {
    let mut out = format!("Table {}:\n", description.table);
    for column in &description.columns {
        out.push_str("  ");
        out.push_str(&column.name);
        if !column.declared_type.is_empty() {
            out.push(' ');
            out.push_str(&column.declared_type);
        }
        if column.primary_key {
            out.push_str(" PRIMARY KEY");
        }
        if column.not_null {
            out.push_str(" NOT NULL");
        }
        out.push('\n');
    }

    out.push_str(&format!("\n{SAMPLE_ROW_COUNT} sample rows:\n"));
    out.push_str(&render_rows(sample, SAMPLE_ROW_COUNT));
    out
}

fn object_params(property: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            property: {
                "type": "string",
                "description": description,
            },
        },
        "required": [property],
    })
}

pub fn list_tables_tool() -> Tool {
    create_tool(
        LIST_TABLES,
        "List the tables and views in the database as a comma-separated list.",
        json!({ "type": "object", "properties": {} }),
    )
}

pub fn describe_table_tool() -> Tool {
    create_tool(
        DESCRIBE_TABLE,
        "Show the columns and declared types of a table, plus a few sample rows. \
         Call list_tables first to be sure the table exists.",
        object_params("table", "Name of the table to describe."),
    )
}

pub fn query_tool() -> Tool {
    create_tool(
        EXECUTE_QUERY,
        "Execute a SQL query against the database and return the resulting rows. \
         If the query is wrong an error is returned; rewrite it and try again.",
        object_params(
            "query",
            "The SQL query to execute against the database.",
        ),
    )
}

pub fn validate_query_tool() -> Tool {
    create_tool(
        VALIDATE_QUERY,
        "Check whether a SQL query is correct before executing it.",
        object_params("query", "The SQL query to check."),
    )
}
