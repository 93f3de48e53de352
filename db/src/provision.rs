use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{Database, DatabaseResult, DbError, SqliteDatabase};

/// Query used to confirm a freshly provisioned database answers.
pub const VERIFY_QUERY: &str = "SELECT first_name, last_name FROM actor LIMIT 5;";

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("error downloading {url}: {message}")]
    Download { url: String, message: String },
    #[error("could not create {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("error loading {stage} script into database: {source}")]
    Script { stage: ScriptStage, source: DbError },
    #[error(transparent)]
    Database(#[from] DbError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStage {
    Schema,
    Data,
}

impl fmt::Display for ScriptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptStage::Schema => f.write_str("schema"),
            ScriptStage::Data => f.write_str("data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyPresent,
    Created,
}

/// Where SQL scripts come from.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ProvisionError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpScriptSource {
    client: reqwest::Client,
}

#[async_trait]
impl ScriptSource for HttpScriptSource {
    async fn fetch(&self, url: &str) -> Result<String, ProvisionError> {
        let download_error = |e: reqwest::Error| ProvisionError::Download {
            url: url.to_string(),
            message: e.to_string(),
        };

        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(download_error)?
            .text()
            .await
            .map_err(download_error)
    }
}

#[derive(Debug)]
pub struct Provisioner<S> {
    source: S,
    schema_url: String,
    data_url: String,
}

impl<S: ScriptSource> Provisioner<S> {
    pub fn new(source: S, schema_url: impl Into<String>, data_url: impl Into<String>) -> Self {
        Self {
            source,
            schema_url: schema_url.into(),
            data_url: data_url.into(),
        }
    }

    /// Makes sure a populated database exists at `path`. An existing file is
    /// left untouched. Both scripts are downloaded before the file is created;
    /// a script failure leaves whatever it already created in place.
    pub async fn ensure(&self, path: &Path) -> Result<ProvisionOutcome, ProvisionError> {
        if path.exists() {
            tracing::info!(path = %path.display(), "database already exists, skipping setup");
            return Ok(ProvisionOutcome::AlreadyPresent);
        }

        tracing::info!(path = %path.display(), "creating new database");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ProvisionError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tracing::info!(url = %self.schema_url, "downloading schema");
        let schema_sql = self.source.fetch(&self.schema_url).await?;
        tracing::info!(url = %self.data_url, "downloading data");
        let data_sql = self.source.fetch(&self.data_url).await?;

        let mut db = SqliteDatabase::create(path).await?;

        tracing::info!("creating tables");
        db.execute_script(&schema_sql)
            .await
            .map_err(|source| ProvisionError::Script {
                stage: ScriptStage::Schema,
                source,
            })?;

        tracing::info!("inserting data");
        db.execute_script(&data_sql)
            .await
            .map_err(|source| ProvisionError::Script {
                stage: ScriptStage::Data,
                source,
            })?;

        tracing::info!("database setup complete");
        Ok(ProvisionOutcome::Created)
    }
}

/// Runs [`VERIFY_QUERY`] and returns its rows with the time it took.
pub async fn verify(db: &mut dyn Database) -> Result<(DatabaseResult, Duration), DbError> {
    let start = Instant::now();
    let rows = db.get_results(VERIFY_QUERY).await?;
    Ok((rows, start.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QueryPolicy, TableDescription};
    use std::collections::HashMap;

    const SCHEMA: &str = r#"
CREATE TABLE actor (
  actor_id INTEGER PRIMARY KEY,
  first_name VARCHAR(45) NOT NULL,
  last_name VARCHAR(45) NOT NULL
);
CREATE TABLE film (film_id INTEGER PRIMARY KEY, title TEXT);
"#;

    const DATA: &str = r#"
INSERT INTO actor VALUES (1, 'PENELOPE', 'GUINESS');
INSERT INTO actor VALUES (2, 'NICK', 'WAHLBERG');
INSERT INTO actor VALUES (3, 'ED', 'CHASE');
INSERT INTO actor VALUES (4, 'JENNIFER', 'DAVIS');
INSERT INTO actor VALUES (5, 'JOHNNY', 'LOLLOBRIGIDA');
INSERT INTO actor VALUES (6, 'BETTE', 'NICHOLSON');
"#;

    struct StaticScripts(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl ScriptSource for StaticScripts {
        async fn fetch(&self, url: &str) -> Result<String, ProvisionError> {
            self.0
                .get(url)
                .map(|s| (*s).to_string())
                .ok_or_else(|| ProvisionError::Download {
                    url: url.to_string(),
                    message: "404 Not Found".to_string(),
                })
        }
    }

    fn provisioner(data: &'static str) -> Provisioner<StaticScripts> {
        let scripts = StaticScripts(HashMap::from([("mem://schema", SCHEMA), ("mem://data", data)]));
        Provisioner::new(scripts, "mem://schema", "mem://data")
    }

    #[tokio::test]
    async fn creates_and_populates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/sakila.db");

        let outcome = provisioner(DATA).ensure(&path).await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::Created);

        let mut db = SqliteDatabase::open(&path, QueryPolicy::ReadOnly).await.unwrap();
        let (rows, _) = verify(&mut db).await.unwrap();
        assert_eq!(rows.rows.len(), 5);
        assert_eq!(rows.column_names(), vec!["first_name", "last_name"]);
    }

    #[tokio::test]
    async fn second_run_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sakila.db");

        provisioner(DATA).ensure(&path).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        // No scripts are reachable now, so any download attempt would fail.
        let offline = Provisioner::new(StaticScripts(HashMap::new()), "mem://schema", "mem://data");
        let outcome = offline.ensure(&path).await.unwrap();

        assert_eq!(outcome, ProvisionOutcome::AlreadyPresent);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn download_failure_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sakila.db");

        let broken = Provisioner::new(
            StaticScripts(HashMap::from([("mem://schema", SCHEMA)])),
            "mem://schema",
            "mem://missing",
        );
        let err = broken.ensure(&path).await.unwrap_err();

        assert!(matches!(err, ProvisionError::Download { ref url, .. } if url == "mem://missing"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn data_failure_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sakila.db");

        let err = provisioner("INSERT INTO nowhere VALUES (1);")
            .ensure(&path)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Script {
                stage: ScriptStage::Data,
                ..
            }
        ));
        assert!(err.to_string().starts_with("error loading data script"));

        let mut db = SqliteDatabase::open(&path, QueryPolicy::ReadOnly).await.unwrap();
        assert_eq!(db.list_tables().await.unwrap(), vec!["actor", "film"]);
    }

    struct CountingDb {
        queries: Vec<String>,
    }

    #[async_trait]
    impl Database for CountingDb {
        async fn list_tables(&mut self) -> Result<Vec<String>, DbError> {
            Ok(vec![])
        }

        async fn describe_table(&mut self, table: &str) -> Result<TableDescription, DbError> {
            Err(DbError::TableNotFound(table.to_string()))
        }

        async fn sample_rows(&mut self, _: &str, _: usize) -> Result<DatabaseResult, DbError> {
            Ok(DatabaseResult::default())
        }

        async fn get_results(&mut self, query: &str) -> Result<DatabaseResult, DbError> {
            self.queries.push(query.to_string());
            Ok(DatabaseResult::default())
        }

        async fn check_syntax(&mut self, _: &str) -> Result<(), DbError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn verify_runs_the_query_once() {
        let mut db = CountingDb { queries: vec![] };
        verify(&mut db).await.unwrap();
        assert_eq!(db.queries, vec![VERIFY_QUERY.to_string()]);
    }
}
