use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable that points at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SQLCHAT_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChatConfig {
    pub ai: AIConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AIConfig {
    pub model: String,
    /// Full URL of an OpenAI-compatible chat completions endpoint.
    pub url: String,
    /// Name of the environment variable holding the provider API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Upper bound on model calls for a single question.
    pub max_turns: usize,
    pub system_prompt: String,
}

impl Default for AIConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                .to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: None,
            max_turns: 25,
            system_prompt: "You are a helpful SQL assistant. You have access to a SQLite database. \
                Use the tools to answer user questions. Inspect the schema before writing queries \
                and only use read-only SELECT statements."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub schema_url: String,
    pub data_url: String,
    /// Restrict `execute_query` to single read-only statements.
    pub read_only: bool,
    pub max_result_rows: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/sakila.db"),
            schema_url: "https://raw.githubusercontent.com/ivanceras/sakila/master/sqlite-sakila-db/sqlite-sakila-schema.sql".to_string(),
            data_url: "https://raw.githubusercontent.com/ivanceras/sakila/master/sqlite-sakila-db/sqlite-sakila-insert-data.sql".to_string(),
            read_only: true,
            max_result_rows: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UiConfig {
    /// When set, the console sends questions to this `/chat` URL instead of
    /// running the agent in-process.
    pub endpoint: Option<String>,
}

impl ChatConfig {
    /// Loads `$SQLCHAT_CONFIG`, then `~/.config/sqlchat/config.toml`, falling
    /// back to defaults when neither is usable.
    #[must_use]
    pub fn get_or_default() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(|_| {
                std::env::var("HOME")
                    .map(|home| PathBuf::from(home).join(".config/sqlchat/config.toml"))
            });

        let Ok(path) = path else {
            return ChatConfig::default();
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return ChatConfig::default();
        }

        Self::load_from(&path).unwrap_or_else(|err| {
            tracing::warn!("{err}; using default configuration");
            ChatConfig::default()
        })
    }

    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid TOML for this schema.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves the provider API key through `lookup`, treating blank values as unset.
    #[must_use]
    pub fn api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        lookup(&self.ai.api_key_env).filter(|key| !key.trim().is_empty())
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
