use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::format::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/postgres";
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_TABLE: &str = "image_table";
pub const DEFAULT_INDEX: &str = "semantic_image";
pub const DEFAULT_ENCODER_FUNCTION: &str = "clip_image";
pub const DEFAULT_DIMENSION: u32 = 512;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_CONCURRENCY: usize = 16;

static SQL_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

/// True when `name` is a plain, optionally schema-qualified, SQL identifier.
pub fn is_sql_identifier(name: &str) -> bool {
    SQL_IDENTIFIER.is_match(name)
}

static PLAIN_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// True when `name` is an unqualified SQL identifier. Index names cannot carry a schema.
pub fn is_plain_identifier(name: &str) -> bool {
    PLAIN_IDENTIFIER.is_match(name)
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("imload").join("config.toml"))
    }

    /// Load from `path`, or from the default location when it exists.
    ///
    /// An explicit path that does not exist is an error; a missing default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL")
            && !url.is_empty()
        {
            self.store.url = url;
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.pipeline.batch_size == 0 {
            return invalid("pipeline.batch_size must be at least 1");
        }
        if self.pipeline.concurrency == 0 {
            return invalid("pipeline.concurrency must be at least 1");
        }
        if self.store.dimension == 0 {
            return invalid("store.dimension must be at least 1");
        }
        if self.store.pool_max == Some(0) {
            return invalid("store.pool_max must be at least 1");
        }
        if self.encoder.max_attempts == 0 {
            return invalid("encoder.max_attempts must be at least 1");
        }
        if !is_plain_identifier(&self.store.index) {
            return Err(ConfigError::ValidationError(format!(
                "store.index must be an unqualified SQL identifier: {:?}",
                self.store.index
            )));
        }
        for (field, name) in [
            ("store.table", &self.store.table),
            ("encoder.function", &self.encoder.function),
        ] {
            if !is_sql_identifier(name) {
                return Err(ConfigError::ValidationError(format!(
                    "{field} is not a valid SQL identifier: {name:?}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Allowed file extensions, case-insensitive. Empty accepts every file.
    #[serde(default)]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreDriver {
    #[default]
    #[serde(alias = "postgres", alias = "pgvector")]
    PostgreSQL,
    Memory,
}

impl std::fmt::Display for StoreDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreDriver::PostgreSQL => write!(f, "postgresql"),
            StoreDriver::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StoreDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pgvector" => Ok(StoreDriver::PostgreSQL),
            "memory" => Ok(StoreDriver::Memory),
            _ => Err(format!("unknown store driver: {}", s)),
        }
    }
}

/// HNSW construction parameters. Changing them requires rebuilding the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    #[serde(default = "default_m")]
    pub m: u32,

    #[serde(default = "default_ef")]
    pub ef_search: u32,

    #[serde(default = "default_ef")]
    pub ef_construction: u32,
}

fn default_m() -> u32 {
    5
}

fn default_ef() -> u32 {
    30
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            m: default_m(),
            ef_search: default_ef(),
            ef_construction: default_ef(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub driver: StoreDriver,

    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_index")]
    pub index: String,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default)]
    pub hnsw: IndexParams,

    /// Connection pool size. Defaults to the pipeline concurrency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_max: Option<u32>,

    #[serde(default = "default_acquire_timeout")]
    pub pool_acquire_timeout: u32,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_index() -> String {
    DEFAULT_INDEX.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_DIMENSION
}

fn default_acquire_timeout() -> u32 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: StoreDriver::default(),
            url: default_database_url(),
            table: default_table(),
            index: default_index(),
            dimension: default_dimension(),
            hnsw: IndexParams::default(),
            pool_max: None,
            pool_acquire_timeout: default_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderDriver {
    /// Embedding computed by a SQL function inside the database.
    #[default]
    Sql,
    /// Embedding requested from an HTTP embedding server.
    Http,
}

impl std::fmt::Display for EncoderDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderDriver::Sql => write!(f, "sql"),
            EncoderDriver::Http => write!(f, "http"),
        }
    }
}

impl std::str::FromStr for EncoderDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sql" => Ok(EncoderDriver::Sql),
            "http" => Ok(EncoderDriver::Http),
            _ => Err(format!("unknown encoder driver: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default)]
    pub driver: EncoderDriver,

    #[serde(default = "default_encoder_function")]
    pub function: String,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_encoder_function() -> String {
    DEFAULT_ENCODER_FUNCTION.to_string()
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            driver: EncoderDriver::default(),
            function: default_encoder_function(),
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Index of the first batch to process; earlier batches are skipped.
    #[serde(default)]
    pub resume_from_batch: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            resume_from_batch: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub default_format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.pipeline.batch_size, 1000);
        assert_eq!(config.pipeline.concurrency, 16);
        assert_eq!(config.store.dimension, 512);
        assert_eq!(config.store.table, DEFAULT_TABLE);
        assert_eq!(config.store.hnsw.m, 5);
        assert_eq!(config.store.hnsw.ef_construction, 30);
        assert_eq!(config.encoder.driver, EncoderDriver::Sql);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            batch_size = 50

            [store]
            driver = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.batch_size, 50);
        assert_eq!(config.pipeline.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.store.driver, StoreDriver::Memory);
        assert_eq!(config.store.index, DEFAULT_INDEX);
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.pipeline.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_identifier() {
        let mut config = Config::default();
        config.encoder.function = "clip_image('x'); DROP TABLE t; --".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_driver_from_str() {
        assert_eq!("pgvector".parse::<StoreDriver>(), Ok(StoreDriver::PostgreSQL));
        assert_eq!("HTTP".parse::<EncoderDriver>(), Ok(EncoderDriver::Http));
        assert!("qdrant".parse::<StoreDriver>().is_err());
    }

    #[test]
    fn test_sql_identifier() {
        assert!(is_sql_identifier("image_table"));
        assert!(is_sql_identifier("public.image_table"));
        assert!(!is_sql_identifier("1table"));
        assert!(!is_sql_identifier("a b"));
        assert!(!is_sql_identifier(""));
        assert!(is_plain_identifier("semantic_image"));
        assert!(!is_plain_identifier("public.semantic_image"));
    }

    #[test]
    fn test_validate_index_must_be_unqualified() {
        let mut config = Config::default();
        config.store.table = "public.image_table".to_string();
        assert!(config.validate().is_ok());

        config.store.index = "public.semantic_image".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.index"));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.pipeline.concurrency = 4;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.pipeline.concurrency, 4);
    }
}
