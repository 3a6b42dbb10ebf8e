use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::secrets::{expand_home, SecretSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub parsers: ParsersConfig,
    #[serde(default)]
    pub covers: CoversConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Configured database path, or `~/.shelf/data/shelf.db`.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(expand_home(path))),
            None => crate::db::default_database_path(),
        }
    }
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

/// Which blob store receives originals and covers. Chosen once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Filesystem { root: String },
    ObjectStore(ObjectStoreConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Custom endpoint for MinIO and other S3-compatible services.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    /// MinIO needs path-style addressing.
    #[serde(default)]
    pub path_style: bool,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub access_key_file: Option<String>,
    #[serde(default)]
    pub access_key_env_var: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub secret_key_file: Option<String>,
    #[serde(default)]
    pub secret_key_env_var: Option<String>,
}

impl ObjectStoreConfig {
    pub fn access_key_source(&self) -> SecretSource<'_> {
        SecretSource::new(
            self.access_key.as_deref(),
            self.access_key_file.as_deref(),
            self.access_key_env_var.as_deref(),
        )
    }

    pub fn secret_key_source(&self) -> SecretSource<'_> {
        SecretSource::new(
            self.secret_key.as_deref(),
            self.secret_key_file.as_deref(),
            self.secret_key_env_var.as_deref(),
        )
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_parse_timeout_secs")]
    pub parse_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_parse_timeout_secs() -> u64 {
    120
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            parse_timeout_secs: default_parse_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsersConfig {
    /// Render page 1 with `pdftoppm` when a PDF has no embedded cover image.
    #[serde(default = "default_render_pdf_first_page")]
    pub render_pdf_first_page: bool,
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,
    #[serde(default = "default_pdftoppm_path")]
    pub pdftoppm_path: String,
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
}

fn default_render_pdf_first_page() -> bool {
    true
}

fn default_render_dpi() -> u32 {
    150
}

fn default_pdftoppm_path() -> String {
    "pdftoppm".to_string()
}

fn default_render_timeout_secs() -> u64 {
    30
}

impl Default for ParsersConfig {
    fn default() -> Self {
        Self {
            render_pdf_first_page: default_render_pdf_first_page(),
            render_dpi: default_render_dpi(),
            pdftoppm_path: default_pdftoppm_path(),
            render_timeout_secs: default_render_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoversConfig {
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,
    #[serde(default = "default_thumbnail_height")]
    pub thumbnail_height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_thumbnail_width() -> u32 {
    150
}

fn default_thumbnail_height() -> u32 {
    200
}

fn default_jpeg_quality() -> u8 {
    85
}

impl Default for CoversConfig {
    fn default() -> Self {
        Self {
            thumbnail_width: default_thumbnail_width(),
            thumbnail_height: default_thumbnail_height(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
