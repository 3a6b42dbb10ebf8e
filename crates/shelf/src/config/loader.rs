use std::path::Path;

use crate::config::schema::{Config, StorageConfig};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.yaml` / `.yml` select YAML; anything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                ConfigFormat::Yaml
            }
            _ => ConfigFormat::Json,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, ConfigFormat::from_path(path))
}

pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let value: serde_json::Value = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_schema(&value)?;

    let config: Config = serde_json::from_value(value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();

    if !errors.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return invalid(format!("Unsupported config version: {}", config.version));
    }

    if config.worker_count == 0 {
        return invalid("worker_count must be at least 1");
    }

    let ingest = &config.ingest;
    if ingest.max_attempts == 0 {
        return invalid("ingest.max_attempts must be at least 1");
    }
    if ingest.parse_timeout_secs == 0 {
        return invalid("ingest.parse_timeout_secs must be at least 1");
    }
    if ingest.initial_backoff_ms > ingest.max_backoff_ms {
        return invalid("ingest.initial_backoff_ms must not exceed ingest.max_backoff_ms");
    }

    let covers = &config.covers;
    if covers.thumbnail_width == 0 || covers.thumbnail_height == 0 {
        return invalid("covers thumbnail dimensions must be positive");
    }
    if !(1..=100).contains(&covers.jpeg_quality) {
        return invalid("covers.jpeg_quality must be between 1 and 100");
    }

    match &config.storage {
        StorageConfig::Filesystem { root } => {
            if root.trim().is_empty() {
                return invalid("storage.root must not be empty");
            }
        }
        StorageConfig::ObjectStore(store) => {
            if store.bucket.trim().is_empty() {
                return invalid("storage.bucket must not be empty");
            }
            if !store.access_key_source().is_configured() {
                return invalid("storage needs access_key, access_key_file or access_key_env_var");
            }
            if !store.secret_key_source().is_configured() {
                return invalid("storage needs secret_key, secret_key_file or secret_key_env_var");
            }
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Validation {
        message: message.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;

    #[test]
    fn test_minimal_filesystem_config_gets_defaults() {
        let json = r#"
        {
            "version": "1.0",
            "storage": { "backend": "filesystem", "root": "/var/lib/shelf/blobs" }
        }
        "#;

        let config = load_config_from_str(json, ConfigFormat::Json).unwrap();
        assert!(matches!(
            config.storage,
            StorageConfig::Filesystem { ref root } if root == "/var/lib/shelf/blobs"
        ));
        assert_eq!(config.ingest.max_attempts, 3);
        assert_eq!(config.ingest.parse_timeout_secs, 120);
        assert!(config.parsers.render_pdf_first_page);
        assert_eq!(config.parsers.render_dpi, 150);
        assert_eq!(config.parsers.pdftoppm_path, "pdftoppm");
        assert_eq!(config.parsers.render_timeout_secs, 30);
        assert_eq!(config.covers.thumbnail_width, 150);
        assert_eq!(config.covers.thumbnail_height, 200);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.worker_count >= 1);
    }

    #[test]
    fn test_yaml_object_store_config() {
        let yaml = r#"
version: "1.0"
worker_count: 2
storage:
  backend: object_store
  endpoint: http://localhost:9000
  bucket: books
  prefix: uploads
  path_style: true
  access_key: minio
  secret_key_env_var: SHELF_S3_SECRET
ingest:
  max_attempts: 5
parsers:
  render_pdf_first_page: false
  render_timeout_secs: 5
logging:
  level: debug
  format: json
"#;

        let config = load_config_from_str(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.ingest.max_attempts, 5);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.parsers.render_pdf_first_page);
        assert_eq!(config.parsers.render_timeout_secs, 5);
        match config.storage {
            StorageConfig::ObjectStore(store) => {
                assert_eq!(store.bucket, "books");
                assert_eq!(store.prefix.as_deref(), Some("uploads"));
                assert_eq!(store.region, "us-east-1");
                assert!(store.path_style);
            }
            other => panic!("expected object store, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_backend_fails_schema() {
        let json = r#"
        {
            "version": "1.0",
            "storage": { "backend": "ftp", "root": "/srv" }
        }
        "#;

        let result = load_config_from_str(json, ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_zero_render_timeout_fails_schema() {
        let json = r#"
        {
            "version": "1.0",
            "storage": { "backend": "filesystem", "root": "/srv" },
            "parsers": { "render_timeout_secs": 0 }
        }
        "#;

        let result = load_config_from_str(json, ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_missing_storage_fails_schema() {
        let result = load_config_from_str(r#"{ "version": "1.0" }"#, ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unsupported_version() {
        let json = r#"
        {
            "version": "2.0",
            "storage": { "backend": "filesystem", "root": "/srv" }
        }
        "#;

        let result = load_config_from_str(json, ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_object_store_requires_credentials() {
        let json = r#"
        {
            "version": "1.0",
            "storage": { "backend": "object_store", "bucket": "books", "access_key": "minio" }
        }
        "#;

        let err = load_config_from_str(json, ConfigFormat::Json).unwrap_err();
        assert!(err.to_string().contains("secret_key"), "{}", err);
    }

    #[test]
    fn test_backoff_bounds_checked() {
        let json = r#"
        {
            "version": "1.0",
            "storage": { "backend": "filesystem", "root": "/srv" },
            "ingest": { "initial_backoff_ms": 5000, "max_backoff_ms": 100 }
        }
        "#;

        let result = load_config_from_str(json, ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("shelf.yml")),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("shelf.YAML")),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("shelf.json")),
            ConfigFormat::Json
        );
        assert_eq!(ConfigFormat::from_path(Path::new("shelf")), ConfigFormat::Json);
    }

    #[test]
    fn test_load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.yaml");
        std::fs::write(
            &path,
            "version: \"1.0\"\nstorage:\n  backend: filesystem\n  root: /srv/books\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.version, "1.0");

        let missing = load_config(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(ConfigError::ReadFile { .. })));
    }
}
