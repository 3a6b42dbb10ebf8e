use std::time::Duration;

use crate::config::{Config, CoversConfig, IngestConfig, ParsersConfig};
use crate::parser::ParserConfig;

use super::retry::RetryPolicy;

/// Settings the ingestion job needs, derived once from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    pub parse_timeout: Duration,
    pub parsers: ParserConfig,
    pub covers: CoversConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy::from_ingest(&config.ingest),
            parse_timeout: Duration::from_secs(config.ingest.parse_timeout_secs),
            parsers: ParserConfig::from(&config.parsers),
            covers: config.covers.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let ingest = IngestConfig::default();
        Self {
            retry: RetryPolicy::from_ingest(&ingest),
            parse_timeout: Duration::from_secs(ingest.parse_timeout_secs),
            parsers: ParserConfig::from(&ParsersConfig::default()),
            covers: CoversConfig::default(),
        }
    }
}
