use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::config::storage_config::{StorageConfig, StorageSection};

/// On-disk shape of the pipeline TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfigFile {
    pub storage: StorageSection,
    pub job: JobConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Prefix holding the raw transaction CSVs.
    pub input_prefix: String,
    /// Prefix the partitioned parquet output is written under.
    pub output_prefix: String,
    pub currency_rates_key: String,
    pub product_categories_key: String,
    pub target_currency: Option<String>,
}

impl JobConfig {
    pub fn get_target_currency(&self) -> &str {
        self.target_currency.as_deref().unwrap_or("USD")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub database: String,
    pub table: String,
    /// Prefix where partition discovery drops its run records.
    pub query_results_prefix: String,
    pub poll_interval_secs: Option<u64>,
    pub max_polls: Option<u32>,
    pub discover_partitions: Option<bool>,
}

impl CatalogConfig {
    pub fn get_poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(5))
    }

    pub fn get_max_polls(&self) -> u32 {
        self.max_polls.unwrap_or(60)
    }

    pub fn is_discovery_enabled(&self) -> bool {
        self.discover_partitions.unwrap_or(true)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub job: JobConfig,
    pub catalog: CatalogConfig,
}

impl PipelineConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config file: {}", path))?;

        let config_file: PipelineConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline config file: {}", path))?;

        let mut storage = StorageConfig::from_section(config_file.storage);

        // Load credentials from environment variables
        storage.load_credentials()?;

        let mut config = PipelineConfig {
            storage,
            job: config_file.job,
            catalog: config_file.catalog,
        };
        config.normalize_prefixes();
        config.validate()?;

        Ok(config)
    }

    /// Keys are joined as `prefix + name`, so every configured prefix must
    /// carry exactly one trailing slash.
    fn normalize_prefixes(&mut self) {
        self.job.input_prefix = normalize_prefix(&self.job.input_prefix);
        self.job.output_prefix = normalize_prefix(&self.job.output_prefix);
        self.catalog.query_results_prefix = normalize_prefix(&self.catalog.query_results_prefix);
    }

    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;

        if self.job.input_prefix.is_empty() {
            return Err(anyhow::anyhow!("Job input prefix cannot be empty"));
        }
        if self.job.output_prefix.is_empty() {
            return Err(anyhow::anyhow!("Job output prefix cannot be empty"));
        }
        if self.job.currency_rates_key.is_empty() {
            return Err(anyhow::anyhow!("Currency rates key cannot be empty"));
        }
        if self.job.product_categories_key.is_empty() {
            return Err(anyhow::anyhow!("Product categories key cannot be empty"));
        }

        if !is_valid_catalog_name(&self.catalog.database) {
            return Err(anyhow::anyhow!(
                "Invalid catalog database name '{}': expected lowercase letters, digits or underscores",
                self.catalog.database
            ));
        }
        if !is_valid_catalog_name(&self.catalog.table) {
            return Err(anyhow::anyhow!(
                "Invalid catalog table name '{}': expected lowercase letters, digits or underscores",
                self.catalog.table
            ));
        }

        Ok(())
    }
}

pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

fn is_valid_catalog_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Path of the pipeline config file, overridable for deployments.
pub fn config_path() -> String {
    env::var("ECOM_PIPELINE_CONFIG").unwrap_or_else(|_| "src/configs/pipeline.toml".to_string())
}
