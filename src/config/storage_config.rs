use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    pub endpoint: String,
    pub bucket_name: String,
    pub region: Option<String>,
    pub path_style: Option<bool>,
    pub ssl: Option<bool>,
    // Optional environment variable names for customization
    pub env_access_key: Option<String>,
    pub env_secret_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket_name: String,
    pub region: Option<String>,
    pub path_style: Option<bool>,
    pub ssl: Option<bool>,
    // These fields will be loaded from environment variables
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    // Optional environment variable names for customization
    pub env_access_key: Option<String>,
    pub env_secret_key: Option<String>,
}

impl StorageConfig {
    pub fn from_section(section: StorageSection) -> Self {
        Self {
            endpoint: section.endpoint,
            bucket_name: section.bucket_name,
            region: section.region,
            path_style: section.path_style,
            ssl: section.ssl,
            access_key: None,
            secret_key: None,
            env_access_key: section.env_access_key,
            env_secret_key: section.env_secret_key,
        }
    }

    pub fn load_credentials(&mut self) -> Result<()> {
        // Default environment variable names
        let access_key_var = self.env_access_key.as_deref().unwrap_or("MINIO_ACCESS_KEY");
        let secret_key_var = self.env_secret_key.as_deref().unwrap_or("MINIO_SECRET_KEY");

        self.access_key = env::var(access_key_var)
            .with_context(|| format!("Missing environment variable: {}", access_key_var))?
            .into();

        self.secret_key = env::var(secret_key_var)
            .with_context(|| format!("Missing environment variable: {}", secret_key_var))?
            .into();

        Ok(())
    }

    pub fn get_access_key(&self) -> Result<&str> {
        self.access_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Access key not loaded"))
    }

    pub fn get_secret_key(&self) -> Result<&str> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Secret key not loaded"))
    }

    #[allow(dead_code)]
    pub fn is_ssl(&self) -> bool {
        self.ssl
            .unwrap_or_else(|| self.endpoint.starts_with("https://"))
    }

    pub fn is_path_style(&self) -> bool {
        self.path_style.unwrap_or(true)
    }

    pub fn get_region(&self) -> &str {
        self.region.as_deref().unwrap_or("us-east-1")
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(anyhow::anyhow!("Storage endpoint cannot be empty"));
        }

        if !is_valid_bucket_name(&self.bucket_name) {
            return Err(anyhow::anyhow!(
                "Invalid bucket name '{}': expected 3-63 lowercase letters, digits or hyphens",
                self.bucket_name
            ));
        }

        if self.access_key.is_none() {
            return Err(anyhow::anyhow!("Storage access key not loaded"));
        }

        if self.secret_key.is_none() {
            return Err(anyhow::anyhow!("Storage secret key not loaded"));
        }

        Ok(())
    }
}

/// S3 bucket naming rules: 3-63 characters, lowercase letters, digits and
/// hyphens, starting and ending with a letter or digit.
pub fn is_valid_bucket_name(name: &str) -> bool {
    match Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$") {
        Ok(re) => re.is_match(name),
        Err(_) => false,
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            bucket_name: "ecommerce-pipeline".to_string(),
            region: Some("us-east-1".to_string()),
            path_style: Some(true),
            ssl: Some(false),
            access_key: None,
            secret_key: None,
            env_access_key: None,
            env_secret_key: None,
        }
    }
}
