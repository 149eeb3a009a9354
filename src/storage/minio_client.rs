use std::path::Path;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use tracing::{info, warn};

use crate::config::{PipelineConfig, StorageConfig};
use crate::storage::object_store::ObjectStore;

/// Outcome of a successful provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Created,
    AlreadyOwned,
}

/// A 409 on bucket creation either means we already own the bucket (fine,
/// creation is idempotent) or the name is taken by another account (fatal).
/// The response body tells them apart.
pub fn conflict_means_owned(body: &str) -> bool {
    body.contains("BucketAlreadyOwnedByYou")
}

pub struct MinioStorage {
    bucket: Bucket,
}

impl MinioStorage {
    pub fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
    ) -> Result<Self> {
        // Create custom region for MinIO endpoint
        let region = Region::Custom {
            region: "us-east-1".to_owned(),
            endpoint: endpoint.to_owned(),
        };

        // Create credentials
        let credentials = Credentials::new(
            Some(access_key),
            Some(secret_key),
            None, // security_token
            None, // session_token
            None, // expiration
        )?;

        // Create bucket instance
        let bucket = Bucket::new(bucket_name, region, credentials)?;

        // Configure for path-style access (required for MinIO)
        let bucket = *bucket.with_path_style();

        Ok(MinioStorage { bucket })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        // Validate configuration
        config.validate()?;

        // Create custom region for MinIO endpoint
        let region = Region::Custom {
            region: config.get_region().to_owned(),
            endpoint: config.endpoint.clone(),
        };

        // Create credentials from config
        let credentials = Credentials::new(
            Some(config.get_access_key()?),
            Some(config.get_secret_key()?),
            None, // security_token
            None, // session_token
            None, // expiration
        )?;

        // Create bucket instance
        let bucket = Bucket::new(&config.bucket_name, region, credentials)?;

        // Configure path-style if specified
        let bucket = if config.is_path_style() {
            *bucket.with_path_style()
        } else {
            *bucket
        };

        Ok(MinioStorage { bucket })
    }

    pub fn from_config_file(config_path: &str) -> Result<Self> {
        let config = PipelineConfig::from_file(config_path)?;
        Self::from_config(&config.storage)
    }

    /// Makes sure the configured bucket exists and is ours.
    ///
    /// A bucket that already exists under our credentials is a success; a
    /// name that is taken by another account is a hard failure, because
    /// writing data into it would land in someone else's bucket.
    pub async fn ensure_bucket(&self) -> Result<BucketStatus> {
        match self.bucket.exists().await {
            Ok(true) => {
                info!("Bucket '{}' already exists", self.bucket.name);
                Ok(BucketStatus::AlreadyOwned)
            }
            Ok(false) => self.create_bucket().await,
            Err(S3Error::HttpFailWithBody(403, _)) => Err(anyhow!(
                "Bucket '{}' exists but is owned by another account",
                self.bucket.name
            )),
            Err(e) => Err(anyhow!("Failed to check bucket existence: {}", e)),
        }
    }

    async fn create_bucket(&self) -> Result<BucketStatus> {
        let config = s3::BucketConfiguration::default();
        let response = s3::Bucket::create(
            &self.bucket.name,
            self.bucket.region.clone(),
            self.bucket.credentials().await?,
            config,
        )
        .await;

        match response {
            Ok(_) => {
                info!("Created bucket: {}", self.bucket.name);
                Ok(BucketStatus::Created)
            }
            Err(S3Error::HttpFailWithBody(409, body)) => {
                if conflict_means_owned(&body) {
                    warn!("Bucket '{}' already exists and is owned by us", self.bucket.name);
                    Ok(BucketStatus::AlreadyOwned)
                } else {
                    Err(anyhow!(
                        "Bucket name '{}' is already taken by another account",
                        self.bucket.name
                    ))
                }
            }
            Err(e) => Err(anyhow!("Failed to create bucket: {}", e)),
        }
    }

    /// Uploads a local file to the bucket under the given key.
    pub async fn upload_file(&self, local_path: &Path, key: &str) -> Result<()> {
        let data = tokio::fs::read(local_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow!("Local file not found: {}", local_path.display())
            } else {
                anyhow!("Failed to read local file '{}': {}", local_path.display(), e)
            }
        })?;

        self.put_object(key, &data).await?;
        info!("Uploaded '{}' to '{}'", local_path.display(), key);
        Ok(())
    }

    pub async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        let response = self.bucket.put_object(key, data).await?;

        if response.status_code() == 200 {
            Ok(())
        } else {
            Err(anyhow!(
                "Failed to store object '{}': HTTP {}",
                key,
                response.status_code()
            ))
        }
    }

    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        match self.get_object_opt(key).await? {
            Some(bytes) => Ok(bytes),
            None => Err(anyhow!("Object not found: {}", key)),
        }
    }

    /// Fetches an object, mapping a 404 to `None`.
    pub async fn get_object_opt(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.bucket.get_object(key).await {
            Ok(response) if response.status_code() == 200 => Ok(Some(response.bytes().to_vec())),
            Ok(response) => Err(anyhow!(
                "Failed to get object '{}': HTTP {}",
                key,
                response.status_code()
            )),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let list = self.bucket.list(prefix.to_string(), None).await?;

        let mut object_names = Vec::new();
        for result in list {
            for object in result.contents {
                object_names.push(object.key);
            }
        }

        Ok(object_names)
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        let response = self.bucket.delete_object(key).await?;

        if response.status_code() == 204 || response.status_code() == 200 {
            Ok(())
        } else {
            Err(anyhow!(
                "Failed to delete object '{}': HTTP {}",
                key,
                response.status_code()
            ))
        }
    }

    pub fn get_bucket_name(&self) -> &str {
        &self.bucket.name
    }
}

#[async_trait]
impl ObjectStore for MinioStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_object_opt(key).await
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.put_object(key, data).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.list_objects(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.delete_object(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_minio_client_creation() {
        let result = MinioStorage::new(
            "http://localhost:9000",
            "test_access_key",
            "test_secret_key",
            "test-bucket",
        );

        assert!(result.is_ok());
    }

    #[test]
    fn test_minio_from_config() {
        let mut config = StorageConfig::default();
        config.access_key = Some("test_access".to_string());
        config.secret_key = Some("test_secret".to_string());

        let result = MinioStorage::from_config(&config);
        assert!(result.is_ok());
        assert_eq!(result.unwrap().get_bucket_name(), "ecommerce-pipeline");
    }

    #[test]
    fn test_conflict_classification() {
        let owned = "<Error><Code>BucketAlreadyOwnedByYou</Code></Error>";
        let taken = "<Error><Code>BucketAlreadyExists</Code></Error>";

        assert!(conflict_means_owned(owned));
        assert!(!conflict_means_owned(taken));
        assert!(!conflict_means_owned(""));
    }

    #[tokio::test]
    async fn test_upload_missing_file_reports_local_error() {
        let storage = MinioStorage::new(
            "http://localhost:9000",
            "test_access_key",
            "test_secret_key",
            "test-bucket",
        )
        .unwrap();

        let result = storage
            .upload_file(Path::new("/no/such/file.csv"), "raw/file.csv")
            .await;

        let message = result.unwrap_err().to_string();
        assert!(message.contains("Local file not found"), "{}", message);
    }

    #[tokio::test]
    async fn test_bucket_operations() {
        // This test requires a running MinIO instance
        if env::var("MINIO_TEST_ENABLED").is_ok() {
            let storage = MinioStorage::new(
                "http://localhost:9000",
                "minioadmin",
                "minioadmin",
                "test-bucket",
            )
            .unwrap();

            // Provisioning is idempotent
            let first = storage.ensure_bucket().await.unwrap();
            let second = storage.ensure_bucket().await.unwrap();
            assert!(matches!(first, BucketStatus::Created | BucketStatus::AlreadyOwned));
            assert_eq!(second, BucketStatus::AlreadyOwned);

            // Local file upload
            let mut sample = tempfile::NamedTempFile::new().unwrap();
            std::io::Write::write_all(&mut sample, b"transaction_id\n1\n").unwrap();
            storage
                .upload_file(sample.path(), "raw/test.csv")
                .await
                .unwrap();
            let fetched = storage.get_object_opt("raw/test.csv").await.unwrap();
            assert_eq!(fetched.as_deref(), Some(b"transaction_id\n1\n".as_slice()));

            assert_eq!(storage.get_object_opt("raw/absent.csv").await.unwrap(), None);

            let listed = storage.list_objects("raw/").await.unwrap();
            assert!(listed.contains(&"raw/test.csv".to_string()));

            storage.delete_object("raw/test.csv").await.unwrap();
        }
    }
}
