use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use ecom_pipeline::config::{PipelineConfig, config_path};
use ecom_pipeline::job::TransformJob;
use ecom_pipeline::storage::{MinioStorage, ObjectStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    info!("🚀 Starting e-commerce transaction transform job");

    let config = PipelineConfig::from_file(&config_path())
        .context("Failed to load pipeline configuration")?;

    info!(
        "Loaded pipeline configuration: {}@{}",
        config.storage.endpoint, config.storage.bucket_name
    );

    let storage = MinioStorage::from_config(&config.storage)
        .context("Failed to initialize MinIO storage")?;
    let store: Arc<dyn ObjectStore> = Arc::new(storage);

    let job = TransformJob::new(Arc::clone(&store), config.job.clone());
    let summary = job.run().await?;

    info!("\n=== Transform Run Summary ===");
    info!(
        "✅ Run {} finished for load_date={}",
        summary.run_id, summary.load_date
    );
    info!(
        "📊 {} row(s) read, {} written, {} dropped",
        summary.rows_read, summary.rows_written, summary.rows_dropped
    );
    if summary.missing_rate_rows > 0 {
        warn!(
            "⚠️ {} row(s) had no conversion rate and kept the original amount",
            summary.missing_rate_rows
        );
    }
    if summary.unmatched_category_rows > 0 {
        warn!(
            "⚠️ {} row(s) matched no product category",
            summary.unmatched_category_rows
        );
    }
    info!("🎉 Transform job completed successfully!");

    Ok(())
}
