use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use ecom_pipeline::config::{PipelineConfig, config_path};
use ecom_pipeline::storage::MinioStorage;

const SAMPLE_RAW_FILE: &str = "sample_raw_data.csv";

const SAMPLE_TRANSACTIONS: &str = "\
transaction_id,user_id,product_id,amount,currency,timestamp
1,101,P100,50.00,USD,2025-04-12T10:00:00Z
2,102,P200,75.50,EUR,2025-04-12T11:30:00Z
";

const SAMPLE_CURRENCY_RATES: &str = "\
currency,rate_to_usd,rate_date
EUR,1.05,2025-03-01T00:00:00Z
EUR,1.08,2025-04-10T00:00:00Z
GBP,1.26,2025-04-10T00:00:00Z
";

const SAMPLE_PRODUCT_CATEGORIES: &str = "\
product_id,category
P100,electronics
P200,books
";

/// Provisions the pipeline bucket and seeds it with sample raw and reference
/// data so the transform job has something to chew on.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    info!("🚀 Starting storage setup");

    let config = PipelineConfig::from_file(&config_path())
        .context("Failed to load pipeline configuration")?;

    let storage = MinioStorage::from_config(&config.storage)
        .context("Failed to initialize MinIO storage")?;

    // 1. Make sure the bucket exists and is ours
    let status = storage.ensure_bucket().await?;
    info!(
        "✅ Bucket '{}' is ready ({:?})",
        config.storage.bucket_name, status
    );

    // 2. Upload a sample raw data file
    std::fs::write(SAMPLE_RAW_FILE, SAMPLE_TRANSACTIONS)
        .with_context(|| format!("Failed to write {}", SAMPLE_RAW_FILE))?;

    let raw_key = format!("{}{}", config.job.input_prefix, SAMPLE_RAW_FILE);
    let upload = storage.upload_file(Path::new(SAMPLE_RAW_FILE), &raw_key).await;

    // Clean up the local file before reporting the outcome
    std::fs::remove_file(SAMPLE_RAW_FILE)
        .with_context(|| format!("Failed to remove {}", SAMPLE_RAW_FILE))?;
    upload?;
    info!("✅ Sample raw data uploaded to '{}'", raw_key);

    // 3. Seed the reference data the transform job reads
    storage
        .put_object(
            &config.job.currency_rates_key,
            SAMPLE_CURRENCY_RATES.as_bytes(),
        )
        .await?;
    info!(
        "✅ Currency rates seeded at '{}'",
        config.job.currency_rates_key
    );

    storage
        .put_object(
            &config.job.product_categories_key,
            SAMPLE_PRODUCT_CATEGORIES.as_bytes(),
        )
        .await?;
    info!(
        "✅ Product categories seeded at '{}'",
        config.job.product_categories_key
    );

    info!("🎉 Storage setup finished");
    Ok(())
}
