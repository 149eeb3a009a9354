use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use ecom_pipeline::catalog::{CatalogRegistrar, PartitionDiscovery, transactions_table_spec};
use ecom_pipeline::config::{PipelineConfig, config_path};
use ecom_pipeline::storage::{MinioStorage, ObjectStore};

/// Registers the catalog database and table for the transformed data and
/// optionally runs partition discovery so fresh load dates become queryable.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    info!("🚀 Starting catalog registration");

    let config = PipelineConfig::from_file(&config_path())
        .context("Failed to load pipeline configuration")?;

    let storage = MinioStorage::from_config(&config.storage)
        .context("Failed to initialize MinIO storage")?;
    let store: Arc<dyn ObjectStore> = Arc::new(storage);

    let registrar = CatalogRegistrar::new(Arc::clone(&store));

    // 1. Ensure the catalog database exists
    registrar.ensure_database(&config.catalog.database).await?;

    // 2. Create or update the table pointing at the transformed data
    let spec = transactions_table_spec(
        &config.catalog.database,
        &config.catalog.table,
        &config.storage.bucket_name,
        &config.job.output_prefix,
    );
    let table = registrar.ensure_table(&spec).await?;
    info!(
        "✅ Catalog table '{}.{}' registered with {} column(s)",
        table.database,
        table.name,
        table.columns.len()
    );

    // 3. Discover partitions written since the last registration
    if config.catalog.is_discovery_enabled() {
        let discovery = PartitionDiscovery::new(
            Arc::clone(&store),
            &config.catalog.query_results_prefix,
            config.catalog.get_poll_interval(),
            config.catalog.get_max_polls(),
        );

        let succeeded = discovery
            .run_to_completion(&config.catalog.database, &config.catalog.table)
            .await?;

        if succeeded {
            info!("✅ Partition discovery finished");
        } else {
            warn!("⚠️ Partition discovery did not succeed; check the run record");
        }
    } else {
        info!("Partition discovery disabled by configuration");
    }

    info!("🎉 Catalog registration finished. Table should be queryable.");
    Ok(())
}
