use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::info;

use crate::catalog::manifest::{DatabaseManifest, PartitionInfo, TableManifest, TableSpec};
use crate::storage::layout::StorageLayout;
use crate::storage::object_store::ObjectStore;

/// Maintains the catalog manifests that make the transformed data queryable.
pub struct CatalogRegistrar {
    store: Arc<dyn ObjectStore>,
}

impl CatalogRegistrar {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        CatalogRegistrar { store }
    }

    /// Creates the database manifest if it does not exist yet. Re-running is
    /// a no-op that returns the existing manifest.
    pub async fn ensure_database(&self, name: &str) -> Result<DatabaseManifest> {
        let key = StorageLayout::database_key(name);

        if let Some(bytes) = self.store.get(&key).await? {
            let manifest: DatabaseManifest = serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt database manifest at {}", key))?;
            info!("Catalog database '{}' already exists", name);
            return Ok(manifest);
        }

        let manifest = DatabaseManifest {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.store
            .put(&key, &serde_json::to_vec_pretty(&manifest)?)
            .await?;
        info!("Created catalog database '{}'", name);
        Ok(manifest)
    }

    /// Creates or updates a table manifest.
    ///
    /// Updating replaces the declared schema and location but keeps the
    /// registered partitions and the original creation time. The database
    /// must exist first.
    pub async fn ensure_table(&self, spec: &TableSpec) -> Result<TableManifest> {
        let database_key = StorageLayout::database_key(&spec.database);
        if self.store.get(&database_key).await?.is_none() {
            return Err(anyhow!(
                "Catalog database '{}' does not exist",
                spec.database
            ));
        }

        let key = StorageLayout::table_key(&spec.database, &spec.name);
        let now = Utc::now();

        let manifest = match self.store.get(&key).await? {
            Some(bytes) => {
                let existing: TableManifest = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt table manifest at {}", key))?;
                info!("Updating catalog table '{}.{}'", spec.database, spec.name);
                TableManifest {
                    database: spec.database.clone(),
                    name: spec.name.clone(),
                    columns: spec.columns.clone(),
                    partition_keys: spec.partition_keys.clone(),
                    bucket: spec.bucket.clone(),
                    location: spec.location.clone(),
                    format: spec.format.clone(),
                    created_at: existing.created_at,
                    updated_at: now,
                    partitions: existing.partitions,
                }
            }
            None => {
                info!("Creating catalog table '{}.{}'", spec.database, spec.name);
                TableManifest {
                    database: spec.database.clone(),
                    name: spec.name.clone(),
                    columns: spec.columns.clone(),
                    partition_keys: spec.partition_keys.clone(),
                    bucket: spec.bucket.clone(),
                    location: spec.location.clone(),
                    format: spec.format.clone(),
                    created_at: now,
                    updated_at: now,
                    partitions: Vec::new(),
                }
            }
        };

        self.store
            .put(&key, &serde_json::to_vec_pretty(&manifest)?)
            .await?;
        Ok(manifest)
    }

    pub async fn load_table(&self, database: &str, table: &str) -> Result<Option<TableManifest>> {
        let key = StorageLayout::table_key(database, table);
        match self.store.get(&key).await? {
            Some(bytes) => {
                let manifest = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt table manifest at {}", key))?;
                Ok(Some(manifest))
            }
            None => Ok(None),
        }
    }

    /// Merges newly discovered partitions into the table manifest, skipping
    /// load dates that are already registered. Returns how many were new.
    pub async fn register_partitions(
        &self,
        database: &str,
        table: &str,
        discovered: &[PartitionInfo],
    ) -> Result<usize> {
        let key = StorageLayout::table_key(database, table);
        let bytes = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| anyhow!("Catalog table '{}.{}' does not exist", database, table))?;
        let mut manifest: TableManifest = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt table manifest at {}", key))?;

        let mut added = 0usize;
        for partition in discovered {
            let known = manifest
                .partitions
                .iter()
                .any(|p| p.load_date == partition.load_date);
            if !known {
                manifest.partitions.push(partition.clone());
                added += 1;
            }
        }

        if added > 0 {
            manifest.partitions.sort_by_key(|p| p.load_date);
            manifest.updated_at = Utc::now();
            self.store
                .put(&key, &serde_json::to_vec_pretty(&manifest)?)
                .await?;
            info!(
                "Registered {} new partition(s) for '{}.{}'",
                added, database, table
            );
        }

        Ok(added)
    }
}
