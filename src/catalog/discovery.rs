use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::manifest::PartitionInfo;
use crate::catalog::registrar::CatalogRegistrar;
use crate::storage::layout::StorageLayout;
use crate::storage::object_store::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryState {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl DiscoveryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DiscoveryState::Running)
    }
}

/// Record of one discovery run, stored under the query results prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRun {
    pub id: String,
    pub database: String,
    pub table: String,
    pub state: DiscoveryState,
    pub reason: Option<String>,
    pub partitions_added: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Scans the table location for `load_date=` partitions the catalog does not
/// know yet and registers them.
///
/// Runs execute asynchronously: [`start`](PartitionDiscovery::start) returns a
/// run id immediately and callers poll [`wait`](PartitionDiscovery::wait) for
/// the outcome.
pub struct PartitionDiscovery {
    store: Arc<dyn ObjectStore>,
    query_results_prefix: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl PartitionDiscovery {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        query_results_prefix: &str,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Self {
        PartitionDiscovery {
            store,
            query_results_prefix: query_results_prefix.to_string(),
            poll_interval,
            max_polls,
        }
    }

    /// Starts a discovery run for one table and returns its id.
    pub async fn start(&self, database: &str, table: &str) -> Result<String> {
        let run = DiscoveryRun {
            id: Uuid::new_v4().to_string(),
            database: database.to_string(),
            table: table.to_string(),
            state: DiscoveryState::Running,
            reason: None,
            partitions_added: 0,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.write_run(&run).await?;
        info!(
            "Started partition discovery run {} for '{}.{}'",
            run.id, database, table
        );

        let store = Arc::clone(&self.store);
        let prefix = self.query_results_prefix.clone();
        let mut task_run = run.clone();
        tokio::spawn(async move {
            let outcome = discover_partitions(
                Arc::clone(&store),
                &task_run.database,
                &task_run.table,
            )
            .await;

            match outcome {
                Ok(added) => {
                    task_run.state = DiscoveryState::Succeeded;
                    task_run.partitions_added = added;
                }
                Err(e) => {
                    task_run.state = DiscoveryState::Failed;
                    task_run.reason = Some(e.to_string());
                }
            }
            task_run.finished_at = Some(Utc::now());

            if let Err(e) = finish_run(store, &prefix, task_run).await {
                error!("Failed to record discovery run outcome: {}", e);
            }
        });

        Ok(run.id)
    }

    pub async fn status(&self, id: &str) -> Result<Option<DiscoveryRun>> {
        let key = StorageLayout::discovery_key(&self.query_results_prefix, id);
        match self.store.get(&key).await? {
            Some(bytes) => {
                let run = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt discovery run record at {}", key))?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    /// Polls a run until it reaches a terminal state. Returns `true` only for
    /// a successful run; failures and cancellations are reported through the
    /// run record, not as errors.
    pub async fn wait(&self, id: &str) -> Result<bool> {
        for _ in 0..self.max_polls {
            let run = self
                .status(id)
                .await?
                .ok_or_else(|| anyhow!("Unknown discovery run: {}", id))?;

            match run.state {
                DiscoveryState::Running => sleep(self.poll_interval).await,
                DiscoveryState::Succeeded => {
                    info!(
                        "Partition discovery run {} succeeded, {} new partition(s)",
                        id, run.partitions_added
                    );
                    return Ok(true);
                }
                DiscoveryState::Failed | DiscoveryState::Cancelled => {
                    error!(
                        "Partition discovery run {} finished with state {:?}: {}",
                        id,
                        run.state,
                        run.reason.as_deref().unwrap_or("no reason provided")
                    );
                    return Ok(false);
                }
            }
        }

        warn!(
            "Partition discovery run {} still running after {} polls",
            id, self.max_polls
        );
        Ok(false)
    }

    /// Marks a still-running run as cancelled. Returns `true` if the run was
    /// transitioned; a run that already finished keeps its state.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        let mut run = self
            .status(id)
            .await?
            .ok_or_else(|| anyhow!("Unknown discovery run: {}", id))?;

        if run.state.is_terminal() {
            return Ok(false);
        }

        run.state = DiscoveryState::Cancelled;
        run.finished_at = Some(Utc::now());
        self.write_run(&run).await?;
        info!("Cancelled partition discovery run {}", id);
        Ok(true)
    }

    /// Starts a run and waits for it to finish.
    pub async fn run_to_completion(&self, database: &str, table: &str) -> Result<bool> {
        let id = self.start(database, table).await?;
        self.wait(&id).await
    }

    async fn write_run(&self, run: &DiscoveryRun) -> Result<()> {
        let key = StorageLayout::discovery_key(&self.query_results_prefix, &run.id);
        self.store
            .put(&key, &serde_json::to_vec_pretty(run)?)
            .await
    }
}

/// Lists the table location and registers every `load_date=` partition the
/// manifest does not carry yet. Returns the number of new partitions.
async fn discover_partitions(
    store: Arc<dyn ObjectStore>,
    database: &str,
    table: &str,
) -> Result<usize> {
    let registrar = CatalogRegistrar::new(Arc::clone(&store));
    let manifest = registrar
        .load_table(database, table)
        .await?
        .ok_or_else(|| anyhow!("Catalog table '{}.{}' does not exist", database, table))?;

    let keys = store.list(&manifest.location).await?;

    let mut seen = BTreeSet::new();
    let mut discovered = Vec::new();
    for key in keys {
        match StorageLayout::load_date_from_key(&key) {
            Some(load_date) => {
                if seen.insert(load_date) {
                    discovered.push(PartitionInfo {
                        load_date,
                        location: StorageLayout::partition_prefix(&manifest.location, load_date),
                        registered_at: Utc::now(),
                    });
                }
            }
            None if key.contains("load_date=") => {
                warn!("Skipping malformed partition segment in key '{}'", key);
            }
            None => {}
        }
    }

    registrar.register_partitions(database, table, &discovered).await
}

/// Writes the terminal run record, unless the run was cancelled while the
/// task was working.
async fn finish_run(
    store: Arc<dyn ObjectStore>,
    query_results_prefix: &str,
    run: DiscoveryRun,
) -> Result<()> {
    let key = StorageLayout::discovery_key(query_results_prefix, &run.id);

    if let Some(bytes) = store.get(&key).await? {
        let current: DiscoveryRun = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt discovery run record at {}", key))?;
        if current.state == DiscoveryState::Cancelled {
            return Ok(());
        }
    }

    store.put(&key, &serde_json::to_vec_pretty(&run)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::manifest::transactions_table_spec;
    use crate::storage::object_store::MemoryStore;

    fn discovery(store: Arc<MemoryStore>) -> PartitionDiscovery {
        PartitionDiscovery::new(store, "query-results/", Duration::from_millis(10), 100)
    }

    async fn seed_catalog(store: &Arc<MemoryStore>) {
        let registrar = CatalogRegistrar::new(Arc::clone(store) as Arc<dyn ObjectStore>);
        registrar.ensure_database("ecommerce_db").await.unwrap();
        registrar
            .ensure_table(&transactions_table_spec(
                "ecommerce_db",
                "transactions_transformed",
                "ecommerce-pipeline",
                "transformed/",
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_discovery_registers_new_partitions() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;

        store
            .put("transformed/load_date=2025-04-12/part-a.parquet", b"x")
            .await
            .unwrap();
        store
            .put("transformed/load_date=2025-04-13/part-b.parquet", b"y")
            .await
            .unwrap();
        // Not partition data, must be ignored.
        store.put("transformed/notes.txt", b"z").await.unwrap();

        let discovery = discovery(Arc::clone(&store));
        let succeeded = discovery
            .run_to_completion("ecommerce_db", "transactions_transformed")
            .await
            .unwrap();
        assert!(succeeded);

        let registrar = CatalogRegistrar::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        let table = registrar
            .load_table("ecommerce_db", "transactions_transformed")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(table.partitions.len(), 2);

        // A second run finds nothing new but still succeeds.
        let succeeded = discovery
            .run_to_completion("ecommerce_db", "transactions_transformed")
            .await
            .unwrap();
        assert!(succeeded);
    }

    #[tokio::test]
    async fn test_discovery_records_success_details() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;
        store
            .put("transformed/load_date=2025-04-12/part-a.parquet", b"x")
            .await
            .unwrap();

        let discovery = discovery(Arc::clone(&store));
        let id = discovery
            .start("ecommerce_db", "transactions_transformed")
            .await
            .unwrap();
        assert!(discovery.wait(&id).await.unwrap());

        let run = discovery.status(&id).await.unwrap().unwrap();
        assert_eq!(run.state, DiscoveryState::Succeeded);
        assert_eq!(run.partitions_added, 1);
        assert!(run.finished_at.is_some());
        assert_eq!(run.reason, None);
    }

    #[tokio::test]
    async fn test_discovery_fails_for_missing_table() {
        let store = Arc::new(MemoryStore::new());

        let discovery = discovery(Arc::clone(&store));
        let id = discovery
            .start("ecommerce_db", "transactions_transformed")
            .await
            .unwrap();
        assert!(!discovery.wait(&id).await.unwrap());

        let run = discovery.status(&id).await.unwrap().unwrap();
        assert_eq!(run.state, DiscoveryState::Failed);
        assert!(run.reason.is_some());
    }

    #[tokio::test]
    async fn test_wait_on_unknown_run_errors() {
        let store = Arc::new(MemoryStore::new());
        let discovery = discovery(store);

        assert!(discovery.wait("no-such-run").await.is_err());
    }

    #[tokio::test]
    async fn test_wait_gives_up_after_max_polls() {
        let store = Arc::new(MemoryStore::new());

        // A run record that never reaches a terminal state.
        let run = DiscoveryRun {
            id: "stuck".to_string(),
            database: "ecommerce_db".to_string(),
            table: "transactions_transformed".to_string(),
            state: DiscoveryState::Running,
            reason: None,
            partitions_added: 0,
            started_at: Utc::now(),
            finished_at: None,
        };
        store
            .put(
                &StorageLayout::discovery_key("query-results/", "stuck"),
                &serde_json::to_vec_pretty(&run).unwrap(),
            )
            .await
            .unwrap();

        let discovery =
            PartitionDiscovery::new(store, "query-results/", Duration::from_millis(1), 3);
        assert!(!discovery.wait("stuck").await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_partition_segments_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;

        store
            .put("transformed/load_date=2025-04-12/part-a.parquet", b"x")
            .await
            .unwrap();
        store
            .put("transformed/load_date=yesterday/part-b.parquet", b"y")
            .await
            .unwrap();

        let discovery = discovery(Arc::clone(&store));
        assert!(
            discovery
                .run_to_completion("ecommerce_db", "transactions_transformed")
                .await
                .unwrap()
        );

        let registrar = CatalogRegistrar::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        let table = registrar
            .load_table("ecommerce_db", "transactions_transformed")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(table.partitions.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_finish_keeps_state() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(&store).await;

        let discovery = discovery(Arc::clone(&store));
        let id = discovery
            .start("ecommerce_db", "transactions_transformed")
            .await
            .unwrap();
        discovery.wait(&id).await.unwrap();

        assert!(!discovery.cancel(&id).await.unwrap());
        let run = discovery.status(&id).await.unwrap().unwrap();
        assert_eq!(run.state, DiscoveryState::Succeeded);
    }
}
