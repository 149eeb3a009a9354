use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::JobConfig;
use crate::processor::category_enricher::CategoryBook;
use crate::processor::currency_normalizer::CurrencyNormalizer;
use crate::processor::transaction_transformer::{TransactionTransformer, read_transactions};
use crate::storage::layout::StorageLayout;
use crate::storage::object_store::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Run record written under `runs/<load_date>/<run_id>.json` when a transform
/// run finishes, success or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub load_date: NaiveDate,
    pub status: RunStatus,
    pub input_objects: usize,
    pub rows_read: usize,
    pub rows_written: usize,
    pub rows_dropped: usize,
    pub missing_rate_rows: usize,
    pub unmatched_category_rows: usize,
    pub partition_prefix: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ExecutionReport {
    input_objects: usize,
    rows_read: usize,
    rows_written: usize,
    rows_dropped: usize,
    missing_rate_rows: usize,
    unmatched_category_rows: usize,
    partition_prefix: String,
}

/// The batch transform: reads raw transaction CSVs, converts currency,
/// enriches with product categories, derives date parts and writes one
/// parquet partition per load date.
pub struct TransformJob {
    store: Arc<dyn ObjectStore>,
    config: JobConfig,
}

impl TransformJob {
    pub fn new(store: Arc<dyn ObjectStore>, config: JobConfig) -> Self {
        TransformJob { store, config }
    }

    /// Runs the transform for today's load date.
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_for_date(Utc::now().date_naive()).await
    }

    /// Runs the transform for one load date.
    ///
    /// The run record is committed whether the transform succeeds or fails;
    /// on failure the original error is returned after the commit attempt.
    pub async fn run_for_date(&self, load_date: NaiveDate) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("Starting transform run {} for load_date={}", run_id, load_date);

        let outcome = self.execute(load_date).await;

        let summary = match &outcome {
            Ok(report) => RunSummary {
                run_id: run_id.clone(),
                load_date,
                status: RunStatus::Succeeded,
                input_objects: report.input_objects,
                rows_read: report.rows_read,
                rows_written: report.rows_written,
                rows_dropped: report.rows_dropped,
                missing_rate_rows: report.missing_rate_rows,
                unmatched_category_rows: report.unmatched_category_rows,
                partition_prefix: Some(report.partition_prefix.clone()),
                error: None,
                started_at,
                finished_at: Utc::now(),
            },
            Err(e) => RunSummary {
                run_id: run_id.clone(),
                load_date,
                status: RunStatus::Failed,
                input_objects: 0,
                rows_read: 0,
                rows_written: 0,
                rows_dropped: 0,
                missing_rate_rows: 0,
                unmatched_category_rows: 0,
                partition_prefix: None,
                error: Some(format!("{:#}", e)),
                started_at,
                finished_at: Utc::now(),
            },
        };

        let commit = self.commit(&summary).await;

        match outcome {
            Ok(_) => {
                commit?;
                info!("Transform run {} committed", run_id);
                Ok(summary)
            }
            Err(e) => {
                error!("Transform run {} failed: {:#}", run_id, e);
                if let Err(commit_err) = commit {
                    error!(
                        "Failed to commit run record for failed run {}: {:#}",
                        run_id, commit_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, load_date: NaiveDate) -> Result<ExecutionReport> {
        // 1. Read raw transaction data
        let keys = self.store.list(&self.config.input_prefix).await?;
        let csv_keys: Vec<String> = keys.into_iter().filter(|k| k.ends_with(".csv")).collect();
        if csv_keys.is_empty() {
            return Err(anyhow!(
                "No raw transaction CSVs found under '{}'",
                self.config.input_prefix
            ));
        }
        info!(
            "Reading {} raw transaction file(s) from '{}'",
            csv_keys.len(),
            self.config.input_prefix
        );

        let mut raw_rows = Vec::new();
        let mut unreadable = 0usize;
        for key in &csv_keys {
            let bytes = self
                .store
                .get(key)
                .await?
                .ok_or_else(|| anyhow!("Raw object disappeared during run: {}", key))?;
            let (mut rows, dropped) = read_transactions(&bytes)
                .with_context(|| format!("Failed to read raw transactions from {}", key))?;
            raw_rows.append(&mut rows);
            unreadable += dropped;
        }
        info!("Read {} raw transactions", raw_rows.len());
        if raw_rows.is_empty() {
            warn!("Raw input contained no readable rows; the partition will be empty");
        }

        // 2. Read reference data
        let rates_bytes = self
            .store
            .get(&self.config.currency_rates_key)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "Currency rates object not found: {}",
                    self.config.currency_rates_key
                )
            })?;
        let normalizer =
            CurrencyNormalizer::from_csv(&rates_bytes, self.config.get_target_currency())?;

        let categories_bytes = self
            .store
            .get(&self.config.product_categories_key)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "Product categories object not found: {}",
                    self.config.product_categories_key
                )
            })?;
        let (categories, _) = CategoryBook::from_csv(&categories_bytes)?;

        // 3. Transform
        let transformer = TransactionTransformer::new(normalizer, categories);
        let (enriched, counts) = transformer.transform(&raw_rows);
        let df = transformer.to_dataframe(&enriched)?;

        // 4. Write the partition
        let partition_prefix = self.write_partition(df, load_date).await?;

        Ok(ExecutionReport {
            input_objects: csv_keys.len(),
            rows_read: counts.input_rows + unreadable,
            rows_written: counts.output_rows,
            rows_dropped: counts.dropped_rows + unreadable,
            missing_rate_rows: counts.missing_rate_rows,
            unmatched_category_rows: counts.unmatched_category_rows,
            partition_prefix,
        })
    }

    /// Writes the output partition, replacing whatever a previous run left
    /// under the same load date.
    async fn write_partition(&self, mut df: DataFrame, load_date: NaiveDate) -> Result<String> {
        let partition_prefix =
            StorageLayout::partition_prefix(&self.config.output_prefix, load_date);

        let existing = self.store.list(&partition_prefix).await?;
        for key in &existing {
            self.store.delete(key).await?;
        }
        if !existing.is_empty() {
            info!(
                "Replaced {} existing object(s) under '{}'",
                existing.len(),
                partition_prefix
            );
        }

        let mut buffer = Vec::new();
        ParquetWriter::new(&mut buffer)
            .with_compression(ParquetCompression::Snappy)
            .finish(&mut df)
            .map_err(|e| anyhow!("Failed to encode parquet output: {}", e))?;

        let key = StorageLayout::part_key(&self.config.output_prefix, load_date);
        self.store.put(&key, &buffer).await?;
        info!(
            "Wrote {} row(s) to '{}' ({} bytes)",
            df.height(),
            key,
            buffer.len()
        );

        Ok(partition_prefix)
    }

    async fn commit(&self, summary: &RunSummary) -> Result<()> {
        let key = StorageLayout::run_key(summary.load_date, &summary.run_id);
        self.store
            .put(&key, &serde_json::to_vec_pretty(summary)?)
            .await
            .with_context(|| format!("Failed to write run record {}", key))
    }
}
