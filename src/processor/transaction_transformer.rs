use anyhow::{Result, anyhow};
use csv::{ReaderBuilder, Trim};
use polars::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::{info, warn};

use crate::models::{EnrichedTransaction, RawTransaction};
use crate::processor::category_enricher::CategoryBook;
use crate::processor::currency_normalizer::CurrencyNormalizer;
use crate::processor::date_parts::{DateParts, parse_timestamp};

/// Days between 0001-01-01 (CE) and the Unix epoch; polars dates are
/// day-counts from the epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Per-stage row accounting carried into the run summary.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TransformCounts {
    pub input_rows: usize,
    pub output_rows: usize,
    /// Rows dropped for an unparseable timestamp.
    pub dropped_rows: usize,
    /// Rows converted by identity because no rate was known.
    pub missing_rate_rows: usize,
    /// Rows kept with a null category.
    pub unmatched_category_rows: usize,
}

/// Reads the raw transactions CSV. Records that fail to deserialize are
/// dropped and counted so one bad line cannot sink the batch.
pub fn read_transactions(bytes: &[u8]) -> Result<(Vec<RawTransaction>, usize)> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for (index, result) in reader.deserialize::<RawTransaction>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                dropped += 1;
                warn!("Skipping unreadable transaction row {}: {}", index + 1, e);
            }
        }
    }

    Ok((rows, dropped))
}

/// Applies the full per-row transform: currency conversion, category
/// enrichment, date-part derivation.
pub struct TransactionTransformer {
    normalizer: CurrencyNormalizer,
    categories: CategoryBook,
}

impl TransactionTransformer {
    pub fn new(normalizer: CurrencyNormalizer, categories: CategoryBook) -> Self {
        TransactionTransformer {
            normalizer,
            categories,
        }
    }

    /// Transforms raw rows into enriched rows.
    ///
    /// Every input row is preserved except those whose timestamp cannot be
    /// parsed; those are dropped with a warn and counted. Missing rates and
    /// missing categories never drop a row.
    pub fn transform(&self, rows: &[RawTransaction]) -> (Vec<EnrichedTransaction>, TransformCounts) {
        let mut counts = TransformCounts {
            input_rows: rows.len(),
            ..TransformCounts::default()
        };
        let mut enriched = Vec::with_capacity(rows.len());

        for row in rows {
            let timestamp = match parse_timestamp(&row.timestamp) {
                Ok(ts) => ts,
                Err(e) => {
                    counts.dropped_rows += 1;
                    warn!("Dropping transaction '{}': {}", row.transaction_id, e);
                    continue;
                }
            };

            if row.currency != self.normalizer.target_currency()
                && !self.normalizer.has_rate(&row.currency)
            {
                counts.missing_rate_rows += 1;
            }

            let amount_usd = self.normalizer.convert(row.amount, &row.currency);

            let category = self.categories.lookup(&row.product_id).map(str::to_string);
            if category.is_none() {
                counts.unmatched_category_rows += 1;
            }

            let parts = DateParts::from_timestamp(timestamp);

            enriched.push(EnrichedTransaction {
                transaction_id: row.transaction_id.clone(),
                user_id: row.user_id.clone(),
                product_id: row.product_id.clone(),
                category,
                amount: row.amount,
                currency: row.currency.clone(),
                amount_usd,
                timestamp,
                transaction_date: parts.date,
                transaction_year: parts.year,
                transaction_month: parts.month,
                transaction_week: parts.week,
                transaction_day: parts.day,
            });
        }

        counts.output_rows = enriched.len();
        info!(
            "Transform summary: {} in, {} out, {} dropped, {} without a rate, {} without a category",
            counts.input_rows,
            counts.output_rows,
            counts.dropped_rows,
            counts.missing_rate_rows,
            counts.unmatched_category_rows
        );

        (enriched, counts)
    }

    /// Builds the output DataFrame in the fixed column order the catalog
    /// table declares.
    pub fn to_dataframe(&self, rows: &[EnrichedTransaction]) -> Result<DataFrame> {
        let ids: Vec<String> = rows.iter().map(|r| r.transaction_id.clone()).collect();
        let users: Vec<String> = rows.iter().map(|r| r.user_id.clone()).collect();
        let products: Vec<String> = rows.iter().map(|r| r.product_id.clone()).collect();
        let categories: Vec<Option<String>> = rows.iter().map(|r| r.category.clone()).collect();
        let amounts: Vec<f64> = rows
            .iter()
            .map(|r| r.amount.to_f64().unwrap_or(f64::NAN))
            .collect();
        let currencies: Vec<String> = rows.iter().map(|r| r.currency.clone()).collect();
        let amounts_usd: Vec<f64> = rows
            .iter()
            .map(|r| r.amount_usd.to_f64().unwrap_or(f64::NAN))
            .collect();
        let timestamps: Vec<i64> = rows
            .iter()
            .map(|r| r.timestamp.and_utc().timestamp_micros())
            .collect();
        let dates: Vec<i32> = rows
            .iter()
            .map(|r| chrono::Datelike::num_days_from_ce(&r.transaction_date) - UNIX_EPOCH_DAYS_FROM_CE)
            .collect();
        let years: Vec<i32> = rows.iter().map(|r| r.transaction_year).collect();
        let months: Vec<i32> = rows.iter().map(|r| r.transaction_month as i32).collect();
        let weeks: Vec<i32> = rows.iter().map(|r| r.transaction_week as i32).collect();
        let days: Vec<i32> = rows.iter().map(|r| r.transaction_day as i32).collect();

        let timestamp_series = Int64Chunked::from_vec("timestamp".into(), timestamps)
            .into_datetime(TimeUnit::Microseconds, None)
            .into_series();
        let date_series = Int32Chunked::from_vec("transaction_date".into(), dates)
            .into_date()
            .into_series();

        let columns: Vec<Column> = vec![
            Series::new("transaction_id".into(), ids).into(),
            Series::new("user_id".into(), users).into(),
            Series::new("product_id".into(), products).into(),
            Series::new("category".into(), categories).into(),
            Series::new("amount".into(), amounts).into(),
            Series::new("currency".into(), currencies).into(),
            Series::new("amount_usd".into(), amounts_usd).into(),
            timestamp_series.into(),
            date_series.into(),
            Series::new("transaction_year".into(), years).into(),
            Series::new("transaction_month".into(), months).into(),
            Series::new("transaction_week".into(), weeks).into(),
            Series::new("transaction_day".into(), days).into(),
        ];

        DataFrame::new(columns).map_err(|e| anyhow!("Failed to build output DataFrame: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductCategory;
    use crate::processor::currency_normalizer::RateBook;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn raw(id: &str, product: &str, amount: &str, currency: &str, ts: &str) -> RawTransaction {
        RawTransaction {
            transaction_id: id.to_string(),
            user_id: format!("u-{}", id),
            product_id: product.to_string(),
            amount: dec(amount),
            currency: currency.to_string(),
            timestamp: ts.to_string(),
        }
    }

    fn transformer() -> TransactionTransformer {
        let rates_csv = "currency,rate_to_usd,rate_date\n\
                         EUR,1.05,2025-03-01T00:00:00Z\n\
                         EUR,1.08,2025-04-10T00:00:00Z\n";
        let (book, _) = RateBook::from_csv(rates_csv.as_bytes()).unwrap();
        let normalizer = CurrencyNormalizer::new(book, "USD");

        let categories = CategoryBook::from_rows(&[
            ProductCategory {
                product_id: "P100".to_string(),
                category: "electronics".to_string(),
            },
            ProductCategory {
                product_id: "P200".to_string(),
                category: "books".to_string(),
            },
        ]);

        TransactionTransformer::new(normalizer, categories)
    }

    #[test]
    fn test_transform_converts_and_enriches() {
        let rows = vec![
            raw("1", "P100", "50.00", "USD", "2025-04-12T10:00:00Z"),
            raw("2", "P200", "50.00", "EUR", "2025-04-12T11:30:00Z"),
            raw("3", "P999", "75.50", "PKR", "2025-04-13T09:00:00Z"),
        ];

        let (enriched, counts) = transformer().transform(&rows);

        assert_eq!(counts.input_rows, 3);
        assert_eq!(counts.output_rows, 3);
        assert_eq!(counts.dropped_rows, 0);
        assert_eq!(counts.missing_rate_rows, 1);
        assert_eq!(counts.unmatched_category_rows, 1);

        // USD stays identity regardless of the rate table.
        assert_eq!(enriched[0].amount_usd, dec("50.00"));
        assert_eq!(enriched[0].category.as_deref(), Some("electronics"));

        // EUR converts with the most recent rate.
        assert_eq!(enriched[1].amount_usd, dec("54.00"));

        // Unknown currency and unknown product keep the row intact.
        assert_eq!(enriched[2].amount_usd, dec("75.50"));
        assert_eq!(enriched[2].category, None);

        assert_eq!(enriched[0].transaction_year, 2025);
        assert_eq!(enriched[0].transaction_month, 4);
        assert_eq!(enriched[0].transaction_week, 15);
        assert_eq!(enriched[0].transaction_day, 12);
        assert_eq!(
            enriched[0].transaction_date,
            NaiveDate::from_ymd_opt(2025, 4, 12).unwrap()
        );
    }

    #[test]
    fn test_transform_drops_bad_timestamps() {
        let rows = vec![
            raw("1", "P100", "10.00", "USD", "2025-04-12T10:00:00Z"),
            raw("2", "P100", "20.00", "USD", "sometime last week"),
        ];

        let (enriched, counts) = transformer().transform(&rows);

        assert_eq!(enriched.len(), 1);
        assert_eq!(counts.dropped_rows, 1);
        assert_eq!(enriched[0].transaction_id, "1");
    }

    #[test]
    fn test_read_transactions_counts_unreadable_rows() {
        let csv = "transaction_id,user_id,product_id,amount,currency,timestamp\n\
                   1,101,P100,50.00,USD,2025-04-12T10:00:00Z\n\
                   2,102,P200,not-an-amount,EUR,2025-04-12T11:30:00Z\n\
                   3,103,P300,75.50,EUR,2025-04-12T12:00:00Z\n";

        let (rows, dropped) = read_transactions(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(dropped, 1);
        assert_eq!(rows[1].transaction_id, "3");
    }

    #[test]
    fn test_dataframe_schema_and_values() {
        let rows = vec![
            raw("1", "P100", "50.00", "USD", "2025-04-12T10:00:00Z"),
            raw("2", "P999", "50.00", "EUR", "2025-04-12T11:30:00Z"),
        ];
        let t = transformer();
        let (enriched, _) = t.transform(&rows);
        let df = t.to_dataframe(&enriched).unwrap();

        assert_eq!(df.height(), 2);
        let column_names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            column_names,
            vec![
                "transaction_id",
                "user_id",
                "product_id",
                "category",
                "amount",
                "currency",
                "amount_usd",
                "timestamp",
                "transaction_date",
                "transaction_year",
                "transaction_month",
                "transaction_week",
                "transaction_day",
            ]
        );

        assert_eq!(df.column("transaction_date").unwrap().dtype(), &DataType::Date);
        assert_eq!(
            df.column("timestamp").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Microseconds, None)
        );

        let usd = df.column("amount_usd").unwrap().f64().unwrap();
        assert_eq!(usd.get(0), Some(50.0));
        assert_eq!(usd.get(1), Some(54.0));

        // P999 has no catalog entry: null category, row preserved.
        assert_eq!(df.column("category").unwrap().null_count(), 1);

        let years = df.column("transaction_year").unwrap().i32().unwrap();
        assert_eq!(years.get(0), Some(2025));
    }

    #[test]
    fn test_dataframe_handles_empty_input() {
        let t = transformer();
        let df = t.to_dataframe(&[]).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 13);
    }
}
