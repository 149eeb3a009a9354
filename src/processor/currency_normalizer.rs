use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::models::CurrencyRate;
use crate::processor::date_parts::parse_timestamp;

#[derive(Debug, Clone, Copy)]
struct RateEntry {
    rate_to_usd: Decimal,
    rate_date: NaiveDateTime,
}

/// Read-only snapshot of the currency rate reference set.
///
/// Built once per run and shared across every row lookup, the same way the
/// rates table is broadcast to the workers in the upstream engine. The time
/// series is folded down at construction: only the most recent rate per
/// currency is kept, so lookups are a single hash probe. A strictly newer
/// `rate_date` replaces an entry; on an exact tie the first-seen row wins.
#[derive(Debug, Clone, Default)]
pub struct RateBook {
    latest: HashMap<String, RateEntry>,
}

impl RateBook {
    pub fn from_rows(rows: &[(String, Decimal, NaiveDateTime)]) -> Self {
        let mut latest: HashMap<String, RateEntry> = HashMap::new();

        for (currency, rate_to_usd, rate_date) in rows {
            match latest.get(currency) {
                Some(existing) if existing.rate_date >= *rate_date => {}
                _ => {
                    latest.insert(
                        currency.clone(),
                        RateEntry {
                            rate_to_usd: *rate_to_usd,
                            rate_date: *rate_date,
                        },
                    );
                }
            }
        }

        RateBook { latest }
    }

    /// Parses the rates CSV and folds it into a snapshot. Rows with an
    /// unreadable shape or rate date are dropped and counted, not fatal:
    /// a missing rate only ever degrades conversion to identity.
    pub fn from_csv(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = Vec::new();
        let mut dropped = 0usize;

        for (index, result) in reader.deserialize::<CurrencyRate>().enumerate() {
            let rate = match result {
                Ok(rate) => rate,
                Err(e) => {
                    dropped += 1;
                    warn!("Skipping unreadable currency rate row {}: {}", index + 1, e);
                    continue;
                }
            };

            match parse_timestamp(&rate.rate_date) {
                Ok(rate_date) => rows.push((rate.currency, rate.rate_to_usd, rate_date)),
                Err(e) => {
                    dropped += 1;
                    warn!(
                        "Skipping rate row for '{}' with bad rate_date: {}",
                        rate.currency, e
                    );
                }
            }
        }

        let book = Self::from_rows(&rows);
        info!(
            "Loaded {} currency rates covering {} currencies ({} rows dropped)",
            rows.len(),
            book.len(),
            dropped
        );

        Ok((book, dropped))
    }

    /// The most recent known rate for a currency, if any.
    pub fn latest_rate(&self, currency: &str) -> Option<Decimal> {
        self.latest.get(currency).map(|entry| entry.rate_to_usd)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

/// Converts transaction amounts into the target currency.
///
/// The rate book is an explicit constructor dependency rather than shared
/// process state; the normalizer itself is immutable and safe to share
/// across threads.
#[derive(Debug, Clone)]
pub struct CurrencyNormalizer {
    book: RateBook,
    target_currency: String,
}

impl CurrencyNormalizer {
    pub fn new(book: RateBook, target_currency: &str) -> Self {
        CurrencyNormalizer {
            book,
            target_currency: target_currency.to_string(),
        }
    }

    pub fn from_csv(bytes: &[u8], target_currency: &str) -> Result<Self> {
        let (book, _) = RateBook::from_csv(bytes).context("Failed to load currency rates")?;
        Ok(Self::new(book, target_currency))
    }

    /// Amount expressed in the target currency.
    ///
    /// Already-target amounts pass through untouched (never consulting the
    /// book), and an unknown currency falls back to the unconverted amount.
    /// The fallback is documented degraded behavior, not an error.
    pub fn convert(&self, amount: Decimal, currency: &str) -> Decimal {
        if currency == self.target_currency {
            return amount;
        }

        match self.book.latest_rate(currency) {
            Some(rate) => amount * rate,
            None => amount,
        }
    }

    /// Whether a conversion rate is known for `currency`. Callers use this
    /// to count identity fallbacks for the run summary.
    pub fn has_rate(&self, currency: &str) -> bool {
        self.book.latest_rate(currency).is_some()
    }

    pub fn target_currency(&self) -> &str {
        &self.target_currency
    }
}
