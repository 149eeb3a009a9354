use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;

/// One row of the raw transactions CSV, exactly as stored in the bucket.
///
/// `timestamp` stays a string at this stage; parsing happens in the
/// transformer so a bad value can be dropped and counted instead of
/// failing the whole read.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub transaction_id: String,
    pub user_id: String,
    pub product_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub timestamp: String,
}

/// One row of the currency rates reference CSV. Multiple rows per currency
/// form a time series; the rate book keeps only the most recent per code.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyRate {
    pub currency: String,
    pub rate_to_usd: Decimal,
    pub rate_date: String,
}

/// One row of the product categories reference CSV.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductCategory {
    pub product_id: String,
    pub category: String,
}

/// A fully transformed transaction, ready to be written as one output row.
///
/// `category` is `None` when the product has no entry in the category
/// reference set; the row is still kept (outer-preserving enrichment).
#[derive(Debug, Clone)]
pub struct EnrichedTransaction {
    pub transaction_id: String,
    pub user_id: String,
    pub product_id: String,
    pub category: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub amount_usd: Decimal,
    pub timestamp: NaiveDateTime,
    pub transaction_date: NaiveDate,
    pub transaction_year: i32,
    pub transaction_month: u32,
    pub transaction_week: u32,
    pub transaction_day: u32,
}
