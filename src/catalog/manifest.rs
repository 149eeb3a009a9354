use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Database manifest, stored at `_catalog/<database>/database.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseManifest {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One column of a catalog table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

impl ColumnDef {
    pub fn new(name: &str, data_type: &str) -> Self {
        ColumnDef {
            name: name.to_string(),
            data_type: data_type.to_string(),
        }
    }
}

/// One registered partition of a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub load_date: NaiveDate,
    /// In-bucket prefix the partition's objects live under.
    pub location: String,
    pub registered_at: DateTime<Utc>,
}

/// Table manifest, stored at `_catalog/<database>/<table>/table.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableManifest {
    pub database: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub partition_keys: Vec<ColumnDef>,
    pub bucket: String,
    /// In-bucket prefix the table data lives under.
    pub location: String,
    pub format: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub partitions: Vec<PartitionInfo>,
}

/// What a caller asks the registrar to register. The registrar fills in the
/// bookkeeping fields when it writes the manifest.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub database: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub partition_keys: Vec<ColumnDef>,
    pub bucket: String,
    pub location: String,
    pub format: String,
}

/// Schema of the transformed transactions table, matching the columns the
/// transform job writes, partitioned by load date.
pub fn transactions_table_spec(
    database: &str,
    table: &str,
    bucket: &str,
    location: &str,
) -> TableSpec {
    TableSpec {
        database: database.to_string(),
        name: table.to_string(),
        columns: vec![
            ColumnDef::new("transaction_id", "string"),
            ColumnDef::new("user_id", "string"),
            ColumnDef::new("product_id", "string"),
            ColumnDef::new("category", "string"),
            ColumnDef::new("amount", "double"),
            ColumnDef::new("currency", "string"),
            ColumnDef::new("amount_usd", "double"),
            ColumnDef::new("timestamp", "timestamp"),
            ColumnDef::new("transaction_date", "date"),
            ColumnDef::new("transaction_year", "int"),
            ColumnDef::new("transaction_month", "int"),
            ColumnDef::new("transaction_week", "int"),
            ColumnDef::new("transaction_day", "int"),
        ],
        partition_keys: vec![ColumnDef::new("load_date", "date")],
        bucket: bucket.to_string(),
        location: location.to_string(),
        format: "parquet".to_string(),
    }
}
