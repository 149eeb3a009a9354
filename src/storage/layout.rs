use chrono::NaiveDate;
use regex::Regex;
use uuid::Uuid;

/// Prefix all catalog manifests live under.
pub const CATALOG_PREFIX: &str = "_catalog/";

/// Prefix the transform job writes its run records under.
pub const RUNS_PREFIX: &str = "runs/";

/// Object key layout shared by the transform job, the catalog registrar and
/// partition discovery. Everything that derives or parses a key goes through
/// here so the three stages cannot drift apart.
pub struct StorageLayout;

impl StorageLayout {
    /// Prefix of one output partition, e.g. `transformed/load_date=2025-04-12/`.
    pub fn partition_prefix(output_prefix: &str, load_date: NaiveDate) -> String {
        format!("{}load_date={}/", output_prefix, load_date.format("%Y-%m-%d"))
    }

    /// A fresh parquet object key inside a partition.
    pub fn part_key(output_prefix: &str, load_date: NaiveDate) -> String {
        format!(
            "{}part-{}.parquet",
            Self::partition_prefix(output_prefix, load_date),
            Uuid::new_v4()
        )
    }

    /// Extracts the load date from an object key, if the key sits inside a
    /// `load_date=YYYY-MM-DD` partition segment.
    pub fn load_date_from_key(key: &str) -> Option<NaiveDate> {
        let re = Regex::new(r"(?:^|/)load_date=(\d{4}-\d{2}-\d{2})/").ok()?;
        let captures = re.captures(key)?;
        NaiveDate::parse_from_str(captures.get(1)?.as_str(), "%Y-%m-%d").ok()
    }

    pub fn database_key(database: &str) -> String {
        format!("{}{}/database.json", CATALOG_PREFIX, database)
    }

    pub fn table_key(database: &str, table: &str) -> String {
        format!("{}{}/{}/table.json", CATALOG_PREFIX, database, table)
    }

    /// Key of one partition discovery run record.
    pub fn discovery_key(query_results_prefix: &str, run_id: &str) -> String {
        format!("{}discovery-{}.json", query_results_prefix, run_id)
    }

    /// Key of one transform run record, e.g. `runs/2025-04-12/<run_id>.json`.
    pub fn run_key(load_date: NaiveDate, run_id: &str) -> String {
        format!("{}{}/{}.json", RUNS_PREFIX, load_date.format("%Y-%m-%d"), run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_partition_prefix_format() {
        assert_eq!(
            StorageLayout::partition_prefix("transformed/", date(2025, 4, 12)),
            "transformed/load_date=2025-04-12/"
        );
    }

    #[test]
    fn test_part_keys_are_unique() {
        let a = StorageLayout::part_key("transformed/", date(2025, 4, 12));
        let b = StorageLayout::part_key("transformed/", date(2025, 4, 12));

        assert!(a.starts_with("transformed/load_date=2025-04-12/part-"));
        assert!(a.ends_with(".parquet"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_load_date_from_key() {
        let key = "transformed/load_date=2025-04-12/part-abc.parquet";
        assert_eq!(
            StorageLayout::load_date_from_key(key),
            Some(date(2025, 4, 12))
        );

        assert_eq!(StorageLayout::load_date_from_key("transformed/other.parquet"), None);
        assert_eq!(
            StorageLayout::load_date_from_key("transformed/load_date=not-a-date/p.parquet"),
            None
        );
        // Month out of range parses the shape but not the date.
        assert_eq!(
            StorageLayout::load_date_from_key("transformed/load_date=2025-13-99/p.parquet"),
            None
        );
    }

    #[test]
    fn test_catalog_keys() {
        assert_eq!(
            StorageLayout::database_key("ecommerce_db"),
            "_catalog/ecommerce_db/database.json"
        );
        assert_eq!(
            StorageLayout::table_key("ecommerce_db", "transactions_transformed"),
            "_catalog/ecommerce_db/transactions_transformed/table.json"
        );
    }

    #[test]
    fn test_run_and_discovery_keys() {
        assert_eq!(
            StorageLayout::run_key(date(2025, 4, 12), "run-1"),
            "runs/2025-04-12/run-1.json"
        );
        assert_eq!(
            StorageLayout::discovery_key("query-results/", "d-1"),
            "query-results/discovery-d-1.json"
        );
    }
}
