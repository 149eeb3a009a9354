use anyhow::Result;
use csv::{ReaderBuilder, Trim};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::models::ProductCategory;

/// Broadcast map from product_id to category, the build side of the
/// enrichment join.
///
/// Every transaction row is kept whether or not it matches; a miss simply
/// yields no category. Duplicate product_ids in the reference set resolve
/// to the first occurrence, which keeps the join deterministic for a given
/// input file.
#[derive(Debug, Clone, Default)]
pub struct CategoryBook {
    categories: HashMap<String, String>,
}

impl CategoryBook {
    pub fn from_rows(rows: &[ProductCategory]) -> Self {
        let mut categories: HashMap<String, String> = HashMap::new();
        let mut duplicates = 0usize;

        for row in rows {
            if categories.contains_key(&row.product_id) {
                duplicates += 1;
                continue;
            }
            categories.insert(row.product_id.clone(), row.category.clone());
        }

        if duplicates > 0 {
            warn!(
                "Category reference set contains {} duplicate product_ids; first occurrence kept",
                duplicates
            );
        }

        CategoryBook { categories }
    }

    /// Parses the product categories CSV. Unreadable rows are dropped and
    /// counted; an absent mapping only ever means a null category downstream.
    pub fn from_csv(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = Vec::new();
        let mut dropped = 0usize;

        for (index, result) in reader.deserialize::<ProductCategory>().enumerate() {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => {
                    dropped += 1;
                    warn!("Skipping unreadable category row {}: {}", index + 1, e);
                }
            }
        }

        let book = Self::from_rows(&rows);
        info!(
            "Loaded categories for {} products ({} rows dropped)",
            book.len(),
            dropped
        );

        Ok((book, dropped))
    }

    pub fn lookup(&self, product_id: &str) -> Option<&str> {
        self.categories.get(product_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
