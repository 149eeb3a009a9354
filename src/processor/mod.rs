pub mod category_enricher;
pub mod currency_normalizer;
pub mod date_parts;
pub mod transaction_transformer;

pub use category_enricher::*;
pub use currency_normalizer::*;
pub use date_parts::*;
pub use transaction_transformer::*;
