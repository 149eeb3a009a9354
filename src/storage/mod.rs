pub mod layout;
pub mod minio_client;
pub mod object_store;

pub use layout::*;
pub use minio_client::*;
pub use object_store::*;
