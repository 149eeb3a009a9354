pub mod discovery;
pub mod manifest;
pub mod registrar;

pub use discovery::*;
pub use manifest::*;
pub use registrar::*;
