pub mod database;
pub mod handler;

pub use database::{CollectionCatalog, DatabaseError, DatabaseHandle, SqliteCatalog};
pub use handler::{DiagnosticsResponse, create_diagnostics_router, check_database};
