mod schema;
mod snapshot_cache;
mod types;

pub use schema::Database;
pub use types::DatabaseError;
