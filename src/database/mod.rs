pub mod connection;

pub use connection::{create_in_memory_pool, create_sqlite_pool, initialize_database, run_migrations};
