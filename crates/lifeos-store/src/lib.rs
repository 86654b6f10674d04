pub mod database;
pub mod error;
pub mod keys;
pub mod path;
pub mod schema;
pub mod state;
pub mod storage;

pub use database::Database;
pub use error::StoreError;
pub use state::{Batch, HydrationReport, HydrationSource, StateStore, StateSubscription, DEFAULT_TAB, WILDCARD};
pub use storage::{KeyValueStorage, MemoryStorage, SqliteStorage};
