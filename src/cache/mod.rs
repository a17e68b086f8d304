pub mod sqlite;
pub mod store;

pub use sqlite::SqliteCacheStore;
pub use store::{CacheStore, MemoryCacheStore};
