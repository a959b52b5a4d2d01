//! Durable, namespaced key/value cache with lazy expiration.
//!
//! The store is the system of record for in-flight and completed workflow
//! state. Every backend implements [`CacheStore`]; callers go through the
//! typed [`crate::workflow::WorkflowCache`] rather than raw keys.

pub mod clock;
pub mod entry;
pub mod file;
pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;
pub mod store;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteCacheStore;
pub use store::{CacheError, CacheStore};
pub use sweeper::spawn_expiry_sweeper;

#[cfg(any(test, feature = "testing"))]
pub use store::MockCacheStore;
