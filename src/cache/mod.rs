//! Versioned cache partitions and the fetch strategies built on them.
//!
//! This module provides the worker's HTTP cache:
//! - Named partitions of request → response entries, persisted in SQLite
//! - Cache-first strategies for static assets and images (with expiry)
//! - Network-first strategies for API calls and pages, with offline fallbacks

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, SqliteStorage};
#[cfg(test)]
pub use traits::normalized_url;
pub use traits::{CachedResponse, ResponseSource, Served};
