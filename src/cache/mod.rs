//! Stale-aware fetch cache.
//!
//! This module classifies intercepted requests and serves them with one of
//! three strategies:
//! - API responses: network first, cached copy while younger than the TTL
//! - Static assets: cache first, network only on a miss
//! - Documents: network first, then the cached page or the cached root document
//!
//! Both namespaces are version-qualified; activation drops everything else.

mod layer;
mod router;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use router::Strategy;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::CacheResult;
#[cfg(test)]
pub use traits::CacheSource;
