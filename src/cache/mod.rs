//! Render cache.
//!
//! A bounded, time-limited store of fully patched documents keyed by
//! `(viewer, url)`. Entries disappear only through capacity eviction (LRU),
//! age expiry, or being overwritten by a fresh render for the same key.
//!
//! ```toml
//! [cache]
//! capacity = 500
//! ttl_seconds = 3600
//! ```

mod config;
mod keys;
mod lock;
pub(crate) mod store;

pub use config::CacheConfig;
pub use keys::CacheKey;
pub use store::RenderCache;
