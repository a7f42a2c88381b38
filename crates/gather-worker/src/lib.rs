//! Request router and cache manager for Gather's offline shell.
//!
//! This crate is the service-worker analog: it classifies every
//! intercepted request, answers it from one of four versioned caches or
//! the network according to a per-class strategy, and owns the cache
//! lifecycle (install precache, activation eviction, the document-facing
//! control protocol). It deliberately knows nothing about the data layer
//! in `gather-core` — it only ever sees HTTP requests and responses.

pub mod cache;
pub mod config;
pub mod control;
pub mod fetch;
pub mod router;

pub use cache::{cache_name, CacheError, CacheRole, CacheStorage, CachedEntry, MemoryCacheStorage};
pub use config::{PrecacheManifest, RouterConfig, API_TIMEOUT};
pub use control::{handle_control, ControlMessage, ControlReply};
pub use fetch::{Destination, FetchError, FetchRequest, FetchResponse, Fetcher, ReqwestFetcher};
pub use router::{RequestClass, Router};
