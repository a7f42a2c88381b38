//! gather-core - Core library for Gather
//!
//! This crate contains the shared models, the key-value storage layer, the
//! event store, the API client with session/token handling, and the offline
//! sync queue used by all Gather interfaces.

pub mod api;
pub mod error;
pub mod kv;
pub mod models;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Event, EventFilter, EventId};
