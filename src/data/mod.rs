//! Persistence: key resolution, chunked upserts and per-entity adapters.

pub mod batch;
pub mod cities;
pub mod errors;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod movies;
pub mod places;
pub mod resolver;
pub mod sessions;
pub mod store;
pub mod timezones;

pub use batch::{ChunkSink, upsert_in_chunks};
pub use errors::StoreError;
pub use resolver::{KeyResolver, KeyStore, Loadable};
pub use store::PgStore;
