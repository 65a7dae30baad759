//! Content-addressed two-tier build cache.
//!
//! The cache holds compiled objects and linked artifacts under SHA-256 keys
//! derived from a canonical serialization of everything that influenced the
//! result. Layout under the cache root:
//!
//! ```text
//! objects/<aa>/<rest-of-hash>.o     compiled object files
//! artifacts/<aa>/<rest-of-hash>.tar linked artifacts + public headers
//! packages/<name>/<version>/        materialized sources (see clyde-registry)
//! index.json                        summary index, rewritten atomically
//! ```
//!
//! Writes go to a unique temp file and rename onto the final path, so
//! concurrent builds producing the same key race benignly.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod bundle;
mod index;
mod key;
mod lock;
mod stats;
mod store;

pub use bundle::ArtifactBundle;
pub use index::{CacheTier, IndexEntry};
pub use key::{
    ArtifactKeyInputs, CACHE_FORMAT_VERSION, CacheKey, KeyWriter, ObjectKeyInputs, ToolIdentity,
    artifact_key, object_key,
};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::{Cache, CacheError};
