//! File-backed read-through cache with derived `index` and `summary` views.
//!
//! Every cache entry is a projection of repository state and can be rebuilt
//! at any time; losing the cache directory loses no data. Reads are
//! stale-while-revalidate: a hit is served immediately and refreshed on the
//! background [`JobRunner`], a miss fetches synchronously.

mod jobs;
mod store;

pub mod error;

pub use error::{BoxError, Error, Result};
pub use jobs::JobRunner;
pub use store::{CacheStore, ServeSource, INDEX_KEY};

#[cfg(test)]
mod tests;
