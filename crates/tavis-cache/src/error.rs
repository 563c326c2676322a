//! Error type for `tavis-cache`.

use thiserror::Error;

/// Error type carried by fetch closures and background jobs.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cache i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("cache json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("fetch failed: {0}")]
  Fetch(#[source] BoxError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
