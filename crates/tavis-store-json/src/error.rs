//! Error type for `tavis-store-json`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("blocking task failed: {0}")]
  Join(#[from] tokio::task::JoinError),

  #[error("conversation not found: {0}")]
  ConversationNotFound(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
