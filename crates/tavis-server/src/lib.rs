//! HTTP server for the Tavis customer-relationship backend.
//!
//! Exposes an axum [`Router`] backed by any [`RecordStore`], with the
//! webhook ingestion pipeline, sync orchestrator, and read-through cache
//! wired together through [`AppState`]. The storage backend is chosen once
//! at startup from configuration and injected; no handler branches on it.

pub mod error;
pub mod merge_view;
pub mod pipeline;
pub mod queue;
pub mod routes;
pub mod sync;
pub mod webhook;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tavis_cache::{CacheStore, JobRunner};
use tavis_core::store::RecordStore;
use tavis_graph::GraphClient;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
use pipeline::Pipeline;
use queue::EventQueue;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Which [`RecordStore`] implementation backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
  Json,
  Sqlite,
}

/// Runtime server configuration, deserialised from `config.toml` with
/// `TAVIS_`-prefixed environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "defaults::host")]
  pub host:              String,
  #[serde(default = "defaults::port")]
  pub port:              u16,
  #[serde(default = "defaults::store_backend")]
  pub store_backend:     StoreBackend,
  /// Root of the flat-file store (json backend).
  #[serde(default = "defaults::data_dir")]
  pub data_dir:          PathBuf,
  /// Database file (sqlite backend).
  #[serde(default = "defaults::db_path")]
  pub db_path:           PathBuf,
  #[serde(default = "defaults::cache_dir")]
  pub cache_dir:         PathBuf,
  /// Shared token echoed during the webhook subscription handshake.
  pub verify_token:      String,
  /// HMAC secret for webhook signatures. Unset skips verification
  /// (development mode) with a warning on every request.
  #[serde(default)]
  pub app_secret:        Option<String>,
  pub page_id:           String,
  /// Unset disables the live platform client; the server then serves local
  /// data only.
  #[serde(default)]
  pub page_access_token: Option<String>,
  #[serde(default = "defaults::graph_base_url")]
  pub graph_base_url:    String,
  /// Safety cap on conversations processed per sync pass.
  #[serde(default = "defaults::sync_limit")]
  pub sync_limit:        usize,
  /// Webhook event queue size; `0` disables the queue entirely and every
  /// event is dispatched directly.
  #[serde(default = "defaults::queue_capacity")]
  pub queue_capacity:    usize,
}

mod defaults {
  use super::StoreBackend;
  use std::path::PathBuf;

  pub fn host() -> String { "127.0.0.1".to_owned() }
  pub fn port() -> u16 { 8080 }
  pub fn store_backend() -> StoreBackend { StoreBackend::Json }
  pub fn data_dir() -> PathBuf { PathBuf::from("data") }
  pub fn db_path() -> PathBuf { PathBuf::from("data/tavis.db") }
  pub fn cache_dir() -> PathBuf { PathBuf::from("cache") }
  pub fn graph_base_url() -> String {
    "https://graph.facebook.com/v21.0".to_owned()
  }
  pub fn sync_limit() -> usize { 50 }
  pub fn queue_capacity() -> usize { 64 }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub cache:    CacheStore,
  pub jobs:     JobRunner,
  pub graph:    Option<Arc<GraphClient>>,
  pub pipeline: Pipeline<S>,
  pub queue:    Option<EventQueue>,
  pub config:   Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      cache:    self.cache.clone(),
      jobs:     self.jobs.clone(),
      graph:    self.graph.clone(),
      pipeline: self.pipeline.clone(),
      queue:    self.queue.clone(),
      config:   self.config.clone(),
    }
  }
}

impl<S> AppState<S>
where
  S: RecordStore + 'static,
{
  /// Wire up cache, worker, pipeline, queue, and (when a token is
  /// configured) the live platform client.
  pub fn build(store: S, config: ServerConfig) -> Result<Self, ApiError> {
    let store = Arc::new(store);
    let cache = CacheStore::open(&config.cache_dir);
    let jobs = JobRunner::start(config.queue_capacity.max(16));

    let graph = match &config.page_access_token {
      Some(token) => Some(Arc::new(
        GraphClient::new(&config.graph_base_url, &config.page_id, token)
          .map_err(ApiError::internal)?,
      )),
      None => None,
    };

    let pipeline = Pipeline::new(
      store.clone(),
      cache.clone(),
      jobs.clone(),
      &config.page_id,
    );
    let queue = (config.queue_capacity > 0)
      .then(|| EventQueue::start(pipeline.clone(), config.queue_capacity));

    Ok(Self {
      store,
      cache,
      jobs,
      graph,
      pipeline,
      queue,
      config: Arc::new(config),
    })
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the server.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: RecordStore + 'static,
{
  Router::new()
    .route(
      "/webhooks/messenger",
      get(webhook::verify::<S>).post(webhook::ingest::<S>),
    )
    .route(
      "/customers",
      get(routes::list_customers::<S>).post(routes::upsert_customer::<S>),
    )
    .route("/customers/{customer_id}", get(routes::get_customer::<S>))
    .route("/conversations", get(routes::list_conversations::<S>))
    .route("/conversations/assign", post(routes::assign_agent::<S>))
    .route("/messages", get(routes::list_messages::<S>))
    .route("/overview", get(routes::overview::<S>))
    .route("/sync", post(routes::run_sync::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
