//! tavis-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! configured record store, and serves the HTTP API.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use tavis_core::store::RecordStore;
use tavis_server::{AppState, ServerConfig, StoreBackend};
use tavis_store_json::JsonStore;
use tavis_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tavis CRM backend server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TAVIS"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // The backend is picked exactly once, here; everything downstream works
  // against the RecordStore trait.
  match server_cfg.store_backend {
    StoreBackend::Json => {
      let store = JsonStore::open(&server_cfg.data_dir);
      serve(store, server_cfg).await
    }
    StoreBackend::Sqlite => {
      if let Some(parent) = server_cfg.db_path.parent() {
        std::fs::create_dir_all(parent)
          .with_context(|| format!("failed to create {parent:?}"))?;
      }
      let store = SqliteStore::open(&server_cfg.db_path)
        .await
        .with_context(|| {
          format!("failed to open store at {:?}", server_cfg.db_path)
        })?;
      serve(store, server_cfg).await
    }
  }
}

async fn serve<S>(store: S, config: ServerConfig) -> anyhow::Result<()>
where
  S: RecordStore + 'static,
{
  let address = format!("{}:{}", config.host, config.port);
  let state = AppState::build(store, config)
    .map_err(|e| anyhow::anyhow!("failed to build server state: {e}"))?;
  let app = tavis_server::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}
