//! [`CacheStore`] — one JSON file per entry under
//! `<cache_dir>/<entity_type>/<id>.json`.

use std::{future::Future, path::PathBuf};

use chrono::{Datelike, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tavis_core::customer::CustomerRecord;

use crate::{jobs::JobRunner, BoxError, Error, Result};

/// Reserved id of the derived per-entity index entry.
pub const INDEX_KEY: &str = "index";

/// Where a response payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeSource {
  Cache,
  Live,
}

impl ServeSource {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Cache => "cache",
      Self::Live => "live",
    }
  }
}

/// A file-backed cache. Entries are always projections of repository state;
/// the whole directory is disposable.
#[derive(Clone)]
pub struct CacheStore {
  root: PathBuf,
}

impl CacheStore {
  pub fn open(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  fn entry_path(&self, entity: &str, id: &str) -> PathBuf {
    self.root.join(entity).join(format!("{id}.json"))
  }

  /// Overwrite the entry for `(entity, id)`.
  pub async fn write(&self, entity: &str, id: &str, payload: &Value) -> Result<()> {
    let path = self.entry_path(entity, id);
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, serde_json::to_vec_pretty(payload)?).await?;
    Ok(())
  }

  /// Read the entry for `(entity, id)`. A missing key is `Ok(None)`, never
  /// an error; an undecodable entry is treated as a miss and logged.
  pub async fn read(&self, entity: &str, id: &str) -> Result<Option<Value>> {
    let path = self.entry_path(entity, id);
    let bytes = match tokio::fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    match serde_json::from_slice(&bytes) {
      Ok(value) => Ok(Some(value)),
      Err(error) => {
        tracing::warn!(%error, path = %path.display(), "undecodable cache entry; treating as miss");
        Ok(None)
      }
    }
  }

  /// Snapshot of every entry of `entity`, excluding the derived index.
  /// Undecodable files are logged and skipped.
  pub async fn list_all(&self, entity: &str) -> Result<Vec<Value>> {
    let dir = self.root.join(entity);
    let mut reader = match tokio::fs::read_dir(&dir).await {
      Ok(reader) => reader,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
      Err(e) => return Err(e.into()),
    };

    let mut values = vec![];
    while let Some(dirent) = reader.next_entry().await? {
      let path = dirent.path();
      if path.extension().is_none_or(|ext| ext != "json") {
        continue;
      }
      if path.file_stem().is_some_and(|stem| stem == INDEX_KEY) {
        continue;
      }
      let bytes = tokio::fs::read(&path).await?;
      match serde_json::from_slice(&bytes) {
        Ok(value) => values.push(value),
        Err(error) => {
          tracing::warn!(%error, path = %path.display(), "skipping undecodable cache entry");
        }
      }
    }
    Ok(values)
  }

  /// Serve a hit immediately and revalidate in the background; on a miss,
  /// fetch synchronously and populate the cache before returning.
  pub async fn read_through<F, Fut>(
    &self,
    jobs: &JobRunner,
    entity: &str,
    id: &str,
    fetch: F,
  ) -> Result<(Value, ServeSource)>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
  {
    if let Some(hit) = self.read(entity, id).await? {
      let cache = self.clone();
      let entity = entity.to_owned();
      let id = id.to_owned();
      jobs.submit("cache_revalidate", async move {
        let fresh = fetch().await?;
        cache.write(&entity, &id, &fresh).await?;
        Ok(())
      });
      return Ok((hit, ServeSource::Cache));
    }

    let value = fetch().await.map_err(Error::Fetch)?;
    self.write(entity, id, &value).await?;
    Ok((value, ServeSource::Live))
  }

  // ── Derived views ─────────────────────────────────────────────────────────

  /// Derive and write the `index` pseudo-entry for `entity`: count plus a
  /// minimal projection per record. Pure in its input, safe to rerun.
  pub async fn rebuild_index(
    &self,
    entity: &str,
    records: &[CustomerRecord],
  ) -> Result<()> {
    let items: Vec<Value> = records
      .iter()
      .map(|r| {
        json!({
          "customer_id":     r.customer_id,
          "name":            r.profile.display_name(),
          "membership_tier": r.profile.membership_tier,
          "lifecycle_stage": r.profile.lifecycle_stage,
          "agent":           r.profile.agent,
          "conversation_id": r.conversation_id,
        })
      })
      .collect();

    let payload = json!({
      "count":        records.len(),
      "generated_at": Utc::now(),
      "items":        items,
    });
    self.write(entity, INDEX_KEY, &payload).await
  }

  /// Derive and write `analytics/summary`: customer counts and revenue
  /// aggregates, with "this month" keyed off each record's join date.
  pub async fn rebuild_summary(&self, records: &[CustomerRecord]) -> Result<()> {
    let now = Utc::now();
    let joined_this_month = |r: &&CustomerRecord| {
      r.profile
        .join_date
        .is_some_and(|d| d.year() == now.year() && d.month() == now.month())
    };

    let new_this_month = records.iter().filter(joined_this_month).count();
    let revenue_total: f64 = records
      .iter()
      .map(|r| r.intelligence.metrics.total_spend)
      .sum();
    let revenue_this_month: f64 = records
      .iter()
      .filter(joined_this_month)
      .map(|r| r.intelligence.metrics.total_spend)
      .sum();

    let payload = json!({
      "generated_at": now,
      "customers": {
        "total":          records.len(),
        "new_this_month": new_this_month,
      },
      "revenue": {
        "total":      revenue_total,
        "this_month": revenue_this_month,
      },
    });
    self.write("analytics", "summary", &payload).await
  }
}
