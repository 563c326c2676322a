//! Handlers for the customer, conversation, message, and analytics
//! endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/customers` | SWR-cached; `?index=true` serves the derived index |
//! | `GET`  | `/customers/{customer_id}` | Single record through the SWR cache |
//! | `POST` | `/customers` | Upsert; `customer_id` required |
//! | `GET`  | `/conversations` | Merged live + local listing |
//! | `POST` | `/conversations/assign` | Manual agent assignment |
//! | `GET`  | `/messages?conversation_id=` | Chronological message listing |
//! | `GET`  | `/overview` | KPI payload from the summary cache entry |
//! | `POST` | `/sync` | Run one sync pass |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use thiserror::Error;
use serde::Deserialize;
use serde_json::{json, Value};
use tavis_cache::{ServeSource, INDEX_KEY};
use tavis_core::{
  conversation::Message, customer::CustomerRecord, store::RecordStore,
};

use crate::{
  error::ApiError,
  merge_view::{ConversationMerger, ConversationView},
  sync::SyncOrchestrator,
  AppState,
};

// ─── Customers ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CustomerListParams {
  #[serde(default)]
  pub index: Option<bool>,
}

/// `GET /customers[?index=true]`
pub async fn list_customers<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<CustomerListParams>,
) -> Result<Json<Value>, ApiError>
where
  S: RecordStore + 'static,
{
  if params.index.unwrap_or(false) {
    return customer_index(&state).await.map(Json);
  }

  let cached = state
    .cache
    .list_all("customers")
    .await
    .map_err(ApiError::internal)?;

  if !cached.is_empty() {
    // Serve stale immediately; refresh entries and index off-path.
    let store = state.store.clone();
    let cache = state.cache.clone();
    state.jobs.submit("customers_revalidate", async move {
      let records = store.list_customers().await.map_err(boxed)?;
      for record in &records {
        let payload = serde_json::to_value(record)?;
        cache
          .write("customers", record.customer_id.as_str(), &payload)
          .await?;
      }
      cache.rebuild_index("customers", &records).await?;
      Ok(())
    });

    let items =
      cached.into_iter().map(|v| tagged(v, ServeSource::Cache)).collect();
    return Ok(Json(Value::Array(items)));
  }

  // Cold cache: fetch from the store, populate, serve as live.
  let records =
    state.store.list_customers().await.map_err(ApiError::internal)?;
  let mut items = Vec::with_capacity(records.len());
  for record in &records {
    let payload = serde_json::to_value(record).map_err(ApiError::internal)?;
    state
      .cache
      .write("customers", record.customer_id.as_str(), &payload)
      .await
      .map_err(ApiError::internal)?;
    items.push(tagged(payload, ServeSource::Live));
  }
  Ok(Json(Value::Array(items)))
}

async fn customer_index<S>(state: &AppState<S>) -> Result<Value, ApiError>
where
  S: RecordStore + 'static,
{
  if let Some(index) = state
    .cache
    .read("customers", INDEX_KEY)
    .await
    .map_err(ApiError::internal)?
  {
    return Ok(index);
  }

  let records =
    state.store.list_customers().await.map_err(ApiError::internal)?;
  state
    .cache
    .rebuild_index("customers", &records)
    .await
    .map_err(ApiError::internal)?;
  Ok(
    state
      .cache
      .read("customers", INDEX_KEY)
      .await
      .map_err(ApiError::internal)?
      .unwrap_or_else(|| json!({ "count": 0, "items": [] })),
  )
}

/// Marker error for the fetch closure below, so a missing record can be
/// told apart from a failing one after the cache wraps it.
#[derive(Debug, Error)]
#[error("customer {0} not found")]
struct UnknownCustomer(String);

/// `GET /customers/{customer_id}` — one record through the
/// stale-while-revalidate read: a hit is served as-is and refreshed off the
/// request path, a miss fetches from the store and populates the cache.
pub async fn get_customer<S>(
  State(state): State<AppState<S>>,
  Path(customer_id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: RecordStore + 'static,
{
  let store = state.store.clone();
  let key = customer_id.clone();
  let fetch = move || {
    let store = store.clone();
    let key = key.clone();
    async move {
      let record = store
        .get_customer(&key)
        .await
        .map_err(boxed)?
        .ok_or_else(|| boxed(UnknownCustomer(key.clone())))?;
      Ok(serde_json::to_value(&record)?)
    }
  };

  match state
    .cache
    .read_through(&state.jobs, "customers", &customer_id, fetch)
    .await
  {
    Ok((value, source)) => Ok(Json(tagged(value, source))),
    Err(tavis_cache::Error::Fetch(e)) if e.is::<UnknownCustomer>() => Err(
      ApiError::NotFound(format!("customer {customer_id} not found")),
    ),
    Err(e) => Err(ApiError::internal(e)),
  }
}

fn tagged(mut value: Value, source: ServeSource) -> Value {
  if let Some(object) = value.as_object_mut() {
    object.insert("_source".to_owned(), json!(source.as_str()));
  }
  value
}

/// `POST /customers` — whole-record upsert, written through to the cache.
pub async fn upsert_customer<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<Value>,
) -> Result<Json<CustomerRecord>, ApiError>
where
  S: RecordStore + 'static,
{
  let has_id = body
    .get("customer_id")
    .and_then(Value::as_str)
    .is_some_and(|s| !s.trim().is_empty());
  if !has_id {
    return Err(ApiError::BadRequest("customer_id is required".into()));
  }

  let record: CustomerRecord = serde_json::from_value(body)
    .map_err(|e| ApiError::BadRequest(format!("invalid customer record: {e}")))?;
  let record = state
    .store
    .upsert_customer(record)
    .await
    .map_err(ApiError::internal)?;

  let payload = serde_json::to_value(&record).map_err(ApiError::internal)?;
  state
    .cache
    .write("customers", record.customer_id.as_str(), &payload)
    .await
    .map_err(ApiError::internal)?;

  let store = state.store.clone();
  let cache = state.cache.clone();
  state.jobs.submit("rebuild_views", async move {
    let records = store.list_customers().await.map_err(boxed)?;
    cache.rebuild_index("customers", &records).await?;
    cache.rebuild_summary(&records).await?;
    Ok(())
  });

  Ok(Json(record))
}

// ─── Conversations ───────────────────────────────────────────────────────────

/// `GET /conversations`
pub async fn list_conversations<S>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<ConversationView>>, ApiError>
where
  S: RecordStore + 'static,
{
  let merger = ConversationMerger::new(
    state.store.clone(),
    state.graph.clone(),
    state.config.sync_limit,
  );
  Ok(Json(merger.list_conversations().await?))
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
  pub conversation_id: Option<String>,
  pub agent:           Option<String>,
}

/// `POST /conversations/assign`
pub async fn assign_agent<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<AssignBody>,
) -> Result<Json<Value>, ApiError>
where
  S: RecordStore + 'static,
{
  let (Some(conversation_id), Some(agent)) = (
    body.conversation_id.filter(|s| !s.trim().is_empty()),
    body.agent.filter(|s| !s.trim().is_empty()),
  ) else {
    return Err(ApiError::BadRequest(
      "conversation_id and agent are required".into(),
    ));
  };

  if state
    .store
    .get_conversation(&conversation_id)
    .await
    .map_err(ApiError::internal)?
    .is_none()
  {
    return Err(ApiError::NotFound(format!(
      "conversation {conversation_id} not found"
    )));
  }

  state
    .store
    .assign_agent(&conversation_id, &agent)
    .await
    .map_err(ApiError::internal)?;

  Ok(Json(json!({ "conversation_id": conversation_id, "agent": agent })))
}

// ─── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MessageParams {
  pub conversation_id: Option<String>,
}

/// `GET /messages?conversation_id=` — live first, local history fallback,
/// chronological order either way.
pub async fn list_messages<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<MessageParams>,
) -> Result<Json<Vec<Message>>, ApiError>
where
  S: RecordStore + 'static,
{
  let Some(conversation_id) =
    params.conversation_id.filter(|s| !s.trim().is_empty())
  else {
    return Err(ApiError::BadRequest("conversation_id is required".into()));
  };

  if let Some(graph) = &state.graph {
    match graph.list_messages(&conversation_id).await {
      Ok(live) => {
        let mut messages: Vec<Message> = live
          .into_iter()
          .map(|m| m.into_message(&conversation_id))
          .collect();

        // Re-cache into local history when the conversation is known;
        // append is idempotent per message id.
        if state
          .store
          .get_conversation(&conversation_id)
          .await
          .map_err(ApiError::internal)?
          .is_some()
        {
          state
            .store
            .append_messages(&conversation_id, messages.clone())
            .await
            .map_err(ApiError::internal)?;
        }

        messages.reverse();
        return Ok(Json(messages));
      }
      Err(e) if e.is_token_expired() => return Err(e.into()),
      Err(error) => {
        tracing::warn!(%error, "live message fetch failed; serving local history");
      }
    }
  }

  let conversation = state
    .store
    .get_conversation(&conversation_id)
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("conversation {conversation_id} not found"))
    })?;

  // Stored newest-first; display chronological.
  let mut messages = conversation.messages;
  messages.reverse();
  Ok(Json(messages))
}

// ─── Analytics & sync ────────────────────────────────────────────────────────

/// `GET /overview`
pub async fn overview<S>(
  State(state): State<AppState<S>>,
) -> Result<Json<Value>, ApiError>
where
  S: RecordStore + 'static,
{
  if let Some(summary) = state
    .cache
    .read("analytics", "summary")
    .await
    .map_err(ApiError::internal)?
  {
    return Ok(Json(summary));
  }

  let records =
    state.store.list_customers().await.map_err(ApiError::internal)?;
  state
    .cache
    .rebuild_summary(&records)
    .await
    .map_err(ApiError::internal)?;
  Ok(Json(
    state
      .cache
      .read("analytics", "summary")
      .await
      .map_err(ApiError::internal)?
      .unwrap_or_else(|| json!({})),
  ))
}

/// `POST /sync`
pub async fn run_sync<S>(
  State(state): State<AppState<S>>,
) -> Result<Json<Value>, ApiError>
where
  S: RecordStore + 'static,
{
  let Some(graph) = state.graph.clone() else {
    return Err(ApiError::BadRequest(
      "no page access token configured".into(),
    ));
  };

  let orchestrator = SyncOrchestrator::new(
    state.store.clone(),
    state.cache.clone(),
    state.jobs.clone(),
    graph,
    state.config.sync_limit,
  );
  let synced = orchestrator.sync_all().await?;
  Ok(Json(json!({ "synced": synced.len() })))
}

fn boxed<E>(e: E) -> tavis_cache::BoxError
where
  E: std::error::Error + Send + Sync + 'static,
{
  Box::new(e)
}
