//! Handlers for the `/webhooks/messenger` endpoints.
//!
//! | Method | Behavior |
//! |--------|----------|
//! | `GET`  | Subscription handshake: echo `hub.challenge` on token match |
//! | `POST` | Verify signature, admit every event, ack `EVENT_RECEIVED` |

use axum::{
  extract::{Query, State},
  http::HeaderMap,
};
use serde::Deserialize;
use tavis_core::store::RecordStore;

use crate::{
  error::ApiError,
  pipeline::{self, Envelope},
  AppState,
};

// ─── Verification handshake ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
  #[serde(rename = "hub.mode")]
  pub mode:         Option<String>,
  #[serde(rename = "hub.verify_token")]
  pub verify_token: Option<String>,
  #[serde(rename = "hub.challenge")]
  pub challenge:    Option<String>,
}

/// `GET /webhooks/messenger`
pub async fn verify<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<VerifyParams>,
) -> Result<String, ApiError>
where
  S: RecordStore + 'static,
{
  let (Some(mode), Some(token), Some(challenge)) =
    (params.mode, params.verify_token, params.challenge)
  else {
    return Err(ApiError::BadRequest("missing hub.* parameters".into()));
  };

  if mode == "subscribe" && token == state.config.verify_token {
    tracing::info!("webhook subscription verified");
    Ok(challenge)
  } else {
    Err(ApiError::Forbidden("verify token mismatch".into()))
  }
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

/// `POST /webhooks/messenger`
///
/// The sender retries aggressively on anything but a fast 2xx, so the 200
/// acknowledges *admission* of every entry, not their processing outcome.
pub async fn ingest<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  body: String,
) -> Result<&'static str, ApiError>
where
  S: RecordStore + 'static,
{
  match &state.config.app_secret {
    Some(secret) => {
      let signature = headers
        .get(pipeline::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
      pipeline::verify_signature(secret, body.as_bytes(), signature)?;
    }
    None => {
      tracing::warn!("no app secret configured; accepting unsigned webhook");
    }
  }

  let envelope: Envelope = serde_json::from_str(&body)
    .map_err(|e| ApiError::BadRequest(format!("malformed envelope: {e}")))?;
  if envelope.object != "page" {
    return Err(ApiError::NotFound(format!(
      "unrecognised object {:?}",
      envelope.object
    )));
  }

  // Queue first; fall back to direct dispatch when the queue is full or
  // disabled. Direct events run concurrently and isolated from each other.
  let mut direct = vec![];
  for event in envelope.entry.into_iter().flat_map(|e| e.messaging) {
    let event = match &state.queue {
      Some(queue) => match queue.try_enqueue(event) {
        Ok(()) => continue,
        Err(event) => event,
      },
      None => event,
    };

    let pipeline = state.pipeline.clone();
    direct.push(tokio::spawn(async move {
      if let Err(error) = pipeline.handle_event(event).await {
        tracing::warn!(%error, "direct event processing failed");
      }
    }));
  }
  for handle in direct {
    let _ = handle.await;
  }

  Ok("EVENT_RECEIVED")
}
