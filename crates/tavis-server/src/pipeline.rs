//! Event ingestion: signature verification and per-event processing.
//!
//! Events travel `RECEIVED → VERIFIED → {QUEUED | DIRECT} → PROCESSED`, or
//! `RECEIVED → REJECTED` on signature mismatch. An event is acknowledged to
//! the sender as soon as it is admitted; processing failures are logged and
//! never reach the response.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tavis_cache::{BoxError, CacheStore, JobRunner};
use tavis_core::{
  conversation::{Attachment, Message},
  customer::Source,
  identity,
  merge::{merge_customer, Observed},
  store::RecordStore,
};

use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the sender's HMAC of the raw body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Verify `sha256=<hex>` over the raw body. Comparison goes through
/// [`Mac::verify_slice`], which is constant-time.
pub fn verify_signature(
  secret: &str,
  body: &[u8],
  header: Option<&str>,
) -> Result<(), ApiError> {
  let header = header
    .ok_or_else(|| ApiError::Unauthorized("missing signature header".into()))?;
  let hex_digest = header.strip_prefix("sha256=").ok_or_else(|| {
    ApiError::Unauthorized("malformed signature header".into())
  })?;
  let expected = hex::decode(hex_digest)
    .map_err(|_| ApiError::Unauthorized("malformed signature header".into()))?;

  let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
    .map_err(ApiError::internal)?;
  mac.update(body);
  mac
    .verify_slice(&expected)
    .map_err(|_| ApiError::Unauthorized("signature mismatch".into()))
}

// ─── Wire types ──────────────────────────────────────────────────────────────

/// The webhook envelope: `{"object": "page", "entry": [...]}`.
#[derive(Debug, Deserialize)]
pub struct Envelope {
  pub object: String,
  #[serde(default)]
  pub entry:  Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
  #[serde(default)]
  pub messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagingEvent {
  pub sender:    EventParty,
  pub recipient: EventParty,
  /// Milliseconds since the epoch.
  #[serde(default)]
  pub timestamp: i64,
  #[serde(default)]
  pub message:   Option<EventMessage>,
}

impl MessagingEvent {
  fn occurred_at(&self) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(self.timestamp)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventParty {
  pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
  #[serde(default)]
  pub mid:         Option<String>,
  #[serde(default)]
  pub text:        Option<String>,
  #[serde(default)]
  pub attachments: Vec<EventAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventAttachment {
  #[serde(rename = "type")]
  pub kind:    String,
  #[serde(default)]
  pub payload: AttachmentPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentPayload {
  #[serde(default)]
  pub url: Option<String>,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Downstream handler shared by the queue consumer and the direct path.
pub struct Pipeline<S> {
  store:   Arc<S>,
  cache:   CacheStore,
  jobs:    JobRunner,
  page_id: String,
}

impl<S> Clone for Pipeline<S> {
  fn clone(&self) -> Self {
    Self {
      store:   self.store.clone(),
      cache:   self.cache.clone(),
      jobs:    self.jobs.clone(),
      page_id: self.page_id.clone(),
    }
  }
}

impl<S> Pipeline<S>
where
  S: RecordStore + 'static,
{
  pub fn new(
    store: Arc<S>,
    cache: CacheStore,
    jobs: JobRunner,
    page_id: impl Into<String>,
  ) -> Self {
    Self { store, cache, jobs, page_id: page_id.into() }
  }

  /// Process one admitted event: resolve the participant's identity, merge
  /// the sighting into their record, and append the message when its
  /// conversation is already known locally.
  pub async fn handle_event(&self, event: MessagingEvent) -> Result<(), BoxError> {
    // An echo of the page's own reply still updates the participant's
    // record (it proves staff engagement), keyed by the recipient.
    let staff_replied = event.sender.id == self.page_id;
    let external_id = if staff_replied {
      event.recipient.id.clone()
    } else {
      event.sender.id.clone()
    };

    let records = self.store.list_customers().await.map_err(box_err)?;
    let customer_id =
      identity::resolve(&external_id, &records, Source::Facebook);
    let existing = records
      .into_iter()
      .find(|r| r.customer_id == customer_id);
    let conversation_id =
      existing.as_ref().and_then(|r| r.conversation_id.clone());

    let observed = Observed {
      external_id:     external_id.clone(),
      external_name:   None,
      conversation_id: None,
      last_active:     event.occurred_at(),
      tags:            vec!["Facebook Chat".to_owned()],
      staff_replied,
      agent_hint:      None,
    };
    let record = merge_customer(
      existing,
      customer_id,
      Source::Facebook,
      observed,
    );
    let record = self
      .store
      .upsert_customer(record)
      .await
      .map_err(box_err)?;

    // Persist the message when we already know which conversation the
    // participant belongs to; earlier sightings without one are profile-only.
    if let Some(message) = self.build_message(&event, conversation_id.as_deref()) {
      let conv_id = message.conversation_id.clone();
      if self
        .store
        .get_conversation(&conv_id)
        .await
        .map_err(box_err)?
        .is_some()
      {
        self
          .store
          .append_messages(&conv_id, vec![message])
          .await
          .map_err(box_err)?;
      }
    }

    // Write-through plus derived-view refresh off the request path.
    let payload = serde_json::to_value(&record)?;
    self
      .cache
      .write("customers", record.customer_id.as_str(), &payload)
      .await?;
    self.schedule_rebuilds();

    Ok(())
  }

  fn build_message(
    &self,
    event: &MessagingEvent,
    conversation_id: Option<&str>,
  ) -> Option<Message> {
    let conversation_id = conversation_id?;
    let message = event.message.as_ref()?;
    let mid = message.mid.as_ref()?;

    let attachment = message.attachments.first().and_then(|a| {
      a.payload.url.as_ref().map(|url| Attachment {
        kind: a.kind.clone(),
        url:  url.clone(),
      })
    });

    Some(Message {
      message_id:      mid.clone(),
      conversation_id: conversation_id.to_owned(),
      from_id:         event.sender.id.clone(),
      from_name:       None,
      content:         message.text.clone(),
      attachment,
      created_at:      event.occurred_at().unwrap_or_else(Utc::now),
    })
  }

  fn schedule_rebuilds(&self) {
    let store = self.store.clone();
    let cache = self.cache.clone();
    self.jobs.submit("rebuild_views", async move {
      let records = store.list_customers().await.map_err(box_err)?;
      cache.rebuild_index("customers", &records).await?;
      cache.rebuild_summary(&records).await?;
      Ok(())
    });
  }
}

fn box_err<E>(e: E) -> BoxError
where
  E: std::error::Error + Send + Sync + 'static,
{
  Box::new(e)
}
