//! [`ConversationMerger`] — read-time merging of live listings with local
//! history, including the display-profile fallback for fragmented records.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tavis_core::{customer::CustomerRecord, store::RecordStore};
use tavis_graph::GraphClient;

use crate::error::ApiError;

/// One merged row of the conversation listing.
#[derive(Debug, Serialize)]
pub struct ConversationView {
  pub conversation_id:  String,
  pub participant_id:   String,
  pub participant_name: Option<String>,
  pub last_message_at:  Option<DateTime<Utc>>,
  pub agent:            Option<String>,
  pub snippet:          Option<String>,
  /// `"live"` when present in the platform listing, `"local"` otherwise.
  pub origin:           &'static str,
  pub profile:          Option<CustomerRecord>,
}

pub struct ConversationMerger<S> {
  store: Arc<S>,
  graph: Option<Arc<GraphClient>>,
  limit: usize,
}

impl<S> ConversationMerger<S>
where
  S: RecordStore + 'static,
{
  pub fn new(
    store: Arc<S>,
    graph: Option<Arc<GraphClient>>,
    limit: usize,
  ) -> Self {
    Self { store, graph, limit }
  }

  /// Merged listing, newest activity first. The live fetch is best-effort:
  /// any upstream failure short of token expiry falls back to local history.
  pub async fn list_conversations(
    &self,
  ) -> Result<Vec<ConversationView>, ApiError> {
    let live = match &self.graph {
      Some(graph) => match graph.list_conversations(self.limit).await {
        Ok(live) => live,
        Err(e) if e.is_token_expired() => return Err(e.into()),
        Err(error) => {
          tracing::warn!(%error, "live listing failed; serving local history only");
          vec![]
        }
      },
      None => vec![],
    };

    let locals = self
      .store
      .list_conversations()
      .await
      .map_err(ApiError::internal)?;
    let records =
      self.store.list_customers().await.map_err(ApiError::internal)?;

    let page_id = self.graph.as_ref().map(|g| g.page_id().to_owned());
    let mut views = vec![];
    let mut seen = HashSet::new();

    for conversation in &live {
      seen.insert(conversation.id.clone());
      let local = locals.iter().find(|c| c.conversation_id == conversation.id);

      let (participant_id, participant_name) = match local {
        Some(local) => {
          (local.participant_id.clone(), local.participant_name.clone())
        }
        None => {
          let participant = page_id
            .as_deref()
            .and_then(|page| conversation.participant_other_than(page));
          (
            participant.map(|p| p.id.clone()).unwrap_or_default(),
            participant.and_then(|p| p.name.clone()),
          )
        }
      };

      views.push(self.view(
        &records,
        &conversation.id,
        participant_id,
        participant_name,
        local
          .and_then(|l| l.last_message_at)
          .max(Some(conversation.updated_time)),
        local.and_then(|l| l.agent.clone()),
        local.and_then(|l| l.snippet().map(str::to_owned)),
        "live",
      ));
    }

    for local in &locals {
      if seen.contains(&local.conversation_id) {
        continue;
      }
      views.push(self.view(
        &records,
        &local.conversation_id,
        local.participant_id.clone(),
        local.participant_name.clone(),
        local.last_message_at,
        local.agent.clone(),
        local.snippet().map(str::to_owned),
        "local",
      ));
    }

    // Newest first; entries with no activity sink to the end.
    views.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    Ok(views)
  }

  #[allow(clippy::too_many_arguments)]
  fn view(
    &self,
    records: &[CustomerRecord],
    conversation_id: &str,
    participant_id: String,
    participant_name: Option<String>,
    last_message_at: Option<DateTime<Utc>>,
    conversation_agent: Option<String>,
    snippet: Option<String>,
    origin: &'static str,
  ) -> ConversationView {
    let profile =
      display_profile(records, conversation_id, &participant_id);

    // A genuine profile assignment outranks whatever the conversation
    // carried from the feed.
    let agent = profile
      .as_ref()
      .and_then(|p| p.profile.assigned_agent())
      .map(str::to_owned)
      .or(conversation_agent);

    ConversationView {
      conversation_id: conversation_id.to_owned(),
      participant_id,
      participant_name,
      last_message_at,
      agent,
      snippet,
      origin,
      profile,
    }
  }
}

/// Pick the record shown alongside a conversation.
///
/// The primary is the record owning the conversation (or matching the
/// participant's external id). When the primary lacks the behavioral block,
/// a fragmented duplicate sharing its external id that does carry one is
/// shown instead — for display only, the stored primary is never rewritten.
fn display_profile(
  records: &[CustomerRecord],
  conversation_id: &str,
  participant_id: &str,
) -> Option<CustomerRecord> {
  let primary = records.iter().find(|r| {
    r.conversation_id.as_deref() == Some(conversation_id)
      || (!participant_id.is_empty()
        && r.contact_info.external_id.as_deref() == Some(participant_id))
  })?;

  if primary.intelligence.has_behavioral() {
    return Some(primary.clone());
  }

  let external_id = primary.contact_info.external_id.as_deref();
  let richer = external_id.and_then(|external| {
    records.iter().find(|r| {
      r.customer_id != primary.customer_id
        && r.contact_info.external_id.as_deref() == Some(external)
        && r.intelligence.has_behavioral()
    })
  });

  Some(richer.unwrap_or(primary).clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tavis_core::customer::CustomerId;

  fn record(id: &str, external: &str, conversation: Option<&str>) -> CustomerRecord {
    let mut r = CustomerRecord::new(CustomerId::from(id));
    r.contact_info.external_id = Some(external.to_owned());
    r.conversation_id = conversation.map(str::to_owned);
    r
  }

  #[test]
  fn behavioral_twin_is_preferred_for_display() {
    let plain = record("TVS-CUS-FB-25-0001", "PSID123", Some("t_100"));
    let mut rich = record("TVS-CUS-FB-24-0042", "PSID123", None);
    rich.intelligence.behavioral = Some(json!({"score": 9}));

    let shown =
      display_profile(&[plain.clone(), rich.clone()], "t_100", "PSID123")
        .unwrap();
    assert_eq!(shown.customer_id, rich.customer_id);
  }

  #[test]
  fn primary_is_kept_when_no_richer_twin_exists() {
    let plain = record("TVS-CUS-FB-25-0001", "PSID123", Some("t_100"));
    let shown = display_profile(&[plain.clone()], "t_100", "PSID123").unwrap();
    assert_eq!(shown.customer_id, plain.customer_id);
  }

  #[test]
  fn unknown_conversation_has_no_profile() {
    assert!(display_profile(&[], "t_999", "PSIDx").is_none());
  }
}
