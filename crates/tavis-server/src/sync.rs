//! [`SyncOrchestrator`] — the pull side of the engine.
//!
//! A pass pulls the page's conversation listing, resolves each participant's
//! identity against the current record snapshot, merges profiles without
//! clobbering curated fields, upserts conversation history, and then fans
//! the refreshed record set out to the cache and its derived views.

use std::sync::Arc;

use tavis_cache::{CacheStore, JobRunner};
use tavis_core::{
  conversation::ConversationRecord,
  customer::{is_assigned, CustomerRecord, Source},
  identity,
  merge::{merge_customer, Observed},
  store::RecordStore,
};
use tavis_graph::{GraphClient, LiveConversation, LiveMessage};

use crate::error::ApiError;

pub struct SyncOrchestrator<S> {
  store: Arc<S>,
  cache: CacheStore,
  jobs:  JobRunner,
  graph: Arc<GraphClient>,
  limit: usize,
}

impl<S> SyncOrchestrator<S>
where
  S: RecordStore + 'static,
{
  pub fn new(
    store: Arc<S>,
    cache: CacheStore,
    jobs: JobRunner,
    graph: Arc<GraphClient>,
    limit: usize,
  ) -> Self {
    Self { store, cache, jobs, graph, limit }
  }

  /// Run one sync pass and return the records it touched.
  ///
  /// Upstream failure aborts the pass and returns what was synced so far;
  /// already-written records are never rolled back. Token expiry is the one
  /// upstream error that surfaces, so a human can re-authorise.
  pub async fn sync_all(&self) -> Result<Vec<CustomerRecord>, ApiError> {
    let conversations = match self.graph.list_conversations(self.limit).await {
      Ok(conversations) => conversations,
      Err(e) if e.is_token_expired() => return Err(e.into()),
      Err(error) => {
        tracing::warn!(%error, "conversation listing failed; aborting sync pass");
        return Ok(vec![]);
      }
    };

    let mut synced = vec![];
    for conversation in conversations {
      match self.sync_one(&conversation).await {
        Ok(Some(record)) => synced.push(record),
        Ok(None) => {}
        Err(e @ ApiError::TokenExpired(_)) => return Err(e),
        Err(ApiError::Internal(error)) => {
          tracing::warn!(
            %error,
            conversation_id = %conversation.id,
            "sync pass aborted mid-way"
          );
          break;
        }
        Err(e) => return Err(e),
      }
    }

    self.fan_out_to_cache().await;
    Ok(synced)
  }

  /// Sync a single live conversation; `None` when it has no non-page
  /// participant to attribute it to.
  async fn sync_one(
    &self,
    conversation: &LiveConversation,
  ) -> Result<Option<CustomerRecord>, ApiError> {
    let Some(participant) =
      conversation.participant_other_than(self.graph.page_id())
    else {
      return Ok(None);
    };

    let live_messages = self.graph.list_messages(&conversation.id).await?;
    let page_reply = live_messages
      .iter()
      .find(|m| m.from.as_ref().is_some_and(|f| f.id == self.graph.page_id()));
    let staff_replied = page_reply.is_some();
    let agent_hint = page_reply
      .and_then(|m| m.from.as_ref())
      .and_then(|f| f.name.clone())
      .filter(|name| is_assigned(Some(name)));

    // Snapshot taken per conversation so serials minted earlier in this
    // pass are visible to later iterations.
    let records =
      self.store.list_customers().await.map_err(ApiError::internal)?;
    let customer_id =
      identity::resolve(&participant.id, &records, Source::Facebook);
    let existing =
      records.into_iter().find(|r| r.customer_id == customer_id);

    // Seed fresh records with the richer profile when the platform shares
    // it; most fields are withheld, so this is best-effort only.
    let mut external_name = participant.name.clone();
    if external_name.is_none() && existing.is_none() {
      match self.graph.fetch_profile(&participant.id).await {
        Ok(info) => external_name = info.display_name(),
        Err(error) => {
          tracing::debug!(
            %error,
            participant_id = %participant.id,
            "profile fetch failed; continuing without a name"
          );
        }
      }
    }

    let record = merge_customer(
      existing,
      customer_id,
      Source::Facebook,
      Observed {
        external_id:     participant.id.clone(),
        external_name:   external_name.clone(),
        conversation_id: Some(conversation.id.clone()),
        last_active:     Some(conversation.updated_time),
        tags:            vec!["Facebook Chat".to_owned()],
        staff_replied,
        agent_hint:      agent_hint.clone(),
      },
    );
    let record = self
      .store
      .upsert_customer(record)
      .await
      .map_err(ApiError::internal)?;

    self
      .store
      .upsert_conversation(self.conversation_record(
        conversation,
        participant.id.clone(),
        external_name,
        agent_hint,
        live_messages,
      ))
      .await
      .map_err(ApiError::internal)?;

    Ok(Some(record))
  }

  fn conversation_record(
    &self,
    conversation: &LiveConversation,
    participant_id: String,
    participant_name: Option<String>,
    agent_hint: Option<String>,
    live_messages: Vec<LiveMessage>,
  ) -> ConversationRecord {
    let messages: Vec<_> = live_messages
      .into_iter()
      .map(|m| m.into_message(&conversation.id))
      .collect();

    ConversationRecord {
      conversation_id: conversation.id.clone(),
      participant_id,
      participant_name,
      last_message_at: messages
        .iter()
        .map(|m| m.created_at)
        .max()
        .or(Some(conversation.updated_time)),
      agent: agent_hint,
      messages,
    }
  }

  /// Mirror the refreshed record set into the cache and schedule the
  /// derived-view rebuilds. All off the caller's path; failures are logged
  /// by the worker and the next pass redoes the work.
  async fn fan_out_to_cache(&self) {
    let records = match self.store.list_customers().await {
      Ok(records) => records,
      Err(error) => {
        tracing::warn!(%error, "skipping cache fan-out; record listing failed");
        return;
      }
    };

    for record in &records {
      let cache = self.cache.clone();
      let id = record.customer_id.to_string();
      let payload = match serde_json::to_value(record) {
        Ok(payload) => payload,
        Err(error) => {
          tracing::warn!(%error, customer_id = %id, "unserialisable record");
          continue;
        }
      };
      self.jobs.submit("cache_write", async move {
        cache.write("customers", &id, &payload).await?;
        Ok(())
      });
    }

    let cache = self.cache.clone();
    let index_records = records.clone();
    self.jobs.submit("rebuild_index", async move {
      cache.rebuild_index("customers", &index_records).await?;
      Ok(())
    });

    let cache = self.cache.clone();
    self.jobs.submit("rebuild_summary", async move {
      cache.rebuild_summary(&records).await?;
      Ok(())
    });
  }
}
