//! [`SqliteStore`] — the SQLite implementation of [`RecordStore`].

use std::{collections::HashMap, path::Path};

use rusqlite::OptionalExtension as _;

use tavis_core::{
  conversation::{ConversationRecord, Message},
  customer::CustomerRecord,
  merge::merge_conversation,
  store::RecordStore,
};

use crate::{
  encode::{
    encode_dt, encode_message, MessageParams, RawConversation, RawMessage,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A record store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. The full
/// customer record lives in a JSON column; `external_id` and
/// `conversation_id` are mirrored into indexed columns for lookup.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch a conversation's metadata row without its messages.
  async fn conversation_meta(
    &self,
    conversation_id: &str,
  ) -> Result<Option<RawConversation>> {
    let id = conversation_id.to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT conversation_id, participant_id, participant_name,
                    last_message_at, agent
             FROM conversations WHERE conversation_id = ?1",
            rusqlite::params![id],
            |row| {
              Ok(RawConversation {
                conversation_id:  row.get(0)?,
                participant_id:   row.get(1)?,
                participant_name: row.get(2)?,
                last_message_at:  row.get(3)?,
                agent:            row.get(4)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    Ok(raw)
  }

  /// Fetch a conversation's messages, newest-first.
  async fn conversation_messages(
    &self,
    conversation_id: &str,
  ) -> Result<Vec<Message>> {
    let id = conversation_id.to_owned();

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT message_id, conversation_id, from_id, from_name,
                  content, attachment_json, created_at
           FROM messages
           WHERE conversation_id = ?1
           ORDER BY created_at DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], read_raw_message)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }

  /// `INSERT OR IGNORE` a batch of messages — previously-seen ids are
  /// untouched, so stored messages are immutable.
  async fn insert_messages(
    &self,
    conversation_id: &str,
    messages: &[Message],
  ) -> Result<()> {
    if messages.is_empty() {
      return Ok(());
    }

    let params: Vec<MessageParams> = messages
      .iter()
      .map(encode_message)
      .collect::<Result<_>>()?;
    let conv_id = conversation_id.to_owned();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for m in &params {
          tx.execute(
            "INSERT OR IGNORE INTO messages (
               message_id, conversation_id, from_id, from_name,
               content, attachment_json, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
              m.message_id,
              conv_id,
              m.from_id,
              m.from_name,
              m.content,
              m.attachment_json,
              m.created_at,
            ],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Recompute `last_message_at` as the newest stored message, keeping an
  /// already-newer metadata value.
  async fn refresh_last_message_at(&self, conversation_id: &str) -> Result<()> {
    let id = conversation_id.to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE conversations
           SET last_message_at = COALESCE(
             (SELECT MAX(m.created_at) FROM messages m
              WHERE m.conversation_id = ?1
                AND (last_message_at IS NULL OR m.created_at > last_message_at)),
             last_message_at
           )
           WHERE conversation_id = ?1",
          rusqlite::params![id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn read_raw_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessage> {
  Ok(RawMessage {
    message_id:      row.get(0)?,
    conversation_id: row.get(1)?,
    from_id:         row.get(2)?,
    from_name:       row.get(3)?,
    content:         row.get(4)?,
    attachment_json: row.get(5)?,
    created_at:      row.get(6)?,
  })
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  // ── Customers ─────────────────────────────────────────────────────────────

  async fn list_customers(&self) -> Result<Vec<CustomerRecord>> {
    let jsons: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT record_json FROM customers ORDER BY customer_id")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut records = Vec::with_capacity(jsons.len());
    for json in jsons {
      match serde_json::from_str(&json) {
        Ok(record) => records.push(record),
        Err(error) => {
          tracing::warn!(%error, "skipping undecodable customer row");
        }
      }
    }
    Ok(records)
  }

  async fn get_customer(&self, id: &str) -> Result<Option<CustomerRecord>> {
    let key = id.to_owned();

    let json: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT record_json FROM customers
             WHERE customer_id = ?1 OR conversation_id = ?1 OR external_id = ?1",
            rusqlite::params![key],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;

    Ok(json.as_deref().map(serde_json::from_str).transpose()?)
  }

  async fn find_by_external_id(
    &self,
    external_id: &str,
  ) -> Result<Option<CustomerRecord>> {
    let key = external_id.to_owned();

    let json: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT record_json FROM customers WHERE external_id = ?1",
            rusqlite::params![key],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;

    Ok(json.as_deref().map(serde_json::from_str).transpose()?)
  }

  async fn upsert_customer(
    &self,
    record: CustomerRecord,
  ) -> Result<CustomerRecord> {
    let customer_id     = record.customer_id.to_string();
    let external_id     = record.contact_info.external_id.clone();
    let conversation_id = record.conversation_id.clone();
    let record_json     = serde_json::to_string(&record)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO customers (
             customer_id, external_id, conversation_id, record_json
           ) VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(customer_id) DO UPDATE SET
             external_id     = excluded.external_id,
             conversation_id = excluded.conversation_id,
             record_json     = excluded.record_json",
          rusqlite::params![customer_id, external_id, conversation_id, record_json],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  // ── Conversations ─────────────────────────────────────────────────────────

  async fn list_conversations(&self) -> Result<Vec<ConversationRecord>> {
    let (conv_raws, message_raws): (Vec<RawConversation>, Vec<RawMessage>) =
      self
        .conn
        .call(|conn| {
          let mut stmt = conn.prepare(
            "SELECT conversation_id, participant_id, participant_name,
                    last_message_at, agent
             FROM conversations",
          )?;
          let convs = stmt
            .query_map([], |row| {
              Ok(RawConversation {
                conversation_id:  row.get(0)?,
                participant_id:   row.get(1)?,
                participant_name: row.get(2)?,
                last_message_at:  row.get(3)?,
                agent:            row.get(4)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

          let mut stmt = conn.prepare(
            "SELECT message_id, conversation_id, from_id, from_name,
                    content, attachment_json, created_at
             FROM messages ORDER BY created_at DESC",
          )?;
          let messages = stmt
            .query_map([], read_raw_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

          Ok((convs, messages))
        })
        .await?;

    let mut by_conversation: HashMap<String, Vec<Message>> = HashMap::new();
    for raw in message_raws {
      let message = raw.into_message()?;
      by_conversation
        .entry(message.conversation_id.clone())
        .or_default()
        .push(message);
    }

    conv_raws
      .into_iter()
      .map(|raw| {
        let messages = by_conversation
          .remove(&raw.conversation_id)
          .unwrap_or_default();
        raw.into_record(messages)
      })
      .collect()
  }

  async fn get_conversation(
    &self,
    conversation_id: &str,
  ) -> Result<Option<ConversationRecord>> {
    let Some(raw) = self.conversation_meta(conversation_id).await? else {
      return Ok(None);
    };
    let messages = self.conversation_messages(conversation_id).await?;
    Ok(Some(raw.into_record(messages)?))
  }

  async fn upsert_conversation(
    &self,
    record: ConversationRecord,
  ) -> Result<()> {
    let existing = self
      .conversation_meta(&record.conversation_id)
      .await?
      .map(|raw| raw.into_record(vec![]))
      .transpose()?;

    let carried = record.messages.clone();
    let merged = merge_conversation(existing, record);

    let conversation_id  = merged.conversation_id.clone();
    let participant_id   = merged.participant_id;
    let participant_name = merged.participant_name;
    let last_message_at  = merged.last_message_at.map(encode_dt);
    let agent            = merged.agent;
    let meta_id          = conversation_id.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO conversations (
             conversation_id, participant_id, participant_name,
             last_message_at, agent
           ) VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(conversation_id) DO UPDATE SET
             participant_id   = excluded.participant_id,
             participant_name = excluded.participant_name,
             last_message_at  = excluded.last_message_at,
             agent            = excluded.agent",
          rusqlite::params![
            meta_id,
            participant_id,
            participant_name,
            last_message_at,
            agent,
          ],
        )?;
        Ok(())
      })
      .await?;

    self.insert_messages(&conversation_id, &carried).await?;
    self.refresh_last_message_at(&conversation_id).await?;
    Ok(())
  }

  async fn append_messages(
    &self,
    conversation_id: &str,
    messages: Vec<Message>,
  ) -> Result<()> {
    if self.conversation_meta(conversation_id).await?.is_none() {
      return Err(Error::ConversationNotFound(conversation_id.to_owned()));
    }

    self.insert_messages(conversation_id, &messages).await?;
    self.refresh_last_message_at(conversation_id).await?;
    Ok(())
  }

  async fn assign_agent(
    &self,
    conversation_id: &str,
    agent: &str,
  ) -> Result<()> {
    let Some(meta) = self.conversation_meta(conversation_id).await? else {
      return Err(Error::ConversationNotFound(conversation_id.to_owned()));
    };

    let conv_id   = conversation_id.to_owned();
    let agent_str = agent.to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE conversations SET agent = ?2 WHERE conversation_id = ?1",
          rusqlite::params![conv_id, agent_str],
        )?;
        Ok(())
      })
      .await?;

    // Write through to the owning profile: matched by conversation first,
    // falling back to the participant's external id.
    let owner = match self.get_customer(conversation_id).await? {
      Some(record) => Some(record),
      None => self.find_by_external_id(&meta.participant_id).await?,
    };

    if let Some(mut record) = owner {
      record.profile.agent = Some(agent.to_owned());
      self.upsert_customer(record).await?;
    }

    Ok(())
  }
}
