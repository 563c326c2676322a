//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. Customer records and message
//! attachments are stored as compact JSON.

use chrono::{DateTime, Utc};
use tavis_core::conversation::{Attachment, ConversationRecord, Message};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Attachment ──────────────────────────────────────────────────────────────

pub fn encode_attachment(a: Option<&Attachment>) -> Result<Option<String>> {
  Ok(a.map(serde_json::to_string).transpose()?)
}

pub fn decode_attachment(s: Option<&str>) -> Result<Option<Attachment>> {
  Ok(s.map(serde_json::from_str).transpose()?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `conversations` row.
pub struct RawConversation {
  pub conversation_id:  String,
  pub participant_id:   String,
  pub participant_name: Option<String>,
  pub last_message_at:  Option<String>,
  pub agent:            Option<String>,
}

impl RawConversation {
  /// Decode into a [`ConversationRecord`], attaching pre-loaded messages.
  pub fn into_record(self, messages: Vec<Message>) -> Result<ConversationRecord> {
    Ok(ConversationRecord {
      conversation_id:  self.conversation_id,
      participant_id:   self.participant_id,
      participant_name: self.participant_name,
      last_message_at:  self
        .last_message_at
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      agent:            self.agent,
      messages,
    })
  }
}

/// Raw strings read directly from a `messages` row.
pub struct RawMessage {
  pub message_id:      String,
  pub conversation_id: String,
  pub from_id:         String,
  pub from_name:       Option<String>,
  pub content:         Option<String>,
  pub attachment_json: Option<String>,
  pub created_at:      String,
}

impl RawMessage {
  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      message_id:      self.message_id,
      conversation_id: self.conversation_id,
      from_id:         self.from_id,
      from_name:       self.from_name,
      content:         self.content,
      attachment:      decode_attachment(self.attachment_json.as_deref())?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// Column values for one message, encoded and ready for binding.
pub struct MessageParams {
  pub message_id:      String,
  pub conversation_id: String,
  pub from_id:         String,
  pub from_name:       Option<String>,
  pub content:         Option<String>,
  pub attachment_json: Option<String>,
  pub created_at:      String,
}

pub fn encode_message(m: &Message) -> Result<MessageParams> {
  Ok(MessageParams {
    message_id:      m.message_id.clone(),
    conversation_id: m.conversation_id.clone(),
    from_id:         m.from_id.clone(),
    from_name:       m.from_name.clone(),
    content:         m.content.clone(),
    attachment_json: encode_attachment(m.attachment.as_ref())?,
    created_at:      encode_dt(m.created_at),
  })
}
