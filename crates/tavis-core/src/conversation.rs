//! Conversation and message records.
//!
//! Conversations are externally owned — the platform assigns their ids and
//! delivers message listings newest-first. Messages are immutable after
//! first write; a repeated upsert with a seen `message_id` is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptor for a message attachment; the binary lives at `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
  pub kind: String,
  pub url:  String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub message_id:      String,
  pub conversation_id: String,
  pub from_id:         String,
  #[serde(default)]
  pub from_name:       Option<String>,
  #[serde(default)]
  pub content:         Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub attachment:      Option<Attachment>,
  pub created_at:      DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
  pub conversation_id:  String,
  pub participant_id:   String,
  #[serde(default)]
  pub participant_name: Option<String>,
  #[serde(default)]
  pub last_message_at:  Option<DateTime<Utc>>,
  #[serde(default)]
  pub agent:            Option<String>,
  /// Newest-first, as delivered by the platform feed. Chronological
  /// ordering is a display concern.
  #[serde(default)]
  pub messages:         Vec<Message>,
}

impl ConversationRecord {
  /// Content of the most recent message, for listings.
  pub fn snippet(&self) -> Option<&str> {
    self.messages.first().and_then(|m| m.content.as_deref())
  }
}
