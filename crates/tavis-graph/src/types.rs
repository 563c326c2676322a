//! Wire types for the platform's JSON payloads.
//!
//! Timestamps arrive as `%Y-%m-%dT%H:%M:%S%z` (a `+0000`-style offset, not
//! quite RFC 3339), so parsing goes through [`graph_time`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tavis_core::conversation::{Attachment, Message};

pub(crate) mod graph_time {
  use chrono::{DateTime, Utc};
  use serde::{Deserialize, Deserializer};

  const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

  pub fn deserialize<'de, D>(d: D) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let s = String::deserialize(d)?;
    DateTime::parse_from_str(&s, FORMAT)
      .or_else(|_| DateTime::parse_from_rfc3339(&s))
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(serde::de::Error::custom)
  }
}

/// One page of a cursored listing.
///
/// The explicit default paths keep the derived `Deserialize` impl free of a
/// `T: Default` bound; the item types deliberately have no `Default`.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
  #[serde(default = "Vec::new")]
  pub data:   Vec<T>,
  #[serde(default = "Option::default")]
  pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
  #[serde(default)]
  pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveConversation {
  pub id:           String,
  #[serde(deserialize_with = "graph_time::deserialize")]
  pub updated_time: DateTime<Utc>,
  #[serde(default)]
  pub participants: Participants,
}

impl LiveConversation {
  /// The non-page side of the conversation, if present.
  pub fn participant_other_than(&self, page_id: &str) -> Option<&Participant> {
    self.participants.data.iter().find(|p| p.id != page_id)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Participants {
  #[serde(default)]
  pub data: Vec<Participant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Participant {
  pub id:    String,
  #[serde(default)]
  pub name:  Option<String>,
  #[serde(default)]
  pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveMessage {
  pub id:           String,
  #[serde(default)]
  pub message:      Option<String>,
  #[serde(default)]
  pub from:         Option<Participant>,
  #[serde(deserialize_with = "graph_time::deserialize")]
  pub created_time: DateTime<Utc>,
  #[serde(default)]
  pub attachments:  Option<Page<LiveAttachment>>,
}

impl LiveMessage {
  /// Convert to a domain [`Message`], keeping the first attachment only.
  pub fn into_message(self, conversation_id: &str) -> Message {
    let attachment = self
      .attachments
      .and_then(|page| page.data.into_iter().next())
      .and_then(LiveAttachment::into_attachment);

    let (from_id, from_name) = match self.from {
      Some(p) => (p.id, p.name),
      None => (String::new(), None),
    };

    Message {
      message_id: self.id,
      conversation_id: conversation_id.to_owned(),
      from_id,
      from_name,
      content: self.message,
      attachment,
      created_at: self.created_time,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveAttachment {
  #[serde(default)]
  pub mime_type:  Option<String>,
  #[serde(default)]
  pub file_url:   Option<String>,
  #[serde(default)]
  pub image_data: Option<ImageData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageData {
  pub url: String,
}

impl LiveAttachment {
  pub fn into_attachment(self) -> Option<Attachment> {
    if let Some(image) = self.image_data {
      return Some(Attachment { kind: "image".to_owned(), url: image.url });
    }
    let url = self.file_url?;
    Some(Attachment {
      kind: self.mime_type.unwrap_or_else(|| "file".to_owned()),
      url,
    })
  }
}

/// Richer profile used to seed a fresh customer record. Best-effort; most
/// fields are commonly withheld by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileInfo {
  #[serde(default)]
  pub first_name: Option<String>,
  #[serde(default)]
  pub last_name:  Option<String>,
  #[serde(default)]
  pub name:       Option<String>,
  #[serde(default)]
  pub locale:     Option<String>,
  #[serde(default)]
  pub timezone:   Option<f64>,
}

impl ProfileInfo {
  /// Full display name, assembled from the parts when the combined field
  /// is withheld.
  pub fn display_name(&self) -> Option<String> {
    if let Some(name) = &self.name {
      return Some(name.clone());
    }
    match (self.first_name.as_deref(), self.last_name.as_deref()) {
      (Some(f), Some(l)) => Some(format!("{f} {l}")),
      (Some(f), None) => Some(f.to_owned()),
      (None, Some(l)) => Some(l.to_owned()),
      (None, None) => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn conversation_page_deserializes() {
    let page: Page<LiveConversation> = serde_json::from_str(
      r#"{
        "data": [{
          "id": "t_100",
          "updated_time": "2025-08-01T12:30:00+0000",
          "participants": {"data": [
            {"id": "PAGE1", "name": "Tavis Shop"},
            {"id": "PSID123", "name": "Alice Liddell"}
          ]}
        }],
        "paging": {"next": "https://example.com/next"}
      }"#,
    )
    .unwrap();

    assert_eq!(page.data.len(), 1);
    assert_eq!(page.paging.unwrap().next.as_deref(), Some("https://example.com/next"));

    let other = page.data[0].participant_other_than("PAGE1").unwrap();
    assert_eq!(other.id, "PSID123");
  }

  #[test]
  fn page_with_no_fields_deserializes_empty() {
    let page: Page<LiveConversation> = serde_json::from_str("{}").unwrap();
    assert!(page.data.is_empty());
    assert!(page.paging.is_none());
  }

  #[test]
  fn message_with_image_attachment_converts() {
    let live: LiveMessage = serde_json::from_str(
      r#"{
        "id": "m_1",
        "message": "see photo",
        "from": {"id": "PSID123", "name": "Alice"},
        "created_time": "2025-08-01T12:30:00+0000",
        "attachments": {"data": [{
          "mime_type": "image/jpeg",
          "image_data": {"url": "https://cdn.example.com/p.jpg"}
        }]}
      }"#,
    )
    .unwrap();

    let message = live.into_message("t_100");
    assert_eq!(message.conversation_id, "t_100");
    let attachment = message.attachment.unwrap();
    assert_eq!(attachment.kind, "image");
    assert_eq!(attachment.url, "https://cdn.example.com/p.jpg");
  }

  #[test]
  fn missing_optional_fields_default() {
    let live: LiveMessage = serde_json::from_str(
      r#"{"id": "m_2", "created_time": "2025-08-01T12:30:00Z"}"#,
    )
    .unwrap();
    let message = live.into_message("t_100");
    assert!(message.content.is_none());
    assert!(message.attachment.is_none());
    assert_eq!(message.from_id, "");
  }
}
