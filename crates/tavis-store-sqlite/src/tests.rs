//! Integration tests for `SqliteStore` against in-memory databases.

use chrono::{TimeZone, Utc};
use tavis_core::{
  conversation::{Attachment, ConversationRecord, Message},
  customer::{CustomerId, CustomerRecord, UNASSIGNED},
  store::RecordStore,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

fn customer(id: &str, external_id: &str, conversation_id: &str) -> CustomerRecord {
  let mut record = CustomerRecord::new(CustomerId::from(id));
  record.contact_info.external_id = Some(external_id.to_owned());
  record.conversation_id = Some(conversation_id.to_owned());
  record
}

fn message(id: &str, content: &str, secs: i64) -> Message {
  Message {
    message_id:      id.to_owned(),
    conversation_id: "t_100".to_owned(),
    from_id:         "PSID123".to_owned(),
    from_name:       Some("Alice".to_owned()),
    content:         Some(content.to_owned()),
    attachment:      None,
    created_at:      Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
  }
}

fn conversation(agent: Option<&str>) -> ConversationRecord {
  ConversationRecord {
    conversation_id:  "t_100".to_owned(),
    participant_id:   "PSID123".to_owned(),
    participant_name: Some("Alice".to_owned()),
    last_message_at:  None,
    agent:            agent.map(str::to_owned),
    messages:         vec![],
  }
}

// ─── Customers ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_then_read_back() {
  let s = store().await;
  let record = customer("TVS-CUS-FB-25-0001", "PSID123", "t_100");

  s.upsert_customer(record.clone()).await.unwrap();

  let all = s.list_customers().await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0], record);
}

#[tokio::test]
async fn get_customer_matches_all_three_keys() {
  let s = store().await;
  s.upsert_customer(customer("TVS-CUS-FB-25-0001", "PSID123", "t_100"))
    .await
    .unwrap();

  for key in ["TVS-CUS-FB-25-0001", "PSID123", "t_100"] {
    let found = s.get_customer(key).await.unwrap();
    assert!(found.is_some(), "no match for key {key}");
  }
  assert!(s.get_customer("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn find_by_external_id_ignores_other_keys() {
  let s = store().await;
  s.upsert_customer(customer("TVS-CUS-FB-25-0001", "PSID123", "t_100"))
    .await
    .unwrap();

  assert!(s.find_by_external_id("PSID123").await.unwrap().is_some());
  assert!(s.find_by_external_id("t_100").await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_replaces_stored_record() {
  let s = store().await;
  let mut record = customer("TVS-CUS-FB-25-0001", "PSID123", "t_100");
  s.upsert_customer(record.clone()).await.unwrap();

  record.profile.agent = Some("Jane".to_owned());
  record.contact_info.external_id = Some("PSID456".to_owned());
  s.upsert_customer(record).await.unwrap();

  let back = s.get_customer("TVS-CUS-FB-25-0001").await.unwrap().unwrap();
  assert_eq!(back.profile.agent.as_deref(), Some("Jane"));
  assert_eq!(s.list_customers().await.unwrap().len(), 1);

  // Lookup columns follow the record.
  assert!(s.find_by_external_id("PSID123").await.unwrap().is_none());
  assert!(s.find_by_external_id("PSID456").await.unwrap().is_some());
}

// ─── Conversations ───────────────────────────────────────────────────────────

#[tokio::test]
async fn conversation_round_trips_with_messages() {
  let s = store().await;
  let mut conv = conversation(None);
  conv.messages = vec![message("m2", "again", 20), message("m1", "hello", 10)];

  s.upsert_conversation(conv).await.unwrap();

  let back = s.get_conversation("t_100").await.unwrap().unwrap();
  assert_eq!(back.messages.len(), 2);
  assert_eq!(back.messages[0].message_id, "m2");
  assert_eq!(back.last_message_at, Some(back.messages[0].created_at));
  assert_eq!(s.list_conversations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn agent_assignment_is_sticky_across_upserts() {
  let s = store().await;
  s.upsert_conversation(conversation(Some("Jane"))).await.unwrap();
  s.upsert_conversation(conversation(Some(UNASSIGNED))).await.unwrap();

  let conv = s.get_conversation("t_100").await.unwrap().unwrap();
  assert_eq!(conv.agent.as_deref(), Some("Jane"));
}

#[tokio::test]
async fn append_messages_is_idempotent() {
  let s = store().await;
  s.upsert_conversation(conversation(None)).await.unwrap();

  s.append_messages("t_100", vec![message("m1", "hello", 10)])
    .await
    .unwrap();
  s.append_messages(
    "t_100",
    vec![message("m1", "EDITED", 10), message("m2", "again", 20)],
  )
  .await
  .unwrap();

  let conv = s.get_conversation("t_100").await.unwrap().unwrap();
  assert_eq!(conv.messages.len(), 2);
  let m1 = conv.messages.iter().find(|m| m.message_id == "m1").unwrap();
  assert_eq!(m1.content.as_deref(), Some("hello"));
  // Newest-first read order.
  assert_eq!(conv.messages[0].message_id, "m2");
  assert_eq!(conv.last_message_at, Some(conv.messages[0].created_at));
}

#[tokio::test]
async fn append_to_unknown_conversation_errors() {
  let s = store().await;
  let err = s
    .append_messages("t_missing", vec![message("m1", "x", 0)])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ConversationNotFound(_)));
}

#[tokio::test]
async fn attachment_survives_the_column_encoding() {
  let s = store().await;
  s.upsert_conversation(conversation(None)).await.unwrap();

  let mut m = message("m1", "see photo", 10);
  m.attachment = Some(Attachment {
    kind: "image".to_owned(),
    url:  "https://cdn.example.com/p.jpg".to_owned(),
  });
  s.append_messages("t_100", vec![m.clone()]).await.unwrap();

  let conv = s.get_conversation("t_100").await.unwrap().unwrap();
  assert_eq!(conv.messages[0].attachment, m.attachment);
}

// ─── Agent assignment ────────────────────────────────────────────────────────

#[tokio::test]
async fn assign_agent_writes_conversation_and_profile() {
  let s = store().await;
  s.upsert_customer(customer("TVS-CUS-FB-25-0001", "PSID123", "t_100"))
    .await
    .unwrap();
  s.upsert_conversation(conversation(None)).await.unwrap();

  s.assign_agent("t_100", "Jane").await.unwrap();

  let conv = s.get_conversation("t_100").await.unwrap().unwrap();
  assert_eq!(conv.agent.as_deref(), Some("Jane"));

  let record = s.get_customer("TVS-CUS-FB-25-0001").await.unwrap().unwrap();
  assert_eq!(record.profile.agent.as_deref(), Some("Jane"));
}

#[tokio::test]
async fn assign_agent_unknown_conversation_errors() {
  let s = store().await;
  let err = s.assign_agent("t_missing", "Jane").await.unwrap_err();
  assert!(matches!(err, Error::ConversationNotFound(_)));
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn data_survives_reopen() {
  let dir = tempfile::TempDir::new().unwrap();
  let path = dir.path().join("tavis.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.upsert_customer(customer("TVS-CUS-FB-25-0001", "PSID123", "t_100"))
      .await
      .unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  assert!(s.get_customer("TVS-CUS-FB-25-0001").await.unwrap().is_some());
}
