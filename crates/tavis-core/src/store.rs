//! The `RecordStore` trait.
//!
//! The trait is implemented by storage backends (`tavis-store-json`,
//! `tavis-store-sqlite`). Higher layers (`tavis-server`) depend on this
//! abstraction, not on any concrete backend; the backend is selected once
//! at startup and injected.

use std::future::Future;

use crate::{
  conversation::{ConversationRecord, Message},
  customer::CustomerRecord,
};

/// Abstraction over a durable record store.
///
/// Customer upserts are whole-record overwrites keyed by `customer_id`;
/// non-destructive merging is the caller's concern (see [`crate::merge`]).
/// Conversation upserts merge metadata with a sticky agent, and message
/// writes are idempotent per `message_id`.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (tokio with `axum`).
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Customers ─────────────────────────────────────────────────────────

  /// List every customer record. Unreadable individual records are logged
  /// and skipped, never fatal.
  fn list_customers(
    &self,
  ) -> impl Future<Output = Result<Vec<CustomerRecord>, Self::Error>> + Send + '_;

  /// Look up a customer by canonical id, conversation id, or external
  /// contact id. Returns `None` if nothing matches.
  fn get_customer<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<CustomerRecord>, Self::Error>> + Send + 'a;

  /// Look up a customer by its platform external id only.
  fn find_by_external_id<'a>(
    &'a self,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Option<CustomerRecord>, Self::Error>> + Send + 'a;

  /// Write the record, replacing any stored version with the same
  /// `customer_id`.
  fn upsert_customer(
    &self,
    record: CustomerRecord,
  ) -> impl Future<Output = Result<CustomerRecord, Self::Error>> + Send + '_;

  // ── Conversations ─────────────────────────────────────────────────────

  fn list_conversations(
    &self,
  ) -> impl Future<Output = Result<Vec<ConversationRecord>, Self::Error>> + Send + '_;

  fn get_conversation<'a>(
    &'a self,
    conversation_id: &'a str,
  ) -> impl Future<Output = Result<Option<ConversationRecord>, Self::Error>> + Send + 'a;

  /// Upsert a conversation. Metadata is merged via
  /// [`crate::merge::merge_conversation`]: a stored non-"Unassigned" agent
  /// is never overwritten, and carried messages are first-write-wins.
  fn upsert_conversation(
    &self,
    record: ConversationRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Append messages to an existing conversation; previously-seen
  /// `message_id`s are no-ops. Errors if the conversation is unknown.
  fn append_messages<'a>(
    &'a self,
    conversation_id: &'a str,
    messages: Vec<Message>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Manually assign an agent: writes through to both the conversation and
  /// the owning customer profile. Errors if the conversation is unknown.
  fn assign_agent<'a>(
    &'a self,
    conversation_id: &'a str,
    agent: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
