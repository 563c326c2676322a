//! Bounded in-process queue for admitted webhook events.
//!
//! Ingestion prefers the queue; when it is full (or disabled in config) the
//! webhook handler falls back to dispatching the event directly.

use tokio::sync::mpsc;

use tavis_core::store::RecordStore;

use crate::pipeline::{MessagingEvent, Pipeline};

/// Sender half of the event queue. Cloning shares the same consumer.
#[derive(Clone)]
pub struct EventQueue {
  tx: mpsc::Sender<MessagingEvent>,
}

impl EventQueue {
  /// Spawn the consumer task. Processing failures are logged and the
  /// consumer keeps going; at-least-once delivery with idempotent handlers
  /// is the contract.
  pub fn start<S>(pipeline: Pipeline<S>, capacity: usize) -> Self
  where
    S: RecordStore + 'static,
  {
    let (tx, mut rx) = mpsc::channel::<MessagingEvent>(capacity);

    tokio::spawn(async move {
      while let Some(event) = rx.recv().await {
        if let Err(error) = pipeline.handle_event(event).await {
          tracing::warn!(%error, "queued event processing failed");
        }
      }
    });

    Self { tx }
  }

  /// Try to admit an event; gives the event back when the queue is full so
  /// the caller can fall back to direct dispatch.
  pub fn try_enqueue(
    &self,
    event: MessagingEvent,
  ) -> Result<(), MessagingEvent> {
    self.tx.try_send(event).map_err(|e| e.into_inner())
  }
}
