//! [`JobRunner`] — a bounded worker for fire-and-forget background jobs.
//!
//! Cache revalidation, derived-view rebuilds, and write-through fan-out all
//! run here. Job failures are logged and swallowed; they never reach the
//! caller that scheduled them.

use std::{future::Future, pin::Pin};

use tokio::sync::mpsc;

use crate::BoxError;

type JobFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

struct Job {
  name: &'static str,
  fut:  JobFuture,
}

/// Handle to the background worker task. Cloning shares the same queue.
#[derive(Clone)]
pub struct JobRunner {
  tx: mpsc::Sender<Job>,
}

impl JobRunner {
  /// Spawn the worker task with a queue of `capacity` pending jobs.
  pub fn start(capacity: usize) -> Self {
    let (tx, mut rx) = mpsc::channel::<Job>(capacity);

    tokio::spawn(async move {
      while let Some(job) = rx.recv().await {
        if let Err(error) = job.fut.await {
          tracing::warn!(job = job.name, %error, "background job failed");
        }
      }
    });

    Self { tx }
  }

  /// Queue a job without waiting for it. A full queue drops the job with a
  /// warning — every job is an idempotent derivation that the next trigger
  /// will redo.
  pub fn submit<F>(&self, name: &'static str, fut: F)
  where
    F: Future<Output = Result<(), BoxError>> + Send + 'static,
  {
    let job = Job { name, fut: Box::pin(fut) };
    if self.tx.try_send(job).is_err() {
      tracing::warn!(job = name, "job queue full; dropping");
    }
  }
}
