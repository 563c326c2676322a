//! Tests for the cache store and its derived views.

use chrono::{Duration, Utc};
use serde_json::json;
use tavis_core::customer::{CustomerId, CustomerRecord};
use tempfile::TempDir;

use crate::{CacheStore, JobRunner, ServeSource, INDEX_KEY};

fn cache() -> (TempDir, CacheStore) {
  let dir = TempDir::new().expect("tempdir");
  let store = CacheStore::open(dir.path());
  (dir, store)
}

fn customer(id: &str, spend: f64, months_ago: i64) -> CustomerRecord {
  let mut record = CustomerRecord::new(CustomerId::from(id));
  record.profile.first_name = Some("Alice".to_owned());
  record.profile.join_date = Some(Utc::now() - Duration::days(31 * months_ago));
  record.intelligence.metrics.total_spend = spend;
  record
}

#[tokio::test]
async fn write_then_read_round_trips() {
  let (_dir, c) = cache();
  let payload = json!({"customer_id": "TVS-CUS-FB-25-0001"});

  c.write("customers", "TVS-CUS-FB-25-0001", &payload).await.unwrap();

  let back = c.read("customers", "TVS-CUS-FB-25-0001").await.unwrap();
  assert_eq!(back, Some(payload));
}

#[tokio::test]
async fn missing_key_reads_none() {
  let (_dir, c) = cache();
  assert_eq!(c.read("customers", "nope").await.unwrap(), None);
}

#[tokio::test]
async fn list_all_excludes_the_index_entry() {
  let (_dir, c) = cache();
  c.write("customers", "a", &json!({"id": "a"})).await.unwrap();
  c.write("customers", "b", &json!({"id": "b"})).await.unwrap();
  c.rebuild_index("customers", &[]).await.unwrap();

  let all = c.list_all("customers").await.unwrap();
  assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn index_carries_count_and_projection() {
  let (_dir, c) = cache();
  let records = vec![customer("TVS-CUS-FB-25-0001", 0.0, 0), customer("TVS-CUS-FB-25-0002", 0.0, 0)];

  c.rebuild_index("customers", &records).await.unwrap();

  let index = c.read("customers", INDEX_KEY).await.unwrap().unwrap();
  assert_eq!(index["count"], 2);
  assert_eq!(index["items"].as_array().unwrap().len(), 2);
  assert_eq!(index["items"][0]["customer_id"], "TVS-CUS-FB-25-0001");
  assert_eq!(index["items"][0]["name"], "Alice");
}

#[tokio::test]
async fn summary_aggregates_revenue_by_join_month() {
  let (_dir, c) = cache();
  let records = vec![
    customer("TVS-CUS-FB-25-0001", 100.0, 0),
    customer("TVS-CUS-FB-25-0002", 40.0, 6),
  ];

  c.rebuild_summary(&records).await.unwrap();

  let summary = c.read("analytics", "summary").await.unwrap().unwrap();
  assert_eq!(summary["customers"]["total"], 2);
  assert_eq!(summary["customers"]["new_this_month"], 1);
  assert_eq!(summary["revenue"]["total"], 140.0);
  assert_eq!(summary["revenue"]["this_month"], 100.0);
}

#[tokio::test]
async fn hit_is_served_without_waiting_on_the_fetch() {
  let (_dir, c) = cache();
  let jobs = JobRunner::start(4);
  c.write("customers", "x", &json!({"v": 1})).await.unwrap();

  // The fetch never resolves; a cache hit must not await it.
  let result = tokio::time::timeout(
    std::time::Duration::from_secs(1),
    c.read_through(&jobs, "customers", "x", || {
      std::future::pending::<Result<serde_json::Value, crate::BoxError>>()
    }),
  )
  .await
  .expect("hit served in bounded time")
  .unwrap();

  assert_eq!(result.0, json!({"v": 1}));
  assert_eq!(result.1, ServeSource::Cache);
}

#[tokio::test]
async fn miss_fetches_synchronously_and_populates() {
  let (_dir, c) = cache();
  let jobs = JobRunner::start(4);

  let (value, source) = c
    .read_through(&jobs, "customers", "x", || async {
      Ok::<_, crate::BoxError>(json!({"v": 2}))
    })
    .await
    .unwrap();

  assert_eq!(value, json!({"v": 2}));
  assert_eq!(source, ServeSource::Live);
  assert_eq!(c.read("customers", "x").await.unwrap(), Some(json!({"v": 2})));
}
