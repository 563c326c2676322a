//! Customer records — the canonical per-person state of the CRM.
//!
//! A record is assembled from several partially-trusted inputs: live platform
//! syncs, inbound webhook events, and manual edits. Fields a human may have
//! curated are only ever *filled*, never overwritten, by automated paths
//! (see [`crate::merge`]).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agent placeholder treated as "no assignment" everywhere.
pub const UNASSIGNED: &str = "Unassigned";

/// True when `agent` names an actual person rather than a placeholder.
pub fn is_assigned(agent: Option<&str>) -> bool {
  matches!(agent, Some(a) if !a.is_empty() && a != UNASSIGNED)
}

// ─── Source ──────────────────────────────────────────────────────────────────

/// The external channel a customer record originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
  Facebook,
}

impl Source {
  /// Short code embedded in minted customer ids.
  pub fn code(self) -> &'static str {
    match self {
      Source::Facebook => "FB",
    }
  }

  /// Human-readable channel name recorded as the lead channel.
  pub fn channel_name(self) -> &'static str {
    match self {
      Source::Facebook => "Facebook",
    }
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// Canonical internal customer identifier.
///
/// Minted ids follow `TVS-CUS-{SOURCE}-{YY}-{NNNN}`; for a given
/// `(source, year)` pair the serials are unique and strictly increasing in
/// assignment order.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CustomerId(pub String);

impl CustomerId {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for CustomerId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for CustomerId {
  fn from(s: &str) -> Self { CustomerId(s.to_owned()) }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// Profile attributes. All of these count as curated once set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  #[serde(default)]
  pub first_name:      Option<String>,
  #[serde(default)]
  pub last_name:       Option<String>,
  #[serde(default)]
  pub status:          Option<String>,
  #[serde(default)]
  pub membership_tier: Option<String>,
  #[serde(default)]
  pub lifecycle_stage: Option<String>,
  #[serde(default)]
  pub agent:           Option<String>,
  #[serde(default)]
  pub join_date:       Option<DateTime<Utc>>,
}

impl Profile {
  /// Display name assembled from the name parts.
  pub fn display_name(&self) -> String {
    match (self.first_name.as_deref(), self.last_name.as_deref()) {
      (Some(f), Some(l)) => format!("{f} {l}"),
      (Some(f), None) => f.to_owned(),
      (None, Some(l)) => l.to_owned(),
      (None, None) => String::new(),
    }
  }

  /// The agent, if one is genuinely assigned.
  pub fn assigned_agent(&self) -> Option<&str> {
    self.agent.as_deref().filter(|a| is_assigned(Some(a)))
  }
}

// ─── Contact info ────────────────────────────────────────────────────────────

/// Per-channel external identifiers for the customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
  /// The messaging platform's opaque participant id.
  #[serde(default)]
  pub external_id:   Option<String>,
  /// Display name as reported by the platform.
  #[serde(default)]
  pub external_name: Option<String>,
  #[serde(default)]
  pub email:         Option<String>,
  #[serde(default)]
  pub lead_channel:  Option<String>,
}

// ─── Intelligence ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
  #[serde(default)]
  pub total_spend:  f64,
  #[serde(default)]
  pub total_orders: u64,
}

/// Derived knowledge about a customer. The optional `behavioral` block is
/// only present on enriched records; fragmented duplicates of the same
/// person may or may not carry it (see the merger's read-time fallback).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intelligence {
  #[serde(default)]
  pub tags:       BTreeSet<String>,
  #[serde(default)]
  pub metrics:    Metrics,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub behavioral: Option<serde_json::Value>,
}

impl Intelligence {
  pub fn has_behavioral(&self) -> bool { self.behavioral.is_some() }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// The full customer record as persisted by a [`crate::store::RecordStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
  pub customer_id:     CustomerId,
  #[serde(default)]
  pub profile:         Profile,
  #[serde(default)]
  pub contact_info:    ContactInfo,
  #[serde(default)]
  pub intelligence:    Intelligence,
  /// Back-reference to the owning conversation; not ownership.
  #[serde(default)]
  pub conversation_id: Option<String>,
}

impl CustomerRecord {
  /// A bare record with nothing but an identity.
  pub fn new(customer_id: CustomerId) -> Self {
    CustomerRecord {
      customer_id,
      profile:         Profile::default(),
      contact_info:    ContactInfo::default(),
      intelligence:    Intelligence::default(),
      conversation_id: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn assigned_agent_filters_placeholder() {
    let mut p = Profile::default();
    assert_eq!(p.assigned_agent(), None);

    p.agent = Some(UNASSIGNED.to_owned());
    assert_eq!(p.assigned_agent(), None);

    p.agent = Some(String::new());
    assert_eq!(p.assigned_agent(), None);

    p.agent = Some("Jane".to_owned());
    assert_eq!(p.assigned_agent(), Some("Jane"));
  }

  #[test]
  fn record_round_trips_through_json() {
    let mut record = CustomerRecord::new(CustomerId::from("TVS-CUS-FB-25-0001"));
    record.profile.first_name = Some("Alice".into());
    record.contact_info.external_id = Some("PSID123".into());
    record.intelligence.tags.insert("Facebook Chat".into());

    let json = serde_json::to_string(&record).unwrap();
    let back: CustomerRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
  }

  #[test]
  fn missing_optional_blocks_default() {
    let back: CustomerRecord =
      serde_json::from_str(r#"{"customer_id":"TVS-CUS-FB-25-0001"}"#).unwrap();
    assert!(back.profile.first_name.is_none());
    assert!(back.intelligence.tags.is_empty());
    assert!(back.conversation_id.is_none());
  }
}
