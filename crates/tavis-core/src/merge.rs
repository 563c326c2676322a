//! Non-destructive merging of observed platform data into stored records.
//!
//! Curated fields win over freshly-observed values: `existing ?? observed`,
//! never the reverse. The agent field additionally treats "Unassigned" as
//! absent on both sides, so a real assignment is sticky.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::{
  conversation::{ConversationRecord, Message},
  customer::{
    is_assigned, ContactInfo, CustomerId, CustomerRecord, Profile, Source,
  },
};

// ─── Customer merge ──────────────────────────────────────────────────────────

/// One sighting of a participant, as observed from a sync pass or an
/// inbound event.
#[derive(Debug, Clone, Default)]
pub struct Observed {
  pub external_id:     String,
  pub external_name:   Option<String>,
  pub conversation_id: Option<String>,
  pub last_active:     Option<DateTime<Utc>>,
  pub tags:            Vec<String>,
  /// Whether any page-side (staff) reply exists in the conversation.
  pub staff_replied:   bool,
  /// Agent name inferred from staff replies; only used when no curated
  /// assignment exists.
  pub agent_hint:      Option<String>,
}

/// Merge an observation into `existing` (or a fresh record), preserving
/// curated fields.
pub fn merge_customer(
  existing: Option<CustomerRecord>,
  customer_id: CustomerId,
  source: Source,
  observed: Observed,
) -> CustomerRecord {
  let prior =
    existing.unwrap_or_else(|| CustomerRecord::new(customer_id));
  let (observed_first, observed_last) =
    split_name(observed.external_name.as_deref());

  let agent = if is_assigned(prior.profile.agent.as_deref()) {
    prior.profile.agent.clone()
  } else {
    observed
      .agent_hint
      .clone()
      .filter(|a| is_assigned(Some(a)))
      .or_else(|| prior.profile.agent.clone())
  };

  let profile = Profile {
    first_name:      prior.profile.first_name.clone().or(observed_first),
    last_name:       prior.profile.last_name.clone().or(observed_last),
    status:          prior
      .profile
      .status
      .clone()
      .or_else(|| Some("Active".to_owned())),
    membership_tier: prior
      .profile
      .membership_tier
      .clone()
      .or_else(|| Some("GENERAL".to_owned())),
    lifecycle_stage: prior.profile.lifecycle_stage.clone().or_else(|| {
      Some(
        if observed.staff_replied { "In Progress" } else { "New Lead" }
          .to_owned(),
      )
    }),
    agent,
    join_date:       prior
      .profile
      .join_date
      .or(observed.last_active)
      .or_else(|| Some(Utc::now())),
  };

  let contact_info = ContactInfo {
    external_id:   Some(observed.external_id),
    external_name: observed
      .external_name
      .or(prior.contact_info.external_name),
    email:         prior.contact_info.email,
    lead_channel:  prior
      .contact_info
      .lead_channel
      .or_else(|| Some(source.channel_name().to_owned())),
  };

  let mut intelligence = prior.intelligence;
  intelligence.tags.extend(observed.tags);

  CustomerRecord {
    customer_id: prior.customer_id,
    profile,
    contact_info,
    intelligence,
    conversation_id: observed
      .conversation_id
      .or(prior.conversation_id),
  }
}

fn split_name(name: Option<&str>) -> (Option<String>, Option<String>) {
  let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
    return (None, None);
  };
  match name.split_once(' ') {
    Some((first, rest)) => (Some(first.to_owned()), Some(rest.to_owned())),
    None => (Some(name.to_owned()), None),
  }
}

// ─── Conversation merge ──────────────────────────────────────────────────────

/// Merge conversation metadata, keeping the stored agent sticky.
pub fn merge_conversation(
  existing: Option<ConversationRecord>,
  incoming: ConversationRecord,
) -> ConversationRecord {
  let Some(prior) = existing else { return incoming };

  let agent = if is_assigned(prior.agent.as_deref()) {
    prior.agent
  } else if is_assigned(incoming.agent.as_deref()) {
    incoming.agent
  } else {
    prior.agent.or(incoming.agent)
  };

  ConversationRecord {
    conversation_id:  prior.conversation_id,
    participant_id:   incoming.participant_id,
    participant_name: incoming
      .participant_name
      .or(prior.participant_name),
    last_message_at:  incoming
      .last_message_at
      .max(prior.last_message_at),
    agent,
    messages: merge_messages(prior.messages, incoming.messages),
  }
}

/// Merge message listings, first-write-wins per `message_id`, newest-first.
pub fn merge_messages(
  existing: Vec<Message>,
  incoming: Vec<Message>,
) -> Vec<Message> {
  let seen: HashSet<String> =
    existing.iter().map(|m| m.message_id.clone()).collect();
  let mut merged = existing;
  merged.extend(
    incoming.into_iter().filter(|m| !seen.contains(&m.message_id)),
  );
  merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
  merged
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
  }

  fn message(id: &str, content: &str, secs: i64) -> Message {
    Message {
      message_id:      id.to_owned(),
      conversation_id: "t_1".to_owned(),
      from_id:         "PSID123".to_owned(),
      from_name:       None,
      content:         Some(content.to_owned()),
      attachment:      None,
      created_at:      at(secs),
    }
  }

  fn conversation(agent: Option<&str>) -> ConversationRecord {
    ConversationRecord {
      conversation_id:  "t_1".to_owned(),
      participant_id:   "PSID123".to_owned(),
      participant_name: Some("Alice Liddell".to_owned()),
      last_message_at:  Some(at(0)),
      agent:            agent.map(str::to_owned),
      messages:         vec![],
    }
  }

  #[test]
  fn curated_profile_fields_win() {
    let mut existing =
      CustomerRecord::new(CustomerId::from("TVS-CUS-FB-25-0001"));
    existing.profile.first_name = Some("Alicia".to_owned());
    existing.profile.membership_tier = Some("VIP".to_owned());
    existing.profile.agent = Some("Jane".to_owned());

    let merged = merge_customer(
      Some(existing),
      CustomerId::from("TVS-CUS-FB-25-0001"),
      Source::Facebook,
      Observed {
        external_id:   "PSID123".to_owned(),
        external_name: Some("Alice Liddell".to_owned()),
        agent_hint:    Some("Bob".to_owned()),
        ..Observed::default()
      },
    );

    assert_eq!(merged.profile.first_name.as_deref(), Some("Alicia"));
    assert_eq!(merged.profile.membership_tier.as_deref(), Some("VIP"));
    assert_eq!(merged.profile.agent.as_deref(), Some("Jane"));
    // Observed values fill what was absent.
    assert_eq!(merged.profile.last_name.as_deref(), Some("Liddell"));
    assert_eq!(
      merged.contact_info.external_name.as_deref(),
      Some("Alice Liddell")
    );
  }

  #[test]
  fn observation_fills_fresh_record() {
    let merged = merge_customer(
      None,
      CustomerId::from("TVS-CUS-FB-25-0001"),
      Source::Facebook,
      Observed {
        external_id:     "PSID123".to_owned(),
        external_name:   Some("Alice Liddell".to_owned()),
        conversation_id: Some("t_1".to_owned()),
        staff_replied:   true,
        ..Observed::default()
      },
    );

    assert_eq!(merged.profile.first_name.as_deref(), Some("Alice"));
    assert_eq!(merged.profile.status.as_deref(), Some("Active"));
    assert_eq!(merged.profile.lifecycle_stage.as_deref(), Some("In Progress"));
    assert_eq!(merged.conversation_id.as_deref(), Some("t_1"));
    assert_eq!(
      merged.contact_info.lead_channel.as_deref(),
      Some("Facebook")
    );
  }

  #[test]
  fn lifecycle_defaults_to_new_lead_without_staff_reply() {
    let merged = merge_customer(
      None,
      CustomerId::from("TVS-CUS-FB-25-0001"),
      Source::Facebook,
      Observed {
        external_id: "PSID123".to_owned(),
        ..Observed::default()
      },
    );
    assert_eq!(merged.profile.lifecycle_stage.as_deref(), Some("New Lead"));
  }

  #[test]
  fn tags_are_unioned() {
    let mut existing =
      CustomerRecord::new(CustomerId::from("TVS-CUS-FB-25-0001"));
    existing.intelligence.tags.insert("VIP".to_owned());

    let merged = merge_customer(
      Some(existing),
      CustomerId::from("TVS-CUS-FB-25-0001"),
      Source::Facebook,
      Observed {
        external_id: "PSID123".to_owned(),
        tags:        vec!["Facebook Chat".to_owned(), "VIP".to_owned()],
        ..Observed::default()
      },
    );

    assert_eq!(merged.intelligence.tags.len(), 2);
    assert!(merged.intelligence.tags.contains("VIP"));
    assert!(merged.intelligence.tags.contains("Facebook Chat"));
  }

  #[test]
  fn assigned_agent_survives_unassigned_merge() {
    let prior = ConversationRecord {
      agent: Some("Jane".to_owned()),
      ..conversation(None)
    };
    let incoming = conversation(Some(UNASSIGNED_STR));
    let merged = merge_conversation(Some(prior), incoming);
    assert_eq!(merged.agent.as_deref(), Some("Jane"));
  }

  const UNASSIGNED_STR: &str = crate::customer::UNASSIGNED;

  #[test]
  fn incoming_assignment_fills_unassigned() {
    let prior = conversation(Some(UNASSIGNED_STR));
    let incoming = conversation(Some("Jane"));
    let merged = merge_conversation(Some(prior), incoming);
    assert_eq!(merged.agent.as_deref(), Some("Jane"));
  }

  #[test]
  fn merge_messages_is_idempotent_per_id() {
    let first = message("m1", "hello", 10);
    let mutated = message("m1", "HELLO EDITED", 10);
    let merged =
      merge_messages(vec![first.clone()], vec![mutated, message("m2", "hi", 20)]);

    assert_eq!(merged.len(), 2);
    // First write wins: the stored content is unchanged.
    let m1 = merged.iter().find(|m| m.message_id == "m1").unwrap();
    assert_eq!(m1.content.as_deref(), Some("hello"));
  }

  #[test]
  fn merged_messages_are_newest_first() {
    let merged = merge_messages(
      vec![message("m1", "a", 10)],
      vec![message("m3", "c", 30), message("m2", "b", 20)],
    );
    let ids: Vec<&str> =
      merged.iter().map(|m| m.message_id.as_str()).collect();
    assert_eq!(ids, ["m3", "m2", "m1"]);
  }
}
