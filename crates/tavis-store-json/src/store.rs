//! [`JsonStore`] — the flat-file implementation of [`RecordStore`].

use std::{
  fs,
  path::{Path, PathBuf},
};

use tavis_core::{
  conversation::{ConversationRecord, Message},
  customer::CustomerRecord,
  merge::{merge_conversation, merge_messages},
  store::RecordStore,
};

use crate::{Error, Result};

const PROFILE_PREFIX: &str = "profile_";
const CONV_PREFIX: &str = "conv_";
const CHAT_DIR: &str = "chathistory";

/// A record store backed by one folder per customer.
///
/// Cloning is cheap; the store holds only the data-root path.
#[derive(Clone)]
pub struct JsonStore {
  root: PathBuf,
}

impl JsonStore {
  /// Open (or create) a store rooted at `root`. The `customer/` directory
  /// is created on first write.
  pub fn open(root: impl Into<PathBuf>) -> Self {
    JsonStore { root: root.into() }
  }

  fn customer_dir(&self) -> PathBuf { self.root.join("customer") }

  async fn blocking<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(PathBuf) -> Result<T> + Send + 'static,
  {
    let dir = self.customer_dir();
    tokio::task::spawn_blocking(move || f(dir)).await?
  }
}

// ─── Blocking helpers ────────────────────────────────────────────────────────

fn customer_folders(dir: &Path) -> Vec<PathBuf> {
  let Ok(entries) = fs::read_dir(dir) else { return vec![] };
  entries
    .filter_map(|e| e.ok())
    .filter(|e| {
      e.path().is_dir()
        && !e.file_name().to_string_lossy().starts_with('.')
    })
    .map(|e| e.path())
    .collect()
}

fn read_profile(folder: &Path) -> Option<CustomerRecord> {
  let entries = fs::read_dir(folder).ok()?;
  let profile_file = entries.filter_map(|e| e.ok()).find(|e| {
    let name = e.file_name().to_string_lossy().to_string();
    name.starts_with(PROFILE_PREFIX) && name.ends_with(".json")
  })?;

  match fs::read_to_string(profile_file.path())
    .map_err(Error::from)
    .and_then(|raw| Ok(serde_json::from_str(&raw)?))
  {
    Ok(record) => Some(record),
    Err(e) => {
      tracing::warn!(folder = %folder.display(), error = %e, "skipping unreadable profile");
      None
    }
  }
}

fn read_all_profiles(dir: &Path) -> Vec<CustomerRecord> {
  customer_folders(dir)
    .iter()
    .filter_map(|folder| read_profile(folder))
    .collect()
}

fn write_profile(dir: &Path, record: &CustomerRecord) -> Result<()> {
  let folder = dir.join(record.customer_id.as_str());
  fs::create_dir_all(&folder)?;
  let path =
    folder.join(format!("{PROFILE_PREFIX}{}.json", record.customer_id));
  fs::write(&path, serde_json::to_vec_pretty(record)?)?;
  Ok(())
}

/// Locate the conversation file for `conversation_id` across all folders.
fn find_conversation_path(dir: &Path, conversation_id: &str) -> Option<PathBuf> {
  let file_name = format!("{CONV_PREFIX}{conversation_id}.json");
  customer_folders(dir)
    .iter()
    .map(|folder| folder.join(CHAT_DIR).join(&file_name))
    .find(|path| path.exists())
}

fn read_conversation(path: &Path) -> Result<ConversationRecord> {
  Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn write_conversation(path: &Path, record: &ConversationRecord) -> Result<()> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::write(path, serde_json::to_vec_pretty(record)?)?;
  Ok(())
}

/// The folder a new conversation file belongs in: the owning customer's
/// folder when one references it, otherwise a folder named after the
/// conversation itself.
fn owner_folder(dir: &Path, record: &ConversationRecord) -> PathBuf {
  let owner = read_all_profiles(dir).into_iter().find(|c| {
    c.conversation_id.as_deref() == Some(record.conversation_id.as_str())
      || c.contact_info.external_id.as_deref()
        == Some(record.participant_id.as_str())
  });
  match owner {
    Some(c) => dir.join(c.customer_id.as_str()),
    None => dir.join(&record.conversation_id),
  }
}

fn matches_customer(record: &CustomerRecord, id: &str) -> bool {
  record.customer_id.as_str() == id
    || record.conversation_id.as_deref() == Some(id)
    || record.contact_info.external_id.as_deref() == Some(id)
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for JsonStore {
  type Error = Error;

  async fn list_customers(&self) -> Result<Vec<CustomerRecord>> {
    self.blocking(|dir| Ok(read_all_profiles(&dir))).await
  }

  async fn get_customer<'a>(&'a self, id: &'a str) -> Result<Option<CustomerRecord>> {
    let id = id.to_owned();
    self
      .blocking(move |dir| {
        Ok(
          read_all_profiles(&dir)
            .into_iter()
            .find(|c| matches_customer(c, &id)),
        )
      })
      .await
  }

  async fn find_by_external_id<'a>(
    &'a self,
    external_id: &'a str,
  ) -> Result<Option<CustomerRecord>> {
    let external_id = external_id.to_owned();
    self
      .blocking(move |dir| {
        Ok(read_all_profiles(&dir).into_iter().find(|c| {
          c.contact_info.external_id.as_deref() == Some(external_id.as_str())
        }))
      })
      .await
  }

  async fn upsert_customer(&self, record: CustomerRecord) -> Result<CustomerRecord> {
    self
      .blocking(move |dir| {
        write_profile(&dir, &record)?;
        Ok(record)
      })
      .await
  }

  async fn list_conversations(&self) -> Result<Vec<ConversationRecord>> {
    self
      .blocking(|dir| {
        let mut conversations = vec![];
        for folder in customer_folders(&dir) {
          let chat_dir = folder.join(CHAT_DIR);
          let Ok(entries) = fs::read_dir(&chat_dir) else { continue };
          for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(CONV_PREFIX) || !name.ends_with(".json") {
              continue;
            }
            match read_conversation(&entry.path()) {
              Ok(conv) => conversations.push(conv),
              Err(e) => {
                tracing::warn!(file = %entry.path().display(), error = %e, "skipping unreadable conversation");
              }
            }
          }
        }
        Ok(conversations)
      })
      .await
  }

  async fn get_conversation<'a>(
    &'a self,
    conversation_id: &'a str,
  ) -> Result<Option<ConversationRecord>> {
    let conversation_id = conversation_id.to_owned();
    self
      .blocking(move |dir| {
        match find_conversation_path(&dir, &conversation_id) {
          Some(path) => Ok(Some(read_conversation(&path)?)),
          None => Ok(None),
        }
      })
      .await
  }

  async fn upsert_conversation(&self, record: ConversationRecord) -> Result<()> {
    self
      .blocking(move |dir| {
        let path = find_conversation_path(&dir, &record.conversation_id)
          .unwrap_or_else(|| {
            owner_folder(&dir, &record)
              .join(CHAT_DIR)
              .join(format!("{CONV_PREFIX}{}.json", record.conversation_id))
          });
        let existing =
          if path.exists() { Some(read_conversation(&path)?) } else { None };
        write_conversation(&path, &merge_conversation(existing, record))
      })
      .await
  }

  async fn append_messages<'a>(
    &'a self,
    conversation_id: &'a str,
    messages: Vec<Message>,
  ) -> Result<()> {
    let conversation_id = conversation_id.to_owned();
    self
      .blocking(move |dir| {
        let path = find_conversation_path(&dir, &conversation_id)
          .ok_or_else(|| Error::ConversationNotFound(conversation_id.clone()))?;
        let mut conv = read_conversation(&path)?;
        conv.messages = merge_messages(conv.messages, messages);
        conv.last_message_at = conv
          .messages
          .first()
          .map(|m| m.created_at)
          .max(conv.last_message_at);
        write_conversation(&path, &conv)
      })
      .await
  }

  async fn assign_agent<'a>(
    &'a self,
    conversation_id: &'a str,
    agent: &'a str,
  ) -> Result<()> {
    let conversation_id = conversation_id.to_owned();
    let agent = agent.to_owned();
    self
      .blocking(move |dir| {
        let path = find_conversation_path(&dir, &conversation_id)
          .ok_or_else(|| Error::ConversationNotFound(conversation_id.clone()))?;
        let mut conv = read_conversation(&path)?;
        conv.agent = Some(agent.clone());
        write_conversation(&path, &conv)?;

        // Write through to the owning profile so the assignment is
        // visible on the customer record too.
        let folder = path
          .parent()
          .and_then(Path::parent)
          .map(Path::to_path_buf);
        if let Some(folder) = folder
          && let Some(mut record) = read_profile(&folder)
        {
          record.profile.agent = Some(agent);
          write_profile(&dir, &record)?;
        }
        Ok(())
      })
      .await
  }
}
