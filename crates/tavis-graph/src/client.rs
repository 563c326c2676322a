//! [`GraphClient`] — thin async wrapper over the platform's HTTP API.

use std::time::Duration;

use reqwest::Client;

use crate::{
  error::{classify, ErrorEnvelope},
  types::{LiveConversation, LiveMessage, Page, ProfileInfo},
  Result,
};

const CONVERSATION_FIELDS: &str = "participants,updated_time";
const MESSAGE_FIELDS: &str = "id,message,from,created_time,attachments";
const PROFILE_FIELDS: &str = "first_name,last_name,name,locale,timezone";

/// Async client for one page's conversations and messages.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct GraphClient {
  client:       Client,
  base_url:     String,
  page_id:      String,
  access_token: String,
}

impl GraphClient {
  pub fn new(
    base_url: impl Into<String>,
    page_id: impl Into<String>,
    access_token: impl Into<String>,
  ) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_owned(),
      page_id: page_id.into(),
      access_token: access_token.into(),
    })
  }

  /// The platform-side id of the page itself, used to pick out the
  /// non-self conversation participant.
  pub fn page_id(&self) -> &str { &self.page_id }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  async fn execute<T: serde::de::DeserializeOwned>(
    &self,
    req: reqwest::RequestBuilder,
  ) -> Result<T> {
    let resp = req.send().await?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp
        .json::<ErrorEnvelope>()
        .await
        .ok()
        .map(|envelope| envelope.error);
      return Err(classify(status.as_u16(), body));
    }

    Ok(resp.json().await?)
  }

  async fn get_json<T: serde::de::DeserializeOwned>(
    &self,
    url: &str,
    query: &[(&str, &str)],
  ) -> Result<T> {
    self
      .execute(
        self
          .client
          .get(url)
          .query(&[("access_token", self.access_token.as_str())])
          .query(query),
      )
      .await
  }

  /// List conversations for the page, following `paging.next` cursors until
  /// exhausted or `limit` items have been collected.
  pub async fn list_conversations(
    &self,
    limit: usize,
  ) -> Result<Vec<LiveConversation>> {
    let first = self.url(&format!("{}/conversations", self.page_id));
    let mut next = Some(first);
    let mut first_page = true;
    let mut conversations = vec![];

    while let Some(url) = next.take() {
      // `paging.next` is a complete URL, token included; only the first
      // request carries our own query parameters.
      let page: Page<LiveConversation> = if first_page {
        first_page = false;
        self.get_json(&url, &[("fields", CONVERSATION_FIELDS)]).await?
      } else {
        self.execute(self.client.get(&url)).await?
      };

      conversations.extend(page.data);
      if conversations.len() >= limit {
        conversations.truncate(limit);
        break;
      }
      next = page.paging.and_then(|p| p.next);
    }

    Ok(conversations)
  }

  /// Newest-first message listing for one conversation.
  pub async fn list_messages(
    &self,
    conversation_id: &str,
  ) -> Result<Vec<LiveMessage>> {
    let url = self.url(&format!("{conversation_id}/messages"));
    let page: Page<LiveMessage> =
      self.get_json(&url, &[("fields", MESSAGE_FIELDS)]).await?;
    Ok(page.data)
  }

  /// Best-effort richer profile for an external contact id.
  pub async fn fetch_profile(&self, external_id: &str) -> Result<ProfileInfo> {
    let url = self.url(external_id);
    self.get_json(&url, &[("fields", PROFILE_FIELDS)]).await
  }
}
