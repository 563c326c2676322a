//! HTTP client for the Graph-style messaging platform API.
//!
//! The base URL is configurable so tests (and staging setups) can point the
//! client at a local server. Token expiry is a distinguished error case:
//! callers surface it to a human for re-authorisation instead of retrying.

mod client;
mod types;

pub mod error;

pub use client::GraphClient;
pub use error::{Error, Result};
pub use types::{
  LiveAttachment, LiveConversation, LiveMessage, Page, Participant,
  ProfileInfo,
};
