//! Flat-file JSON backend for the Tavis record store.
//!
//! Layout under the data root:
//!
//! ```text
//! customer/<CUSTOMER_ID>/profile_<CUSTOMER_ID>.json
//! customer/<CUSTOMER_ID>/chathistory/conv_<CONVERSATION_ID>.json
//! ```
//!
//! All filesystem access runs through `tokio::task::spawn_blocking` so the
//! async runtime is never blocked on disk I/O.

mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::JsonStore;

#[cfg(test)]
mod tests;
