//! Core types and trait definitions for the Tavis customer backend.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod conversation;
pub mod customer;
pub mod identity;
pub mod merge;
pub mod store;
