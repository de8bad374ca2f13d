//! # TuneMint Common Library
//!
//! Shared code for the TuneMint service:
//! - Error type and result alias
//! - Bootstrap configuration (TOML + environment)
//! - JSON file store used for every persisted table
//! - Record types (profiles, social graph, marketplace, credits, generation)
//! - Event bus for server-sent events
//! - Admin request authentication
//! - Wallet address helpers

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod store;
pub mod time;
pub mod wallet;

pub use error::{Error, Result};
pub use store::{Collection, Document, JsonStore};
