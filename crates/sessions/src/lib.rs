//! Durable per-location conversation storage.

pub mod store;

pub use store::{SessionStore, SessionSummary, StoredMessage};
