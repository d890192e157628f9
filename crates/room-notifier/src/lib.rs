//! Announces new meeting-room bookings to a chat exactly once.
//!
//! Every poll cycle rescans a rolling window of the room calendar. Each
//! booking is reduced to a stable identity; identities already in the dedup
//! store are skipped, the rest are announced and recorded only once delivery
//! is confirmed.

pub mod audit;
pub mod calendar_client;
pub mod config;
pub mod db;
pub mod error;
pub mod janitor;
pub mod models;
pub mod notifier;
pub mod poller;
pub mod scheduler;
pub mod schema;
pub mod telegram;
