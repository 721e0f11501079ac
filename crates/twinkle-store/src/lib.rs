//! # twinkle-store
//!
//! Document store for Twinkle, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection`, with typed helpers for users, accounts and
//! sessions, conversations, per-reader unread counters and the
//! per-conversation message log. Every successful write is announced on a
//! broadcast change feed so that live views can re-query.

pub mod accounts;
pub mod changes;
pub mod conversations;
pub mod database;
pub mod maintenance;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;
mod rows;

pub use changes::ChangeEvent;
pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
