//! # tagtrail-store
//!
//! Server-side storage for trackers, their owner links and the raw
//! offline-finding reports fetched for them, backed by SQLite.
//!
//! The store only ever sees ciphertext: report payloads as delivered by the
//! report network and owner-encrypted private data. The crate exposes a
//! synchronous `Database` handle that wraps a `rusqlite::Connection` and
//! provides typed helpers for every domain model.

pub mod database;
pub mod migrations;
pub mod models;
pub mod owner_trackers;
pub mod reports;
pub mod trackers;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
