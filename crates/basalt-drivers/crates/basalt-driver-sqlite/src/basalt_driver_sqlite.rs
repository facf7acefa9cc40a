//! SQLite driver for basalt
//!
//! An embedded single-writer store: one `rusqlite` handle guarded by a
//! mutex. When pooled, wrap a single `SqliteConnection` in an `Arc` and use
//! the shared-adapter strategy, so the pool serializes logical holders over
//! this one physical handle rather than multiplying connections.

mod connection;

pub use connection::{SqliteConnection, SqliteTransaction};
