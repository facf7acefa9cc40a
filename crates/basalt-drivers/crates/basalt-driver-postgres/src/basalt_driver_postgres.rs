//! PostgreSQL driver for basalt
//!
//! A networked multi-connection store. Each `PostgresConnection` owns an
//! independent client over its own socket, so the natural pooling
//! arrangement is the per-slot strategy: hand `PostgresFactory` to the pool
//! and every slot gets a dedicated physical connection, created lazily.

mod connection;
mod factory;

pub use connection::{PostgresConnection, PostgresTransaction};
pub use factory::{PostgresConfig, PostgresFactory};
