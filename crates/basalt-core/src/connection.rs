//! Connection adapter, transaction, and factory traits

use crate::{ExecResult, QueryResult, Result, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// A database connection adapter
///
/// This is the seam between the connection pool and a concrete driver. The
/// pool only ever calls these operations and never inspects the adapter's
/// internals, so any SQL-issuing caller one level up is oblivious to pooling.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql")
    fn driver_name(&self) -> &str;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE/DDL)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult>;

    /// Begin a transaction
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A transaction scoped to one connection
///
/// `commit` and `rollback` consume the transaction; a transaction dropped
/// without either is rolled back best-effort by the driver.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Execute a query within the transaction
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement within the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult>;
}

/// Factory trait for creating new connections
///
/// This is the per-slot pooling strategy: each call to `create` must produce
/// an independent physical connection.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation only checks the closed flag.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}
