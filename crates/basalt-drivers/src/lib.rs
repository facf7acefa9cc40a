//! Basalt Drivers - Database driver implementations
//!
//! This crate re-exports the concrete drivers behind cargo features so
//! applications depend on one crate and pick their backends:
//!
//! - `sqlite` - embedded single-writer store (pool it with the
//!   shared-adapter strategy)
//! - `postgres` - networked multi-connection store (pool it with the
//!   per-slot factory strategy)

#[cfg(feature = "postgres")]
pub use basalt_driver_postgres as postgres;
#[cfg(feature = "sqlite")]
pub use basalt_driver_sqlite as sqlite;

/// Re-export commonly used types from basalt-core
pub use basalt_core::{
    BasaltError, ColumnMeta, Connection, ConnectionFactory, ExecResult, QueryResult, Result, Row,
    Transaction, Value,
};

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use basalt_connection::pool::{ConnectionPool, PoolConfig};
    use futures::future::BoxFuture;
    use sqlite::SqliteConnection;
    use std::sync::Arc;

    use async_trait::async_trait;

    #[tokio::test]
    async fn test_sqlite_connection() {
        let conn = SqliteConnection::open(":memory:").expect("open in-memory db");

        conn.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
            &[],
        )
        .await
        .expect("create table");

        conn.execute(
            "INSERT INTO users (name, email) VALUES (?, ?)",
            &[
                Value::String("Alice".into()),
                Value::String("alice@example.com".into()),
            ],
        )
        .await
        .expect("insert");

        let result = conn.query("SELECT * FROM users", &[]).await.expect("query");
        assert_eq!(result.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_pool_over_shared_sqlite() {
        let conn = Arc::new(SqliteConnection::open(":memory:").expect("open"));
        conn.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)", &[])
            .await
            .expect("create table");

        let pool = ConnectionPool::with_shared(PoolConfig::new(1, 4), conn)
            .await
            .expect("pool");

        pool.execute(
            "INSERT INTO kv (k, v) VALUES (?, ?)",
            &[Value::String("answer".into()), Value::Int64(42)],
        )
        .await
        .expect("insert");

        let result = pool
            .query("SELECT v FROM kv WHERE k = ?", &[Value::String("answer".into())])
            .await
            .expect("select");
        assert_eq!(result.rows[0].get(0).and_then(|v| v.as_i64()), Some(42));

        let stats = pool.stats();
        assert_eq!(stats.total_queries(), 2);
        assert_eq!(stats.active(), 0);
    }

    fn transfer(tx: &dyn Transaction) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            tx.execute("UPDATE accounts SET balance = balance - 10 WHERE id = 1", &[])
                .await?;
            tx.execute("UPDATE accounts SET balance = balance + 10 WHERE id = 2", &[])
                .await?;
            Ok(2)
        })
    }

    fn doomed(tx: &dyn Transaction) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            tx.execute("UPDATE accounts SET balance = 0 WHERE id = 1", &[])
                .await?;
            Err(BasaltError::Query("abort on purpose".into()))
        })
    }

    #[tokio::test]
    async fn test_pool_transaction_over_sqlite() {
        let conn = Arc::new(SqliteConnection::open(":memory:").expect("open"));
        conn.execute("CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance INTEGER)", &[])
            .await
            .expect("create table");
        conn.execute("INSERT INTO accounts (id, balance) VALUES (1, 100), (2, 0)", &[])
            .await
            .expect("seed");

        let pool = ConnectionPool::with_shared(PoolConfig::new(0, 1), conn)
            .await
            .expect("pool");

        let moved = pool.transaction(transfer).await.expect("transaction");
        assert_eq!(moved, 2);

        // A failing transaction rolls its writes back.
        pool.transaction(doomed).await.expect_err("doomed transaction");

        let result = pool
            .query("SELECT balance FROM accounts ORDER BY id", &[])
            .await
            .expect("select");
        assert_eq!(result.rows[0].get(0).and_then(|v| v.as_i64()), Some(90));
        assert_eq!(result.rows[1].get(0).and_then(|v| v.as_i64()), Some(10));
    }

    struct SqliteFileFactory {
        path: String,
    }

    #[async_trait]
    impl ConnectionFactory for SqliteFileFactory {
        async fn create(&self) -> Result<Arc<dyn Connection>> {
            Ok(Arc::new(SqliteConnection::open(&self.path)?))
        }
    }

    #[tokio::test]
    async fn test_pool_over_sqlite_file_factory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pooled.db").to_string_lossy().to_string();

        {
            let conn = SqliteConnection::open(&path).expect("open");
            conn.execute("CREATE TABLE t (n INTEGER)", &[])
                .await
                .expect("create table");
        }

        let factory = SqliteFileFactory { path };
        let pool = ConnectionPool::with_factory(PoolConfig::new(0, 2), factory)
            .await
            .expect("pool");

        // Two slots means two independent handles onto the same file.
        let a = pool.acquire().await.expect("acquire");
        let b = pool.acquire().await.expect("acquire");
        assert!(!Arc::ptr_eq(a.inner(), b.inner()));

        a.execute("INSERT INTO t (n) VALUES (7)", &[])
            .await
            .expect("insert");
        let result = b.query("SELECT n FROM t", &[]).await.expect("select");
        assert_eq!(result.rows[0].get(0).and_then(|v| v.as_i64()), Some(7));

        drop(a);
        drop(b);
        pool.drain().await;
        assert_eq!(pool.stats().total(), 0);
    }

    #[tokio::test]
    async fn test_pool_ping_over_sqlite() {
        let conn = Arc::new(SqliteConnection::open(":memory:").expect("open"));
        let pool = ConnectionPool::with_shared(PoolConfig::new(0, 1), conn)
            .await
            .expect("pool");

        let latency = pool.ping().await.expect("ping");
        assert!(latency < std::time::Duration::from_secs(1));
    }
}
