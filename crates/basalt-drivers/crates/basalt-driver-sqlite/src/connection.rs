//! SQLite connection implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use basalt_core::{
    BasaltError, ColumnMeta, Connection, ExecResult, QueryResult, Result, Row, Transaction, Value,
};
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};

/// SQLite connection wrapper
///
/// SQLite allows one writer at a time, so all access goes through a mutex
/// over the single underlying handle.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Arc<Mutex<RusqliteConnection>>,
    closed: AtomicBool,
}

impl SqliteConnection {
    /// Open a SQLite database
    ///
    /// `:memory:` opens an in-memory database; `file:` URIs pass through
    /// unchanged; other paths have `~` and relative segments expanded.
    pub fn open(path: &str) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let expanded_path = Self::expand_path(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                BasaltError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent()
                    && !parent.exists()
                {
                    return Err(BasaltError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                BasaltError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        // PRAGMA statements return results, so use pragma_update.
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| BasaltError::Connection(format!("Failed to enable foreign keys: {}", e)))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| BasaltError::Connection(format!("Failed to set journal mode: {}", e)))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| BasaltError::Connection(format!("Failed to set synchronous mode: {}", e)))?;

        tracing::info!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            closed: AtomicBool::new(false),
        })
    }

    /// Expand `~` and relative paths to absolute ones
    fn expand_path(path: &str) -> Result<String> {
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                std::path::PathBuf::from(home)
                    .join(rest)
                    .to_string_lossy()
                    .to_string()
            } else {
                return Err(BasaltError::Configuration(
                    "Unable to determine HOME directory".into(),
                ));
            }
        } else if path.starts_with('~') {
            return Err(BasaltError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        let result = if path_buf.is_relative() {
            std::env::current_dir()
                .map_err(BasaltError::Io)?
                .join(path_buf)
                .to_string_lossy()
                .to_string()
        } else {
            expanded
        };

        Ok(result)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BasaltError::Connection("Connection is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.check_open()?;
        let conn = self.conn.lock();
        run_query(&conn, sql, params)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.check_open()?;
        let conn = self.conn.lock();
        run_execute(&conn, sql, params)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.check_open()?;
        tracing::debug!("beginning SQLite transaction");
        {
            let conn = self.conn.lock();
            // DEFERRED takes the write lock only at the first write, the
            // behaviour expected from a default transaction.
            conn.execute_batch("BEGIN DEFERRED")
                .map_err(|e| BasaltError::Query(format!("Failed to begin transaction: {}", e)))?;
        }
        Ok(Box::new(SqliteTransaction {
            conn: Arc::clone(&self.conn),
            committed: false,
            rolled_back: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing SQLite connection");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// SQLite transaction wrapper
///
/// Issues raw `BEGIN DEFERRED` / `COMMIT` / `ROLLBACK` SQL so that it can
/// share the connection mutex without running into rusqlite's borrow-based
/// transaction lifetimes.
pub struct SqliteTransaction {
    conn: Arc<Mutex<RusqliteConnection>>,
    committed: bool,
    rolled_back: bool,
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        // A transaction abandoned without commit/rollback leaves the
        // connection inside BEGIN; roll back best-effort.
        if !self.committed && !self.rolled_back {
            tracing::warn!("SQLite transaction dropped without commit or rollback, rolling back");
            let conn = self.conn.lock();
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %e, "automatic rollback on drop failed");
            }
        }
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        if self.rolled_back {
            return Err(BasaltError::Query("Transaction already rolled back".into()));
        }
        if self.committed {
            return Err(BasaltError::Query("Transaction already committed".into()));
        }

        {
            let conn = self.conn.lock();
            conn.execute_batch("COMMIT")
                .map_err(|e| BasaltError::Query(format!("Failed to commit transaction: {}", e)))?;
        }
        self.committed = true;
        tracing::debug!("SQLite transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        if self.committed {
            return Err(BasaltError::Query("Transaction already committed".into()));
        }
        if self.rolled_back {
            return Ok(());
        }

        {
            let conn = self.conn.lock();
            conn.execute_batch("ROLLBACK")
                .map_err(|e| BasaltError::Query(format!("Failed to rollback transaction: {}", e)))?;
        }
        self.rolled_back = true;
        tracing::debug!("SQLite transaction rolled back");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let conn = self.conn.lock();
        run_query(&conn, sql, params)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let conn = self.conn.lock();
        run_execute(&conn, sql, params)
    }
}

/// Run a row-returning statement on the locked handle
fn run_query(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start_time = Instant::now();
    let rusqlite_params = values_to_rusqlite(params);

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| BasaltError::Query(format!("Failed to prepare query: {}", e)))?;

    let mut names: Vec<String> = Vec::with_capacity(stmt.column_count());
    let mut columns: Vec<ColumnMeta> = Vec::with_capacity(stmt.column_count());
    for (idx, col) in stmt.columns().iter().enumerate() {
        let name = col.name().to_string();
        // The declared type comes from the schema when available; SQLite
        // expressions have none.
        let data_type = col.decl_type().unwrap_or("DYNAMIC").to_string();
        names.push(name.clone());
        columns.push(ColumnMeta {
            name,
            data_type,
            nullable: true,
            ordinal: idx,
        });
    }
    let names: Arc<[String]> = names.into();

    let mut rows = Vec::new();
    let mut query_rows = stmt
        .query(params_from_iter(rusqlite_params.iter()))
        .map_err(|e| BasaltError::Query(format!("Failed to execute query: {}", e)))?;

    while let Some(row) = query_rows
        .next()
        .map_err(|e| BasaltError::Query(format!("Failed to fetch row: {}", e)))?
    {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(rusqlite_to_value(row, i)?);
        }
        rows.push(Row::new(names.clone(), values));
    }

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms,
        "query executed"
    );
    Ok(QueryResult {
        columns,
        rows,
        execution_time_ms,
    })
}

/// Run a data-modifying statement on the locked handle
fn run_execute(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<ExecResult> {
    let rusqlite_params = values_to_rusqlite(params);

    let rows_affected = conn
        .execute(sql, params_from_iter(rusqlite_params.iter()))
        .map_err(|e| BasaltError::Query(format!("Failed to execute statement: {}", e)))?;

    tracing::debug!(affected_rows = rows_affected, "statement executed");
    Ok(ExecResult {
        affected_rows: rows_affected as u64,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}

/// Convert basalt values to rusqlite-compatible values
fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Int16(i) => rusqlite::types::Value::Integer(*i as i64),
        Value::Int32(i) => rusqlite::types::Value::Integer(*i as i64),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float32(f) => rusqlite::types::Value::Real(*f as f64),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::Decimal(d) => rusqlite::types::Value::Text(d.clone()),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
        Value::Uuid(u) => rusqlite::types::Value::Text(u.to_string()),
        Value::Date(d) => rusqlite::types::Value::Text(d.to_string()),
        Value::Time(t) => rusqlite::types::Value::Text(t.to_string()),
        Value::DateTime(dt) => rusqlite::types::Value::Text(dt.to_string()),
        Value::DateTimeUtc(dt) => rusqlite::types::Value::Text(dt.to_rfc3339()),
        Value::Json(j) => rusqlite::types::Value::Text(j.to_string()),
        Value::Array(_) => rusqlite::types::Value::Null,
    }
}

/// Convert a rusqlite row value to a basalt value
fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| BasaltError::Query(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_round_trip() {
        let conn = SqliteConnection::open(":memory:").expect("open");

        conn.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)",
            &[],
        )
        .await
        .expect("create table");

        let result = conn
            .execute(
                "INSERT INTO users (name, age) VALUES (?, ?)",
                &[Value::String("Alice".into()), Value::Int64(30)],
            )
            .await
            .expect("insert");
        assert_eq!(result.affected_rows, 1);
        assert_eq!(result.last_insert_id, Some(1));

        let result = conn
            .query("SELECT id, name, age FROM users WHERE age > ?", &[Value::Int64(18)])
            .await
            .expect("select");
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.columns[1].name, "name");

        let row = &result.rows[0];
        assert_eq!(row.get_by_name("name").and_then(|v| v.as_str()), Some("Alice"));
        assert_eq!(row.get(2).and_then(|v| v.as_i64()), Some(30));
    }

    #[tokio::test]
    async fn test_null_and_blob_values() {
        let conn = SqliteConnection::open(":memory:").expect("open");

        conn.execute("CREATE TABLE t (data BLOB, note TEXT)", &[])
            .await
            .expect("create table");
        conn.execute(
            "INSERT INTO t (data, note) VALUES (?, ?)",
            &[Value::Bytes(vec![1, 2, 3]), Value::Null],
        )
        .await
        .expect("insert");

        let result = conn.query("SELECT data, note FROM t", &[]).await.expect("select");
        let row = &result.rows[0];
        assert_eq!(row.get(0), Some(&Value::Bytes(vec![1, 2, 3])));
        assert!(row.get(1).unwrap().is_null());
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let conn = SqliteConnection::open(":memory:").expect("open");
        conn.execute("CREATE TABLE t (n INTEGER)", &[])
            .await
            .expect("create table");

        let tx = conn.begin_transaction().await.expect("begin");
        tx.execute("INSERT INTO t (n) VALUES (1)", &[])
            .await
            .expect("insert");
        tx.commit().await.expect("commit");

        let tx = conn.begin_transaction().await.expect("begin");
        tx.execute("INSERT INTO t (n) VALUES (2)", &[])
            .await
            .expect("insert");
        tx.rollback().await.expect("rollback");

        let result = conn.query("SELECT n FROM t", &[]).await.expect("select");
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.rows[0].get(0).and_then(|v| v.as_i64()), Some(1));
    }

    #[tokio::test]
    async fn test_close_marks_connection() {
        let conn = SqliteConnection::open(":memory:").expect("open");
        assert!(!conn.is_closed());

        conn.close().await.expect("close");
        assert!(conn.is_closed());

        let err = conn.query("SELECT 1", &[]).await.expect_err("query fails");
        assert!(matches!(err, BasaltError::Connection(_)));
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        let path_str = path.to_string_lossy().to_string();

        {
            let conn = SqliteConnection::open(&path_str).expect("open");
            conn.execute("CREATE TABLE t (n INTEGER)", &[])
                .await
                .expect("create table");
            conn.execute("INSERT INTO t (n) VALUES (42)", &[])
                .await
                .expect("insert");
        }

        let conn = SqliteConnection::open(&path_str).expect("reopen");
        let result = conn.query("SELECT n FROM t", &[]).await.expect("select");
        assert_eq!(result.rows[0].get(0).and_then(|v| v.as_i64()), Some(42));
    }

    #[tokio::test]
    async fn test_open_missing_parent_directory() {
        let err = SqliteConnection::open("/nonexistent-basalt-dir/test.db").expect_err("open fails");
        assert!(matches!(err, BasaltError::Connection(_)));
    }
}
