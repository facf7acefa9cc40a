//! PostgreSQL connection implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use basalt_core::{
    BasaltError, ColumnMeta, Connection, ExecResult, QueryResult, Result, Row, Transaction, Value,
};
use bytes::BytesMut;
use tokio::sync::Mutex;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row as PgRow, Statement};

use crate::factory::PostgresConfig;

/// Map common PostgreSQL error codes onto readable messages
fn format_postgres_error(e: &tokio_postgres::Error) -> String {
    let Some(db) = e.as_db_error() else {
        return e.to_string();
    };
    let code = db.code().code();
    let message = db.message();
    match code {
        "23505" => format!("unique constraint violation: {}", message),
        "23503" => format!("foreign key violation: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "42P01" => format!("relation does not exist: {}", message),
        "42601" => format!("syntax error: {}", message),
        "22007" => format!("invalid datetime format: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        _ => format!("{} (code: {})", message, code),
    }
}

/// PostgreSQL connection wrapper
///
/// Owns one client over one socket. The driver task that pumps the socket is
/// spawned on the ambient runtime and winds down when the client is dropped.
pub struct PostgresConnection {
    client: Arc<Mutex<Client>>,
    closed: AtomicBool,
}

impl PostgresConnection {
    /// Connect to a PostgreSQL database
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        tracing::info!(
            host = %config.host(),
            port = config.port(),
            database = %config.database(),
            "connecting to PostgreSQL database"
        );

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(config.host())
            .port(config.port())
            .dbname(config.database());
        if let Some(user) = config.user() {
            pg_config.user(user);
        }
        if let Some(password) = config.password() {
            pg_config.password(password);
        }
        if let Some(name) = config.application_name() {
            pg_config.application_name(name);
        }

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
            BasaltError::Connection(format!("Failed to connect to PostgreSQL: {}", e))
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        tracing::info!(
            host = %config.host(),
            database = %config.database(),
            "PostgreSQL connection established"
        );
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BasaltError::Connection("Connection is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.check_open()?;
        let client = self.client.lock().await;
        run_query(&client, sql, params).await
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.check_open()?;
        let client = self.client.lock().await;
        run_execute(&client, sql, params).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.check_open()?;
        tracing::debug!("beginning PostgreSQL transaction");

        {
            let client = self.client.lock().await;
            client.execute("BEGIN", &[]).await.map_err(|e| {
                BasaltError::Query(format!(
                    "Failed to begin transaction: {}",
                    format_postgres_error(&e)
                ))
            })?;
        }

        Ok(Box::new(PostgresTransaction {
            client: Arc::clone(&self.client),
            committed: false,
            rolled_back: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing PostgreSQL connection");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// PostgreSQL transaction wrapper
///
/// Holds the client mutex for each statement so everything between BEGIN and
/// COMMIT runs on the one connection, in order.
pub struct PostgresTransaction {
    client: Arc<Mutex<Client>>,
    committed: bool,
    rolled_back: bool,
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        // No async rollback in Drop; the server discards the open
        // transaction when the connection issues the next BEGIN.
        if !self.committed && !self.rolled_back {
            tracing::warn!("PostgreSQL transaction dropped without commit or rollback");
        }
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        if self.rolled_back {
            return Err(BasaltError::Query("Transaction already rolled back".into()));
        }
        if self.committed {
            return Err(BasaltError::Query("Transaction already committed".into()));
        }

        let client = self.client.lock().await;
        client.execute("COMMIT", &[]).await.map_err(|e| {
            BasaltError::Query(format!(
                "Failed to commit transaction: {}",
                format_postgres_error(&e)
            ))
        })?;
        drop(client);

        self.committed = true;
        tracing::debug!("PostgreSQL transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        if self.committed {
            return Err(BasaltError::Query("Transaction already committed".into()));
        }
        if self.rolled_back {
            return Ok(());
        }

        let client = self.client.lock().await;
        client.execute("ROLLBACK", &[]).await.map_err(|e| {
            BasaltError::Query(format!(
                "Failed to rollback transaction: {}",
                format_postgres_error(&e)
            ))
        })?;
        drop(client);

        self.rolled_back = true;
        tracing::debug!("PostgreSQL transaction rolled back");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let client = self.client.lock().await;
        run_query(&client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let client = self.client.lock().await;
        run_execute(&client, sql, params).await
    }
}

/// Run a row-returning statement on the locked client
async fn run_query(client: &Client, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start_time = Instant::now();

    // Prepare first so the target type of each parameter is known.
    let statement = client.prepare(sql).await.map_err(|e| {
        BasaltError::Query(format!("Failed to prepare query: {}", format_postgres_error(&e)))
    })?;

    let pg_params = typed_params(&statement, params);
    let param_refs: Vec<&(dyn ToSql + Sync)> =
        pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    let pg_rows = client.query(&statement, &param_refs).await.map_err(|e| {
        BasaltError::Query(format!("Failed to execute query: {}", format_postgres_error(&e)))
    })?;

    // Column metadata comes from the prepared statement so empty result sets
    // still carry it.
    let mut names = Vec::new();
    let mut columns = Vec::new();
    for (idx, col) in statement.columns().iter().enumerate() {
        names.push(col.name().to_string());
        columns.push(ColumnMeta {
            name: col.name().to_string(),
            data_type: col.type_().name().to_string(),
            nullable: true,
            ordinal: idx,
        });
    }
    let names: Arc<[String]> = names.into();

    let mut rows = Vec::new();
    for pg_row in &pg_rows {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(postgres_to_value(pg_row, idx)?);
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

/// Run a data-modifying statement on the locked client
async fn run_execute(client: &Client, sql: &str, params: &[Value]) -> Result<ExecResult> {
    let statement = client.prepare(sql).await.map_err(|e| {
        BasaltError::Query(format!(
            "Failed to prepare statement: {}",
            format_postgres_error(&e)
        ))
    })?;

    let pg_params = typed_params(&statement, params);
    let param_refs: Vec<&(dyn ToSql + Sync)> =
        pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    let rows_affected = client.execute(&statement, &param_refs).await.map_err(|e| {
        BasaltError::Query(format!(
            "Failed to execute statement: {}",
            format_postgres_error(&e)
        ))
    })?;

    tracing::debug!(affected_rows = rows_affected, "statement executed");
    Ok(ExecResult::with_affected(rows_affected))
}

/// Convert parameters to `PgValue`s matched to the statement's param types
fn typed_params(statement: &Statement, params: &[Value]) -> Vec<PgValue> {
    let param_types = statement.params();
    params
        .iter()
        .enumerate()
        .map(|(i, value)| match param_types.get(i) {
            Some(ty) => PgValue::from_value_for_type(value, ty),
            None => PgValue::from_value(value),
        })
        .collect()
}

/// Strongly typed parameter wrapper for tokio-postgres
///
/// tokio-postgres writes binary parameters, so an i64 sent at an INT4 column
/// is a wire error; the conversion picks the variant whose width matches the
/// prepared statement's parameter type.
#[derive(Debug)]
enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
}

impl PgValue {
    /// Convert a value into the variant matching the target column type
    fn from_value_for_type(value: &Value, target_type: &Type) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),

            Value::Int16(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int32(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int64(v) => Self::coerce_int(*v, target_type),

            Value::Float32(v) => match *target_type {
                Type::FLOAT8 => PgValue::Float64(*v as f64),
                _ => PgValue::Float32(*v),
            },
            Value::Float64(v) => match *target_type {
                Type::FLOAT4 => PgValue::Float32(*v as f32),
                _ => PgValue::Float64(*v),
            },

            Value::Decimal(v) => PgValue::String(v.clone()),
            Value::String(v) => match *target_type {
                // String literals aimed at json columns are sent as json.
                Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(v)
                    .map(PgValue::Json)
                    .unwrap_or_else(|_| PgValue::String(v.clone())),
                _ => PgValue::String(v.clone()),
            },
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Array(_) => PgValue::String(value.to_string()),
        }
    }

    /// Pick the integer variant whose wire width matches the column
    fn coerce_int(value: i64, target_type: &Type) -> Self {
        match *target_type {
            Type::INT2 => PgValue::Int16(value as i16),
            Type::INT4 => PgValue::Int32(value as i32),
            _ => PgValue::Int64(value),
        }
    }

    /// Fallback used when the statement reports no parameter type
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) => PgValue::String(v.clone()),
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Array(_) => PgValue::String(value.to_string()),
        }
    }
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(postgres_types::IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Uuid(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
            PgValue::Date(v) => v.to_sql(ty, out),
            PgValue::Time(v) => v.to_sql(ty, out),
            PgValue::DateTime(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// Text rendering of a binary NUMERIC payload
///
/// tokio-postgres has no built-in decimal type; the wire format is a base
/// 10000 digit-group array with a weight, sign word, and display scale.
#[derive(Debug)]
struct PgNumericString(String);

impl PgNumericString {
    fn parse(raw: &[u8]) -> std::result::Result<String, Box<dyn std::error::Error + Sync + Send>> {
        if raw.len() < 8 {
            return Err("invalid NUMERIC payload: too short".into());
        }

        let ndigits = i16::from_be_bytes([raw[0], raw[1]]) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]);
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = i16::from_be_bytes([raw[6], raw[7]]) as usize;
        if raw.len() < 8 + ndigits * 2 {
            return Err("invalid NUMERIC payload: truncated digits".into());
        }

        if sign == 0xC000 {
            return Ok("NaN".to_string());
        }

        let mut digits = Vec::with_capacity(ndigits);
        for index in 0..ndigits {
            let offset = 8 + index * 2;
            let group = u16::from_be_bytes([raw[offset], raw[offset + 1]]);
            if group > 9999 {
                return Err("invalid NUMERIC payload: group out of range".into());
            }
            digits.push(group);
        }

        if digits.is_empty() {
            return Ok("0".to_string());
        }

        let integer_group_count = if weight >= 0 {
            (weight as usize) + 1
        } else {
            0
        };

        let mut integer_text = String::new();
        if integer_group_count == 0 {
            integer_text.push('0');
        } else {
            for group_index in 0..integer_group_count {
                let group = digits.get(group_index).copied().unwrap_or(0);
                if group_index == 0 {
                    integer_text.push_str(&group.to_string());
                } else {
                    integer_text.push_str(&format!("{group:04}"));
                }
            }
        }

        let mut fraction_text = String::new();
        if dscale > 0 {
            let start = integer_group_count.min(digits.len());
            for group in digits.iter().skip(start) {
                fraction_text.push_str(&format!("{group:04}"));
            }

            if fraction_text.len() < dscale {
                fraction_text.push_str(&"0".repeat(dscale - fraction_text.len()));
            } else {
                fraction_text.truncate(dscale);
            }

            while fraction_text.ends_with('0') {
                fraction_text.pop();
            }
        }

        let mut output = String::new();
        if sign == 0x4000 && integer_text != "0" {
            output.push('-');
        }
        output.push_str(&integer_text);
        if !fraction_text.is_empty() {
            output.push('.');
            output.push_str(&fraction_text);
        }

        Ok(output)
    }
}

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(Self::parse(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Last-resort decode for column types without a dedicated mapping
#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let text = String::from_utf8(raw.to_vec())?;
        Ok(Self(text))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Convert one column of a result row to a basalt value
fn postgres_to_value(row: &PgRow, idx: usize) -> Result<Value> {
    fn fetch<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize) -> Result<Option<T>> {
        row.try_get::<_, Option<T>>(idx)
            .map_err(|e| BasaltError::Query(format!("Failed to decode column {}: {}", idx, e)))
    }

    let ty = row.columns()[idx].type_();
    let value = if *ty == Type::BOOL {
        fetch::<bool>(row, idx)?.map(Value::Bool)
    } else if *ty == Type::INT2 {
        fetch::<i16>(row, idx)?.map(Value::Int16)
    } else if *ty == Type::INT4 {
        fetch::<i32>(row, idx)?.map(Value::Int32)
    } else if *ty == Type::INT8 {
        fetch::<i64>(row, idx)?.map(Value::Int64)
    } else if *ty == Type::FLOAT4 {
        fetch::<f32>(row, idx)?.map(Value::Float32)
    } else if *ty == Type::FLOAT8 {
        fetch::<f64>(row, idx)?.map(Value::Float64)
    } else if *ty == Type::NUMERIC {
        fetch::<PgNumericString>(row, idx)?.map(|v| Value::Decimal(v.0))
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::NAME || *ty == Type::BPCHAR
    {
        fetch::<String>(row, idx)?.map(Value::String)
    } else if *ty == Type::BYTEA {
        fetch::<Vec<u8>>(row, idx)?.map(Value::Bytes)
    } else if *ty == Type::UUID {
        fetch::<uuid::Uuid>(row, idx)?.map(Value::Uuid)
    } else if *ty == Type::DATE {
        fetch::<chrono::NaiveDate>(row, idx)?.map(Value::Date)
    } else if *ty == Type::TIME {
        fetch::<chrono::NaiveTime>(row, idx)?.map(Value::Time)
    } else if *ty == Type::TIMESTAMP {
        fetch::<chrono::NaiveDateTime>(row, idx)?.map(Value::DateTime)
    } else if *ty == Type::TIMESTAMPTZ {
        fetch::<chrono::DateTime<chrono::Utc>>(row, idx)?.map(Value::DateTimeUtc)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        fetch::<serde_json::Value>(row, idx)?.map(Value::Json)
    } else {
        fetch::<PgFallbackString>(row, idx)?.map(|v| Value::String(v.0))
    };

    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_payload(ndigits: i16, weight: i16, sign: u16, dscale: i16, groups: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&ndigits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for group in groups {
            raw.extend_from_slice(&group.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_numeric_parse_fractional() {
        let raw = numeric_payload(2, 0, 0, 1, &[1234, 5000]);
        assert_eq!(PgNumericString::parse(&raw).expect("parse"), "1234.5");
    }

    #[test]
    fn test_numeric_parse_negative() {
        let raw = numeric_payload(2, 0, 0x4000, 1, &[1234, 5000]);
        assert_eq!(PgNumericString::parse(&raw).expect("parse"), "-1234.5");
    }

    #[test]
    fn test_numeric_parse_zero_and_nan() {
        let zero = numeric_payload(0, 0, 0, 0, &[]);
        assert_eq!(PgNumericString::parse(&zero).expect("parse"), "0");

        let nan = numeric_payload(0, 0, 0xC000, 0, &[]);
        assert_eq!(PgNumericString::parse(&nan).expect("parse"), "NaN");
    }

    #[test]
    fn test_numeric_parse_rejects_garbage() {
        assert!(PgNumericString::parse(&[0, 1]).is_err());
        let bad_group = numeric_payload(1, 0, 0, 0, &[10_000]);
        assert!(PgNumericString::parse(&bad_group).is_err());
    }

    #[test]
    fn test_int_coercion_matches_column_width() {
        assert!(matches!(
            PgValue::from_value_for_type(&Value::Int64(7), &Type::INT2),
            PgValue::Int16(7)
        ));
        assert!(matches!(
            PgValue::from_value_for_type(&Value::Int64(7), &Type::INT4),
            PgValue::Int32(7)
        ));
        assert!(matches!(
            PgValue::from_value_for_type(&Value::Int16(7), &Type::INT8),
            PgValue::Int64(7)
        ));
    }

    #[test]
    fn test_float_coercion_matches_column_width() {
        assert!(matches!(
            PgValue::from_value_for_type(&Value::Float64(1.5), &Type::FLOAT4),
            PgValue::Float32(_)
        ));
        assert!(matches!(
            PgValue::from_value_for_type(&Value::Float32(1.5), &Type::FLOAT8),
            PgValue::Float64(_)
        ));
    }

    #[test]
    fn test_string_param_targeting_json_column() {
        let coerced = PgValue::from_value_for_type(&Value::String("{\"a\":1}".into()), &Type::JSONB);
        assert!(matches!(coerced, PgValue::Json(_)));

        let not_json = PgValue::from_value_for_type(&Value::String("plain".into()), &Type::JSONB);
        assert!(matches!(not_json, PgValue::String(_)));
    }
}
