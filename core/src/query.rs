//! Federated query engine over snapshot-backed files
//!
//! Every call opens a fresh in-memory engine session configured for the
//! active storage backend, applies internally generated setup statements to
//! build the per-request namespace, then executes the validated user query.
//! Sessions are never pooled or reused across calls.

use crate::config::StorageConfig;
use crate::error::{Result, TablesnapError};
use crate::sql::{guard, quote_literal};
use duckdb::Connection;
use serde::{Deserialize, Serialize};

pub const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum QueryValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl QueryValue {
    pub fn from_engine(value: duckdb::types::Value) -> Self {
        use duckdb::types::Value;
        match value {
            Value::Null => QueryValue::Null,
            Value::Boolean(b) => QueryValue::Boolean(b),
            Value::TinyInt(i) => QueryValue::Integer(i as i64),
            Value::SmallInt(i) => QueryValue::Integer(i as i64),
            Value::Int(i) => QueryValue::Integer(i as i64),
            Value::BigInt(i) => QueryValue::Integer(i),
            Value::UTinyInt(i) => QueryValue::Integer(i as i64),
            Value::USmallInt(i) => QueryValue::Integer(i as i64),
            Value::UInt(i) => QueryValue::Integer(i as i64),
            Value::UBigInt(i) => QueryValue::Integer(i as i64),
            Value::HugeInt(i) => match i64::try_from(i) {
                Ok(v) => QueryValue::Integer(v),
                Err(_) => QueryValue::String(i.to_string()),
            },
            Value::Float(f) => QueryValue::Float(f as f64),
            Value::Double(f) => QueryValue::Float(f),
            Value::Decimal(d) => QueryValue::String(d.to_string()),
            Value::Text(s) => QueryValue::String(s),
            Value::Enum(s) => QueryValue::String(s),
            Value::Blob(b) => QueryValue::String(format!("BLOB({} bytes)", b.len())),
            Value::Date32(d) => QueryValue::String(format_date(d)),
            Value::Time64(unit, t) => QueryValue::String(format_time(unit.to_micros(t))),
            Value::Timestamp(unit, ts) => QueryValue::String(format_timestamp(unit.to_micros(ts))),
            other => QueryValue::String(format!("{other:?}")),
        }
    }

    /// Render a value the way diff cell comparison sees it
    pub fn render(&self) -> String {
        match self {
            QueryValue::Null => String::new(),
            QueryValue::String(s) => s.clone(),
            QueryValue::Integer(i) => i.to_string(),
            QueryValue::Float(f) => f.to_string(),
            QueryValue::Boolean(b) => b.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, QueryValue::Null)
    }
}

fn format_date(days: i32) -> String {
    match chrono::DateTime::from_timestamp(i64::from(days) * 86_400, 0) {
        Some(dt) => dt.date_naive().to_string(),
        None => format!("Date({days})"),
    }
}

fn format_time(micros: i64) -> String {
    let seconds = micros.div_euclid(1_000_000);
    let nanos = micros.rem_euclid(1_000_000) as u32 * 1_000;
    match u32::try_from(seconds)
        .ok()
        .and_then(|s| chrono::NaiveTime::from_num_seconds_from_midnight_opt(s, nanos))
    {
        Some(time) => time.to_string(),
        None => format!("Time({micros})"),
    }
}

fn format_timestamp(micros: i64) -> String {
    match chrono::DateTime::from_timestamp_micros(micros) {
        Some(ts) => ts.naive_utc().to_string(),
        None => format!("Timestamp({micros})"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<QueryValue>>,
    pub total_rows: u64,
}

/// Open a fresh engine session configured for the active storage backend.
/// Remote object-store credentials, region and endpoint are installed as
/// session parameters so the engine can read `s3://` locations directly.
pub fn open_session(config: &StorageConfig) -> Result<Connection> {
    let connection = Connection::open_in_memory()?;
    connection.execute("SET enable_progress_bar=false", [])?;

    if let StorageConfig::S3 {
        region,
        endpoint,
        access_key_id,
        secret_access_key,
        ..
    } = config
    {
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        let extension_dir = home.join(".tablesnap").join("extensions");
        std::fs::create_dir_all(&extension_dir)?;
        connection.execute(
            &format!("SET extension_directory={}", quote_literal(&extension_dir.to_string_lossy())),
            [],
        )?;

        connection.execute("INSTALL httpfs", [])?;
        connection.execute("LOAD httpfs", [])?;

        connection.execute(&format!("SET s3_region={}", quote_literal(region)), [])?;
        if let Some(key) = access_key_id {
            connection.execute(&format!("SET s3_access_key_id={}", quote_literal(key)), [])?;
        }
        if let Some(secret) = secret_access_key {
            connection.execute(
                &format!("SET s3_secret_access_key={}", quote_literal(secret)),
                [],
            )?;
        }
        if let Some(endpoint) = endpoint {
            connection.execute(&format!("SET s3_endpoint={}", quote_literal(endpoint)), [])?;
        }
    }

    Ok(connection)
}

/// Execute a statement with the DESCRIBE approach: column names and types
/// first, then row values through the engine's native types.
pub fn execute_rows(
    connection: &Connection,
    sql: &str,
) -> Result<(Vec<ColumnInfo>, Vec<Vec<QueryValue>>)> {
    let mut describe_stmt = connection
        .prepare(&format!("DESCRIBE {sql}"))
        .map_err(|e| TablesnapError::query_execution(format!("failed to describe query: {e}")))?;
    let described = describe_stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                type_name: row.get(1)?,
            })
        })
        .map_err(|e| TablesnapError::query_execution(format!("failed to read schema: {e}")))?;

    let mut columns = Vec::new();
    for column in described {
        columns.push(
            column.map_err(|e| TablesnapError::query_execution(format!("schema error: {e}")))?,
        );
    }

    let column_count = columns.len();
    let mut stmt = connection
        .prepare(sql)
        .map_err(|e| TablesnapError::query_execution(format!("failed to prepare query: {e}")))?;
    let mapped = stmt
        .query_map([], |row| {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value: duckdb::types::Value = row.get(i)?;
                values.push(QueryValue::from_engine(value));
            }
            Ok(values)
        })
        .map_err(|e| TablesnapError::query_execution(format!("query execution failed: {e}")))?;

    let mut rows = Vec::new();
    for row in mapped {
        rows.push(row.map_err(|e| TablesnapError::query_execution(format!("row error: {e}")))?);
    }

    Ok((columns, rows))
}

fn validate_page(limit: u32) -> Result<()> {
    if limit == 0 || limit > MAX_LIMIT {
        return Err(TablesnapError::query_rejected(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    Ok(())
}

/// Execute a validated, read-only query against the per-request namespace.
///
/// The inner query is wrapped once for a total row count and once more with
/// LIMIT/OFFSET applied, so `total_rows` reflects the full result set
/// regardless of the requested page. Setup statements are internally
/// generated only and never user input.
pub fn execute_query(
    storage_config: &StorageConfig,
    sql: &str,
    limit: u32,
    offset: u64,
    setup_statements: &[String],
) -> Result<QueryResult> {
    validate_page(limit)?;
    guard::validate_read_only(sql)?;

    let connection = open_session(storage_config)?;
    for statement in setup_statements {
        connection
            .execute(statement, [])
            .map_err(|e| TablesnapError::query_execution(format!("namespace setup failed: {e}")))?;
    }

    let count_sql = format!("SELECT count(*) FROM ({sql}) AS inner_query");
    let total_rows: u64 = connection
        .query_row(&count_sql, [], |row| row.get::<_, i64>(0))
        .map(|n| n.max(0) as u64)
        .map_err(|e| TablesnapError::query_execution(format!("count query failed: {e}")))?;

    let page_sql = format!("SELECT * FROM ({sql}) AS inner_query LIMIT {limit} OFFSET {offset}");
    let (columns, rows) = execute_rows(&connection, &page_sql)?;

    Ok(QueryResult {
        columns,
        rows,
        total_rows,
    })
}

/// Schema introspection for a single resolved table file
pub fn describe_table(storage_config: &StorageConfig, uri: &str) -> Result<Vec<ColumnInfo>> {
    guard::validate_uri(uri)?;
    let connection = open_session(storage_config)?;
    describe_file(&connection, uri)
}

pub(crate) fn describe_file(connection: &Connection, uri: &str) -> Result<Vec<ColumnInfo>> {
    let sql = format!("SELECT * FROM read_parquet({})", quote_literal(uri));
    let (columns, _) = execute_rows(connection, &format!("{sql} LIMIT 0"))?;
    Ok(columns)
}

/// Filtered, sorted preview of a single resolved table file
pub fn preview_table(
    storage_config: &StorageConfig,
    uri: &str,
    where_clause: Option<&str>,
    order_by: Option<&str>,
    limit: u32,
    offset: u64,
) -> Result<QueryResult> {
    guard::validate_uri(uri)?;

    let mut sql = format!("SELECT * FROM read_parquet({})", quote_literal(uri));
    if let Some(filter) = where_clause {
        guard::validate_where(filter)?;
        sql.push_str(&format!(" WHERE {filter}"));
    }
    if let Some(order) = order_by {
        guard::validate_order_by(order)?;
        sql.push_str(&format!(" ORDER BY {order}"));
    }

    execute_query(storage_config, &sql, limit, offset, &[])
}
