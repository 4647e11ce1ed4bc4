//! Table codec: tabular result set <-> compressed columnar file
//!
//! Encoding streams a query's result set straight to Parquet through the
//! engine's COPY; row count and byte size are reported from the Parquet
//! footer rather than a second scan.

use crate::error::{Result, TablesnapError};
use crate::query::QueryValue;
use crate::sql::quote_literal;
use duckdb::Connection;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::path::Path;

/// Size and shape of one encoded table file
#[derive(Debug, Clone, Copy)]
pub struct TableFileInfo {
    pub row_count: u64,
    pub byte_size: u64,
}

/// Write the result set of `query` to a Parquet file at `path`
pub fn write_table_file(
    connection: &Connection,
    query: &str,
    path: &Path,
) -> Result<TableFileInfo> {
    let target = path.to_string_lossy().to_string();
    connection
        .execute(
            &format!(
                "COPY ({query}) TO {} (FORMAT PARQUET, COMPRESSION ZSTD)",
                quote_literal(&target)
            ),
            [],
        )
        .map_err(|e| TablesnapError::query_execution(format!("failed to encode table: {e}")))?;

    inspect_table_file(path)
}

/// Encode a query's result set to Parquet, returning the file bytes
pub fn encode_table(connection: &Connection, query: &str) -> Result<(Vec<u8>, TableFileInfo)> {
    let staging = tempfile::tempdir()?;
    let path = staging.path().join("data.parquet");
    let info = write_table_file(connection, query, &path)?;
    let bytes = std::fs::read(&path)?;
    Ok((bytes, info))
}

/// Read row count and byte size from a Parquet file's footer
pub fn inspect_table_file(path: &Path) -> Result<TableFileInfo> {
    let byte_size = std::fs::metadata(path)?.len();
    let file = std::fs::File::open(path)?;
    let reader = SerializedFileReader::new(file)
        .map_err(|e| TablesnapError::storage(format!("unreadable parquet footer: {e}")))?;
    let row_count = reader.metadata().file_metadata().num_rows() as u64;
    Ok(TableFileInfo {
        row_count,
        byte_size,
    })
}

/// Decode a table file back into column names and row values
pub fn read_table_file(
    connection: &Connection,
    uri: &str,
) -> Result<(Vec<String>, Vec<Vec<QueryValue>>)> {
    crate::sql::guard::validate_uri(uri)?;

    let sql = format!("SELECT * FROM read_parquet({})", quote_literal(uri));
    let (columns, rows) = crate::query::execute_rows(connection, &sql)?;
    Ok((columns.into_iter().map(|c| c.name).collect(), rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_rows_and_nulls() {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch(
                "CREATE TABLE users (id INTEGER, name VARCHAR, score DOUBLE);
                 INSERT INTO users VALUES (1, 'Alice', 95.5), (2, NULL, NULL), (3, 'Carol', 0.0);",
            )
            .unwrap();

        let staging = tempfile::tempdir().unwrap();
        let path = staging.path().join("users.parquet");
        let info =
            write_table_file(&connection, "SELECT * FROM users ORDER BY id", &path).unwrap();
        assert_eq!(info.row_count, 3);
        assert!(info.byte_size > 0);

        let (columns, rows) =
            read_table_file(&connection, &path.to_string_lossy()).unwrap();
        assert_eq!(columns, vec!["id", "name", "score"]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][1], QueryValue::String("Alice".to_string()));
        assert_eq!(rows[1][1], QueryValue::Null);
        assert_eq!(rows[1][2], QueryValue::Null);
        assert_eq!(rows[2][2], QueryValue::Float(0.0));
    }

    #[test]
    fn encode_returns_bytes_matching_footer() {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t SELECT * FROM range(100);")
            .unwrap();

        let (bytes, info) = encode_table(&connection, "SELECT * FROM t").unwrap();
        assert_eq!(info.row_count, 100);
        assert_eq!(info.byte_size as usize, bytes.len());
    }
}
