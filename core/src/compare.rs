//! Snapshot-to-snapshot table comparison
//!
//! The primary contract is the unified diff: a single change feed over two
//! captured table files classifying each differing row as added, removed or
//! changed. When primary keys are known the classification, the summary
//! counts and the requested page are all produced by one query over a shared
//! CTE, so pagination never recomputes or drifts from the summary. Without
//! primary keys the engine falls back to set difference and no row can be
//! classified as changed.

use crate::catalog::Catalog;
use crate::config::StorageConfig;
use crate::error::{Result, TablesnapError};
use crate::model::TableMeta;
use crate::query::{self, ColumnInfo, QueryValue};
use crate::sql::{quote_ident, quote_literal};
use crate::storage::StorageBackend;
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffKind {
    Added,
    Removed,
    Changed,
}

impl DiffKind {
    fn parse(tag: &str) -> Result<Self> {
        match tag {
            "ADDED" => Ok(DiffKind::Added),
            "REMOVED" => Ok(DiffKind::Removed),
            "CHANGED" => Ok(DiffKind::Changed),
            other => Err(TablesnapError::query_execution(format!(
                "unexpected diff tag: {other}"
            ))),
        }
    }
}

/// One row of a unified diff. Both value vectors always match the column
/// list in length; the absent side of an added or removed row is all nulls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffRow {
    pub kind: DiffKind,
    pub left: Vec<QueryValue>,
    pub right: Vec<QueryValue>,
    /// Indices of non-key columns whose rendered values differ, only
    /// populated for changed rows
    pub changed_columns: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: u64,
    pub removed: u64,
    pub changed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedDiff {
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
    pub rows: Vec<DiffRow>,
    pub total_rows: u64,
    pub summary: DiffSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStats {
    pub name: String,
    pub left_distinct: u64,
    pub left_nulls: u64,
    pub right_distinct: u64,
    pub right_nulls: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStats {
    pub left_rows: u64,
    pub right_rows: u64,
    pub columns: Vec<ColumnStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowSets {
    pub columns: Vec<ColumnInfo>,
    pub added: Vec<Vec<QueryValue>>,
    pub removed: Vec<Vec<QueryValue>>,
}

fn source_ctes(left_uri: &str, right_uri: &str) -> Result<String> {
    crate::sql::guard::validate_uri(left_uri)?;
    crate::sql::guard::validate_uri(right_uri)?;
    Ok(format!(
        "l AS (SELECT * FROM read_parquet({})), r AS (SELECT * FROM read_parquet({}))",
        quote_literal(left_uri),
        quote_literal(right_uri)
    ))
}

fn expect_integer(value: &QueryValue) -> u64 {
    match value {
        QueryValue::Integer(i) => (*i).max(0) as u64,
        _ => 0,
    }
}

/// Unified diff between two resolved table files, full-outer-join path.
///
/// Primary keys must be non-empty; callers without keys go through
/// [`diff_table_files_no_keys`].
pub fn diff_table_files_with_keys(
    connection: &Connection,
    left_uri: &str,
    right_uri: &str,
    primary_keys: &[String],
    limit: u32,
    offset: u64,
) -> Result<UnifiedDiff> {
    let columns = query::describe_file(connection, left_uri)?;
    let key_set: Vec<&str> = primary_keys.iter().map(String::as_str).collect();
    let non_keys: Vec<&ColumnInfo> = columns
        .iter()
        .filter(|c| !key_set.contains(&c.name.as_str()))
        .collect();

    let join_condition = primary_keys
        .iter()
        .map(|k| format!("l.{key} = r.{key}", key = quote_ident(k)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let first_key = quote_ident(&primary_keys[0]);

    // A row surfaces only when one side is missing or a non-key column
    // differs under null-safe comparison.
    let changed_predicate = if non_keys.is_empty() {
        "FALSE".to_string()
    } else {
        non_keys
            .iter()
            .map(|c| format!("l.{col} IS DISTINCT FROM r.{col}", col = quote_ident(&c.name)))
            .collect::<Vec<_>>()
            .join(" OR ")
    };

    let mut projection = vec![format!(
        "CASE WHEN l.{first_key} IS NULL THEN 'ADDED' \
         WHEN r.{first_key} IS NULL THEN 'REMOVED' \
         ELSE 'CHANGED' END AS diff_kind"
    )];
    for column in &columns {
        projection.push(format!(
            "l.{col} AS {alias}",
            col = quote_ident(&column.name),
            alias = quote_ident(&format!("l_{}", column.name))
        ));
    }
    for column in &columns {
        projection.push(format!(
            "r.{col} AS {alias}",
            col = quote_ident(&column.name),
            alias = quote_ident(&format!("r_{}", column.name))
        ));
    }

    let order_terms = primary_keys
        .iter()
        .map(|k| {
            format!(
                "coalesce(l.{key}, r.{key}) ASC",
                key = quote_ident(k)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "WITH {sources}, \
         joined AS (SELECT {projection}, {order_keys} FROM l FULL OUTER JOIN r ON {join_condition} \
         WHERE l.{first_key} IS NULL OR r.{first_key} IS NULL OR ({changed_predicate})), \
         summary AS (SELECT \
           count(*) FILTER (WHERE diff_kind = 'ADDED') AS n_added, \
           count(*) FILTER (WHERE diff_kind = 'REMOVED') AS n_removed, \
           count(*) FILTER (WHERE diff_kind = 'CHANGED') AS n_changed \
           FROM joined), \
         page AS (SELECT * FROM joined ORDER BY {page_order} LIMIT {limit} OFFSET {offset}) \
         SELECT s.n_added, s.n_removed, s.n_changed, p.* \
         FROM summary s LEFT JOIN page p ON true \
         ORDER BY {result_order}",
        sources = source_ctes(left_uri, right_uri)?,
        projection = projection.join(", "),
        order_keys = primary_keys
            .iter()
            .enumerate()
            .map(|(i, k)| format!(
                "coalesce(l.{key}, r.{key}) AS {alias}",
                key = quote_ident(k),
                alias = quote_ident(&format!("sort_key_{i}"))
            ))
            .collect::<Vec<_>>()
            .join(", "),
        join_condition = join_condition,
        first_key = first_key,
        changed_predicate = changed_predicate,
        page_order = primary_keys
            .iter()
            .enumerate()
            .map(|(i, _)| format!("{} ASC", quote_ident(&format!("sort_key_{i}"))))
            .collect::<Vec<_>>()
            .join(", "),
        result_order = primary_keys
            .iter()
            .enumerate()
            .map(|(i, _)| format!("p.{} ASC", quote_ident(&format!("sort_key_{i}"))))
            .collect::<Vec<_>>()
            .join(", "),
    );

    let (_, raw_rows) = query::execute_rows(connection, &sql)?;
    let column_count = columns.len();
    let key_indices: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| key_set.contains(&c.name.as_str()))
        .map(|(i, _)| i)
        .collect();

    let mut summary = DiffSummary::default();
    let mut rows = Vec::new();
    for raw in &raw_rows {
        summary = DiffSummary {
            added: expect_integer(&raw[0]),
            removed: expect_integer(&raw[1]),
            changed: expect_integer(&raw[2]),
        };
        // Empty page still yields one summary-only row from the left join
        if raw[3].is_null() {
            continue;
        }
        let kind = match &raw[3] {
            QueryValue::String(tag) => DiffKind::parse(tag)?,
            other => {
                return Err(TablesnapError::query_execution(format!(
                    "unexpected diff tag value: {other:?}"
                )))
            }
        };
        let left: Vec<QueryValue> = raw[4..4 + column_count].to_vec();
        let right: Vec<QueryValue> = raw[4 + column_count..4 + 2 * column_count].to_vec();
        let changed_columns = if kind == DiffKind::Changed {
            (0..column_count)
                .filter(|i| !key_indices.contains(i))
                .filter(|&i| left[i].render() != right[i].render() || left[i].is_null() != right[i].is_null())
                .collect()
        } else {
            Vec::new()
        };
        rows.push(DiffRow {
            kind,
            left,
            right,
            changed_columns,
        });
    }

    Ok(UnifiedDiff {
        columns,
        primary_keys: primary_keys.to_vec(),
        rows,
        total_rows: summary.added + summary.removed + summary.changed,
        summary,
    })
}

/// Set-difference fallback when no primary key is known. Rows present only
/// on the right are added, rows present only on the left are removed, and
/// the changed count is always zero.
pub fn diff_table_files_no_keys(
    connection: &Connection,
    left_uri: &str,
    right_uri: &str,
    limit: u32,
    offset: u64,
) -> Result<UnifiedDiff> {
    let columns = query::describe_file(connection, left_uri)?;
    let column_list = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "WITH {sources}, \
         joined AS (\
           SELECT 'ADDED' AS diff_kind, * FROM (SELECT * FROM r EXCEPT SELECT * FROM l) \
           UNION ALL \
           SELECT 'REMOVED' AS diff_kind, * FROM (SELECT * FROM l EXCEPT SELECT * FROM r)), \
         summary AS (SELECT \
           count(*) FILTER (WHERE diff_kind = 'ADDED') AS n_added, \
           count(*) FILTER (WHERE diff_kind = 'REMOVED') AS n_removed \
           FROM joined), \
         page AS (SELECT * FROM joined ORDER BY diff_kind, {column_list} LIMIT {limit} OFFSET {offset}) \
         SELECT s.n_added, s.n_removed, p.* \
         FROM summary s LEFT JOIN page p ON true \
         ORDER BY p.diff_kind, {page_columns}",
        sources = source_ctes(left_uri, right_uri)?,
        column_list = column_list,
        page_columns = columns
            .iter()
            .map(|c| format!("p.{}", quote_ident(&c.name)))
            .collect::<Vec<_>>()
            .join(", "),
    );

    let (_, raw_rows) = query::execute_rows(connection, &sql)?;
    let column_count = columns.len();
    let mut summary = DiffSummary::default();
    let mut rows = Vec::new();
    for raw in &raw_rows {
        summary = DiffSummary {
            added: expect_integer(&raw[0]),
            removed: expect_integer(&raw[1]),
            changed: 0,
        };
        if raw[2].is_null() {
            continue;
        }
        let kind = match &raw[2] {
            QueryValue::String(tag) => DiffKind::parse(tag)?,
            other => {
                return Err(TablesnapError::query_execution(format!(
                    "unexpected diff tag value: {other:?}"
                )))
            }
        };
        let values: Vec<QueryValue> = raw[3..3 + column_count].to_vec();
        let nulls = vec![QueryValue::Null; column_count];
        let (left, right) = match kind {
            DiffKind::Added => (nulls, values),
            DiffKind::Removed => (values, nulls),
            DiffKind::Changed => {
                return Err(TablesnapError::query_execution(
                    "set-difference diff produced a changed row".to_string(),
                ))
            }
        };
        rows.push(DiffRow {
            kind,
            left,
            right,
            changed_columns: Vec::new(),
        });
    }

    Ok(UnifiedDiff {
        columns,
        primary_keys: Vec::new(),
        rows,
        total_rows: summary.added + summary.removed,
        summary,
    })
}

/// Unified diff between two resolved table files, choosing the join or
/// set-difference strategy based on the known primary keys
pub fn diff_table_files(
    connection: &Connection,
    left_uri: &str,
    right_uri: &str,
    primary_keys: &[String],
    limit: u32,
    offset: u64,
) -> Result<UnifiedDiff> {
    if primary_keys.is_empty() {
        diff_table_files_no_keys(connection, left_uri, right_uri, limit, offset)
    } else {
        diff_table_files_with_keys(connection, left_uri, right_uri, primary_keys, limit, offset)
    }
}

/// Added/removed row sets between two resolved table files
pub fn compare_rows(
    connection: &Connection,
    left_uri: &str,
    right_uri: &str,
) -> Result<RowSets> {
    let sources = source_ctes(left_uri, right_uri)?;
    let columns = query::describe_file(connection, left_uri)?;
    let order = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let added_sql = format!(
        "WITH {sources} SELECT * FROM (SELECT * FROM r EXCEPT SELECT * FROM l) ORDER BY {order}"
    );
    let removed_sql = format!(
        "WITH {sources} SELECT * FROM (SELECT * FROM l EXCEPT SELECT * FROM r) ORDER BY {order}"
    );

    let (_, added) = query::execute_rows(connection, &added_sql)?;
    let (_, removed) = query::execute_rows(connection, &removed_sql)?;
    Ok(RowSets {
        columns,
        added,
        removed,
    })
}

/// Row counts for both sides plus per-column distinct and null counts.
/// One aggregate query per column and side, acceptable against
/// already-materialized snapshot files.
pub fn compare_stats(
    connection: &Connection,
    left_uri: &str,
    right_uri: &str,
) -> Result<TableStats> {
    crate::sql::guard::validate_uri(left_uri)?;
    crate::sql::guard::validate_uri(right_uri)?;

    let count_for = |uri: &str| -> Result<u64> {
        let sql = format!("SELECT count(*) FROM read_parquet({})", quote_literal(uri));
        connection
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n.max(0) as u64)
            .map_err(|e| TablesnapError::query_execution(format!("count failed: {e}")))
    };
    let left_rows = count_for(left_uri)?;
    let right_rows = count_for(right_uri)?;

    let column_stats_for = |uri: &str, column: &str| -> Result<(u64, u64)> {
        let sql = format!(
            "SELECT count(DISTINCT {col}), count(*) FILTER (WHERE {col} IS NULL) \
             FROM read_parquet({uri})",
            col = quote_ident(column),
            uri = quote_literal(uri),
        );
        connection
            .query_row(&sql, [], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .map(|(d, n)| (d.max(0) as u64, n.max(0) as u64))
            .map_err(|e| TablesnapError::query_execution(format!("column stats failed: {e}")))
    };

    let described = query::describe_file(connection, left_uri)?;
    let mut columns = Vec::with_capacity(described.len());
    for column in &described {
        let (left_distinct, left_nulls) = column_stats_for(left_uri, &column.name)?;
        let (right_distinct, right_nulls) = column_stats_for(right_uri, &column.name)?;
        columns.push(ColumnStats {
            name: column.name.clone(),
            left_distinct,
            left_nulls,
            right_distinct,
            right_nulls,
        });
    }

    Ok(TableStats {
        left_rows,
        right_rows,
        columns,
    })
}

fn resolve_table(
    catalog: &Catalog,
    snapshot_id: &str,
    table_name: &str,
) -> Result<(crate::model::SnapshotMeta, TableMeta)> {
    let snapshot = catalog.load_snapshot(snapshot_id)?;
    let table = snapshot
        .find_table(table_name)
        .ok_or_else(|| TablesnapError::TableNotFound {
            snapshot_id: snapshot_id.to_string(),
            table: table_name.to_string(),
        })?
        .clone();
    Ok((snapshot, table))
}

/// Unified diff between the same table in two snapshots. Primary keys come
/// from the left snapshot's table metadata.
pub fn compare_unified_diff(
    backend: Arc<dyn StorageBackend>,
    storage_config: &StorageConfig,
    left_snapshot_id: &str,
    right_snapshot_id: &str,
    table_name: &str,
    limit: u32,
    offset: u64,
) -> Result<UnifiedDiff> {
    let catalog = Catalog::new(backend);
    let (_, left_table) = resolve_table(&catalog, left_snapshot_id, table_name)?;
    let (_, right_table) = resolve_table(&catalog, right_snapshot_id, table_name)?;

    let left_uri = catalog.resolve_uri(&left_table.storage_path)?;
    let right_uri = catalog.resolve_uri(&right_table.storage_path)?;

    let connection = query::open_session(storage_config)?;
    diff_table_files(
        &connection,
        &left_uri,
        &right_uri,
        &left_table.primary_keys,
        limit,
        offset,
    )
}

/// Statistics comparison between the same table in two snapshots
pub fn compare_snapshot_stats(
    backend: Arc<dyn StorageBackend>,
    storage_config: &StorageConfig,
    left_snapshot_id: &str,
    right_snapshot_id: &str,
    table_name: &str,
) -> Result<TableStats> {
    let catalog = Catalog::new(backend);
    let (_, left_table) = resolve_table(&catalog, left_snapshot_id, table_name)?;
    let (_, right_table) = resolve_table(&catalog, right_snapshot_id, table_name)?;

    let left_uri = catalog.resolve_uri(&left_table.storage_path)?;
    let right_uri = catalog.resolve_uri(&right_table.storage_path)?;

    let connection = query::open_session(storage_config)?;
    compare_stats(&connection, &left_uri, &right_uri)
}
