//! Unified diff and statistics over captured table files

mod common;

use common::parquet_fixture;
use duckdb::Connection;
use std::path::PathBuf;
use tablesnap_core::compare::{self, DiffKind};
use tablesnap_core::query::QueryValue;
use tempfile::TempDir;

fn score_fixture(temp: &TempDir) -> (PathBuf, PathBuf) {
    let left = parquet_fixture(
        temp,
        "left.parquet",
        "CREATE TABLE t(id INTEGER, name VARCHAR, score DOUBLE); \
         INSERT INTO t VALUES (1, 'Alice', 95.5), (2, 'Bob', 87.3);",
        "SELECT * FROM t ORDER BY id",
    );
    let right = parquet_fixture(
        temp,
        "right.parquet",
        "CREATE TABLE t(id INTEGER, name VARCHAR, score DOUBLE); \
         INSERT INTO t VALUES (1, 'Alice', 96.0), (3, 'Charlie', 92.1);",
        "SELECT * FROM t ORDER BY id",
    );
    (left, right)
}

fn uri(path: &PathBuf) -> String {
    path.to_string_lossy().to_string()
}

#[test]
fn unified_diff_classifies_rows_with_primary_key() {
    let temp = TempDir::new().unwrap();
    let (left, right) = score_fixture(&temp);
    let connection = Connection::open_in_memory().unwrap();

    let diff = compare::diff_table_files(
        &connection,
        &uri(&left),
        &uri(&right),
        &["id".to_string()],
        10,
        0,
    )
    .unwrap();

    assert_eq!(diff.summary.added, 1);
    assert_eq!(diff.summary.removed, 1);
    assert_eq!(diff.summary.changed, 1);
    assert_eq!(diff.total_rows, 3);
    assert_eq!(diff.primary_keys, vec!["id".to_string()]);
    assert_eq!(diff.rows.len(), 3);

    // Ordered by the coalesced primary key: 1 changed, 2 removed, 3 added
    assert_eq!(diff.rows[0].kind, DiffKind::Changed);
    assert_eq!(diff.rows[1].kind, DiffKind::Removed);
    assert_eq!(diff.rows[2].kind, DiffKind::Added);

    let changed = &diff.rows[0];
    assert_eq!(changed.left[0], QueryValue::Integer(1));
    assert_eq!(changed.right[2], QueryValue::Float(96.0));
    // The score column differs, the key column does not
    assert!(changed.changed_columns.contains(&2));
    assert!(!changed.changed_columns.contains(&0));

    let removed = &diff.rows[1];
    assert_eq!(removed.left[1], QueryValue::String("Bob".to_string()));
    assert!(removed.right[0].is_null());

    let added = &diff.rows[2];
    assert_eq!(added.right[1], QueryValue::String("Charlie".to_string()));
    assert!(added.left[0].is_null());
}

#[test]
fn timestamp_only_changes_are_tracked_per_cell() {
    let temp = TempDir::new().unwrap();
    let left = parquet_fixture(
        &temp,
        "left.parquet",
        "CREATE TABLE t(id INTEGER, updated_at TIMESTAMP); \
         INSERT INTO t VALUES (1, TIMESTAMP '2024-06-15 11:50:45');",
        "SELECT * FROM t",
    );
    let right = parquet_fixture(
        &temp,
        "right.parquet",
        "CREATE TABLE t(id INTEGER, updated_at TIMESTAMP); \
         INSERT INTO t VALUES (1, TIMESTAMP '2024-06-16 08:00:00');",
        "SELECT * FROM t",
    );
    let connection = Connection::open_in_memory().unwrap();

    let diff = compare::diff_table_files(
        &connection,
        &uri(&left),
        &uri(&right),
        &["id".to_string()],
        10,
        0,
    )
    .unwrap();

    assert_eq!(diff.summary.changed, 1);
    let changed = &diff.rows[0];
    assert_eq!(changed.kind, DiffKind::Changed);
    assert_eq!(changed.changed_columns, vec![1]);
    assert_eq!(
        changed.left[1],
        QueryValue::String("2024-06-15 11:50:45".to_string())
    );
    assert_eq!(
        changed.right[1],
        QueryValue::String("2024-06-16 08:00:00".to_string())
    );
}

#[test]
fn pagination_never_changes_summary_or_total() {
    let temp = TempDir::new().unwrap();
    let (left, right) = score_fixture(&temp);
    let connection = Connection::open_in_memory().unwrap();
    let keys = vec!["id".to_string()];

    let first = compare::diff_table_files(&connection, &uri(&left), &uri(&right), &keys, 1, 0)
        .unwrap();
    assert_eq!(first.rows.len(), 1);
    assert_eq!(first.total_rows, 3);
    assert_eq!(first.summary.added, 1);
    assert_eq!(first.summary.removed, 1);
    assert_eq!(first.summary.changed, 1);

    // A page past the end still reports the full summary
    let past_end =
        compare::diff_table_files(&connection, &uri(&left), &uri(&right), &keys, 10, 50).unwrap();
    assert!(past_end.rows.is_empty());
    assert_eq!(past_end.total_rows, 3);
    assert_eq!(past_end.summary, first.summary);

    // Walking page by page visits every row exactly once
    let mut kinds = Vec::new();
    for offset in 0..3 {
        let page =
            compare::diff_table_files(&connection, &uri(&left), &uri(&right), &keys, 1, offset)
                .unwrap();
        kinds.push(page.rows[0].kind);
    }
    assert_eq!(
        kinds,
        vec![DiffKind::Changed, DiffKind::Removed, DiffKind::Added]
    );
}

#[test]
fn no_primary_key_falls_back_to_set_difference() {
    let temp = TempDir::new().unwrap();
    let (left, right) = score_fixture(&temp);
    let connection = Connection::open_in_memory().unwrap();

    let diff =
        compare::diff_table_files(&connection, &uri(&left), &uri(&right), &[], 10, 0).unwrap();

    // The modified Alice row shows up as one addition plus one removal
    assert_eq!(diff.summary.changed, 0);
    assert_eq!(diff.summary.added, 2);
    assert_eq!(diff.summary.removed, 2);
    assert_eq!(diff.total_rows, 4);
    assert!(diff.rows.iter().all(|r| r.kind != DiffKind::Changed));
    assert!(diff.primary_keys.is_empty());
}

#[test]
fn identical_files_produce_empty_diff() {
    let temp = TempDir::new().unwrap();
    let (left, _) = score_fixture(&temp);
    let connection = Connection::open_in_memory().unwrap();

    let diff = compare::diff_table_files(
        &connection,
        &uri(&left),
        &uri(&left),
        &["id".to_string()],
        10,
        0,
    )
    .unwrap();

    assert_eq!(diff.total_rows, 0);
    assert!(diff.rows.is_empty());
    assert_eq!(diff.summary.added, 0);
    assert_eq!(diff.summary.removed, 0);
    assert_eq!(diff.summary.changed, 0);
}

#[test]
fn compare_rows_returns_both_directions() {
    let temp = TempDir::new().unwrap();
    let (left, right) = score_fixture(&temp);
    let connection = Connection::open_in_memory().unwrap();

    let sets = compare::compare_rows(&connection, &uri(&left), &uri(&right)).unwrap();
    assert_eq!(sets.added.len(), 2);
    assert_eq!(sets.removed.len(), 2);
    assert!(sets
        .added
        .iter()
        .any(|row| row[1] == QueryValue::String("Charlie".to_string())));
    assert!(sets
        .removed
        .iter()
        .any(|row| row[1] == QueryValue::String("Bob".to_string())));
}

#[test]
fn compare_stats_counts_rows_and_columns() {
    let temp = TempDir::new().unwrap();
    let left = parquet_fixture(
        &temp,
        "left.parquet",
        "CREATE TABLE t(id INTEGER, name VARCHAR); \
         INSERT INTO t VALUES (1, 'a'), (2, 'a'), (3, NULL);",
        "SELECT * FROM t",
    );
    let right = parquet_fixture(
        &temp,
        "right.parquet",
        "CREATE TABLE t(id INTEGER, name VARCHAR); \
         INSERT INTO t VALUES (1, 'a'), (2, 'b');",
        "SELECT * FROM t",
    );
    let connection = Connection::open_in_memory().unwrap();

    let stats = compare::compare_stats(&connection, &uri(&left), &uri(&right)).unwrap();
    assert_eq!(stats.left_rows, 3);
    assert_eq!(stats.right_rows, 2);

    let name = stats.columns.iter().find(|c| c.name == "name").unwrap();
    assert_eq!(name.left_distinct, 1);
    assert_eq!(name.left_nulls, 1);
    assert_eq!(name.right_distinct, 2);
    assert_eq!(name.right_nulls, 0);
}
