//! Output formatting utilities

use tablesnap_core::compare::{DiffKind, TableStats, UnifiedDiff};
use tablesnap_core::model::{Datasource, SnapshotMeta};
use tablesnap_core::query::{QueryResult, QueryValue};

/// Pretty printer for tablesnap output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print a datasource list
    pub fn print_datasources(datasources: &[Datasource]) {
        if datasources.is_empty() {
            println!("No datasources registered.");
            return;
        }

        println!("🗄️  Registered Datasources:");
        for (i, ds) in datasources.iter().enumerate() {
            let prefix = if i == datasources.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            println!("{prefix} {} [{}] ({})", ds.id, ds.dialect, ds.name);
        }
    }

    /// Print a snapshot list
    pub fn print_snapshot_list(snapshots: &[SnapshotMeta]) {
        if snapshots.is_empty() {
            println!("No snapshots found.");
            return;
        }

        println!("📸 Snapshots:");
        for (i, snapshot) in snapshots.iter().enumerate() {
            let prefix = if i == snapshots.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            println!(
                "{prefix} {} {:?} {} ({:?}, {} tables)",
                snapshot.id,
                snapshot.kind,
                snapshot.logical_date,
                snapshot.status,
                snapshot.tables.len()
            );
        }
    }

    /// Print one snapshot's metadata
    pub fn print_snapshot(snapshot: &SnapshotMeta) {
        println!("📸 Snapshot: {}", snapshot.id);
        println!("├─ Datasource: {} ({})", snapshot.datasource_name, snapshot.datasource_id);
        println!("├─ Kind: {:?}", snapshot.kind);
        println!("├─ Date: {}", snapshot.logical_date);
        println!("├─ Status: {:?}", snapshot.status);
        println!("├─ Started: {}", snapshot.started_at);
        if let Some(completed) = snapshot.completed_at {
            println!("├─ Completed: {completed}");
        }
        if let Some(error) = &snapshot.error_message {
            println!("├─ Error: {error}");
        }
        if let Some(memo) = &snapshot.memo {
            println!("├─ Memo: {memo}");
        }
        if snapshot.tables.is_empty() {
            println!("└─ Tables: none");
            return;
        }
        println!("└─ Tables:");
        for (i, table) in snapshot.tables.iter().enumerate() {
            let prefix = if i == snapshot.tables.len() - 1 {
                "   └─"
            } else {
                "   ├─"
            };
            println!(
                "{prefix} {} ({} rows, {})",
                table.full_name(),
                table.row_count,
                format_bytes(table.byte_size)
            );
        }
    }

    /// Print a query result as an aligned text table
    pub fn print_query_result(result: &QueryResult) {
        let headers: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
        let rendered: Vec<Vec<String>> = result
            .rows
            .iter()
            .map(|row| row.iter().map(render_cell).collect())
            .collect();

        let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
        for row in &rendered {
            for (i, cell) in row.iter().enumerate() {
                if cell.len() > widths[i] {
                    widths[i] = cell.len();
                }
            }
        }

        print_row(&headers, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        print_row(&rule, &widths);
        for row in &rendered {
            print_row(row, &widths);
        }
        println!(
            "({} of {} rows)",
            result.rows.len(),
            result.total_rows
        );
    }

    /// Print a unified diff
    pub fn print_diff(diff: &UnifiedDiff) {
        println!(
            "🔍 Diff Summary: +{} added, -{} removed, ~{} changed ({} total)",
            diff.summary.added, diff.summary.removed, diff.summary.changed, diff.total_rows
        );
        if !diff.primary_keys.is_empty() {
            println!("   Matched on: {}", diff.primary_keys.join(", "));
        }

        for row in &diff.rows {
            match row.kind {
                DiffKind::Added => {
                    println!("+ {}", join_cells(&row.right));
                }
                DiffKind::Removed => {
                    println!("- {}", join_cells(&row.left));
                }
                DiffKind::Changed => {
                    let changed: Vec<String> = row
                        .changed_columns
                        .iter()
                        .map(|&i| {
                            format!(
                                "{}: {} → {}",
                                diff.columns[i].name,
                                render_cell(&row.left[i]),
                                render_cell(&row.right[i])
                            )
                        })
                        .collect();
                    println!("~ {} ({})", join_cells(&row.right), changed.join(", "));
                }
            }
        }
    }

    /// Print column statistics for both sides
    pub fn print_stats(stats: &TableStats) {
        println!(
            "📊 Rows: {} (left) vs {} (right)",
            stats.left_rows, stats.right_rows
        );
        for (i, column) in stats.columns.iter().enumerate() {
            let prefix = if i == stats.columns.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            println!(
                "{prefix} {}: distinct {}/{}, nulls {}/{}",
                column.name,
                column.left_distinct,
                column.right_distinct,
                column.left_nulls,
                column.right_nulls
            );
        }
    }
}

fn render_cell(value: &QueryValue) -> String {
    match value {
        QueryValue::Null => "NULL".to_string(),
        other => other.render(),
    }
}

fn join_cells(values: &[QueryValue]) -> String {
    values
        .iter()
        .map(render_cell)
        .collect::<Vec<_>>()
        .join(" | ")
}

fn print_row(cells: &[String], widths: &[usize]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    println!("{}", padded.join("  "));
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
