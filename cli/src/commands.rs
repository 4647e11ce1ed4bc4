//! Command implementations for tablesnap CLI

use crate::cli::{Commands, DatasourceCommands};
use crate::output::PrettyPrinter;
use crate::progress::create_spinner;
use std::path::Path;
use tablesnap_core::catalog::Catalog;
use tablesnap_core::compare;
use tablesnap_core::config::Config;
use tablesnap_core::error::{Result, TablesnapError};
use tablesnap_core::lifecycle::SnapshotLifecycle;
use tablesnap_core::model::{Datasource, SnapshotMeta, SnapshotStatus};
use tablesnap_core::provider::StorageProvider;
use tablesnap_core::query;
use tablesnap_core::sql::namespace::{build_setup_statements, AliasedSnapshot};

/// Execute a command
pub fn execute_command(command: Commands, config_dir: Option<&Path>) -> Result<()> {
    match command {
        Commands::Init => init_command(config_dir),
        Commands::Datasource { command } => datasource_command(config_dir, command),
        Commands::Snapshot { datasource } => snapshot_command(config_dir, &datasource),
        Commands::List { datasource, json } => list_command(config_dir, &datasource, json),
        Commands::Show { snapshot, json } => show_command(config_dir, &snapshot, json),
        Commands::Delete { snapshot } => delete_command(config_dir, &snapshot),
        Commands::Query {
            sql,
            snapshots,
            limit,
            offset,
            json,
        } => query_command(config_dir, &sql, &snapshots, limit, offset, json),
        Commands::Preview {
            snapshot,
            table,
            where_clause,
            order_by,
            limit,
            offset,
            json,
        } => preview_command(
            config_dir,
            &snapshot,
            &table,
            where_clause.as_deref(),
            order_by.as_deref(),
            limit,
            offset,
            json,
        ),
        Commands::Diff {
            left,
            right,
            table,
            limit,
            offset,
            json,
        } => diff_command(config_dir, &left, &right, &table, limit, offset, json),
        Commands::Stats {
            left,
            right,
            table,
            json,
        } => stats_command(config_dir, &left, &right, &table, json),
    }
}

fn base_dir(config_dir: Option<&Path>) -> &Path {
    config_dir.unwrap_or_else(|| Path::new("."))
}

fn open_provider(config_dir: Option<&Path>) -> Result<StorageProvider> {
    let config = Config::load_or_default(base_dir(config_dir))?;
    Ok(StorageProvider::new(config))
}

fn open_catalog(provider: &StorageProvider) -> Result<Catalog> {
    Ok(Catalog::new(provider.backend()?))
}

fn init_command(config_dir: Option<&Path>) -> Result<()> {
    let path = base_dir(config_dir).join("tablesnap.toml");
    if path.exists() {
        return Err(TablesnapError::config(format!(
            "{} already exists",
            path.display()
        )));
    }
    Config::default().save(&path)?;
    println!("✅ Wrote {}", path.display());
    Ok(())
}

fn datasource_command(config_dir: Option<&Path>, command: DatasourceCommands) -> Result<()> {
    let provider = open_provider(config_dir)?;
    let catalog = open_catalog(&provider)?;

    match command {
        DatasourceCommands::Add { file } => {
            let content = std::fs::read_to_string(&file)?;
            let datasource: Datasource = serde_json::from_str(&content)?;
            catalog.save_datasource(&datasource)?;
            println!("✅ Registered datasource '{}' ({})", datasource.name, datasource.id);
        }
        DatasourceCommands::List { json } => {
            let datasources = catalog.list_datasources()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&datasources)?);
            } else {
                PrettyPrinter::print_datasources(&datasources);
            }
        }
        DatasourceCommands::Remove { id } => {
            // Fails with NotFound before deleting anything
            let datasource = catalog.load_datasource(&id)?;
            catalog.delete_datasource(&id)?;
            println!("🗑️  Removed datasource '{}'", datasource.name);
        }
    }
    Ok(())
}

fn snapshot_command(config_dir: Option<&Path>, datasource_id: &str) -> Result<()> {
    let provider = open_provider(config_dir)?;
    let lifecycle = SnapshotLifecycle::new(provider.backend()?);

    let spinner = create_spinner(&format!("Capturing snapshot of '{datasource_id}'..."));
    let result = lifecycle.take_snapshot(datasource_id);
    spinner.finish_and_clear();

    let meta = result?;
    match meta.status {
        SnapshotStatus::Completed => {
            println!("✅ Snapshot {} completed ({} tables)", meta.id, meta.tables.len())
        }
        _ => println!(
            "❌ Snapshot {} failed: {}",
            meta.id,
            meta.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
    PrettyPrinter::print_snapshot(&meta);
    Ok(())
}

fn list_command(config_dir: Option<&Path>, datasource_id: &str, json: bool) -> Result<()> {
    let provider = open_provider(config_dir)?;
    let catalog = open_catalog(&provider)?;

    let snapshots = catalog.list_snapshots(datasource_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    } else {
        PrettyPrinter::print_snapshot_list(&snapshots);
    }
    Ok(())
}

fn show_command(config_dir: Option<&Path>, snapshot_id: &str, json: bool) -> Result<()> {
    let provider = open_provider(config_dir)?;
    let catalog = open_catalog(&provider)?;

    let snapshot = catalog.load_snapshot(snapshot_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        PrettyPrinter::print_snapshot(&snapshot);
    }
    Ok(())
}

fn delete_command(config_dir: Option<&Path>, snapshot_id: &str) -> Result<()> {
    let provider = open_provider(config_dir)?;
    let lifecycle = SnapshotLifecycle::new(provider.backend()?);
    lifecycle.delete_snapshot(snapshot_id)?;
    println!("🗑️  Deleted snapshot {snapshot_id}");
    Ok(())
}

/// Only terminal, successful snapshots are queryable
fn load_completed(catalog: &Catalog, snapshot_id: &str) -> Result<SnapshotMeta> {
    let snapshot = catalog.load_snapshot(snapshot_id)?;
    if snapshot.status != SnapshotStatus::Completed {
        return Err(TablesnapError::query_rejected(format!(
            "snapshot {snapshot_id} is {:?}, only COMPLETED snapshots can be queried",
            snapshot.status
        )));
    }
    Ok(snapshot)
}

fn parse_snapshot_arg(arg: &str, position: usize) -> (String, String) {
    match arg.split_once('=') {
        Some((id, alias)) => (id.to_string(), alias.to_string()),
        None => (arg.to_string(), format!("s{}", position + 1)),
    }
}

fn query_command(
    config_dir: Option<&Path>,
    sql: &str,
    snapshot_args: &[String],
    limit: u32,
    offset: u64,
    json: bool,
) -> Result<()> {
    let provider = open_provider(config_dir)?;
    let catalog = open_catalog(&provider)?;

    let mut aliased = Vec::with_capacity(snapshot_args.len());
    for (i, arg) in snapshot_args.iter().enumerate() {
        let (snapshot_id, alias) = parse_snapshot_arg(arg, i);
        let snapshot = load_completed(&catalog, &snapshot_id)?;
        let mut tables = Vec::with_capacity(snapshot.tables.len());
        for table in &snapshot.tables {
            let uri = catalog.resolve_uri(&table.storage_path)?;
            tables.push((table.table.clone(), uri));
        }
        aliased.push(AliasedSnapshot { alias, tables });
    }

    let setup = build_setup_statements(&aliased)?;
    let result = query::execute_query(&provider.storage_config(), sql, limit, offset, &setup)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        PrettyPrinter::print_query_result(&result);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn preview_command(
    config_dir: Option<&Path>,
    snapshot_id: &str,
    table_name: &str,
    where_clause: Option<&str>,
    order_by: Option<&str>,
    limit: u32,
    offset: u64,
    json: bool,
) -> Result<()> {
    let provider = open_provider(config_dir)?;
    let catalog = open_catalog(&provider)?;

    let snapshot = load_completed(&catalog, snapshot_id)?;
    let table = snapshot
        .find_table(table_name)
        .ok_or_else(|| TablesnapError::TableNotFound {
            snapshot_id: snapshot_id.to_string(),
            table: table_name.to_string(),
        })?;
    let uri = catalog.resolve_uri(&table.storage_path)?;

    let result = query::preview_table(
        &provider.storage_config(),
        &uri,
        where_clause,
        order_by,
        limit,
        offset,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        PrettyPrinter::print_query_result(&result);
    }
    Ok(())
}

fn diff_command(
    config_dir: Option<&Path>,
    left: &str,
    right: &str,
    table: &str,
    limit: u32,
    offset: u64,
    json: bool,
) -> Result<()> {
    let provider = open_provider(config_dir)?;

    let diff = compare::compare_unified_diff(
        provider.backend()?,
        &provider.storage_config(),
        left,
        right,
        table,
        limit,
        offset,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
    } else {
        PrettyPrinter::print_diff(&diff);
    }
    Ok(())
}

fn stats_command(
    config_dir: Option<&Path>,
    left: &str,
    right: &str,
    table: &str,
    json: bool,
) -> Result<()> {
    let provider = open_provider(config_dir)?;

    let stats = compare::compare_snapshot_stats(
        provider.backend()?,
        &provider.storage_config(),
        left,
        right,
        table,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        PrettyPrinter::print_stats(&stats);
    }
    Ok(())
}
