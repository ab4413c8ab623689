//! Inspect command implementation.

use super::open_store;
use polydb_core::{DBQuery, ReadOptions};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Tables with their row counts, sorted by name.
    pub tables: Vec<TableStats>,
    /// Rows over all tables.
    pub total_rows: u64,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: String,
    /// Number of rows.
    pub rows: u64,
}

/// Runs the inspect command.
pub async fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store found at {:?}", path).into());
    }

    let result = inspect(path).await?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Counts the rows of every table in the store at `path`.
pub async fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let db = open_store(path);
    let mut names = db.get_tables().await?;
    names.sort();

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let rows = db
            .run_query_count(&DBQuery::create(&name), &ReadOptions::default())
            .await?;
        tables.push(TableStats { name, rows });
    }
    let total_rows = tables.iter().map(|t| t.rows).sum();

    Ok(InspectResult {
        path: path.display().to_string(),
        tables,
        total_rows,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!("Tables: {}", result.tables.len());
    println!();
    for table in &result.tables {
        println!("  {:<32} {:>10}", table.name, table.rows);
    }
    println!();
    println!("Total rows: {}", result.total_rows);
}
