//! Copy command implementation.

use super::backup::print_stats;
use super::open_store;
use polydb_core::ErrorMode;
use polydb_pipeline::{db_pipeline_copy, CopyOptions};
use std::path::Path;
use tracing::info;

/// Copies tables of the store at `db_path` into the store at `target`.
pub async fn run(
    db_path: &Path,
    target: &Path,
    tables: Option<Vec<String>>,
    chunk_size: usize,
    error_mode: ErrorMode,
) -> Result<(), Box<dyn std::error::Error>> {
    if db_path == target {
        return Err("Source and target must differ".into());
    }
    info!("Copying {:?} to {:?}", db_path, target);

    let mut opt = CopyOptions::new(open_store(db_path), open_store(target))
        .chunk_size(chunk_size)
        .error_mode(error_mode);
    if let Some(tables) = tables {
        opt = opt.tables(tables);
    }

    let stats = db_pipeline_copy(&opt).await?;
    print_stats("Tables copied", target, &stats);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polydb_core::ndjson::{read_ndjson_file, table_file_path, write_ndjson_file};
    use polydb_core::row_from_value;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn copies_selected_tables() {
        let source = tempdir().unwrap();
        let target = tempdir().unwrap();
        for table in ["a", "b"] {
            let rows: Vec<_> = (0..4)
                .map(|i| row_from_value(json!({"id": format!("{table}{i}")})).unwrap())
                .collect();
            write_ndjson_file(table_file_path(source.path(), table, false), &rows).unwrap();
        }

        let tables = Some(vec!["b".to_string()]);
        run(source.path(), target.path(), tables, 3, ErrorMode::ThrowImmediately)
            .await
            .unwrap();

        let copied = read_ndjson_file(table_file_path(target.path(), "b", true)).unwrap();
        assert_eq!(copied.len(), 4);
        assert!(!table_file_path(target.path(), "a", true).exists());
    }

    #[tokio::test]
    async fn refuses_to_copy_onto_itself() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path(), dir.path(), None, 10, ErrorMode::Suppress)
            .await
            .is_err());
    }
}
