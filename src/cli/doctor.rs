//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use mnemos::config::MnemosConfig;
use mnemos::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &MnemosConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `mnemos add` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Mnemos Health Report");
    println!("====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Records:         {}", report.record_count);
    println!("  Archived:        {}", report.archived_count);
    println!("  Edges:           {}", report.edge_count);
    println!("  Full-text rows:  {}", report.fts_row_count);
    let live = report.record_count.saturating_sub(report.archived_count);
    if report.fts_row_count != live {
        println!("  WARNING: full-text index has {} rows for {} live records.", report.fts_row_count, live);
    }
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db {}", db_path.display());
        println!("  2. Or re-add records into a fresh database.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
