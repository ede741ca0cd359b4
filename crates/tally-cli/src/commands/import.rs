//! Import command

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use tally_core::db::Database;
use tally_core::import::{run_import, ImportProfile};

pub fn cmd_import(db: &Database, file: &Path, profile: &str) -> Result<()> {
    println!("📥 Importing {}...", file.display());

    let profile = ImportProfile::resolve(profile)
        .with_context(|| format!("Failed to load import profile '{}'", profile))?;
    println!("   Profile: {}", profile.name);

    let reader = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let report = run_import(db, reader, &profile).context("Import failed")?;

    println!();
    println!("📊 Import Results");
    println!("   ─────────────────────────────");
    println!("   Imported: {}", report.imported);
    println!("   Skipped duplicates: {}", report.skipped_duplicates);

    if !report.failed.is_empty() {
        println!("   ⚠️  Failed rows: {}", report.failed.len());
        for row in &report.failed {
            println!("      line {}: {}", row.line, row.message);
        }
    }

    if report.imported > 0 {
        println!();
        println!("💡 Run 'tally receipts auto-match' to link waiting receipts.");
    }

    Ok(())
}
