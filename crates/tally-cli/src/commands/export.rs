//! Export commands

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::db::Database;
use tally_core::export::{export_full_gz, export_transactions_csv};

pub fn cmd_export_transactions(db: &Database, output: Option<&Path>) -> Result<()> {
    let csv = export_transactions_csv(db)?;

    match output {
        Some(path) => {
            std::fs::write(path, csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✅ Exported transactions to {}.", path.display());
        }
        None => print!("{}", csv),
    }

    Ok(())
}

pub fn cmd_export_full(db: &Database, output: &Path) -> Result<()> {
    let bytes = export_full_gz(db)?;

    std::fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "✅ Exported full snapshot to {} ({} bytes).",
        output.display(),
        bytes.len()
    );

    Ok(())
}
