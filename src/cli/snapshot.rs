use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cache::SheetCache;
use crate::error::Result;
use crate::settings::{shellexpand_path, Settings};

/// Load every configured input once and write the cached sheets as JSON.
pub fn run(settings: &Settings, output: Option<String>) -> Result<()> {
    let data_dir = settings.data_path();
    let dir: PathBuf = output
        .map(|o| shellexpand_path(&o).into())
        .unwrap_or_else(|| settings.exports_path().join("snapshots"));

    let mut cache = SheetCache::new();
    let mut table = Table::new();
    table.set_header(vec!["File", "Sheet", "Rows", "SHA-256"]);
    let specs = std::iter::once(&settings.baseline)
        .chain(&settings.sources)
        .chain(&settings.pm_files);
    for spec in specs {
        let path = spec.resolve(&data_dir);
        if let Err(e) = cache.get(&path, &spec.sheet) {
            println!("{} {e}", "Skipped:".yellow());
            continue;
        }
        if let Some(entry) = cache.entry(&path, &spec.sheet) {
            table.add_row(vec![
                Cell::new(&entry.sheet.source),
                Cell::new(&entry.sheet.sheet),
                Cell::new(entry.sheet.rows.len()),
                Cell::new(&entry.checksum[..12]),
            ]);
        }
    }

    if cache.is_empty() {
        println!("No inputs could be loaded; nothing to snapshot.");
        return Ok(());
    }
    println!("{table}");
    println!("{} sheet(s) from {} read(s)", cache.len(), cache.loads());

    let written = cache.save_snapshots(&dir)?;
    println!("Wrote {} snapshot(s) to {}", written.len(), dir.display());
    Ok(())
}
