use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cache::SheetCache;
use crate::error::Result;
use crate::fmt::{money, month_name};
use crate::models::round2;
use crate::pipeline::{self, RunConfig};
use crate::settings::{shellexpand_path, Settings};
use crate::writer::ExportNames;

use super::PeriodArgs;

const MAX_DIVERGENCE_ROWS: usize = 10;

pub fn run(
    settings: &Settings,
    period: PeriodArgs,
    tolerance: Option<f64>,
    exports_dir: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let (month, year) = settings.period(period.month, period.year)?;
    let mut config = RunConfig::from_settings(settings, ExportNames::new(month, year));
    if let Some(t) = tolerance {
        config.tolerance = t;
    }
    if let Some(dir) = exports_dir {
        config.exports_dir = shellexpand_path(&dir).into();
    }
    config.dry_run = dry_run;

    println!("Billing period: {} {year}", month_name(month));
    let mut cache = SheetCache::new();
    let summary = pipeline::run(&config, &mut cache)?;

    let mut sources = Table::new();
    sources.set_header(vec!["Source", "Records", "Skipped rows", "Billed", "Reconciled"]);
    for s in &summary.sources {
        sources.add_row(vec![
            Cell::new(&s.source),
            Cell::new(s.records),
            Cell::new(s.skipped_rows),
            Cell::new(money(s.billed_total)),
            Cell::new(money(s.total)),
        ]);
    }
    println!("{sources}");
    let billed = summary.billed_total();
    let reconciled = summary.source_total();
    println!(
        "Source total: {} reconciled, {} as billed (diff {})",
        money(reconciled),
        money(billed),
        money(round2(reconciled - billed))
    );

    for skipped in &summary.skipped {
        println!("{} {}", "Skipped:".yellow(), skipped.error);
    }
    if !summary.warnings.is_empty() {
        println!(
            "{} row warning(s); rerun with RUST_LOG=traxovo=debug for detail",
            summary.warnings.len()
        );
    }
    if !summary.divergences.is_empty() {
        println!(
            "{} {} row(s) where units x rate differs from the source amount",
            "Divergent:".yellow(),
            summary.divergences.len()
        );
        let mut table = Table::new();
        table.set_header(vec!["Equip #", "Job", "Source", "Billed", "Calculated", "Diff"]);
        for d in summary.divergences.iter().take(MAX_DIVERGENCE_ROWS) {
            table.add_row(vec![
                Cell::new(&d.equipment_id),
                Cell::new(&d.job_number),
                Cell::new(&d.source),
                Cell::new(money(d.source_amount)),
                Cell::new(money(d.calculated)),
                Cell::new(money(d.difference())),
            ]);
        }
        println!("{table}");
    }

    let mut totals = Table::new();
    totals.set_header(vec!["Division", "Records", "Amount"]);
    for t in &summary.division_totals {
        totals.add_row(vec![
            Cell::new(t.division.code()),
            Cell::new(t.records),
            Cell::new(money(t.amount)),
        ]);
    }
    let check = &summary.total_check;
    let label = if check.passed {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    totals.add_row(vec![
        Cell::new("TOTAL".bold()),
        Cell::new(summary.records.len()),
        Cell::new(money(check.actual)),
    ]);
    println!("{totals}");
    println!(
        "Total check: {label} (expected {}, divisions {}, diff {})",
        money(check.expected),
        money(check.actual),
        money(check.difference)
    );

    let changes = &summary.revisions.changes;
    if !changes.is_empty() {
        println!(
            "PM revisions applied: {} (net change {})",
            changes.len(),
            money(summary.revisions.delta())
        );
    }
    if !summary.revisions.unmatched.is_empty() {
        println!(
            "{} {} revision(s) matched no billing record",
            "Unmatched:".yellow(),
            summary.revisions.unmatched.len()
        );
    }
    if !summary.duplicate_revisions.is_empty() {
        println!(
            "{} {} duplicate revision(s) ignored",
            "Duplicates:".yellow(),
            summary.duplicate_revisions.len()
        );
    }

    if config.dry_run {
        println!("Dry run: no files written.");
    } else {
        println!("Wrote {} file(s) to {}:", summary.written.len(), config.exports_dir.display());
        for file in &summary.written {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("  {name}  ({} rows, {})", file.rows, money(file.total));
        }
    }
    Ok(())
}
