use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cache::SheetCache;
use crate::error::Result;
use crate::fmt::{money, pct};
use crate::pipeline::{compare_pm_totals, RunConfig};
use crate::settings::{Settings, SourceSpec};
use crate::writer::ExportNames;

pub fn run(settings: &Settings, pm: Vec<String>, threshold: Option<f64>) -> Result<()> {
    let (month, year) = settings.period(None, None)?;
    let config = RunConfig::from_settings(settings, ExportNames::new(month, year));
    let pm_files: Vec<SourceSpec> = if pm.is_empty() {
        settings.pm_files.clone()
    } else {
        pm.iter().map(|p| SourceSpec::new(p, "")).collect()
    };
    if pm_files.is_empty() {
        println!("No PM files given. Pass --pm or set pm_files in settings.");
        return Ok(());
    }
    let threshold = threshold.unwrap_or(settings.significant_difference);

    let mut cache = SheetCache::new();
    let (report, skipped) = compare_pm_totals(&config, &mut cache, &pm_files, threshold)?;

    let mut table = Table::new();
    table.set_header(vec!["File", "Total", "Difference", "%", ""]);
    table.add_row(vec![
        Cell::new(format!("{} (original)", report.original_label)),
        Cell::new(money(report.original_total)),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
    ]);
    for entry in &report.entries {
        let flag = if entry.significant {
            "SIGNIFICANT".red().bold()
        } else {
            "ok".green()
        };
        table.add_row(vec![
            Cell::new(&entry.label),
            Cell::new(money(entry.total)),
            Cell::new(money(entry.abs_diff)),
            Cell::new(pct(entry.pct_diff)),
            Cell::new(flag),
        ]);
    }
    println!("{table}");
    println!(
        "PM files combined: {}  Threshold: {}",
        money(report.combined_total()),
        money(threshold)
    );

    for s in &skipped {
        println!("{} {}", "Skipped:".yellow(), s.error);
    }
    Ok(())
}
