use colored::Colorize;

use crate::error::Result;
use crate::settings::{settings_path, Settings, SourceSpec};

fn describe(label: &str, spec: &SourceSpec, settings: &Settings) {
    let path = spec.resolve(&settings.data_path());
    let state = if path.exists() {
        "found".green()
    } else {
        "missing".red()
    };
    let sheet = if spec.sheet.is_empty() {
        String::new()
    } else {
        format!(" [{}]", spec.sheet)
    };
    println!("{label:<12} {}{sheet}  {state}", path.display());
}

pub fn run(settings: &Settings, settings_file: Option<&std::path::Path>) -> Result<()> {
    let file = settings_file
        .map(|p| p.to_path_buf())
        .unwrap_or_else(settings_path);
    let file_state = if file.exists() { "" } else { " (not found, using defaults)" };

    println!("Settings:    {}{file_state}", file.display());
    println!("Data dir:    {}", settings.data_path().display());
    println!("Exports dir: {}", settings.exports_path().display());
    println!("Tolerance:   {}", settings.tolerance);
    println!();

    describe("Baseline", &settings.baseline, settings);
    for spec in &settings.sources {
        describe("Source", spec, settings);
    }
    for spec in &settings.pm_files {
        describe("PM file", spec, settings);
    }

    if !settings.expected_totals.is_empty() {
        println!();
        for (division, total) in &settings.expected_totals {
            println!("Expected {division:<4} {}", crate::fmt::money(*total));
        }
    }
    Ok(())
}
