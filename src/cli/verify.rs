use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::{BillingError, Result};
use crate::fmt::month_name;
use crate::settings::{shellexpand_path, Settings};
use crate::verify::{verify_exports, Status, VerifyOptions};
use crate::writer::ExportNames;

use super::PeriodArgs;

pub fn run(settings: &Settings, period: PeriodArgs, exports_dir: Option<String>) -> Result<()> {
    let (month, year) = settings.period(period.month, period.year)?;
    let names = ExportNames::new(month, year);
    let dir: PathBuf = exports_dir
        .map(|d| shellexpand_path(&d).into())
        .unwrap_or_else(|| settings.exports_path());

    let report = verify_exports(
        &dir,
        &names,
        &VerifyOptions {
            expected_totals: &settings.expected_totals,
            tolerance: settings.tolerance,
            max_units_per_asset: settings.max_units_per_asset,
        },
    );

    let mut table = Table::new();
    table.set_header(vec!["Check", "Result", "Detail"]);
    for check in &report.checks {
        let status = match check.status {
            Status::Pass => "PASS".green().bold(),
            Status::Fail => "FAIL".red().bold(),
            Status::Info => "INFO".cyan(),
        };
        table.add_row(vec![
            Cell::new(&check.name),
            Cell::new(status),
            Cell::new(&check.detail),
        ]);
    }
    println!("Verification: {} {year}\n{table}", month_name(month));

    let failed = report
        .checks
        .iter()
        .filter(|c| c.status == Status::Fail)
        .count();
    if failed > 0 {
        return Err(BillingError::Other(format!(
            "{failed} verification check(s) failed"
        )));
    }
    println!("{}", "All checks passed.".green());
    Ok(())
}
