pub mod classify;
pub mod compare;
pub mod init;
pub mod run;
pub mod snapshot;
pub mod status;
pub mod verify;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::settings::{load_settings, Settings};

#[derive(Parser)]
#[command(
    name = "traxovo",
    about = "Reconcile equipment billing workbooks and write division import files."
)]
pub struct Cli {
    /// Settings file (default: ~/.config/traxovo/settings.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a settings file with input and export locations.
    Init {
        /// Directory holding the source workbooks (default: ./attached_assets)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Directory for generated exports (default: ./exports)
        #[arg(long = "exports-dir")]
        exports_dir: Option<String>,
        /// Baseline billing workbook, relative to the data directory
        #[arg(long)]
        baseline: Option<String>,
    },
    /// Load, reconcile and export one billing period.
    Run {
        #[command(flatten)]
        period: PeriodArgs,
        /// Divergence tolerance in dollars (default from settings: 0.01)
        #[arg(long)]
        tolerance: Option<f64>,
        /// Override the exports directory
        #[arg(long = "exports-dir")]
        exports_dir: Option<String>,
        /// Reconcile and report without writing any files
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Re-read the division import files and check totals and allocations.
    Verify {
        #[command(flatten)]
        period: PeriodArgs,
        /// Override the exports directory
        #[arg(long = "exports-dir")]
        exports_dir: Option<String>,
    },
    /// Compare the baseline total with PM allocation sheet totals.
    Compare {
        /// PM file(s) to compare (default: pm_files from settings)
        #[arg(long = "pm")]
        pm: Vec<String>,
        /// Difference in dollars considered significant (default from settings: 1000)
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Show the division each job number is routed to.
    Classify {
        /// Job numbers or job cells, e.g. "2023-045 Hwy 121"
        #[arg(required = true)]
        jobs: Vec<String>,
    },
    /// Load every configured input and write JSON snapshots.
    Snapshot {
        /// Output directory (default: <exports_dir>/snapshots)
        #[arg(long)]
        output: Option<String>,
    },
    /// Show settings and which configured inputs exist.
    Status,
}

#[derive(clap::Args, Debug, Clone, Copy)]
pub struct PeriodArgs {
    /// Billing month: 1-12 (default: settings, then current month)
    #[arg(long)]
    pub month: Option<u32>,
    /// Billing year (default: settings, then current year)
    #[arg(long)]
    pub year: Option<i32>,
}

pub(crate) fn settings_for(path: &Option<PathBuf>) -> Settings {
    load_settings(path.as_deref())
}
