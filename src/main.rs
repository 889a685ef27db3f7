mod cache;
mod cli;
mod columns;
mod compare;
mod division;
mod error;
mod fmt;
mod importer;
mod loader;
mod models;
mod pipeline;
mod reconciler;
mod revisions;
mod settings;
mod verify;
mod writer;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("traxovo=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let settings = cli::settings_for(&cli.settings);

    let result = match cli.command {
        Commands::Init {
            data_dir,
            exports_dir,
            baseline,
        } => cli::init::run(cli.settings.clone(), data_dir, exports_dir, baseline),
        Commands::Run {
            period,
            tolerance,
            exports_dir,
            dry_run,
        } => cli::run::run(&settings, period, tolerance, exports_dir, dry_run),
        Commands::Verify {
            period,
            exports_dir,
        } => cli::verify::run(&settings, period, exports_dir),
        Commands::Compare { pm, threshold } => cli::compare::run(&settings, pm, threshold),
        Commands::Classify { jobs } => cli::classify::run(&jobs),
        Commands::Snapshot { output } => cli::snapshot::run(&settings, output),
        Commands::Status => cli::status::run(&settings, cli.settings.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
