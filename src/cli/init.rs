use std::path::PathBuf;

use crate::error::Result;
use crate::settings::{load_settings_from, save_settings_to, settings_path, SourceSpec};

pub fn run(
    settings_file: Option<PathBuf>,
    data_dir: Option<String>,
    exports_dir: Option<String>,
    baseline: Option<String>,
) -> Result<()> {
    let path = settings_file.unwrap_or_else(settings_path);
    let mut settings = load_settings_from(&path);

    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }
    if let Some(dir) = exports_dir {
        settings.exports_dir = dir;
    }
    if let Some(file) = baseline {
        settings.baseline = SourceSpec::new(&file, &settings.baseline.sheet);
    }

    save_settings_to(&settings, &path)?;
    std::fs::create_dir_all(settings.exports_path())?;

    println!("Settings written to {}", path.display());
    println!("  Data dir:    {}", settings.data_path().display());
    println!("  Exports dir: {}", settings.exports_path().display());
    println!(
        "  Baseline:    {} [{}]",
        settings.baseline.path, settings.baseline.sheet
    );
    Ok(())
}
