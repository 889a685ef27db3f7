use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

/// A workbook (or CSV) plus the sheet to read from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub path: String,
    #[serde(default)]
    pub sheet: String,
}

impl SourceSpec {
    pub fn new(path: &str, sheet: &str) -> Self {
        Self {
            path: path.to_string(),
            sheet: sheet.to_string(),
        }
    }

    /// Relative paths resolve against the data directory.
    pub fn resolve(&self, data_dir: &Path) -> PathBuf {
        let p = PathBuf::from(shellexpand_path(&self.path));
        if p.is_absolute() {
            p
        } else {
            data_dir.join(p)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_exports_dir")]
    pub exports_dir: String,
    #[serde(default = "default_baseline")]
    pub baseline: SourceSpec,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub pm_files: Vec<SourceSpec>,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_significant_difference")]
    pub significant_difference: f64,
    #[serde(default = "default_max_units")]
    pub max_units_per_asset: f64,
    /// Hand-verified division totals keyed by division code.
    #[serde(default)]
    pub expected_totals: BTreeMap<String, f64>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub year: Option<i32>,
}

fn default_data_dir() -> String {
    "attached_assets".to_string()
}

fn default_exports_dir() -> String {
    "exports".to_string()
}

fn default_baseline() -> SourceSpec {
    SourceSpec::new("EQMO_BILLING_ALLOCATIONS.xlsx", "EQ ALLOCATIONS - ALL DIV")
}

fn default_tolerance() -> f64 {
    0.01
}

fn default_significant_difference() -> f64 {
    1000.0
}

fn default_max_units() -> f64 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            exports_dir: default_exports_dir(),
            baseline: default_baseline(),
            sources: Vec::new(),
            pm_files: Vec::new(),
            tolerance: default_tolerance(),
            significant_difference: default_significant_difference(),
            max_units_per_asset: default_max_units(),
            expected_totals: BTreeMap::new(),
            month: None,
            year: None,
        }
    }
}

impl Settings {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.data_dir))
    }

    pub fn exports_path(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.exports_dir))
    }

    /// Month and year for export names, falling back to the current local date.
    pub fn period(&self, month: Option<u32>, year: Option<i32>) -> Result<(u32, i32)> {
        let now = chrono::Local::now();
        let month = month
            .or(self.month)
            .unwrap_or_else(|| chrono::Datelike::month(&now));
        let year = year
            .or(self.year)
            .unwrap_or_else(|| chrono::Datelike::year(&now));
        if !(1..=12).contains(&month) {
            return Err(BillingError::Settings(format!("Invalid month: {month}")));
        }
        Ok((month, year))
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("traxovo")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn load_settings_from(path: &Path) -> Settings {
    if path.exists() {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable settings: {e}");
                Settings::default()
            }
        }
    } else {
        Settings::default()
    }
}

pub fn load_settings(path: Option<&Path>) -> Settings {
    match path {
        Some(p) => load_settings_from(p),
        None => load_settings_from(&settings_path()),
    }
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| BillingError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
