use std::path::PathBuf;

use crate::cache::SheetCache;
use crate::columns::ColumnMap;
use crate::compare::{compare_totals, sheet_total};
use crate::error::{BillingError, Result};
use crate::importer::{extract_records, RowWarning};
use crate::models::{round2, BillingRecord, DivisionTotal, ReconciliationReport, RevisionEntry};
use crate::reconciler::{division_totals, grand_total, Divergence, Reconciler, RevisionOutcome, TotalCheck};
use crate::revisions::{load_revisions, RevisionSet};
use crate::settings::{Settings, SourceSpec};
use crate::writer::{write_all, ExportNames, WrittenFile};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub baseline: SourceSpec,
    pub sources: Vec<SourceSpec>,
    pub pm_files: Vec<SourceSpec>,
    pub tolerance: f64,
    pub names: ExportNames,
    pub dry_run: bool,
}

impl RunConfig {
    pub fn from_settings(settings: &Settings, names: ExportNames) -> Self {
        Self {
            data_dir: settings.data_path(),
            exports_dir: settings.exports_path(),
            baseline: settings.baseline.clone(),
            sources: settings.sources.clone(),
            pm_files: settings.pm_files.clone(),
            tolerance: settings.tolerance,
            names,
            dry_run: false,
        }
    }
}

/// One billing file that made it into the run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLoad {
    pub source: String,
    pub records: usize,
    pub skipped_rows: usize,
    /// Reconciled total before PM revisions.
    pub total: f64,
    /// Sum of the sheet's own Amount column, as billed.
    pub billed_total: f64,
}

/// A document dropped from the run and why.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub error: BillingError,
}

#[derive(Debug)]
pub struct RunSummary {
    pub sources: Vec<SourceLoad>,
    pub skipped: Vec<SkippedFile>,
    pub records: Vec<BillingRecord>,
    pub warnings: Vec<RowWarning>,
    pub divergences: Vec<Divergence>,
    pub revisions: RevisionOutcome,
    pub duplicate_revisions: Vec<RevisionEntry>,
    pub division_totals: Vec<DivisionTotal>,
    pub total_check: TotalCheck,
    pub written: Vec<WrittenFile>,
}

impl RunSummary {
    pub fn source_total(&self) -> f64 {
        round2(self.sources.iter().map(|s| s.total).sum())
    }

    /// Amount-column total across sources, before any recalculation.
    pub fn billed_total(&self) -> f64 {
        round2(self.sources.iter().map(|s| s.billed_total).sum())
    }
}

struct Loaded {
    load: SourceLoad,
    records: Vec<BillingRecord>,
    warnings: Vec<RowWarning>,
    divergences: Vec<Divergence>,
}

fn load_billing_source(
    cache: &mut SheetCache,
    spec: &SourceSpec,
    config: &RunConfig,
    reconciler: &Reconciler,
) -> Result<Loaded> {
    let path = spec.resolve(&config.data_dir);
    let sheet = cache.get(&path, &spec.sheet)?;
    let columns = ColumnMap::resolve(&sheet.headers, &sheet.source)?;
    if columns.amount_only() {
        tracing::info!(source = %sheet.source, "no units/rate columns, taking amounts as billed");
    }
    let mut report = extract_records(sheet, &columns);
    let divergences = reconciler.reconcile_all(&mut report.records);
    let total = grand_total(&report.records);
    let billed_total = round2(report.records.iter().filter_map(|r| r.source_amount).sum());
    tracing::info!(
        source = %report.source,
        records = report.records.len(),
        skipped = report.skipped_rows,
        total,
        billed_total,
        "loaded billing source"
    );
    Ok(Loaded {
        load: SourceLoad {
            source: report.source.clone(),
            records: report.records.len(),
            skipped_rows: report.skipped_rows,
            total,
            billed_total,
        },
        records: report.records,
        warnings: report.warnings,
        divergences,
    })
}

fn baseline_error(e: BillingError) -> BillingError {
    match e {
        BillingError::FileNotFound(p) => BillingError::BaselineMissing(p),
        other => other,
    }
}

fn skip(skipped: &mut Vec<SkippedFile>, path: PathBuf, error: BillingError) -> Result<()> {
    if !error.is_per_file() {
        return Err(error);
    }
    tracing::error!(path = %path.display(), "skipping file: {error}");
    skipped.push(SkippedFile { path, error });
    Ok(())
}

/// Load, classify, reconcile, revise, total and write one billing period.
///
/// Only a missing baseline ends the run; any other unreadable source or PM
/// file is skipped and reported in the summary.
pub fn run(config: &RunConfig, cache: &mut SheetCache) -> Result<RunSummary> {
    let reconciler = Reconciler::new(config.tolerance);
    let mut skipped = Vec::new();

    let baseline = load_billing_source(cache, &config.baseline, config, &reconciler)
        .map_err(baseline_error)?;

    let mut sources = vec![baseline.load];
    let mut records = baseline.records;
    let mut warnings = baseline.warnings;
    let mut divergences = baseline.divergences;

    for spec in &config.sources {
        match load_billing_source(cache, spec, config, &reconciler) {
            Ok(loaded) => {
                sources.push(loaded.load);
                records.extend(loaded.records);
                warnings.extend(loaded.warnings);
                divergences.extend(loaded.divergences);
            }
            Err(e) => skip(&mut skipped, spec.resolve(&config.data_dir), e)?,
        }
    }

    let mut revision_set = RevisionSet::default();
    for spec in &config.pm_files {
        let path = spec.resolve(&config.data_dir);
        let loaded = cache.get(&path, &spec.sheet).and_then(load_revisions);
        match loaded {
            Ok((entries, row_warnings)) => {
                tracing::info!(path = %path.display(), revisions = entries.len(), "loaded PM revisions");
                revision_set.extend(entries);
                revision_set.warnings.extend(row_warnings);
            }
            Err(e) => skip(&mut skipped, path, e)?,
        }
    }
    warnings.extend(std::mem::take(&mut revision_set.warnings));

    let revisions = reconciler.apply_revisions(&mut records, &revision_set.entries);

    let totals = division_totals(&records);
    let source_total: f64 = sources.iter().map(|s| s.total).sum();
    let expected = round2(source_total + revisions.delta());
    let actual = round2(totals.iter().map(|t| t.amount).sum());
    let total_check = reconciler.check_total(expected, actual);
    if !total_check.passed {
        tracing::warn!(expected, actual, "division totals do not match source total");
    }

    let written = if config.dry_run {
        Vec::new()
    } else {
        write_all(&config.exports_dir, &config.names, &records, &revisions.changes)?
    };

    Ok(RunSummary {
        sources,
        skipped,
        records,
        warnings,
        divergences,
        revisions,
        duplicate_revisions: revision_set.duplicates,
        division_totals: totals,
        total_check,
        written,
    })
}

/// Compare the baseline total with each PM file's own total.
pub fn compare_pm_totals(
    config: &RunConfig,
    cache: &mut SheetCache,
    pm_files: &[SourceSpec],
    significant_difference: f64,
) -> Result<(ReconciliationReport, Vec<SkippedFile>)> {
    let reconciler = Reconciler::new(config.tolerance);
    let baseline_path = config.baseline.resolve(&config.data_dir);
    let baseline = cache
        .get(&baseline_path, &config.baseline.sheet)
        .map_err(baseline_error)?;
    let original_label = baseline.source.clone();
    let original_total = sheet_total(baseline, &reconciler)?;

    let mut skipped = Vec::new();
    let mut pm_totals = Vec::new();
    for spec in pm_files {
        let path = spec.resolve(&config.data_dir);
        let total = cache
            .get(&path, &spec.sheet)
            .and_then(|sheet| Ok((sheet.source.clone(), sheet_total(sheet, &reconciler)?)));
        match total {
            Ok(pair) => pm_totals.push(pair),
            Err(e) => skip(&mut skipped, path, e)?,
        }
    }

    Ok((
        compare_totals(&original_label, original_total, &pm_totals, significant_difference),
        skipped,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::write_xlsx;
    use crate::models::Division;
    use std::path::Path;

    fn config(data: &Path, exports: &Path) -> RunConfig {
        RunConfig {
            data_dir: data.to_path_buf(),
            exports_dir: exports.to_path_buf(),
            baseline: SourceSpec::new("ragle.xlsx", "EQ ALLOCATIONS - ALL DIV"),
            sources: vec![],
            pm_files: vec![],
            tolerance: 0.01,
            names: ExportNames::new(5, 2025),
            dry_run: false,
        }
    }

    fn write_baseline(dir: &Path) {
        write_xlsx(
            &dir.join("ragle.xlsx"),
            "EQ ALLOCATIONS - ALL DIV",
            &["Equip #", "Job", "Cost Code", "Units", "Rate", "Amount"],
            &[
                vec!["12345", "2023-045", "9000-100", "10", "25.50", "255"],
                vec!["EX-7", "H22-017", "", "0.5", "3000", "1500"],
                vec!["EX-9", "WTX-330", "", "1", "2200", "2000"],
            ],
        );
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let exports = dir.path().join("exports");
        write_baseline(dir.path());
        std::fs::write(
            dir.path().join("pm_dfw.csv"),
            "Equip #,Job,Units,Revision Units\n12345,2023-045,10,8\n",
        )
        .unwrap();
        let mut cfg = config(dir.path(), &exports);
        cfg.pm_files = vec![SourceSpec::new("pm_dfw.csv", "")];

        let mut cache = SheetCache::new();
        let summary = run(&cfg, &mut cache).unwrap();

        assert_eq!(summary.records.len(), 3);
        assert_eq!(summary.sources[0].total, 255.0 + 1500.0 + 2200.0);
        // The sheet billed EX-9 at 2000; the reconciled total uses 1 x 2200.
        assert_eq!(summary.sources[0].billed_total, 255.0 + 1500.0 + 2000.0);
        assert_eq!(summary.billed_total(), 3755.0);
        assert_eq!(round2(summary.source_total() - summary.billed_total()), 200.0);
        // EX-9 billed 2000 against 1 x 2200.
        assert_eq!(summary.divergences.len(), 1);
        assert_eq!(summary.revisions.changes.len(), 1);
        assert_eq!(summary.revisions.changes[0].new_amount, 204.0);
        assert!(summary.total_check.passed);

        let dfw = &summary.division_totals[0];
        assert_eq!(dfw.division, Division::Dfw);
        assert_eq!(dfw.amount, 204.0);

        let names = &cfg.names;
        let dfw_csv = std::fs::read_to_string(exports.join(names.division_import(Division::Dfw))).unwrap();
        assert!(dfw_csv.contains("12345,,2023-045,9000-100,8,25.5,204.00"));
        let hou_csv = std::fs::read_to_string(exports.join(names.division_import(Division::Hou))).unwrap();
        assert!(hou_csv.contains("EX-7,,H22-017,CC NEEDED,0.5,3000,1500.00"));
        assert!(exports.join(names.master_allocation()).exists());
        assert!(exports.join(names.change_log()).exists());
    }

    #[test]
    fn test_pm_sheet_repeating_units_writes_no_change_log() {
        let dir = tempfile::tempdir().unwrap();
        let exports = dir.path().join("exports");
        write_baseline(dir.path());
        std::fs::write(
            dir.path().join("pm_copy.csv"),
            "Equip #,Job,Units\n12345,2023-045,10\nEX-7,H22-017,0.5\n",
        )
        .unwrap();
        let mut cfg = config(dir.path(), &exports);
        cfg.pm_files = vec![SourceSpec::new("pm_copy.csv", "")];

        let summary = run(&cfg, &mut SheetCache::new()).unwrap();
        assert!(summary.revisions.changes.is_empty());
        assert!(summary.revisions.unmatched.is_empty());
        assert!(!exports.join(cfg.names.change_log()).exists());
    }

    #[test]
    fn test_missing_baseline_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), &dir.path().join("exports"));
        let err = run(&cfg, &mut SheetCache::new()).unwrap_err();
        assert!(matches!(err, BillingError::BaselineMissing(_)));
    }

    #[test]
    fn test_missing_extra_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_baseline(dir.path());
        let mut cfg = config(dir.path(), &dir.path().join("exports"));
        cfg.sources = vec![SourceSpec::new("select.xlsx", "Equip Billings")];
        std::fs::write(dir.path().join("pm_bad.csv"), "Equip #,Notes\n1,x\n").unwrap();
        cfg.pm_files = vec![SourceSpec::new("pm_bad.csv", "")];
        cfg.dry_run = true;

        let summary = run(&cfg, &mut SheetCache::new()).unwrap();
        assert_eq!(summary.skipped.len(), 2);
        assert!(matches!(summary.skipped[0].error, BillingError::FileNotFound(_)));
        assert!(matches!(summary.skipped[1].error, BillingError::MissingColumns { .. }));
        assert!(summary.written.is_empty());
        assert!(!dir.path().join("exports").exists());
    }

    #[test]
    fn test_rerun_produces_identical_csvs() {
        let dir = tempfile::tempdir().unwrap();
        write_baseline(dir.path());
        let cfg = config(dir.path(), &dir.path().join("exports"));
        let path = dir.path().join("exports").join(cfg.names.division_import(Division::Dfw));

        run(&cfg, &mut SheetCache::new()).unwrap();
        let first = std::fs::read(&path).unwrap();
        run(&cfg, &mut SheetCache::new()).unwrap();
        assert_eq!(first, std::fs::read(&path).unwrap());
    }

    #[test]
    fn test_compare_pm_totals() {
        let dir = tempfile::tempdir().unwrap();
        write_baseline(dir.path());
        std::fs::write(
            dir.path().join("pm_hou.csv"),
            "Equip #,Job,Amount\nEX-7,H22-017,1500\nEX-9,WTX-330,900\n",
        )
        .unwrap();
        let cfg = config(dir.path(), &dir.path().join("exports"));
        let (report, skipped) = compare_pm_totals(
            &cfg,
            &mut SheetCache::new(),
            &[SourceSpec::new("pm_hou.csv", "")],
            1000.0,
        )
        .unwrap();
        assert!(skipped.is_empty());
        assert_eq!(report.original_total, 3955.0);
        assert_eq!(report.entries[0].total, 2400.0);
        assert!(report.entries[0].significant);
    }
}
