//! Post-export audit: re-read the division import CSVs, re-add them, and
//! check the per-asset allocation rule.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::Result;
use crate::fmt::money;
use crate::importer::parse_amount;
use crate::models::{round2, Division};
use crate::writer::ExportNames;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pass,
    Fail,
    /// Nothing to compare against; the value is reported only.
    Info,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: String,
    pub status: Status,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct VerificationReport {
    pub checks: Vec<Check>,
    pub division_sums: BTreeMap<Division, f64>,
    /// Assets whose units across all division files exceed the limit.
    pub over_allocated: Vec<(String, f64)>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status != Status::Fail)
    }
}

pub struct VerifyOptions<'a> {
    pub expected_totals: &'a BTreeMap<String, f64>,
    pub tolerance: f64,
    pub max_units_per_asset: f64,
}

struct CsvContents {
    /// Sum of the last column of every data row.
    last_column_sum: f64,
    units_by_asset: Vec<(String, f64)>,
    bad_cells: usize,
}

fn read_division_csv(path: &Path) -> Result<CsvContents> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = rdr.headers()?.clone();
    let asset_col = headers
        .iter()
        .position(|h| h.trim() == "Equipment_Number")
        .unwrap_or(0);
    let hours_col = headers
        .iter()
        .position(|h| h.trim() == "Hours")
        .unwrap_or(4);

    let mut contents = CsvContents {
        last_column_sum: 0.0,
        units_by_asset: Vec::new(),
        bad_cells: 0,
    };
    for result in rdr.records() {
        let record = result?;
        let Some(last) = record.iter().last() else {
            continue;
        };
        match parse_amount(last) {
            Ok(v) => contents.last_column_sum += v,
            Err(e) => {
                tracing::warn!(path = %path.display(), "{e}");
                contents.bad_cells += 1;
            }
        }
        let asset = record.get(asset_col).unwrap_or("").trim().to_string();
        if asset.is_empty() {
            continue;
        }
        match record.get(hours_col).map(parse_amount) {
            Some(Ok(units)) => contents.units_by_asset.push((asset, units)),
            Some(Err(_)) => contents.bad_cells += 1,
            None => {}
        }
    }
    contents.last_column_sum = round2(contents.last_column_sum);
    Ok(contents)
}

fn units_label(units: f64) -> String {
    if units.fract() == 0.0 {
        format!("{units:.1}")
    } else {
        format!("{units}")
    }
}

/// Re-add each division file and compare to the expected totals, then check
/// that no asset is allocated more than the unit limit across all files.
pub fn verify_exports(
    exports_dir: &Path,
    names: &ExportNames,
    opts: &VerifyOptions,
) -> VerificationReport {
    let mut report = VerificationReport::default();
    let mut units: HashMap<String, f64> = HashMap::new();

    let mut expected_totals: BTreeMap<Division, f64> = BTreeMap::new();
    for (key, &total) in opts.expected_totals {
        match key.parse::<Division>() {
            Ok(division) => {
                expected_totals.insert(division, total);
            }
            Err(e) => report.checks.push(Check {
                name: "Expected totals".to_string(),
                status: Status::Fail,
                detail: e.to_string(),
            }),
        }
    }

    for division in Division::ALL {
        let path = exports_dir.join(names.division_import(division));
        let name = format!("{} total", division.code());
        let contents = match read_division_csv(&path) {
            Ok(c) => c,
            Err(e) => {
                report.checks.push(Check {
                    name,
                    status: Status::Fail,
                    detail: format!("{}: {e}", path.display()),
                });
                continue;
            }
        };

        for (asset, u) in &contents.units_by_asset {
            *units.entry(asset.clone()).or_default() += u;
        }
        report.division_sums.insert(division, contents.last_column_sum);

        let sum = contents.last_column_sum;
        let check = match expected_totals.get(&division) {
            Some(&expected) => {
                let diff = round2(sum - expected);
                let status = if (sum - expected).abs() <= opts.tolerance {
                    Status::Pass
                } else {
                    Status::Fail
                };
                Check {
                    name,
                    status,
                    detail: format!("{} (expected {}, diff {})", money(sum), money(expected), money(diff)),
                }
            }
            None => Check {
                name,
                status: Status::Info,
                detail: format!("{} (no expected total configured)", money(sum)),
            },
        };
        report.checks.push(check);

        if contents.bad_cells > 0 {
            report.checks.push(Check {
                name: format!("{} numeric cells", division.code()),
                status: Status::Fail,
                detail: format!("{} unreadable cell(s)", contents.bad_cells),
            });
        }
    }

    let limit = opts.max_units_per_asset + opts.tolerance;
    let limit_label = units_label(opts.max_units_per_asset);
    let mut over: Vec<(String, f64)> = units
        .into_iter()
        .filter(|(_, u)| *u > limit)
        .map(|(a, u)| (a, round2(u)))
        .collect();
    over.sort_by(|a, b| a.0.cmp(&b.0));

    report.checks.push(if over.is_empty() {
        Check {
            name: "Asset allocation".to_string(),
            status: Status::Pass,
            detail: format!("no asset exceeds {limit_label} total units"),
        }
    } else {
        Check {
            name: "Asset allocation".to_string(),
            status: Status::Fail,
            detail: format!(
                "{} asset(s) with more than {limit_label} total units: {}",
                over.len(),
                over.iter()
                    .map(|(a, u)| format!("{a} ({u})"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    });
    report.over_allocated = over;
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Equipment_Number,Date,Job,Cost_Code,Hours,Rate,Amount\n";

    fn write(dir: &Path, names: &ExportNames, division: Division, rows: &str) {
        std::fs::write(
            dir.join(names.division_import(division)),
            format!("{HEADER}{rows}"),
        )
        .unwrap();
    }

    fn opts(expected: &BTreeMap<String, f64>) -> VerifyOptions<'_> {
        VerifyOptions {
            expected_totals: expected,
            tolerance: 0.01,
            max_units_per_asset: 1.0,
        }
    }

    #[test]
    fn test_verify_passes_matching_totals() {
        let dir = tempfile::tempdir().unwrap();
        let names = ExportNames::new(5, 2025);
        write(dir.path(), &names, Division::Dfw, "A1,2025-05-31,2023-045,CC NEEDED,1,2500,2500.00\n");
        write(dir.path(), &names, Division::Hou, "B1,2025-05-31,H22-017,CC NEEDED,0.5,1000,500.00\n");
        write(dir.path(), &names, Division::Wt, "");
        let mut expected = BTreeMap::new();
        expected.insert("DFW".to_string(), 2500.0);
        expected.insert("HOU".to_string(), 500.0);

        let report = verify_exports(dir.path(), &names, &opts(&expected));
        assert!(report.passed());
        assert_eq!(report.division_sums[&Division::Dfw], 2500.0);
        let wt = report.checks.iter().find(|c| c.name == "WT total").unwrap();
        assert_eq!(wt.status, Status::Info);
    }

    #[test]
    fn test_verify_fails_on_total_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let names = ExportNames::new(5, 2025);
        write(dir.path(), &names, Division::Dfw, "A1,,2023-045,,1,100,100.00\n");
        write(dir.path(), &names, Division::Hou, "");
        write(dir.path(), &names, Division::Wt, "");
        let mut expected = BTreeMap::new();
        expected.insert("DFW".to_string(), 100.02);
        let report = verify_exports(dir.path(), &names, &opts(&expected));
        assert!(!report.passed());
    }

    #[test]
    fn test_asset_over_one_unit_across_sheets_fails() {
        let dir = tempfile::tempdir().unwrap();
        let names = ExportNames::new(5, 2025);
        write(dir.path(), &names, Division::Dfw, "EX-9,,2023-045,,1,1000,1000.00\n");
        write(dir.path(), &names, Division::Hou, "EX-9,,H22-017,,0.5,1000,500.00\n");
        write(dir.path(), &names, Division::Wt, "");
        let expected = BTreeMap::new();
        let report = verify_exports(dir.path(), &names, &opts(&expected));
        assert!(!report.passed());
        assert_eq!(report.over_allocated, vec![("EX-9".to_string(), 1.5)]);
        let rule = report.checks.last().unwrap();
        assert!(rule.detail.contains("more than 1.0 total units"));
    }

    #[test]
    fn test_expected_totals_accept_division_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let names = ExportNames::new(5, 2025);
        write(dir.path(), &names, Division::Dfw, "");
        write(dir.path(), &names, Division::Hou, "");
        write(dir.path(), &names, Division::Wt, "C1,,WTX-330,,1,2200,2200.00\n");
        let mut expected = BTreeMap::new();
        expected.insert("WTX".to_string(), 2200.0);
        expected.insert("ATL".to_string(), 1.0);
        let report = verify_exports(dir.path(), &names, &opts(&expected));
        let wt = report.checks.iter().find(|c| c.name == "WT total").unwrap();
        assert_eq!(wt.status, Status::Pass);
        let bad = report.checks.iter().find(|c| c.name == "Expected totals").unwrap();
        assert_eq!(bad.status, Status::Fail);
    }

    #[test]
    fn test_missing_division_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let names = ExportNames::new(5, 2025);
        write(dir.path(), &names, Division::Dfw, "");
        write(dir.path(), &names, Division::Hou, "");
        let expected = BTreeMap::new();
        let report = verify_exports(dir.path(), &names, &opts(&expected));
        assert!(!report.passed());
        let wt = report.checks.iter().find(|c| c.name == "WT total").unwrap();
        assert_eq!(wt.status, Status::Fail);
    }
}
