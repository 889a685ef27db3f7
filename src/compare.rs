//! Original-versus-PM total comparison. Purely informational: nothing here
//! changes records, it only tells a reader how far each PM sheet has drifted
//! from the baseline.

use crate::columns::ColumnMap;
use crate::error::Result;
use crate::importer::extract_records;
use crate::models::{round2, PmComparison, ReconciliationReport, SheetData};
use crate::reconciler::{grand_total, Reconciler};

/// Total of a sheet: units × rate where possible, the amount column otherwise.
pub fn sheet_total(sheet: &SheetData, reconciler: &Reconciler) -> Result<f64> {
    let columns = ColumnMap::resolve(&sheet.headers, &sheet.source)?;
    let mut report = extract_records(sheet, &columns);
    reconciler.reconcile_all(&mut report.records);
    Ok(grand_total(&report.records))
}

pub fn compare_totals(
    original_label: &str,
    original_total: f64,
    pm_totals: &[(String, f64)],
    significant_difference: f64,
) -> ReconciliationReport {
    let entries = pm_totals
        .iter()
        .map(|(label, total)| {
            let diff = round2(total - original_total);
            let pct_diff = if original_total == 0.0 {
                None
            } else {
                Some(diff / original_total * 100.0)
            };
            PmComparison {
                label: label.clone(),
                total: *total,
                abs_diff: diff.abs(),
                pct_diff,
                significant: diff.abs() > significant_difference,
            }
        })
        .collect();
    ReconciliationReport {
        original_label: original_label.to_string(),
        original_total,
        entries,
    }
}

impl ReconciliationReport {
    pub fn combined_total(&self) -> f64 {
        round2(self.entries.iter().map(|e| e.total).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellValue;

    #[test]
    fn test_compare_totals_flags_significant() {
        let report = compare_totals(
            "ragle.xlsx",
            100_000.0,
            &[
                ("pm_dfw.csv".to_string(), 100_500.0),
                ("pm_hou.csv".to_string(), 98_000.0),
            ],
            1000.0,
        );
        assert_eq!(report.entries[0].abs_diff, 500.0);
        assert!(!report.entries[0].significant);
        assert_eq!(report.entries[1].abs_diff, 2000.0);
        assert!(report.entries[1].significant);
        assert_eq!(report.entries[1].pct_diff, Some(-2.0));
        assert_eq!(report.combined_total(), 198_500.0);
    }

    #[test]
    fn test_compare_totals_zero_original() {
        let report = compare_totals("empty", 0.0, &[("pm".to_string(), 10.0)], 1000.0);
        assert_eq!(report.entries[0].pct_diff, None);
    }

    #[test]
    fn test_sheet_total_uses_units_times_rate() {
        let t = |s: &str| CellValue::Text(s.to_string());
        let sheet = SheetData {
            source: "pm.csv".to_string(),
            sheet: "pm".to_string(),
            headers: ["Equip #", "Job", "Units", "Rate", "Amount"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows: vec![
                vec![t("1"), t("2023-1"), t("10"), t("25.50"), t("999")],
                vec![t("2"), t("H-1"), t(""), t(""), t("45")],
            ],
        };
        assert_eq!(sheet_total(&sheet, &Reconciler::default()).unwrap(), 300.0);
    }
}
