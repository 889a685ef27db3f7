use std::collections::HashSet;

use crate::columns::{has_revision_column, ColumnMap};
use crate::division::extract_job_number;
use crate::error::Result;
use crate::importer::{parse_numeric, RowWarning};
use crate::models::{RevisionEntry, SheetData};

#[derive(Debug, Default)]
pub struct RevisionSet {
    pub entries: Vec<RevisionEntry>,
    pub warnings: Vec<RowWarning>,
    /// Later entries for an equipment/job pair that already had one.
    pub duplicates: Vec<RevisionEntry>,
}

impl RevisionSet {
    /// Add entries keeping the first one seen per equipment/job pair.
    pub fn extend(&mut self, entries: Vec<RevisionEntry>) {
        let mut seen: HashSet<(String, String)> = self
            .entries
            .iter()
            .map(|e| (e.equipment_id.clone(), e.job_number.clone()))
            .collect();
        for entry in entries {
            let key = (entry.equipment_id.clone(), entry.job_number.clone());
            if seen.insert(key) {
                self.entries.push(entry);
            } else {
                tracing::warn!(
                    equipment = %entry.equipment_id,
                    job = %entry.job_number,
                    source = %entry.source,
                    "duplicate revision ignored"
                );
                self.duplicates.push(entry);
            }
        }
    }
}

/// Read unit overrides from a PM allocation sheet. Rows with a blank
/// revision cell carry no change and are skipped.
pub fn load_revisions(sheet: &SheetData) -> Result<(Vec<RevisionEntry>, Vec<RowWarning>)> {
    let columns = ColumnMap::resolve_revision(&sheet.headers, &sheet.source)?;
    if !has_revision_column(&sheet.headers) {
        tracing::info!(source = %sheet.source, "no REVISION column, reading revised units from the units column");
    }
    let Some(units_col) = columns.units else {
        return Ok((Vec::new(), Vec::new()));
    };

    let mut entries = Vec::new();
    let mut warnings = Vec::new();
    for idx in 0..sheet.rows.len() {
        let equipment_id = sheet.cell(idx, columns.equipment).as_text();
        let job_raw = sheet.cell(idx, columns.job).as_text();
        if equipment_id.is_empty() || job_raw.is_empty() {
            continue;
        }
        match parse_numeric(sheet.cell(idx, units_col)) {
            Ok(Some(new_units)) => entries.push(RevisionEntry {
                equipment_id,
                job_number: extract_job_number(&job_raw),
                new_units,
                source: sheet.source.clone(),
            }),
            Ok(None) => {}
            Err(e) => {
                let warning = RowWarning {
                    source: sheet.source.clone(),
                    row: idx + 1,
                    column: "Units",
                    message: e.to_string(),
                };
                tracing::warn!("{warning}");
                warnings.push(warning);
            }
        }
    }
    Ok((entries, warnings))
}
