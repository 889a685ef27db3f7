//! Header resolution for hand-edited billing sheets.
//!
//! Source workbooks are not versioned and their headers drift between months
//! (`Equip #`, `EQUIPMENT NO`, `Equip No.`), so each logical field carries an
//! ordered list of candidate patterns. Exact matches win over substring
//! matches; within a tier the first column in sheet order wins.

use crate::error::{BillingError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Equipment,
    Job,
    CostCode,
    Date,
    Units,
    Rate,
    Amount,
}

impl Field {
    /// Display name used when reporting a missing column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Equipment => "Equip #",
            Self::Job => "Job",
            Self::CostCode => "Cost Code",
            Self::Date => "Date",
            Self::Units => "Units",
            Self::Rate => "Rate",
            Self::Amount => "Amount",
        }
    }

    fn exact(&self) -> &'static [&'static str] {
        match self {
            Self::Equipment => &["EQUIP #", "EQUIP#", "EQUIPMENT #", "EQUIP NO", "EQUIPMENT"],
            Self::Job => &["JOB", "JOB #", "JOB NO", "JOB NUMBER"],
            Self::CostCode => &["COST CODE", "CC", "COSTCODE"],
            Self::Date => &["DATE"],
            Self::Units => &["UNITS", "UNIT", "HOURS"],
            Self::Rate => &["RATE"],
            Self::Amount => &["AMOUNT", "AMT"],
        }
    }

    fn contains(&self) -> &'static [&'static str] {
        match self {
            Self::Equipment => &["EQUIP", "ASSET"],
            Self::Job => &["JOB"],
            Self::CostCode => &["COST CODE", "COST"],
            Self::Date => &["DATE"],
            Self::Units => &["UNIT", "HOURS", "QTY"],
            Self::Rate => &["RATE"],
            Self::Amount => &["AMOUNT", "TOTAL", "EXTENDED"],
        }
    }

    /// Substrings that disqualify an otherwise matching header.
    fn excludes(&self) -> &'static [&'static str] {
        match self {
            Self::Equipment => &["DESC", "TYPE", "CLASS"],
            Self::Job => &["DESC", "NAME", "COST"],
            Self::Units => &["RATE", "AMOUNT", "PRICE"],
            Self::Rate => &["AMOUNT"],
            Self::Amount => &["RATE", "UNIT"],
            _ => &[],
        }
    }
}

fn normalize(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

fn excluded(header: &str, field: Field) -> bool {
    field.excludes().iter().any(|x| header.contains(x))
}

/// Best matching column index for `field`, or `None`.
pub fn resolve(headers: &[String], field: Field) -> Option<usize> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();

    if field == Field::Units {
        if let Some(idx) = resolve_revision_units(&normalized) {
            return Some(idx);
        }
    }

    let exact = normalized
        .iter()
        .position(|h| field.exact().contains(&h.as_str()));
    if exact.is_some() {
        return exact;
    }
    normalized.iter().position(|h| {
        !excluded(h, field) && field.contains().iter().any(|pat| h.contains(pat))
    })
}

/// A units-like header explicitly tagged `REVISION` takes precedence over any
/// other units column.
fn resolve_revision_units(normalized: &[String]) -> Option<usize> {
    normalized.iter().position(|h| {
        h.contains("REVISION")
            && (h.contains("UNIT") || h.contains("HOURS") || h.contains("QTY"))
    })
}

/// True when the header row has a column tagged `REVISION`.
pub fn has_revision_column(headers: &[String]) -> bool {
    headers.iter().any(|h| normalize(h).contains("REVISION"))
}

/// Resolved column positions for one billing sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    pub equipment: usize,
    pub job: usize,
    pub cost_code: Option<usize>,
    pub date: Option<usize>,
    pub units: Option<usize>,
    pub rate: Option<usize>,
    pub amount: Option<usize>,
}

impl ColumnMap {
    /// Resolve a billing sheet. Equipment, job, units and one of rate/amount
    /// are required; every missing one is named in the error.
    pub fn resolve(headers: &[String], source_name: &str) -> Result<Self> {
        let equipment = resolve(headers, Field::Equipment);
        let job = resolve(headers, Field::Job);
        let units = resolve(headers, Field::Units);
        let rate = resolve(headers, Field::Rate);
        let amount = resolve(headers, Field::Amount);

        let mut missing = Vec::new();
        if equipment.is_none() {
            missing.push(Field::Equipment.label().to_string());
        }
        if job.is_none() {
            missing.push(Field::Job.label().to_string());
        }
        // Units are only required when there is a rate to multiply by.
        if units.is_none() && amount.is_none() {
            missing.push(Field::Units.label().to_string());
        }
        if rate.is_none() && amount.is_none() {
            missing.push(Field::Rate.label().to_string());
            missing.push(Field::Amount.label().to_string());
        }
        if !missing.is_empty() {
            return Err(BillingError::MissingColumns {
                source_name: source_name.to_string(),
                columns: missing,
            });
        }

        Ok(Self {
            equipment: equipment.unwrap_or_default(),
            job: job.unwrap_or_default(),
            cost_code: resolve(headers, Field::CostCode),
            date: resolve(headers, Field::Date),
            units,
            rate: if units.is_some() { rate } else { None },
            amount,
        })
    }

    /// Resolve a PM allocation sheet: equipment, job and a units column
    /// (the `REVISION` one when present).
    pub fn resolve_revision(headers: &[String], source_name: &str) -> Result<Self> {
        let equipment = resolve(headers, Field::Equipment);
        let job = resolve(headers, Field::Job);
        let units = resolve(headers, Field::Units);

        let mut missing = Vec::new();
        for (field, idx) in [
            (Field::Equipment, equipment),
            (Field::Job, job),
            (Field::Units, units),
        ] {
            if idx.is_none() {
                missing.push(field.label().to_string());
            }
        }
        if !missing.is_empty() {
            return Err(BillingError::MissingColumns {
                source_name: source_name.to_string(),
                columns: missing,
            });
        }

        Ok(Self {
            equipment: equipment.unwrap_or_default(),
            job: job.unwrap_or_default(),
            cost_code: resolve(headers, Field::CostCode),
            date: resolve(headers, Field::Date),
            units,
            rate: resolve(headers, Field::Rate),
            amount: resolve(headers, Field::Amount),
        })
    }

    /// No rate column: amounts are taken from the sheet unmodified.
    pub fn amount_only(&self) -> bool {
        self.rate.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let h = headers(&["equip #", "job", "units", "rate", "amount"]);
        assert_eq!(resolve(&h, Field::Equipment), Some(0));
        assert_eq!(resolve(&h, Field::Job), Some(1));
        assert_eq!(resolve(&h, Field::Units), Some(2));
        assert_eq!(resolve(&h, Field::Rate), Some(3));
        assert_eq!(resolve(&h, Field::Amount), Some(4));
    }

    #[test]
    fn test_exact_beats_substring() {
        let h = headers(&["Job Description", "Job", "Equipment Description", "Equip #"]);
        assert_eq!(resolve(&h, Field::Job), Some(1));
        assert_eq!(resolve(&h, Field::Equipment), Some(3));
    }

    #[test]
    fn test_substring_first_match_in_column_order() {
        let h = headers(&["Equip No.", "Job Code", "Unit Count", "Units Alt"]);
        assert_eq!(resolve(&h, Field::Equipment), Some(0));
        assert_eq!(resolve(&h, Field::Job), Some(1));
        assert_eq!(resolve(&h, Field::Units), Some(2));
    }

    #[test]
    fn test_revision_units_take_precedence() {
        let h = headers(&["Equip #", "Job", "Units", "REVISION UNITS"]);
        assert_eq!(resolve(&h, Field::Units), Some(3));
        assert!(has_revision_column(&h));
    }

    #[test]
    fn test_unit_rate_is_not_units() {
        let h = headers(&["Unit Rate", "Units Used"]);
        assert_eq!(resolve(&h, Field::Rate), Some(0));
        assert_eq!(resolve(&h, Field::Units), Some(1));
    }

    #[test]
    fn test_column_map_reports_all_missing() {
        let h = headers(&["Equip #", "Description"]);
        let err = ColumnMap::resolve(&h, "select.xlsx").unwrap_err();
        match err {
            BillingError::MissingColumns { source_name, columns } => {
                assert_eq!(source_name, "select.xlsx");
                assert_eq!(columns, vec!["Job", "Units", "Rate", "Amount"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_amount_only_fallback() {
        let h = headers(&["Equip #", "Job", "Amount"]);
        let map = ColumnMap::resolve(&h, "x").unwrap();
        assert!(map.amount_only());
        assert_eq!(map.amount, Some(2));
        assert_eq!(map.units, None);
    }

    #[test]
    fn test_rate_without_amount_is_enough() {
        let h = headers(&["Equip #", "Job", "Units", "Rate"]);
        let map = ColumnMap::resolve(&h, "x").unwrap();
        assert!(!map.amount_only());
        assert_eq!(map.amount, None);
    }

    #[test]
    fn test_resolve_revision_requires_units() {
        let h = headers(&["Equip #", "Job", "Notes"]);
        let err = ColumnMap::resolve_revision(&h, "pm.csv").unwrap_err();
        assert!(err.to_string().contains("Units"));
        let h = headers(&["Equip #", "Job", "Revision Hours"]);
        let map = ColumnMap::resolve_revision(&h, "pm.csv").unwrap();
        assert_eq!(map.units, Some(2));
    }
}
