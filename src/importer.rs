use std::fmt;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::columns::ColumnMap;
use crate::division::{classify, extract_job_number, resolve_cost_code};
use crate::error::Result;
use crate::models::{BillingRecord, CellValue, SheetData};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NumericError {
    pub raw: String,
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a number: '{}'", self.raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateError {
    pub raw: String,
}

impl fmt::Display for DateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "date serial out of range: '{}'", self.raw)
    }
}

/// Parse a money/quantity string. `(12.50)` is negative; `$`, `,` and quotes
/// are ignored. `nan` and `inf` are rejected.
pub fn parse_amount(raw: &str) -> std::result::Result<f64, NumericError> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    let err = || NumericError { raw: raw.to_string() };
    let value = match s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => inner.trim().parse::<f64>().map(|v| -v),
        None => s.parse::<f64>(),
    }
    .map_err(|_| err())?;
    if !value.is_finite() {
        return Err(err());
    }
    Ok(value)
}

/// Blank cells are `Ok(None)`; text that is not a number is an error the
/// caller reports instead of treating as zero.
pub fn parse_numeric(cell: &CellValue) -> std::result::Result<Option<f64>, NumericError> {
    match cell {
        CellValue::Number(n) if !n.is_finite() => Err(NumericError { raw: n.to_string() }),
        CellValue::Number(n) => Ok(Some(*n)),
        CellValue::Empty => Ok(None),
        CellValue::Text(s) if s.trim().is_empty() || s.trim() == "-" => Ok(None),
        CellValue::Text(s) => parse_amount(s).map(Some),
        CellValue::Bool(b) => Err(NumericError { raw: b.to_string() }),
        CellValue::Date(d) => Err(NumericError { raw: d.clone() }),
    }
}

pub fn parse_date_mdy(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let m: u32 = parts[0].parse().ok()?;
    let d: u32 = parts[1].parse().ok()?;
    let y: i32 = parts[2].parse().ok()?;
    chrono::NaiveDate::from_ymd_opt(y, m, d).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// `None` for serials that are not finite or fall outside chrono's range.
pub fn excel_serial_to_date(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = chrono::Duration::try_days(serial.trunc() as i64)?;
    base.checked_add_signed(days)
        .map(|date| date.format("%Y-%m-%d").to_string())
}

/// Normalize whatever a Date cell holds to `YYYY-MM-DD` when recognizable.
/// Text that is neither a date nor a serial passes through unchanged; a
/// serial that cannot be a date is an error carrying the raw text.
pub fn date_cell(cell: &CellValue) -> std::result::Result<String, DateError> {
    let serial = |n: f64, raw: String| excel_serial_to_date(n).ok_or(DateError { raw });
    match cell {
        CellValue::Date(d) => Ok(d.clone()),
        CellValue::Number(n) => serial(*n, cell.as_text()),
        CellValue::Text(s) => {
            let s = s.trim();
            if let Some(d) = parse_date_mdy(s) {
                Ok(d)
            } else if let Ok(n) = s.parse::<f64>() {
                serial(n, s.to_string())
            } else {
                Ok(s.to_string())
            }
        }
        _ => Ok(String::new()),
    }
}

pub fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Row extraction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RowWarning {
    pub source: String,
    /// 1-based position among the data rows below the header.
    pub row: usize,
    pub column: &'static str,
    pub message: String,
}

impl fmt::Display for RowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} row {} [{}]: {}", self.source, self.row, self.column, self.message)
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub source: String,
    pub records: Vec<BillingRecord>,
    pub warnings: Vec<RowWarning>,
    pub skipped_rows: usize,
}

fn is_total_row(equipment: &str) -> bool {
    let upper = equipment.to_ascii_uppercase();
    upper.starts_with("TOTAL") || upper.starts_with("GRAND TOTAL")
}

/// Turn sheet rows into unreconciled billing records. `amount` holds the
/// source amount (or zero) until the reconciler runs.
pub fn extract_records(sheet: &SheetData, columns: &ColumnMap) -> LoadReport {
    let mut report = LoadReport {
        source: sheet.source.clone(),
        ..Default::default()
    };

    for idx in 0..sheet.rows.len() {
        let row_no = idx + 1;
        let equipment_id = sheet.cell(idx, columns.equipment).as_text();
        let job_raw = sheet.cell(idx, columns.job).as_text();
        if equipment_id.is_empty() || job_raw.is_empty() || is_total_row(&equipment_id) {
            report.skipped_rows += 1;
            continue;
        }

        let mut numeric = |col: Option<usize>, label: &'static str| -> Option<f64> {
            let col = col?;
            match parse_numeric(sheet.cell(idx, col)) {
                Ok(v) => v,
                Err(e) => {
                    let warning = RowWarning {
                        source: sheet.source.clone(),
                        row: row_no,
                        column: label,
                        message: e.to_string(),
                    };
                    tracing::warn!("{warning}");
                    report.warnings.push(warning);
                    None
                }
            }
        };

        let units = numeric(columns.units, "Units");
        let rate = numeric(columns.rate, "Rate");
        let source_amount = numeric(columns.amount, "Amount");

        // A rate is only usable alongside a readable unit count.
        let rate = if units.is_some() { rate } else { None };
        if rate.is_none() && source_amount.is_none() {
            report.skipped_rows += 1;
            continue;
        }

        let job_number = extract_job_number(&job_raw);
        let division = classify(&job_number);
        let cost_code = resolve_cost_code(
            &columns
                .cost_code
                .map(|c| sheet.cell(idx, c).as_text())
                .unwrap_or_default(),
        );
        let date = match columns.date.map(|c| date_cell(sheet.cell(idx, c))) {
            Some(Ok(d)) => d,
            Some(Err(e)) => {
                let warning = RowWarning {
                    source: sheet.source.clone(),
                    row: row_no,
                    column: "Date",
                    message: e.to_string(),
                };
                tracing::warn!("{warning}");
                report.warnings.push(warning);
                e.raw
            }
            None => String::new(),
        };

        report.records.push(BillingRecord {
            equipment_id,
            job_number,
            division,
            cost_code,
            date,
            units: units.unwrap_or(0.0),
            rate,
            amount: source_amount.unwrap_or(0.0),
            source_amount,
            source: sheet.source.clone(),
        });
    }
    report
}
