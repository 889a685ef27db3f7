use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BillingError;

/// Operational region a billing line is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Division {
    #[serde(rename = "DFW")]
    Dfw,
    #[serde(rename = "HOU")]
    Hou,
    #[serde(rename = "WT")]
    Wt,
}

impl Division {
    pub const ALL: [Division; 3] = [Division::Dfw, Division::Hou, Division::Wt];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Dfw => "DFW",
            Self::Hou => "HOU",
            Self::Wt => "WT",
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Division {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DFW" => Ok(Self::Dfw),
            "HOU" => Ok(Self::Hou),
            "WT" | "WTX" => Ok(Self::Wt),
            other => Err(BillingError::UnknownDivision(other.to_string())),
        }
    }
}

/// A single spreadsheet cell after loading, independent of the source format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text rendering used for identifiers (equipment ids, job numbers).
    /// Whole numbers drop the trailing `.0` Excel gives them.
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) | Self::Date(s) => s.trim().to_string(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// Tabular contents of one sheet with its header row already separated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetData {
    pub source: String,
    pub sheet: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl SheetData {
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// One equipment-billing line.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingRecord {
    pub equipment_id: String,
    pub job_number: String,
    pub division: Division,
    pub cost_code: String,
    pub date: String,
    pub units: f64,
    pub rate: Option<f64>,
    pub amount: f64,
    /// Amount as it appeared in the source file, before reconciliation.
    pub source_amount: Option<f64>,
    pub source: String,
}

impl BillingRecord {
    pub fn key(&self) -> (&str, &str) {
        (self.equipment_id.as_str(), self.job_number.as_str())
    }
}

/// PM-supplied unit override for one equipment/job pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionEntry {
    pub equipment_id: String,
    pub job_number: String,
    pub new_units: f64,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLogEntry {
    pub equipment_id: String,
    pub job_number: String,
    pub division: Division,
    pub old_units: f64,
    pub new_units: f64,
    pub old_amount: f64,
    pub new_amount: f64,
    pub source: String,
}

impl ChangeLogEntry {
    pub fn delta(&self) -> f64 {
        self.new_amount - self.old_amount
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DivisionTotal {
    pub division: Division,
    pub amount: f64,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PmComparison {
    pub label: String,
    pub total: f64,
    pub abs_diff: f64,
    /// Percent of the original total; `None` when the original is zero.
    pub pct_diff: Option<f64>,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationReport {
    pub original_label: String,
    pub original_total: f64,
    pub entries: Vec<PmComparison>,
}

pub fn round2(val: f64) -> f64 {
    (val * 100.0).round() / 100.0
}
