use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook};

use crate::error::Result;
use crate::fmt::month_name;
use crate::models::{round2, BillingRecord, ChangeLogEntry, Division};

pub const ALLOCATION_SHEET: &str = "EQ ALLOCATIONS - ALL DIV";
pub const BILLING_SHEET: &str = "Equip Billings";

/// Column schema expected by the downstream regional import.
pub const DIVISION_CSV_HEADER: [&str; 7] = [
    "Equipment_Number",
    "Date",
    "Job",
    "Cost_Code",
    "Hours",
    "Rate",
    "Amount",
];

const MASTER_HEADER: [&str; 9] = [
    "Equip #", "Job", "Division", "Cost Code", "Date", "Units", "Rate", "Amount", "Source",
];

/// File names for one billing period.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportNames {
    pub month: u32,
    pub year: i32,
}

impl ExportNames {
    pub fn new(month: u32, year: i32) -> Self {
        Self { month, year }
    }

    fn suffix(&self) -> String {
        format!("{}_{}", month_name(self.month), self.year)
    }

    pub fn master_allocation(&self) -> String {
        format!("FINALIZED_MASTER_ALLOCATION_SHEET_{}.xlsx", self.suffix())
    }

    pub fn master_billing(&self) -> String {
        format!("MASTER_BILLINGS_SHEET_{}.xlsx", self.suffix())
    }

    pub fn division_import(&self, division: Division) -> String {
        format!("FINAL_REGION_IMPORT_{}_{}.csv", division.code(), self.suffix())
    }

    pub fn change_log(&self) -> String {
        format!("PM_CHANGE_LOG_{}.csv", self.suffix())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub rows: usize,
    pub total: f64,
}

/// Records in export order: equipment, job, date, then input order.
pub fn sorted_for_export<'a>(records: impl IntoIterator<Item = &'a BillingRecord>) -> Vec<&'a BillingRecord> {
    let mut out: Vec<&BillingRecord> = records.into_iter().collect();
    out.sort_by(|a, b| {
        a.equipment_id
            .cmp(&b.equipment_id)
            .then_with(|| a.job_number.cmp(&b.job_number))
            .then_with(|| a.date.cmp(&b.date))
    });
    out
}

fn fmt_quantity(val: f64) -> String {
    let rounded = (val * 10_000.0).round() / 10_000.0;
    format!("{rounded}")
}

pub fn write_master_workbook(
    path: &Path,
    sheet_label: &str,
    records: &[BillingRecord],
) -> Result<WrittenFile> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let header_format = Format::new()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_border_bottom(FormatBorder::Thin);
    let money_format = Format::new().set_num_format("#,##0.00");
    let total_format = Format::new()
        .set_bold()
        .set_num_format("#,##0.00")
        .set_border_top(FormatBorder::Thin);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name(sheet_label)?;

    for (col, label) in MASTER_HEADER.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *label, &header_format)?;
    }

    let sorted = sorted_for_export(records);
    for (i, rec) in sorted.iter().enumerate() {
        let row = i as u32 + 1;
        worksheet.write_string(row, 0, &rec.equipment_id)?;
        worksheet.write_string(row, 1, &rec.job_number)?;
        worksheet.write_string(row, 2, rec.division.code())?;
        worksheet.write_string(row, 3, &rec.cost_code)?;
        worksheet.write_string(row, 4, &rec.date)?;
        worksheet.write_number(row, 5, rec.units)?;
        if let Some(rate) = rec.rate {
            worksheet.write_number_with_format(row, 6, rate, &money_format)?;
        }
        worksheet.write_number_with_format(row, 7, rec.amount, &money_format)?;
        worksheet.write_string(row, 8, &rec.source)?;
    }

    let total = round2(records.iter().map(|r| r.amount).sum());
    let total_row = sorted.len() as u32 + 1;
    worksheet.write_string_with_format(total_row, 0, "TOTAL", &total_format)?;
    worksheet.write_number_with_format(total_row, 7, total, &total_format)?;

    worksheet.set_column_width(0, 14)?;
    worksheet.set_column_width(1, 14)?;
    worksheet.set_column_width(3, 14)?;
    worksheet.set_column_width(7, 14)?;
    worksheet.set_freeze_panes(1, 0)?;

    workbook.save(path)?;
    Ok(WrittenFile {
        path: path.to_path_buf(),
        rows: records.len(),
        total,
    })
}

/// Write one division's import CSV. Rows are sorted so identical input
/// produces identical bytes.
pub fn write_division_csv(
    path: &Path,
    division: Division,
    records: &[BillingRecord],
) -> Result<WrittenFile> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(DIVISION_CSV_HEADER)?;

    let rows = sorted_for_export(records.iter().filter(|r| r.division == division));
    let mut total = 0.0;
    for rec in &rows {
        total += rec.amount;
        wtr.write_record([
            rec.equipment_id.as_str(),
            rec.date.as_str(),
            rec.job_number.as_str(),
            rec.cost_code.as_str(),
            fmt_quantity(rec.units).as_str(),
            rec.rate.map(fmt_quantity).unwrap_or_default().as_str(),
            format!("{:.2}", rec.amount).as_str(),
        ])?;
    }
    wtr.flush()?;

    Ok(WrittenFile {
        path: path.to_path_buf(),
        rows: rows.len(),
        total: round2(total),
    })
}

pub fn write_change_log(path: &Path, changes: &[ChangeLogEntry]) -> Result<WrittenFile> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "Equipment_Number",
        "Job",
        "Division",
        "Old_Units",
        "New_Units",
        "Old_Amount",
        "New_Amount",
        "Change",
        "Source",
    ])?;
    for c in changes {
        wtr.write_record([
            c.equipment_id.as_str(),
            c.job_number.as_str(),
            c.division.code(),
            fmt_quantity(c.old_units).as_str(),
            fmt_quantity(c.new_units).as_str(),
            format!("{:.2}", c.old_amount).as_str(),
            format!("{:.2}", c.new_amount).as_str(),
            format!("{:.2}", c.delta()).as_str(),
            c.source.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(WrittenFile {
        path: path.to_path_buf(),
        rows: changes.len(),
        total: round2(changes.iter().map(|c| c.delta()).sum()),
    })
}

/// Write every deliverable for the period into `dir`, creating it if needed.
/// Files already written stay on disk if a later write fails.
pub fn write_all(
    dir: &Path,
    names: &ExportNames,
    records: &[BillingRecord],
    changes: &[ChangeLogEntry],
) -> Result<Vec<WrittenFile>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    written.push(write_master_workbook(
        &dir.join(names.master_allocation()),
        ALLOCATION_SHEET,
        records,
    )?);
    written.push(write_master_workbook(
        &dir.join(names.master_billing()),
        BILLING_SHEET,
        records,
    )?);
    for division in Division::ALL {
        written.push(write_division_csv(
            &dir.join(names.division_import(division)),
            division,
            records,
        )?);
    }
    if !changes.is_empty() {
        written.push(write_change_log(&dir.join(names.change_log()), changes)?);
    }
    for file in &written {
        tracing::info!(path = %file.path.display(), rows = file.rows, total = file.total, "wrote export");
    }
    Ok(written)
}
