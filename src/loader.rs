use std::path::Path;

use calamine::{Data, Reader};

use crate::columns::{self, Field};
use crate::error::{BillingError, Result};
use crate::importer::excel_serial_to_date;
use crate::models::{CellValue, SheetData};

/// How far down a sheet to look for the header row. Billing workbooks carry a
/// title block of a few rows above the table.
const HEADER_SCAN_ROWS: usize = 20;

/// Open `path` and return the sheet best matching `sheet_hint`.
///
/// Workbooks (`.xlsx`, `.xlsm`, `.xls`) go through calamine; anything else is
/// read as CSV and the hint is ignored. An empty hint picks the first sheet.
pub fn load_sheet(path: &Path, sheet_hint: &str) -> Result<SheetData> {
    if !path.exists() {
        return Err(BillingError::FileNotFound(path.to_path_buf()));
    }
    let raw = if is_workbook(path) {
        read_workbook(path, sheet_hint)?
    } else {
        read_csv(path)?
    };
    let (sheet, rows) = raw;
    Ok(into_sheet_data(source_name(path), sheet, rows))
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "xlsx" | "xlsm" | "xls" | "xlsb"))
        .unwrap_or(false)
}

pub fn source_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}

/// Pick a sheet name: exact, then case-insensitive, then case-insensitive
/// substring.
pub fn match_sheet_name<'a>(names: &'a [String], hint: &str) -> Option<&'a String> {
    if hint.trim().is_empty() {
        return names.first();
    }
    let hint_lower = hint.trim().to_lowercase();
    names
        .iter()
        .find(|n| n.as_str() == hint)
        .or_else(|| names.iter().find(|n| n.trim().to_lowercase() == hint_lower))
        .or_else(|| names.iter().find(|n| n.to_lowercase().contains(&hint_lower)))
}

fn read_workbook(path: &Path, sheet_hint: &str) -> Result<(String, Vec<Vec<CellValue>>)> {
    let mut workbook = calamine::open_workbook_auto(path)?;
    let names = workbook.sheet_names();
    let Some(name) = match_sheet_name(&names, sheet_hint).cloned() else {
        return Err(BillingError::SheetNotFound {
            path: path.to_path_buf(),
            sheet: sheet_hint.to_string(),
            available: names,
        });
    };
    let range = workbook.worksheet_range(&name)?;
    let rows = range
        .rows()
        .map(|row| row.iter().map(convert_cell).collect())
        .collect();
    Ok((name, rows))
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
            Some(d) => CellValue::Date(d),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => CellValue::Date(s.chars().take(10).collect()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("#{e:?}")),
    }
}

fn read_csv(path: &Path) -> Result<(String, Vec<Vec<CellValue>>)> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(
            record
                .iter()
                .map(|f| {
                    if f.trim().is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(f.to_string())
                    }
                })
                .collect(),
        );
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("csv")
        .to_string();
    Ok((stem, rows))
}

/// Index of the first row that names both an equipment and a job column.
pub fn detect_header_row(rows: &[Vec<CellValue>]) -> usize {
    rows.iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| {
            let labels: Vec<String> = row.iter().map(|c| c.as_text()).collect();
            columns::resolve(&labels, Field::Equipment).is_some()
                && columns::resolve(&labels, Field::Job).is_some()
        })
        .unwrap_or(0)
}

fn into_sheet_data(source: String, sheet: String, rows: Vec<Vec<CellValue>>) -> SheetData {
    let header_idx = detect_header_row(&rows);
    let headers: Vec<String> = rows
        .get(header_idx)
        .map(|r| r.iter().map(|c| c.as_text()).collect())
        .unwrap_or_default();
    let date_col = columns::resolve(&headers, Field::Date);

    let body = rows
        .into_iter()
        .skip(header_idx + 1)
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .map(|mut r| {
            if let Some(col) = date_col {
                // Out-of-range serials stay numeric and are reported per row.
                if let Some(&CellValue::Number(serial)) = r.get(col) {
                    if let Some(date) = excel_serial_to_date(serial) {
                        r[col] = CellValue::Date(date);
                    }
                }
            }
            r
        })
        .collect();

    SheetData {
        source,
        sheet,
        headers,
        rows: body,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    /// Write a single-sheet workbook with a title row above the table.
    pub(crate) fn write_xlsx(
        path: &Path,
        sheet: &str,
        headers: &[&str],
        rows: &[Vec<&str>],
    ) {
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet().set_name(sheet).unwrap();
        ws.write_string(0, 0, "EQUIPMENT BILLING - MONTH END").unwrap();
        for (c, h) in headers.iter().enumerate() {
            ws.write_string(2, c as u16, *h).unwrap();
        }
        for (r, row) in rows.iter().enumerate() {
            for (c, val) in row.iter().enumerate() {
                let (r32, c16) = (r as u32 + 3, c as u16);
                match val.parse::<f64>() {
                    Ok(n) => ws.write_number(r32, c16, n).unwrap(),
                    Err(_) => ws.write_string(r32, c16, *val).unwrap(),
                };
            }
        }
        wb.save(path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_sheet(&dir.path().join("nope.xlsx"), "Equip Billings").unwrap_err();
        assert!(matches!(err, BillingError::FileNotFound(_)));
    }

    #[test]
    fn test_match_sheet_name() {
        let names = vec!["Summary".to_string(), "EQ ALLOCATIONS - ALL DIV".to_string()];
        assert_eq!(match_sheet_name(&names, "eq allocations - all div").unwrap(), &names[1]);
        assert_eq!(match_sheet_name(&names, "ALLOCATIONS").unwrap(), &names[1]);
        assert_eq!(match_sheet_name(&names, "").unwrap(), &names[0]);
        assert!(match_sheet_name(&names, "Equip Billings").is_none());
    }

    #[test]
    fn test_load_xlsx_skips_title_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragle.xlsx");
        write_xlsx(
            &path,
            "Equip Billings",
            &["Equip #", "Job", "Units", "Rate", "Amount"],
            &[vec!["12345", "2023-045", "10", "25.50", "255"]],
        );
        let sheet = load_sheet(&path, "equip billings").unwrap();
        assert_eq!(sheet.sheet, "Equip Billings");
        assert_eq!(sheet.headers, vec!["Equip #", "Job", "Units", "Rate", "Amount"]);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.cell(0, 0).as_text(), "12345");
        assert_eq!(sheet.cell(0, 3), &CellValue::Number(25.5));
    }

    #[test]
    fn test_load_xlsx_sheet_not_found_lists_available() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragle.xlsx");
        write_xlsx(&path, "Equip Billings", &["Equip #", "Job"], &[]);
        match load_sheet(&path, "Timecards").unwrap_err() {
            BillingError::SheetNotFound { available, .. } => {
                assert_eq!(available, vec!["Equip Billings"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_csv_with_date_serials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pm.csv");
        std::fs::write(
            &path,
            "PM allocations,,,\n,,,\nEquip #,Job,Date,Units\n12345,2023-045,45667,8\n,,,\n",
        )
        .unwrap();
        let sheet = load_sheet(&path, "").unwrap();
        assert_eq!(sheet.headers[0], "Equip #");
        assert_eq!(sheet.rows.len(), 1);
        // CSV cells stay text; only numeric cells are converted.
        assert_eq!(sheet.cell(0, 2).as_text(), "45667");
    }

    #[test]
    fn test_xlsx_out_of_range_date_serial_stays_numeric() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragle.xlsx");
        write_xlsx(
            &path,
            "Equip Billings",
            &["Equip #", "Job", "Date", "Units", "Rate"],
            &[
                vec!["1", "2023-1", "99999999999", "1", "25"],
                vec!["2", "2023-1", "45667", "1", "25"],
            ],
        );
        let sheet = load_sheet(&path, "Equip Billings").unwrap();
        assert_eq!(sheet.cell(0, 2), &CellValue::Number(99_999_999_999.0));
        assert_eq!(sheet.cell(1, 2), &CellValue::Date("2025-01-10".to_string()));

        let columns = crate::columns::ColumnMap::resolve(&sheet.headers, &sheet.source).unwrap();
        let report = crate::importer::extract_records(&sheet, &columns);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].column, "Date");
    }

    #[test]
    fn test_detect_header_row_defaults_to_first() {
        let rows = vec![vec![CellValue::Text("A".into()), CellValue::Text("B".into())]];
        assert_eq!(detect_header_row(&rows), 0);
    }
}
