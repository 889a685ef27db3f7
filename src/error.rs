use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("XLSX write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Sheet '{sheet}' not found in {} (available: {})", path.display(), available.join(", "))]
    SheetNotFound {
        path: PathBuf,
        sheet: String,
        available: Vec<String>,
    },

    #[error("{source_name}: missing column(s) {}", columns.join(", "))]
    MissingColumns {
        source_name: String,
        columns: Vec<String>,
    },

    #[error("Baseline billing file missing: {}", .0.display())]
    BaselineMissing(PathBuf),

    #[error("Unknown division: {0}")]
    UnknownDivision(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl BillingError {
    /// Errors that end processing of one document but not the whole run.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_)
                | Self::SheetNotFound { .. }
                | Self::MissingColumns { .. }
                | Self::Workbook(_)
                | Self::Csv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_every_column() {
        let err = BillingError::MissingColumns {
            source_name: "ragle.xlsx".to_string(),
            columns: vec!["Units".to_string(), "Rate".to_string()],
        };
        assert_eq!(err.to_string(), "ragle.xlsx: missing column(s) Units, Rate");
    }

    #[test]
    fn test_per_file_errors() {
        assert!(BillingError::FileNotFound(PathBuf::from("x.xlsx")).is_per_file());
        assert!(!BillingError::BaselineMissing(PathBuf::from("x.xlsx")).is_per_file());
        assert!(!BillingError::Other("boom".into()).is_per_file());
    }
}
