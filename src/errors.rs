// 🚨 Error taxonomy for the ingestion pipeline
//
// Structural and invariant errors are fatal for the file they were raised on.
// Coercion never produces an error (see coerce.rs).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The file layout does not match the expected template
    /// (shifted rows, renamed labels, changed column order).
    #[error("structural mismatch in {file}: {check}: expected {expected:?}, found {actual:?}")]
    StructuralMismatch {
        file: String,
        check: String,
        expected: String,
        actual: String,
    },

    /// Itemized counts do not add up to the printed total.
    #[error("invariant violated in {file}: {detail}")]
    InvariantViolation { file: String, detail: String },

    /// A tabular source lacks a column its extractor depends on.
    #[error("missing column {column:?} in {file}")]
    MissingColumn { file: String, column: String },

    /// An extracted fragment holds values outside the canonical schema
    /// (non-finite numbers, shares outside [0, 1]).
    #[error("invalid fragment from {source_name}: {count} bad values, first: {first}")]
    InvalidFragment {
        source_name: String,
        count: usize,
        first: String,
    },

    /// A source could not be extracted while building a merged table.
    #[error("source {source_name} failed: {error}")]
    SourceFailed {
        source_name: String,
        #[source]
        error: Box<Error>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn structural(
        file: impl Into<String>,
        check: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Error::StructuralMismatch {
            file: file.into(),
            check: check.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invariant(file: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::InvariantViolation {
            file: file.into(),
            detail: detail.into(),
        }
    }

    /// Wrap an extraction failure with the name of the source it came from
    pub fn source_failed(source_name: impl Into<String>, error: Error) -> Self {
        Error::SourceFailed {
            source_name: source_name.into(),
            error: Box::new(error),
        }
    }

    /// True for errors that indicate the upstream format changed
    pub fn is_structural(&self) -> bool {
        match self {
            Error::StructuralMismatch { .. } | Error::MissingColumn { .. } => true,
            Error::SourceFailed { error, .. } => error.is_structural(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_message_names_file_and_marker() {
        let err = Error::structural("fz28_2024_03.xlsx", "row 7 col 1", "Fahrzeugklasse", "");
        let msg = err.to_string();
        assert!(msg.contains("fz28_2024_03.xlsx"));
        assert!(msg.contains("Fahrzeugklasse"));
        assert!(err.is_structural());
    }

    #[test]
    fn test_source_failed_keeps_cause() {
        let inner = Error::invariant("fz28_2024_03.xlsx", "sum 10 != total 11");
        let err = Error::source_failed("kba", inner);
        assert!(err.to_string().contains("kba"));
        assert!(!err.is_structural());

        let structural = Error::source_failed(
            "iea",
            Error::MissingColumn {
                file: "EVDataExplorer2025.xlsx".to_string(),
                column: "powertrain".to_string(),
            },
        );
        assert!(structural.is_structural());
    }
}
