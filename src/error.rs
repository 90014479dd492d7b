use std::path::PathBuf;
use thiserror::Error;

/// Domain failures raised while reading lab files or writing outputs.
///
/// Library functions return `anyhow::Result`; these variants are the typed
/// causes callers can downcast to.
#[derive(Error, Debug)]
pub enum StampError {
    #[error("{}: missing required column '{column}'", file.display())]
    MissingColumn { file: PathBuf, column: String },

    #[error("{}: {message}", file.display())]
    BadFormat { file: PathBuf, message: String },

    #[error("{}: wrote {written} spreadsheet rows but report has {expected} lines", file.display())]
    LineCountMismatch {
        file: PathBuf,
        expected: usize,
        written: usize,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl StampError {
    pub fn bad_format(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::BadFormat {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn missing_column(file: impl Into<PathBuf>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            file: file.into(),
            column: column.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StampError::missing_column("/tmp/a.txt", "Min Depth");
        assert_eq!(
            err.to_string(),
            "/tmp/a.txt: missing required column 'Min Depth'"
        );

        let err = StampError::LineCountMismatch {
            file: PathBuf::from("r.txt"),
            expected: 10,
            written: 9,
        };
        assert!(err.to_string().contains("wrote 9 spreadsheet rows"));
    }
}
