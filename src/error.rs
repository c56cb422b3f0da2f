//! Error taxonomy for the profiling and execution pipelines.
//!
//! Every component raises a [`ScoutError`]; the tool boundary converts it into
//! an [`ErrorResponse`] so that nothing but the uniform
//! `{success:false, error_type, message, suggestion}` shape leaves the core.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::security::ForbiddenCategory;

/// Why a request failed validation before any I/O was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationKind {
    FileNotFound,
    NotAFile,
    UnsupportedExtension,
    FileTooLarge,
    InvalidPath,
    InvalidColumns,
    InvalidSheet,
    InvalidCode,
}

#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    /// Input rejected before reading (path, extension, size, arguments).
    #[error("{message}")]
    Validation {
        kind: ValidationKind,
        message: String,
        path: Option<PathBuf>,
    },

    /// Text encoding could not be determined or applied.
    #[error("encoding error: {message}")]
    Encoding { message: String },

    /// File could not be parsed into a table.
    #[error("failed to load data: {message}")]
    Load { message: String },

    /// Submitted code contains a forbidden token.
    #[error("forbidden operation detected: {token}")]
    SecurityViolation {
        token: String,
        category: ForbiddenCategory,
        reason: String,
        locations: Vec<String>,
    },

    /// Submitted code is not well formed.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    /// Evaluation failed part-way through.
    #[error("{message}")]
    RuntimeExecution {
        message: String,
        line: Option<usize>,
        statement: Option<String>,
        trace: Vec<String>,
    },

    /// The captured result is outside the serializable set.
    #[error("cannot format result of kind '{kind}': {message}")]
    Formatting { kind: String, message: String },

    /// A configurable feature was switched off.
    #[error("feature '{feature}' is disabled by configuration")]
    FeatureDisabled { feature: String },
}

/// Result type used by the pipeline components.
pub type Result<T> = std::result::Result<T, ScoutError>;

impl ScoutError {
    pub fn validation(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            message: message.into(),
            path: None,
        }
    }

    pub fn validation_at(
        kind: ValidationKind,
        message: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self::Validation {
            kind,
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    /// Wraps an `anyhow` chain from the CSV/IO plumbing, keeping every context layer.
    pub fn load_from(err: anyhow::Error) -> Self {
        Self::Load {
            message: format!("{err:#}"),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::RuntimeExecution {
            message: message.into(),
            line: None,
            statement: None,
            trace: Vec::new(),
        }
    }

    pub fn formatting(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Formatting {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Stable upper-snake identifier reported to callers.
    pub fn error_type(&self) -> &'static str {
        match self {
            ScoutError::Validation { kind, .. } => match kind {
                ValidationKind::FileNotFound => "FILE_NOT_FOUND",
                ValidationKind::NotAFile | ValidationKind::InvalidPath => "INVALID_FILE_PATH",
                ValidationKind::UnsupportedExtension => "UNSUPPORTED_FILE_TYPE",
                ValidationKind::FileTooLarge => "FILE_TOO_LARGE",
                ValidationKind::InvalidColumns => "INVALID_COLUMN_NAMES",
                ValidationKind::InvalidSheet => "INVALID_SHEET_NAME",
                ValidationKind::InvalidCode => "INVALID_CODE",
            },
            ScoutError::Encoding { .. } => "ENCODING_ERROR",
            ScoutError::Load { .. } => "DATA_ERROR",
            ScoutError::SecurityViolation { .. } => "SECURITY_VIOLATION",
            ScoutError::Syntax { .. } => "CODE_COMPILATION_ERROR",
            ScoutError::RuntimeExecution { .. } => "CODE_EXECUTION_ERROR",
            ScoutError::Formatting { .. } => "FORMATTING_ERROR",
            ScoutError::FeatureDisabled { .. } => "FEATURE_DISABLED",
        }
    }

    /// Actionable hint for the caller, chosen per error kind.
    pub fn suggestion(&self) -> String {
        match self {
            ScoutError::Validation { kind, .. } => match kind {
                ValidationKind::FileNotFound => {
                    "Check that the path is absolute and the file exists.".to_string()
                }
                ValidationKind::NotAFile | ValidationKind::InvalidPath => {
                    "Provide a path to a regular file without '..' components.".to_string()
                }
                ValidationKind::UnsupportedExtension => {
                    "Convert the file to CSV/TSV or an Excel workbook (.xlsx, .xls).".to_string()
                }
                ValidationKind::FileTooLarge => {
                    "Split the file or raise the configured size ceiling.".to_string()
                }
                ValidationKind::InvalidColumns => {
                    "Pass between 1 and 100 non-empty column names.".to_string()
                }
                ValidationKind::InvalidSheet => {
                    "Use a sheet index or a valid sheet name from the metadata.".to_string()
                }
                ValidationKind::InvalidCode => {
                    "Submit non-empty code that assigns the final value to 'result'.".to_string()
                }
            },
            ScoutError::Encoding { .. } => {
                "Re-save the file as UTF-8 and try again.".to_string()
            }
            ScoutError::Load { .. } => {
                "Check that the file is not corrupt and that every row has the header's field count."
                    .to_string()
            }
            ScoutError::SecurityViolation { token, .. } => {
                format!("Remove '{token}' from your code. Use table operations instead.")
            }
            ScoutError::Syntax { .. } => {
                "Fix the syntax at the reported position; statements look like `result = table['col'].sum()`."
                    .to_string()
            }
            ScoutError::RuntimeExecution { .. } => {
                "Cross-check column names and types against the most recent read_metadata output."
                    .to_string()
            }
            ScoutError::Formatting { .. } => {
                "Assign a table, series, mapping or scalar to 'result'.".to_string()
            }
            ScoutError::FeatureDisabled { .. } => {
                "Enable the feature in the configuration and restart.".to_string()
            }
        }
    }

    fn details(&self) -> Option<JsonValue> {
        match self {
            ScoutError::Validation {
                path: Some(path), ..
            } => Some(serde_json::json!({ "path": path.display().to_string() })),
            ScoutError::SecurityViolation {
                token,
                category,
                reason,
                locations,
            } => Some(serde_json::json!({
                "forbidden_operation": token,
                "category": category.as_str(),
                "reason": reason,
                "locations": locations,
            })),
            ScoutError::Syntax { line, column, .. } => {
                Some(serde_json::json!({ "line": line, "column": column }))
            }
            ScoutError::RuntimeExecution {
                line,
                statement,
                trace,
                ..
            } => Some(serde_json::json!({
                "line": line,
                "statement": statement,
                "trace": trace,
            })),
            _ => None,
        }
    }

    pub fn to_detail(&self) -> ErrorDetail {
        ErrorDetail {
            error_type: self.error_type().to_string(),
            message: self.to_string(),
            suggestion: self.suggestion(),
            details: self.details(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            detail: self.to_detail(),
        }
    }
}

impl From<arrow::error::ArrowError> for ScoutError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ScoutError::runtime(format!("table kernel failed: {err}"))
    }
}

/// Error fields shared by every failure shape.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    pub error_type: String,
    pub message: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

/// Uniform failure response crossing the core boundary.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    pub success: bool,
    #[serde(flatten)]
    pub detail: ErrorDetail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_distinct_types() {
        let missing = ScoutError::validation(ValidationKind::FileNotFound, "missing");
        let large = ScoutError::validation(ValidationKind::FileTooLarge, "too big");
        assert_eq!(missing.error_type(), "FILE_NOT_FOUND");
        assert_eq!(large.error_type(), "FILE_TOO_LARGE");
    }

    #[test]
    fn security_suggestion_names_token() {
        let err = ScoutError::SecurityViolation {
            token: "import os".to_string(),
            category: ForbiddenCategory::DangerousImport,
            reason: "nope".to_string(),
            locations: vec!["Line 1: import os".to_string()],
        };
        let response = err.to_response();
        assert!(!response.success);
        assert_eq!(response.detail.error_type, "SECURITY_VIOLATION");
        assert!(response.detail.suggestion.contains("import os"));
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["success"], false);
        assert_eq!(json["details"]["category"], "dangerous-import");
    }

    #[test]
    fn load_from_keeps_context_chain() {
        let err = anyhow::anyhow!("bad quote").context("Reading row 4");
        let converted = ScoutError::load_from(err);
        assert!(converted.to_string().contains("Reading row 4"));
        assert!(converted.to_string().contains("bad quote"));
    }
}
