//! Request validation that runs before any file content is read.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

use log::{debug, warn};
use serde::Serialize;

use crate::{
    config::Config,
    error::{Result, ScoutError, ValidationKind},
};

const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];
const MAX_COLUMN_NAMES: usize = 100;
const MAX_COLUMN_NAME_LENGTH: usize = 255;
const MAX_SHEET_INDEX: usize = 1000;
const MAX_SHEET_NAME_LENGTH: usize = 31;
const INVALID_SHEET_CHARS: &[char] = &['\\', '/', '*', '?', ':', '[', ']'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Delimited,
    Workbook,
}

/// Outcome of a successful file check.
#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub path: PathBuf,
    pub kind: FileKind,
    pub extension: String,
    pub size: u64,
}

/// Worksheet choice for workbook inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    Index(usize),
    Name(String),
}

impl SheetSelector {
    /// Digits select by position, anything else by name.
    pub fn parse(raw: &str) -> SheetSelector {
        let trimmed = raw.trim();
        match trimmed.parse::<usize>() {
            Ok(index) => SheetSelector::Index(index),
            Err(_) => SheetSelector::Name(raw.to_string()),
        }
    }
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Index(idx) => write!(f, "#{idx}"),
            SheetSelector::Name(name) => f.write_str(name),
        }
    }
}

pub struct Validator<'a> {
    config: &'a Config,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Path sanity, then existence, extension and size, failing on the first problem.
    pub fn validate_file(&self, path: &Path) -> Result<ValidatedFile> {
        self.validate_path_shape(path)?;

        if !path.exists() {
            return Err(ScoutError::validation_at(
                ValidationKind::FileNotFound,
                format!("File not found: {}", path.display()),
                path,
            ));
        }
        let metadata = std::fs::metadata(path).map_err(|err| {
            ScoutError::validation_at(
                ValidationKind::InvalidPath,
                format!("Cannot read metadata for {}: {err}", path.display()),
                path,
            )
        })?;
        if !metadata.is_file() {
            return Err(ScoutError::validation_at(
                ValidationKind::NotAFile,
                format!("Path is not a file: {}", path.display()),
                path,
            ));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let kind = if DELIMITED_EXTENSIONS.contains(&extension.as_str()) {
            FileKind::Delimited
        } else if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
            FileKind::Workbook
        } else {
            return Err(ScoutError::validation_at(
                ValidationKind::UnsupportedExtension,
                format!(
                    "Unsupported file type '.{extension}'. Supported: {}",
                    DELIMITED_EXTENSIONS
                        .iter()
                        .chain(WORKBOOK_EXTENSIONS)
                        .map(|ext| format!(".{ext}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                path,
            ));
        };

        let size = metadata.len();
        if size > self.config.max_file_size {
            return Err(ScoutError::validation_at(
                ValidationKind::FileTooLarge,
                format!(
                    "File size {:.2} MB exceeds the {:.2} MB limit",
                    size as f64 / (1024.0 * 1024.0),
                    self.config.max_file_size as f64 / (1024.0 * 1024.0)
                ),
                path,
            ));
        }

        debug!("Validated {} ({kind:?}, {size} bytes)", path.display());
        Ok(ValidatedFile {
            path: path.to_path_buf(),
            kind,
            extension,
            size,
        })
    }

    fn validate_path_shape(&self, path: &Path) -> Result<()> {
        let raw = path.as_os_str();
        if raw.is_empty() {
            return Err(ScoutError::validation(
                ValidationKind::InvalidPath,
                "File path cannot be empty",
            ));
        }
        if raw.len() > self.config.max_path_length {
            return Err(ScoutError::validation(
                ValidationKind::InvalidPath,
                format!(
                    "File path exceeds maximum length of {} characters",
                    self.config.max_path_length
                ),
            ));
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            warn!("Path traversal attempt rejected: {}", path.display());
            return Err(ScoutError::validation_at(
                ValidationKind::InvalidPath,
                "Path traversal is not allowed",
                path,
            ));
        }
        Ok(())
    }

    /// Trims names and rejects empty, oversized or blank entries.
    pub fn validate_column_names(&self, names: &[String]) -> Result<Vec<String>> {
        if names.is_empty() {
            return Err(ScoutError::validation(
                ValidationKind::InvalidColumns,
                "Column names list cannot be empty",
            ));
        }
        if names.len() > MAX_COLUMN_NAMES {
            return Err(ScoutError::validation(
                ValidationKind::InvalidColumns,
                format!("Cannot process more than {MAX_COLUMN_NAMES} columns at once"),
            ));
        }
        names
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                if name.trim().is_empty() {
                    Err(ScoutError::validation(
                        ValidationKind::InvalidColumns,
                        format!("Column name at index {idx} cannot be empty or whitespace only"),
                    ))
                } else if name.chars().count() > MAX_COLUMN_NAME_LENGTH {
                    Err(ScoutError::validation(
                        ValidationKind::InvalidColumns,
                        format!(
                            "Column name at index {idx} exceeds maximum length of {MAX_COLUMN_NAME_LENGTH} characters"
                        ),
                    ))
                } else {
                    Ok(name.trim().to_string())
                }
            })
            .collect()
    }

    pub fn validate_sheet(&self, sheet: Option<&SheetSelector>) -> Result<()> {
        match sheet {
            None => Ok(()),
            Some(SheetSelector::Index(idx)) if *idx > MAX_SHEET_INDEX => {
                Err(ScoutError::validation(
                    ValidationKind::InvalidSheet,
                    format!("Sheet index {idx} exceeds the limit of {MAX_SHEET_INDEX}"),
                ))
            }
            Some(SheetSelector::Index(_)) => Ok(()),
            Some(SheetSelector::Name(name)) => {
                if name.trim().is_empty() {
                    Err(ScoutError::validation(
                        ValidationKind::InvalidSheet,
                        "Sheet name cannot be empty",
                    ))
                } else if name.chars().count() > MAX_SHEET_NAME_LENGTH {
                    Err(ScoutError::validation(
                        ValidationKind::InvalidSheet,
                        format!("Sheet name cannot exceed {MAX_SHEET_NAME_LENGTH} characters"),
                    ))
                } else if name.contains(INVALID_SHEET_CHARS) {
                    Err(ScoutError::validation(
                        ValidationKind::InvalidSheet,
                        "Sheet name contains one of the characters \\ / * ? : [ ]",
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    pub fn validate_code(&self, source: &str) -> Result<()> {
        if source.trim().is_empty() {
            return Err(ScoutError::validation(
                ValidationKind::InvalidCode,
                "Code cannot be empty",
            ));
        }
        let length = source.chars().count();
        if length > self.config.max_code_length {
            return Err(ScoutError::validation(
                ValidationKind::InvalidCode,
                format!(
                    "Code length {length} exceeds the maximum of {} characters",
                    self.config.max_code_length
                ),
            ));
        }
        Ok(())
    }
}
