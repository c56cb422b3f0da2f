//! Column type model and value-driven type inference.
//!
//! Inference is strict: a column gets a non-text type only when every
//! non-null value parses as that type. Placeholder tokens (`NA`, `null`, …)
//! count as nulls and never vote.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::data::{is_placeholder_token, parse_boolean, parse_naive_date, parse_naive_datetime};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    /// Accepts the cast names used by `astype`.
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "str" | "string" | "object" | "text" => Ok(ColumnType::String),
            "int" | "int64" | "int32" | "integer" => Ok(ColumnType::Integer),
            "float" | "float64" | "float32" | "double" | "number" => Ok(ColumnType::Float),
            "bool" | "boolean" => Ok(ColumnType::Boolean),
            "date" => Ok(ColumnType::Date),
            "datetime" | "datetime64" | "timestamp" => Ok(ColumnType::DateTime),
            other => Err(anyhow!("Unknown column type '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    non_empty: usize,
    possible_integer: bool,
    possible_float: bool,
    possible_boolean: bool,
    possible_date: bool,
    possible_datetime: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            non_empty: 0,
            possible_integer: true,
            possible_float: true,
            possible_boolean: true,
            possible_date: true,
            possible_datetime: true,
        }
    }

    fn update(&mut self, value: &str) {
        if is_placeholder_token(value) {
            return;
        }
        let trimmed = value.trim();
        self.non_empty += 1;
        if self.possible_integer && trimmed.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && !parses_as_float(trimmed) {
            self.possible_float = false;
        }
        if self.possible_boolean && parse_boolean(trimmed).is_none() {
            self.possible_boolean = false;
        }
        if self.possible_date && parse_naive_date(trimmed).is_err() {
            self.possible_date = false;
        }
        if self.possible_datetime && parse_naive_datetime(trimmed).is_err() {
            self.possible_datetime = false;
        }
    }

    fn decide(&self) -> ColumnType {
        if self.non_empty == 0 {
            ColumnType::String
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_date {
            ColumnType::Date
        } else if self.possible_datetime {
            ColumnType::DateTime
        } else {
            ColumnType::String
        }
    }
}

/// `f64::from_str` also accepts `inf`/`infinity`; only digits-based literals count here.
fn parses_as_float(value: &str) -> bool {
    value.parse::<f64>().is_ok() && value.bytes().any(|b| b.is_ascii_digit())
}

/// Infers one type per column from raw, row-major string cells.
pub fn infer_column_types(width: usize, rows: &[Vec<String>]) -> Vec<ColumnType> {
    let mut candidates = vec![TypeCandidate::new(); width];
    for row in rows {
        for (idx, candidate) in candidates.iter_mut().enumerate() {
            if let Some(value) = row.get(idx) {
                candidate.update(value);
            }
        }
    }
    candidates.iter().map(TypeCandidate::decide).collect()
}

/// Infers the type of one column given its raw cells.
pub fn infer_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let mut candidate = TypeCandidate::new();
    for value in values {
        candidate.update(value);
    }
    candidate.decide()
}

/// Makes header names unique and non-empty (`a`, `a.1`, `Unnamed: 2`).
pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashMap::<String, usize>::new();
    let mut out = Vec::with_capacity(raw.len());
    for (idx, header) in raw.iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("Unnamed: {idx}")
        } else {
            header.trim().to_string()
        };
        let mut name = base.clone();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{base}.{count}");
        }
        seen.insert(name.clone(), 0);
        out.push(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_names_match_display_names() {
        for ty in [
            ColumnType::String,
            ColumnType::Integer,
            ColumnType::Float,
            ColumnType::Boolean,
            ColumnType::Date,
            ColumnType::DateTime,
        ] {
            let json = serde_json::to_value(ty).expect("serialize");
            assert_eq!(json, serde_json::json!(ty.as_str()));
            let back: ColumnType = serde_json::from_value(json).expect("deserialize");
            assert_eq!(back, ty);
        }
    }

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn infers_numeric_boolean_and_temporal_columns() {
        let data = rows(&[
            &["1", "1.5", "true", "2024-01-01", "2024-01-01 10:00:00", "x"],
            &["2", "2", "False", "2024-01-02", "2024-01-02 11:00:00", "y"],
            &["NA", "", "", "", "", ""],
        ]);
        let types = infer_column_types(6, &data);
        assert_eq!(
            types,
            vec![
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::Boolean,
                ColumnType::Date,
                ColumnType::DateTime,
                ColumnType::String,
            ]
        );
    }

    #[test]
    fn single_non_matching_value_demotes_to_string() {
        assert_eq!(infer_type(["1", "2", "three"]), ColumnType::String);
        assert_eq!(infer_type(["inf", "1"]), ColumnType::String);
    }

    #[test]
    fn all_null_column_is_string() {
        assert_eq!(infer_type(["", "null", "N/A"]), ColumnType::String);
    }

    #[test]
    fn headers_are_deduplicated_and_named() {
        let headers = normalize_headers(&[
            "a".to_string(),
            "".to_string(),
            "a".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(headers, vec!["a", "Unnamed: 1", "a.1", "a.2"]);
    }

    #[test]
    fn astype_names_parse() {
        assert_eq!("int64".parse::<ColumnType>().unwrap(), ColumnType::Integer);
        assert_eq!("str".parse::<ColumnType>().unwrap(), ColumnType::String);
        assert!("complex".parse::<ColumnType>().is_err());
    }
}
