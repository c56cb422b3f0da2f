//! Column statistics, data-quality warnings and suggested operations.

use std::collections::{BTreeSet, HashSet};

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{
    data::{ComparableValue, option_to_json},
    frame::{Column, Dataset},
    schema::ColumnType,
    stats::ColumnStats,
};

pub const HIGH_NULL_RATIO: f64 = 0.5;
pub const IDENTIFIER_RATIO: f64 = 0.95;
pub const LOW_CARDINALITY_RATIO: f64 = 0.5;
pub const LOW_CARDINALITY_MAX_DISTINCT: usize = 20;
pub const SAMPLE_VALUE_COUNT: usize = 3;
pub const MAX_SUGGESTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningCode {
    HighNull,
    AllNull,
    ConstantColumn,
    LikelyIdentifier,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::HighNull => "high-null",
            WarningCode::AllNull => "all-null",
            WarningCode::ConstantColumn => "constant-column",
            WarningCode::LikelyIdentifier => "likely-identifier",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Empty,
    Constant,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub logical_type: ColumnType,
    pub total_values: usize,
    pub null_count: usize,
    pub unique_count: usize,
    pub cardinality: Cardinality,
    pub sample_values: Vec<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_summary: Option<NumericSummary>,
    pub warnings: Vec<WarningCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ColumnProfile {
    pub fn null_ratio(&self) -> f64 {
        ratio(self.null_count, self.total_values)
    }

    pub fn unique_ratio(&self) -> f64 {
        ratio(self.unique_count, self.total_values)
    }

    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.warnings.contains(&code)
    }

    fn failed(column: &Column, message: String) -> Self {
        Self {
            name: column.name.clone(),
            dtype: column.data.dtype().to_string(),
            logical_type: column.data.column_type(),
            total_values: column.len(),
            null_count: 0,
            unique_count: 0,
            cardinality: Cardinality::Empty,
            sample_values: Vec::new(),
            numeric_summary: None,
            warnings: Vec::new(),
            error: Some(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    GroupBy,
    ValueCounts,
    FillNulls,
    DropNulls,
    DropColumn,
    ExcludeIdentifier,
    Describe,
    SortBy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestedOperation {
    pub operation: OperationKind,
    pub column: String,
    pub reason: String,
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnWarning {
    pub column: String,
    pub warning: WarningCode,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub row_count: usize,
    pub column_count: usize,
    pub warning_codes: BTreeSet<WarningCode>,
    pub warnings: Vec<ColumnWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetProfile {
    pub columns: Vec<ColumnProfile>,
    pub summary: DatasetSummary,
    pub suggested_operations: Vec<SuggestedOperation>,
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Profiles every column; a column whose statistics fail gets an `error` marker instead.
pub fn profile_dataset(dataset: &Dataset) -> DatasetProfile {
    let columns = dataset
        .columns()
        .iter()
        .map(|column| match profile_column(column) {
            Ok(profile) => profile,
            Err(message) => {
                warn!("Profiling column '{}' failed: {message}", column.name);
                ColumnProfile::failed(column, message)
            }
        })
        .collect::<Vec<_>>();

    let warnings = columns
        .iter()
        .flat_map(|profile| {
            profile.warnings.iter().map(|code| ColumnWarning {
                column: profile.name.clone(),
                warning: *code,
            })
        })
        .collect::<Vec<_>>();
    let summary = DatasetSummary {
        row_count: dataset.row_count(),
        column_count: dataset.column_count(),
        warning_codes: warnings.iter().map(|w| w.warning).collect(),
        warnings,
    };
    let suggested_operations = suggest_operations(&columns);
    DatasetProfile {
        columns,
        summary,
        suggested_operations,
    }
}

fn profile_column(column: &Column) -> Result<ColumnProfile, String> {
    let total_values = column.len();
    let null_count = column.data.null_count();
    let mut seen = HashSet::new();
    let mut sample_values = Vec::new();
    for value in column.data.iter().flatten() {
        let key = ComparableValue(Some(value));
        if seen.contains(&key) {
            continue;
        }
        if sample_values.len() < SAMPLE_VALUE_COUNT {
            sample_values.push(option_to_json(&key.0));
        }
        seen.insert(key);
    }
    let unique_count = seen.len();
    let logical_type = column.data.column_type();

    let numeric_summary = if logical_type.is_numeric() {
        numeric_summary(column)?
    } else {
        None
    };

    let null_ratio = ratio(null_count, total_values);
    let unique_ratio = ratio(unique_count, total_values);
    let mut warnings = Vec::new();
    if total_values > 0 && null_ratio > HIGH_NULL_RATIO {
        warnings.push(WarningCode::HighNull);
    }
    if total_values > 0 && null_count == total_values {
        warnings.push(WarningCode::AllNull);
    }
    if unique_count == 1 {
        warnings.push(WarningCode::ConstantColumn);
    }
    if logical_type == ColumnType::String && total_values > 1 && unique_ratio > IDENTIFIER_RATIO {
        warnings.push(WarningCode::LikelyIdentifier);
    }

    let cardinality = if unique_count == 0 {
        Cardinality::Empty
    } else if unique_count == 1 {
        Cardinality::Constant
    } else if unique_ratio > IDENTIFIER_RATIO {
        Cardinality::High
    } else if unique_count <= LOW_CARDINALITY_MAX_DISTINCT || unique_ratio < LOW_CARDINALITY_RATIO {
        Cardinality::Low
    } else {
        Cardinality::Medium
    };

    debug!(
        "Column '{}': {} null, {} unique, {:?}, warnings {:?}",
        column.name, null_count, unique_count, cardinality, warnings
    );
    Ok(ColumnProfile {
        name: column.name.clone(),
        dtype: column.data.dtype().to_string(),
        logical_type,
        total_values,
        null_count,
        unique_count,
        cardinality,
        sample_values,
        numeric_summary,
        warnings,
        error: None,
    })
}

fn numeric_summary(column: &Column) -> Result<Option<NumericSummary>, String> {
    let mut stats = ColumnStats::default();
    for value in column.data.iter().flatten() {
        if let Some(numeric) = value.as_f64() {
            stats.add(numeric);
        }
    }
    let (Some(min), Some(max), Some(mean)) = (stats.min(), stats.max(), stats.mean()) else {
        return Ok(None);
    };
    if !mean.is_finite() {
        return Err(format!(
            "numeric summary overflowed over {} value(s)",
            stats.count()
        ));
    }
    Ok(Some(NumericSummary {
        min,
        max,
        mean,
        std_dev: stats.std_dev().filter(|s| s.is_finite()),
    }))
}

/// Quotes a column name as a string literal of the transformation language.
pub fn quote(name: &str) -> String {
    format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn suggest_operations(columns: &[ColumnProfile]) -> Vec<SuggestedOperation> {
    let measure = columns.iter().find(|p| {
        p.logical_type.is_numeric() && p.error.is_none() && p.warnings.is_empty()
    });
    let mut suggestions = Vec::new();
    for profile in columns.iter().filter(|p| p.error.is_none()) {
        let name = quote(&profile.name);
        if profile.has_warning(WarningCode::AllNull)
            || profile.has_warning(WarningCode::ConstantColumn)
        {
            suggestions.push(SuggestedOperation {
                operation: OperationKind::DropColumn,
                column: profile.name.clone(),
                reason: if profile.has_warning(WarningCode::AllNull) {
                    "column contains only nulls".to_string()
                } else {
                    "column holds a single value".to_string()
                },
                example: format!("result = table.drop(columns=[{name}])"),
            });
            continue;
        }
        if profile.has_warning(WarningCode::HighNull) {
            let percent = profile.null_ratio() * 100.0;
            if profile.logical_type.is_numeric() {
                suggestions.push(SuggestedOperation {
                    operation: OperationKind::FillNulls,
                    column: profile.name.clone(),
                    reason: format!("{percent:.0}% of values are null"),
                    example: format!(
                        "table[{name}] = table[{name}].fillna(table[{name}].median())\nresult = table[{name}].describe()"
                    ),
                });
            } else {
                suggestions.push(SuggestedOperation {
                    operation: OperationKind::DropNulls,
                    column: profile.name.clone(),
                    reason: format!("{percent:.0}% of values are null"),
                    example: format!("result = table.dropna(subset=[{name}])"),
                });
            }
            continue;
        }
        if profile.has_warning(WarningCode::LikelyIdentifier) {
            suggestions.push(SuggestedOperation {
                operation: OperationKind::ExcludeIdentifier,
                column: profile.name.clone(),
                reason: "values are nearly all distinct; exclude from categorical analysis"
                    .to_string(),
                example: format!("result = table[{name}].nunique()"),
            });
            continue;
        }
        match (profile.logical_type, profile.cardinality) {
            (ColumnType::String | ColumnType::Boolean, Cardinality::Low) => match measure {
                Some(measure) => suggestions.push(SuggestedOperation {
                    operation: OperationKind::GroupBy,
                    column: profile.name.clone(),
                    reason: format!(
                        "{} distinct values make a good grouping key",
                        profile.unique_count
                    ),
                    example: format!(
                        "result = table.groupby({name})[{}].sum()",
                        quote(&measure.name)
                    ),
                }),
                None => suggestions.push(SuggestedOperation {
                    operation: OperationKind::ValueCounts,
                    column: profile.name.clone(),
                    reason: format!("{} distinct values", profile.unique_count),
                    example: format!("result = table[{name}].value_counts()"),
                }),
            },
            (ty, _) if ty.is_numeric() => suggestions.push(SuggestedOperation {
                operation: OperationKind::Describe,
                column: profile.name.clone(),
                reason: "numeric column".to_string(),
                example: format!("result = table[{name}].describe()"),
            }),
            (ty, _) if ty.is_temporal() => suggestions.push(SuggestedOperation {
                operation: OperationKind::SortBy,
                column: profile.name.clone(),
                reason: "temporal column orders the rows".to_string(),
                example: format!("result = table.sort_values({name}).head(10)"),
            }),
            _ => {}
        }
    }
    // Data-quality fixes first, exploration after.
    suggestions.sort_by_key(|s| match s.operation {
        OperationKind::DropColumn | OperationKind::FillNulls | OperationKind::DropNulls => 0,
        OperationKind::ExcludeIdentifier => 1,
        _ => 2,
    });
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ColumnData;

    fn text(values: &[Option<&str>]) -> ColumnData {
        ColumnData::text(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    fn scenario() -> Dataset {
        Dataset::new(vec![
            Column::new(
                "sales",
                ColumnData::int64(vec![Some(10), Some(20), Some(30), Some(40), Some(50), Some(60)]),
            ),
            Column::new(
                "region",
                text(&[
                    Some("East"),
                    Some("West"),
                    Some("East"),
                    Some("West"),
                    Some("East"),
                    Some("East"),
                ]),
            ),
            Column::new(
                "notes",
                text(&[Some("late"), None, None, None, Some("ok"), None]),
            ),
        ])
        .expect("dataset")
    }

    #[test]
    fn one_profile_per_column_in_order() {
        let profile = profile_dataset(&scenario());
        let names = profile
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["sales", "region", "notes"]);
        assert!(profile.columns.iter().all(|c| c.null_count <= c.total_values));
    }

    #[test]
    fn high_null_text_column_gets_drop_suggestion() {
        let profile = profile_dataset(&scenario());
        let notes = &profile.columns[2];
        assert!(notes.has_warning(WarningCode::HighNull));
        assert!(
            profile
                .suggested_operations
                .iter()
                .any(|s| s.column == "notes" && s.operation == OperationKind::DropNulls)
        );
        assert!(profile.summary.warning_codes.contains(&WarningCode::HighNull));
    }

    #[test]
    fn low_cardinality_text_suggests_groupby_over_measure() {
        let profile = profile_dataset(&scenario());
        let group = profile
            .suggested_operations
            .iter()
            .find(|s| s.operation == OperationKind::GroupBy)
            .expect("groupby suggestion");
        assert_eq!(group.column, "region");
        assert_eq!(group.example, "result = table.groupby('region')['sales'].sum()");
    }

    #[test]
    fn numeric_summary_and_samples() {
        let profile = profile_dataset(&scenario());
        let sales = &profile.columns[0];
        let summary = sales.numeric_summary.as_ref().expect("summary");
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.max, 60.0);
        assert_eq!(summary.mean, 35.0);
        assert_eq!(sales.sample_values.len(), 3);
    }

    #[test]
    fn constant_identifier_and_all_null_rules() {
        let dataset = Dataset::new(vec![
            Column::new("id", text(&[Some("a"), Some("b"), Some("c")])),
            Column::new("flag", text(&[Some("y"), Some("y"), Some("y")])),
            Column::new("blank", text(&[None, None, None])),
        ])
        .expect("dataset");
        let profile = profile_dataset(&dataset);
        assert!(profile.columns[0].has_warning(WarningCode::LikelyIdentifier));
        assert!(profile.columns[1].has_warning(WarningCode::ConstantColumn));
        assert!(profile.columns[2].has_warning(WarningCode::AllNull));
        assert!(profile.columns[2].has_warning(WarningCode::HighNull));
        assert_eq!(profile.columns[2].cardinality, Cardinality::Empty);
    }

    #[test]
    fn failing_column_is_isolated() {
        let dataset = Dataset::new(vec![
            Column::new("huge", ColumnData::float64(vec![Some(f64::MAX), Some(f64::MAX)])),
            Column::new("ok", ColumnData::int64(vec![Some(1), Some(2)])),
        ])
        .expect("dataset");
        let profile = profile_dataset(&dataset);
        assert!(profile.columns[0].error.is_some());
        assert!(profile.columns[1].error.is_none());
        assert!(profile.columns[1].numeric_summary.is_some());
    }

    #[test]
    fn quoting_escapes_apostrophes() {
        assert_eq!(quote("Owner's"), "'Owner\\'s'");
    }
}
