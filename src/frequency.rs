use std::collections::HashMap;

use serde::{Serialize, ser::SerializeTuple};
use serde_json::Value as JsonValue;

use crate::{
    data::{ComparableValue, Value},
    frame::{ColumnData, Dataset},
    schema::ColumnType,
};

/// Distinct non-null values with their counts, most frequent first; ties by ascending value.
pub fn value_counts(data: &ColumnData) -> Vec<(Value, usize)> {
    let mut counts: HashMap<ComparableValue, usize> = HashMap::new();
    for value in data.iter().flatten() {
        *counts.entry(ComparableValue(Some(value))).or_insert(0) += 1;
    }
    let mut items = counts
        .into_iter()
        .filter_map(|(key, count)| key.0.map(|value| (value, count)))
        .collect::<Vec<_>>();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items
}

/// Coarse type name used in column interpretations.
pub fn descriptive_type(data: &ColumnData) -> &'static str {
    if data.is_categorical() {
        return "category";
    }
    if data.null_count() == data.len() {
        return "empty";
    }
    match data.column_type() {
        ColumnType::Integer | ColumnType::Float => "number",
        ColumnType::Boolean => "boolean",
        ColumnType::Date | ColumnType::DateTime => "date",
        ColumnType::String => "string",
    }
}

/// One `(value, count)` pair, serialized as a two-element array.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueCount {
    pub value: JsonValue,
    pub count: usize,
}

impl Serialize for ValueCount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.value)?;
        tuple.serialize_element(&self.count)?;
        tuple.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInterpretation {
    pub column_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<&'static str>,
    pub total_values: usize,
    pub null_count: usize,
    pub unique_count: usize,
    pub unique_values_with_counts: Vec<ValueCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full frequency distribution for each requested column; unknown names get an error entry.
pub fn interpret_columns(dataset: &Dataset, names: &[String]) -> Vec<ColumnInterpretation> {
    names
        .iter()
        .map(|name| match dataset.column(name) {
            Ok(column) => {
                let counts = value_counts(&column.data);
                ColumnInterpretation {
                    column_name: name.clone(),
                    data_type: Some(descriptive_type(&column.data)),
                    total_values: column.len(),
                    null_count: column.data.null_count(),
                    unique_count: counts.len(),
                    unique_values_with_counts: counts
                        .into_iter()
                        .map(|(value, count)| ValueCount {
                            value: value.to_json(),
                            count,
                        })
                        .collect(),
                    error: None,
                }
            }
            Err(_) => ColumnInterpretation {
                column_name: name.clone(),
                data_type: None,
                total_values: 0,
                null_count: 0,
                unique_count: 0,
                unique_values_with_counts: Vec::new(),
                error: Some(format!(
                    "Column '{name}' not found. Available columns: {}",
                    dataset.column_names().join(", ")
                )),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;

    fn letters() -> Dataset {
        Dataset::new(vec![Column::new(
            "letter",
            ColumnData::text(
                ["A", "B", "A", "A", "C"]
                    .iter()
                    .map(|s| Some(s.to_string()))
                    .collect(),
            ),
        )])
        .expect("dataset")
    }

    #[test]
    fn counts_sorted_by_frequency_then_value() {
        let interpretation = interpret_columns(&letters(), &["letter".to_string()]);
        let json = serde_json::to_value(&interpretation[0].unique_values_with_counts)
            .expect("serialize");
        assert_eq!(json, serde_json::json!([["A", 3], ["B", 1], ["C", 1]]));
        assert_eq!(interpretation[0].data_type, Some("string"));
        assert_eq!(interpretation[0].unique_count, 3);
    }

    #[test]
    fn missing_column_yields_error_entry() {
        let interpretation =
            interpret_columns(&letters(), &["letter".to_string(), "nope".to_string()]);
        assert_eq!(interpretation.len(), 2);
        assert!(interpretation[0].error.is_none());
        let error = interpretation[1].error.as_deref().expect("error");
        assert!(error.contains("nope"));
        assert!(error.contains("letter"));
    }

    #[test]
    fn descriptive_types() {
        assert_eq!(descriptive_type(&ColumnData::int32(vec![Some(1)])), "number");
        assert_eq!(descriptive_type(&ColumnData::float64(vec![None])), "empty");
        assert_eq!(
            descriptive_type(&ColumnData::categorical(vec![Some("x".into())]).expect("categorical")),
            "category"
        );
    }
}
