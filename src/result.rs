//! Normalizes whatever a program bound to `result` into a bounded,
//! serializable [`ExecutionResult`].
//!
//! Tables and series are capped at the configured record count with a
//! `truncated` flag; mappings are formatted recursively; scalars carry a
//! type tag. Anything else (groupby objects, accessors, modules, nested
//! lists at the top level) is a formatting error, never a stringification.

use log::debug;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::{
    data::{Value, option_to_json},
    error::{ErrorDetail, Result, ScoutError},
    frame::{ColumnData, Dataset, Series, SeriesIndex},
    optimize::{DtypeOptimizer, Optimization},
    script::ScriptValue,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TablePayload {
    pub columns: Vec<String>,
    pub dtypes: Vec<String>,
    pub records: Vec<Map<String, JsonValue>>,
    pub shape: (usize, usize),
    pub truncated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub optimizations: Vec<Optimization>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesPayload {
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    pub index: Vec<JsonValue>,
    pub values: Vec<JsonValue>,
    pub dtype: String,
    pub length: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MappingPayload {
    pub entries: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScalarPayload {
    pub value: JsonValue,
    #[serde(rename = "type")]
    pub value_type: &'static str,
}

/// Captured program result, tagged by `kind` when serialized.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionResult {
    Table(TablePayload),
    Series(SeriesPayload),
    Mapping(MappingPayload),
    Scalar(ScalarPayload),
    Error(ErrorDetail),
}

impl ExecutionResult {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionResult::Table(_) => "table",
            ExecutionResult::Series(_) => "series",
            ExecutionResult::Mapping(_) => "mapping",
            ExecutionResult::Scalar(_) => "scalar",
            ExecutionResult::Error(_) => "error",
        }
    }
}

impl From<&ScoutError> for ExecutionResult {
    fn from(err: &ScoutError) -> Self {
        ExecutionResult::Error(err.to_detail())
    }
}

pub struct ResultFormatter {
    record_cap: usize,
    optimizer: DtypeOptimizer,
}

impl ResultFormatter {
    pub fn new(record_cap: usize) -> Self {
        Self {
            record_cap,
            optimizer: DtypeOptimizer::default(),
        }
    }

    pub fn format(&self, value: &ScriptValue) -> Result<ExecutionResult> {
        match value {
            ScriptValue::Table(dataset) => Ok(ExecutionResult::Table(self.table(dataset)?)),
            ScriptValue::Series(series) => Ok(ExecutionResult::Series(self.series(series))),
            ScriptValue::Mapping(entries) => Ok(ExecutionResult::Mapping(MappingPayload {
                entries: self.entries(entries)?,
            })),
            ScriptValue::Scalar(scalar) => Ok(ExecutionResult::Scalar(ScalarPayload {
                value: option_to_json(scalar),
                value_type: scalar.as_ref().map_or("null", Value::type_tag),
            })),
            ScriptValue::List(items) => {
                let values = items
                    .iter()
                    .map(|item| match item {
                        ScriptValue::Scalar(scalar) => Ok(scalar.clone()),
                        other => Err(unsupported(
                            "list",
                            format!("lists may only hold single values, found a {}", other.kind()),
                        )),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let series = Series::new(
                    None,
                    SeriesIndex::range(values.len()),
                    ColumnData::from_values_inferred(values),
                )?;
                Ok(ExecutionResult::Series(self.series(&series)))
            }
            other => Err(unsupported(
                other.kind(),
                "result must be a table, series, mapping, list or single value".to_string(),
            )),
        }
    }

    fn table(&self, dataset: &Dataset) -> Result<TablePayload> {
        let mut optimized = dataset.clone();
        let report = self.optimizer.optimize(&mut optimized)?;
        if !report.changes.is_empty() {
            debug!(
                "Result table optimized from {} to {} bytes",
                report.memory_before, report.memory_after
            );
        }
        let shown = optimized.row_count().min(self.record_cap);
        let records = (0..shown)
            .map(|row| {
                optimized
                    .columns()
                    .iter()
                    .map(|c| (c.name.clone(), option_to_json(&c.data.get(row))))
                    .collect::<Map<_, _>>()
            })
            .collect();
        Ok(TablePayload {
            columns: optimized.column_names(),
            dtypes: optimized
                .columns()
                .iter()
                .map(|c| c.data.dtype().to_string())
                .collect(),
            records,
            shape: (optimized.row_count(), optimized.column_count()),
            truncated: optimized.row_count() > self.record_cap,
            optimizations: report.changes,
        })
    }

    fn series(&self, series: &Series) -> SeriesPayload {
        let shown = series.len().min(self.record_cap);
        SeriesPayload {
            name: series.name.clone(),
            index_name: series.index.name().map(str::to_string),
            index: (0..shown)
                .map(|idx| option_to_json(&series.index.label(idx)))
                .collect(),
            values: (0..shown)
                .map(|idx| option_to_json(&series.data.get(idx)))
                .collect(),
            dtype: series.data.dtype().to_string(),
            length: series.len(),
            truncated: series.len() > self.record_cap,
        }
    }

    fn entries(&self, entries: &[(String, ScriptValue)]) -> Result<Map<String, JsonValue>> {
        entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.nested(value)?)))
            .collect()
    }

    /// Mapping members: plain JSON for values, tagged objects for tables and series.
    fn nested(&self, value: &ScriptValue) -> Result<JsonValue> {
        match value {
            ScriptValue::Scalar(scalar) => Ok(option_to_json(scalar)),
            ScriptValue::List(items) => items
                .iter()
                .map(|item| self.nested(item))
                .collect::<Result<Vec<_>>>()
                .map(JsonValue::Array),
            ScriptValue::Mapping(entries) => self.entries(entries).map(JsonValue::Object),
            ScriptValue::Table(_) | ScriptValue::Series(_) => {
                let formatted = self.format(value)?;
                serde_json::to_value(&formatted)
                    .map_err(|err| unsupported(value.kind(), err.to_string()))
            }
            other => Err(unsupported(
                other.kind(),
                "mappings may only hold tables, series, lists, mappings or single values"
                    .to_string(),
            )),
        }
    }
}

fn unsupported(kind: &str, message: String) -> ScoutError {
    ScoutError::formatting(kind, message)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::*;
    use crate::{
        frame::Column,
        script::{Module, groupby::GroupBy},
    };

    fn numbers(rows: usize) -> Dataset {
        Dataset::new(vec![Column::new(
            "n",
            ColumnData::int64((0..rows as i64).map(Some).collect()),
        )])
        .expect("dataset")
    }

    #[test]
    fn table_payload_is_optimized_and_tagged() {
        let formatter = ResultFormatter::new(10);
        let result = formatter
            .format(&ScriptValue::table(numbers(3)))
            .expect("format");
        let json = serde_json::to_value(&result).expect("json");
        assert_eq!(json["kind"], "table");
        assert_eq!(json["shape"], serde_json::json!([3, 1]));
        assert_eq!(json["dtypes"], serde_json::json!(["int32"]));
        assert_eq!(json["records"][2]["n"], 2);
    }

    #[test]
    fn scalars_carry_type_tags() {
        let formatter = ResultFormatter::new(10);
        let result = formatter.format(&ScriptValue::Scalar(Some(Value::Float(2.5)))).expect("format");
        let json = serde_json::to_value(&result).expect("json");
        assert_eq!(json["kind"], "scalar");
        assert_eq!(json["type"], "float");
        assert_eq!(json["value"], 2.5);
        let none = formatter.format(&ScriptValue::none()).expect("format");
        assert_eq!(serde_json::to_value(&none).expect("json")["type"], "null");
    }

    #[test]
    fn mappings_nest_tables_as_tagged_objects() {
        let formatter = ResultFormatter::new(10);
        let mapping = ScriptValue::Mapping(vec![
            ("rows".into(), ScriptValue::int(3)),
            ("head".into(), ScriptValue::table(numbers(2))),
        ]);
        let ExecutionResult::Mapping(payload) = formatter.format(&mapping).expect("format") else {
            panic!("expected mapping");
        };
        assert_eq!(payload.entries["rows"], 3);
        assert_eq!(payload.entries["head"]["kind"], "table");
    }

    #[test]
    fn unsupported_kinds_are_formatting_errors() {
        let formatter = ResultFormatter::new(10);
        let grouped = GroupBy::new(Rc::new(numbers(2)), vec!["n".into()], true).expect("groupby");
        for value in [
            ScriptValue::GroupBy(grouped),
            ScriptValue::Module(Module::Pandas),
            ScriptValue::List(vec![ScriptValue::List(Vec::new())]),
        ] {
            let err = formatter.format(&value).expect_err("unsupported");
            assert_eq!(err.error_type(), "FORMATTING_ERROR");
        }
    }

    proptest! {
        #[test]
        fn truncation_matches_cap(rows in 0usize..60, cap in 0usize..40) {
            let formatter = ResultFormatter::new(cap);
            let ExecutionResult::Table(payload) = formatter
                .format(&ScriptValue::table(numbers(rows)))
                .expect("format")
            else {
                panic!("expected table");
            };
            prop_assert_eq!(payload.records.len(), rows.min(cap));
            prop_assert_eq!(payload.truncated, rows > cap);
            prop_assert_eq!(payload.shape, (rows, 1));
        }
    }
}
