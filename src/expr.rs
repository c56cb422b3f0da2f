//! Row expressions for `.query(...)` and `.derive(...)`.
//!
//! Expressions are written in a pandas-like surface (`and`, `or`, `not`,
//! single-quoted strings, backtick-quoted column names) and rewritten into
//! evalexpr syntax before evaluation against one row at a time.

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Duration, NaiveDate};
use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, Function, HashMapContext,
    Value as EvalValue, eval_with_context,
};
use log::debug;
use regex::Regex;

use crate::{
    data::{
        Value, normalize_column_name, parse_naive_date, parse_naive_datetime, value_from_evalexpr,
        value_to_evalexpr,
    },
    frame::Dataset,
    transform::string_ops,
};

fn register_temporal_functions(context: &mut HashMapContext) -> Result<()> {
    context
        .set_function(
            "date_add".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 2, "date_add")?;
                let date = parse_date_arg(&args[0])?;
                let days = parse_i64_arg(&args[1], "days")?;
                let shifted = date
                    .checked_add_signed(Duration::days(days))
                    .ok_or_else(|| eval_error("date_add overflow"))?;
                Ok(EvalValue::String(shifted.format("%Y-%m-%d").to_string()))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "date_diff_days".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 2, "date_diff_days")?;
                let end = parse_date_arg(&args[0])?;
                let start = parse_date_arg(&args[1])?;
                Ok(EvalValue::Int((end - start).num_days()))
            }),
        )
        .map_err(anyhow::Error::from)?;

    for (name, part) in [
        ("year", DatePart::Year),
        ("month", DatePart::Month),
        ("day", DatePart::Day),
    ] {
        context
            .set_function(
                name.into(),
                Function::new(move |arguments| {
                    let args = expect_args(arguments, 1, name)?;
                    let date = parse_date_arg(&args[0])?;
                    let component = match part {
                        DatePart::Year => i64::from(date.year()),
                        DatePart::Month => i64::from(date.month()),
                        DatePart::Day => i64::from(date.day()),
                    };
                    Ok(EvalValue::Int(component))
                }),
            )
            .map_err(anyhow::Error::from)?;
    }

    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum DatePart {
    Year,
    Month,
    Day,
}

fn register_string_functions(context: &mut HashMapContext) -> Result<()> {
    let unary: [(&'static str, fn(&str) -> String); 4] = [
        ("lowercase", |v| string_ops::lowercase(v).into_owned()),
        ("uppercase", |v| string_ops::uppercase(v).into_owned()),
        ("trim", |v| string_ops::trim(v).into_owned()),
        ("snake_case", |v| string_ops::snake_case(v).into_owned()),
    ];
    for (name, apply) in unary {
        context
            .set_function(
                name.into(),
                Function::new(move |arguments| {
                    let args = expect_args(arguments, 1, name)?;
                    let value = expect_string(&args[0], "value")?;
                    Ok(EvalValue::String(apply(value)))
                }),
            )
            .map_err(anyhow::Error::from)?;
    }

    let predicates: [(&'static str, fn(&str, &str) -> bool); 3] = [
        ("contains", |v, n| v.contains(n)),
        ("starts_with", |v, n| v.starts_with(n)),
        ("ends_with", |v, n| v.ends_with(n)),
    ];
    for (name, test) in predicates {
        context
            .set_function(
                name.into(),
                Function::new(move |arguments| {
                    let args = expect_args(arguments, 2, name)?;
                    let value = expect_string(&args[0], "value")?;
                    let needle = expect_string(&args[1], "needle")?;
                    Ok(EvalValue::Boolean(test(value, needle)))
                }),
            )
            .map_err(anyhow::Error::from)?;
    }

    context
        .set_function(
            "substring".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 3, "substring")?;
                let value = expect_string(&args[0], "value")?;
                let start = parse_i64_arg(&args[1], "start")?.max(0) as usize;
                let length = parse_i64_arg(&args[2], "length")?.max(0) as usize;
                Ok(EvalValue::String(
                    string_ops::substring(value, start, length).into_owned(),
                ))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "replace".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 3, "replace")?;
                let value = expect_string(&args[0], "value")?;
                let from = expect_string(&args[1], "from")?;
                let to = expect_string(&args[2], "to")?;
                Ok(EvalValue::String(
                    string_ops::replace(value, from, to).into_owned(),
                ))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "regex_replace".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 3, "regex_replace")?;
                let value = expect_string(&args[0], "value")?;
                let pattern = expect_string(&args[1], "pattern")?;
                let replacement = expect_string(&args[2], "replacement")?;
                let regex = Regex::new(pattern)
                    .map_err(|err| eval_error(&format!("Invalid regex: {err}")))?;
                Ok(EvalValue::String(
                    string_ops::regex_replace(value, &regex, replacement).into_owned(),
                ))
            }),
        )
        .map_err(anyhow::Error::from)?;

    Ok(())
}

fn expect_args(
    arguments: &EvalValue,
    expected: usize,
    name: &str,
) -> Result<Vec<EvalValue>, evalexpr::EvalexprError> {
    match arguments {
        value if expected == 1 && !matches!(value, EvalValue::Tuple(_)) => Ok(vec![value.clone()]),
        EvalValue::Tuple(values) => {
            if values.len() != expected {
                return Err(evalexpr::EvalexprError::wrong_function_argument_amount(
                    values.len(),
                    expected,
                ));
            }
            Ok(values.clone())
        }
        _ => Err(eval_error(&format!(
            "{name} expects {expected} arguments provided as a tuple"
        ))),
    }
}

fn eval_error(message: &str) -> evalexpr::EvalexprError {
    evalexpr::EvalexprError::CustomMessage(message.to_string())
}

fn parse_date_arg(value: &EvalValue) -> Result<NaiveDate, evalexpr::EvalexprError> {
    let raw = expect_string(value, "date")?;
    parse_naive_date(raw)
        .or_else(|_| parse_naive_datetime(raw).map(|dt| dt.date()))
        .map_err(|err| eval_error(&err.to_string()))
}

fn parse_i64_arg(value: &EvalValue, name: &str) -> Result<i64, evalexpr::EvalexprError> {
    match value {
        EvalValue::Int(i) => Ok(*i),
        EvalValue::Float(f) => Ok(*f as i64),
        other => Err(eval_error(&format!(
            "Expected integer for {name}, got {other:?}",
        ))),
    }
}

fn expect_string<'a>(value: &'a EvalValue, name: &str) -> Result<&'a str, evalexpr::EvalexprError> {
    if let EvalValue::String(s) = value {
        Ok(s)
    } else {
        Err(eval_error(&format!("Expected string for {name}")))
    }
}

/// Rewrites the pandas-like surface into evalexpr syntax.
///
/// Backtick-quoted names become their normalized identifier so columns with
/// spaces can be referenced.
pub fn translate(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len() + 8);
    let mut chars = expr.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push('"');
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => {
                            out.push('\\');
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        '"' if c == '\'' => out.push_str("\\\""),
                        _ if inner == c => break,
                        _ => out.push(inner),
                    }
                }
                out.push('"');
            }
            '`' => {
                let name: String = chars.by_ref().take_while(|ch| *ch != '`').collect();
                out.push_str(&normalize_column_name(&name));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(next) = chars.peek() {
                    if next.is_alphanumeric() || *next == '_' {
                        word.push(*next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "and" => out.push_str("&&"),
                    "or" => out.push_str("||"),
                    "not" => out.push('!'),
                    "True" => out.push_str("true"),
                    "False" => out.push_str("false"),
                    _ => out.push_str(&word),
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Evaluates one expression against every row of a dataset.
pub struct RowEvaluator<'a> {
    dataset: &'a Dataset,
    names: Vec<Vec<String>>,
    expression: String,
}

impl<'a> RowEvaluator<'a> {
    pub fn new(dataset: &'a Dataset, expr: &str) -> Result<Self> {
        if expr.trim().is_empty() {
            return Err(anyhow!("Row expression is empty"));
        }
        let names = dataset
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let mut bound = Vec::with_capacity(3);
                if is_identifier(&column.name) {
                    bound.push(column.name.clone());
                }
                let normalized = normalize_column_name(&column.name);
                if !bound.contains(&normalized) {
                    bound.push(normalized);
                }
                bound.push(format!("c{idx}"));
                bound
            })
            .collect();
        let expression = translate(expr);
        debug!("Row expression '{expr}' translated to '{expression}'");
        Ok(Self {
            dataset,
            names,
            expression,
        })
    }

    fn bind_row(&self, row: usize) -> Result<(HashMapContext, bool)> {
        let mut context = HashMapContext::new();
        register_temporal_functions(&mut context)?;
        register_string_functions(&mut context)?;
        let mut has_null = false;
        for (column, names) in self.dataset.columns().iter().zip(&self.names) {
            let value = match column.data.get(row) {
                Some(value) => value_to_evalexpr(&value),
                None => {
                    has_null = true;
                    EvalValue::Empty
                }
            };
            for name in names {
                context
                    .set_value(name.clone(), value.clone())
                    .with_context(|| format!("Binding column '{}'", column.name))?;
            }
        }
        Ok((context, has_null))
    }

    /// Evaluates the expression for one row. Rows containing nulls that make
    /// the expression fail evaluate to `None` instead of an error.
    pub fn evaluate(&self, row: usize) -> Result<Option<EvalValue>> {
        let (context, has_null) = self.bind_row(row)?;
        match eval_with_context(&self.expression, &context) {
            Ok(value) => Ok(Some(value)),
            Err(_) if has_null => Ok(None),
            Err(err) => Err(anyhow::Error::from(err))
                .with_context(|| format!("Evaluating '{}' on row {}", self.expression, row + 1)),
        }
    }

    pub fn filter_mask(&self) -> Result<Vec<bool>> {
        (0..self.dataset.row_count())
            .map(|row| Ok(self.evaluate(row)?.is_some_and(eval_value_truthy)))
            .collect()
    }

    pub fn derive_values(&self) -> Result<Vec<Option<Value>>> {
        (0..self.dataset.row_count())
            .map(|row| Ok(self.evaluate(row)?.and_then(value_from_evalexpr)))
            .collect()
    }
}

pub fn eval_value_truthy(value: EvalValue) -> bool {
    match value {
        EvalValue::Boolean(b) => b,
        EvalValue::Int(i) => i != 0,
        EvalValue::Float(f) => f != 0.0,
        EvalValue::String(s) => !s.is_empty(),
        EvalValue::Tuple(values) => values.into_iter().any(eval_value_truthy),
        EvalValue::Empty => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, ColumnData};

    fn sales() -> Dataset {
        Dataset::new(vec![
            Column::new(
                "Region",
                ColumnData::text(vec![
                    Some("East".into()),
                    Some("West".into()),
                    Some("East".into()),
                    None,
                ]),
            ),
            Column::new(
                "Unit Price",
                ColumnData::float64(vec![Some(2.5), Some(4.0), None, Some(1.0)]),
            ),
            Column::new(
                "Qty",
                ColumnData::int64(vec![Some(10), Some(3), Some(7), Some(1)]),
            ),
        ])
        .expect("dataset")
    }

    #[test]
    fn translates_pandas_surface() {
        assert_eq!(
            translate("Qty > 2 and Region == 'East' or not False"),
            "Qty > 2 && Region == \"East\" || ! false"
        );
        assert_eq!(translate("`Unit Price` * 2"), "unit_price * 2");
        assert_eq!(translate("'it\"s'"), "\"it\\\"s\"");
    }

    #[test]
    fn filter_mask_treats_null_failures_as_false() {
        let data = sales();
        let mask = RowEvaluator::new(&data, "`Unit Price` > 2 and Qty > 1")
            .expect("evaluator")
            .filter_mask()
            .expect("mask");
        assert_eq!(mask, vec![true, true, false, false]);
    }

    #[test]
    fn derive_binds_original_and_positional_names() {
        let data = sales();
        let values = RowEvaluator::new(&data, "Qty * 2 + c2")
            .expect("evaluator")
            .derive_values()
            .expect("values");
        assert_eq!(values[0], Some(Value::Integer(30)));
        let lowered = RowEvaluator::new(&data, "lowercase(region)")
            .expect("evaluator")
            .derive_values()
            .expect("values");
        assert_eq!(lowered[1], Some(Value::String("west".into())));
        assert_eq!(lowered[3], None);
    }

    #[test]
    fn errors_on_complete_rows_propagate() {
        let data = sales();
        let evaluator = RowEvaluator::new(&data, "missing_column > 1").expect("evaluator");
        assert!(evaluator.evaluate(0).is_err());
    }

    #[test]
    fn date_functions() {
        let data = Dataset::new(vec![Column::new(
            "shipped",
            ColumnData::date(vec![NaiveDate::from_ymd_opt(2024, 3, 9)]),
        )])
        .expect("dataset");
        let values = RowEvaluator::new(&data, "month(shipped) * 100 + day(shipped)")
            .expect("evaluator")
            .derive_values()
            .expect("values");
        assert_eq!(values, vec![Some(Value::Integer(309))]);
        let shifted = RowEvaluator::new(&data, "date_add(shipped, 30)")
            .expect("evaluator")
            .derive_values()
            .expect("values");
        assert_eq!(shifted, vec![Some(Value::String("2024-04-08".into()))]);
    }
}
