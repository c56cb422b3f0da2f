//! Series methods, properties and the `.str` accessor.

use std::collections::HashSet;

use anyhow::{Result, anyhow, bail};
use regex::Regex;

use super::{
    ast::{BinaryOp, CompareOp},
    ops::{arithmetic, compare},
    value::{
        Args, ScriptValue, expect_bool, expect_int, expect_scalar, expect_str, expect_usize,
        expect_values, scalar_display,
    },
};
use crate::{
    data::{ComparableValue, Value, parse_typed_value},
    frame::{Column, ColumnData, Dataset, Series, SeriesIndex, sort_order},
    frequency,
    schema::ColumnType,
    stats::{Aggregation, ColumnStats, aggregate_column},
    transform::string_ops::{StrOp, StrPredicate},
};

const DEFAULT_HEAD: usize = 5;

/// A series whose index carries explicit labels.
pub fn labelled(
    name: Option<String>,
    index_name: Option<String>,
    labels: Vec<Option<Value>>,
    values: Vec<Option<Value>>,
) -> Result<Series> {
    Ok(Series::new(
        name,
        SeriesIndex::Labels {
            name: index_name,
            labels,
        },
        ColumnData::from_values_inferred(values),
    )?)
}

pub fn attribute(series: &Series, name: &str) -> Result<ScriptValue> {
    match name {
        "str" => {
            let textual = series.data.column_type() == ColumnType::String
                || series.data.null_count() == series.len();
            if !textual {
                bail!(
                    "can only use .str accessor with string values, '{}' holds {}",
                    series.name.as_deref().unwrap_or("series"),
                    series.data.dtype()
                );
            }
            Ok(ScriptValue::StrAccessor(series.clone()))
        }
        "name" => Ok(series
            .name
            .clone()
            .map_or_else(ScriptValue::none, ScriptValue::string)),
        "dtype" => Ok(ScriptValue::string(series.data.dtype())),
        "shape" => Ok(ScriptValue::List(vec![ScriptValue::int(series.len() as i64)])),
        "size" => Ok(ScriptValue::int(series.len() as i64)),
        "empty" => Ok(ScriptValue::bool(series.is_empty())),
        "values" => Ok(to_list(series)),
        "index" => Ok(ScriptValue::Series(Series::new(
            series.index.name().map(str::to_string),
            SeriesIndex::range(series.len()),
            ColumnData::from_values_inferred(series.index.labels()),
        )?)),
        other => bail!("series has no attribute '{other}'"),
    }
}

fn to_list(series: &Series) -> ScriptValue {
    ScriptValue::List(series.values().into_iter().map(ScriptValue::Scalar).collect())
}

fn reduce(series: &Series, aggregation: Aggregation) -> Result<ScriptValue> {
    Ok(ScriptValue::Scalar(aggregate_column(aggregation, &series.data)?))
}

fn head_count(args: &Args, method: &str) -> Result<usize> {
    args.check(method, 1, &["n"])?;
    args.get(0, "n")
        .map(|n| expect_usize(n, "n"))
        .transpose()
        .map(|n| n.unwrap_or(DEFAULT_HEAD))
}

fn ascending(args: &Args, position: usize) -> Result<bool> {
    args.get(position, "ascending")
        .map(|v| expect_bool(v, "ascending"))
        .transpose()
        .map(|v| v.unwrap_or(true))
}

fn mask_series(series: &Series, mask: Vec<bool>) -> Result<ScriptValue> {
    Ok(ScriptValue::Series(
        series.with_data(ColumnData::boolean(mask.into_iter().map(Some).collect()))?,
    ))
}

pub fn call(series: &Series, method: &str, args: &Args) -> Result<ScriptValue> {
    if let Ok(aggregation) = method.parse::<Aggregation>() {
        if !matches!(aggregation, Aggregation::First | Aggregation::Last | Aggregation::Size) {
            args.check(method, 0, &["skipna", "numeric_only"])?;
            return reduce(series, aggregation);
        }
    }
    match method {
        "any" | "all" => {
            args.check(method, 0, &[])?;
            let truths = series
                .values()
                .into_iter()
                .flatten()
                .map(|v| ScriptValue::Scalar(Some(v)).truthy())
                .collect::<Result<Vec<_>>>()?;
            let result = if method == "any" {
                truths.iter().any(|t| *t)
            } else {
                truths.iter().all(|t| *t)
            };
            Ok(ScriptValue::bool(result))
        }
        "quantile" => {
            args.check(method, 1, &["q"])?;
            let q = match args.get(0, "q") {
                Some(q) => expect_scalar(q, "q")?
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| anyhow!("q must be a number between 0 and 1"))?,
                None => 0.5,
            };
            Ok(ScriptValue::Scalar(
                numeric_stats(series, method)?.quantile(q).map(Value::Float),
            ))
        }
        "value_counts" => {
            args.check(method, 0, &["normalize", "dropna"])?;
            let normalize = args
                .get(usize::MAX, "normalize")
                .map(|v| expect_bool(v, "normalize"))
                .transpose()?
                .unwrap_or(false);
            Ok(ScriptValue::Series(value_counts(series, normalize)?))
        }
        "unique" => {
            args.check(method, 0, &[])?;
            let mut seen = HashSet::new();
            let values = series
                .values()
                .into_iter()
                .filter(|v| seen.insert(ComparableValue(v.clone())))
                .collect::<Vec<_>>();
            Ok(ScriptValue::Series(Series::new(
                series.name.clone(),
                SeriesIndex::range(values.len()),
                ColumnData::from_values_inferred(values),
            )?))
        }
        "isna" | "isnull" | "notna" | "notnull" => {
            args.check(method, 0, &[])?;
            let want_null = method.starts_with("is");
            let mask = (0..series.len())
                .map(|idx| series.data.is_null(idx) == want_null)
                .collect();
            mask_series(series, mask)
        }
        "fillna" => {
            args.check(method, 1, &["value"])?;
            let fill = expect_scalar(args.required(0, "value", method)?, "value")?;
            Ok(ScriptValue::Series(series.with_data(fill_nulls(&series.data, &fill))?))
        }
        "dropna" => {
            args.check(method, 0, &[])?;
            let keep = (0..series.len())
                .filter(|&idx| !series.data.is_null(idx))
                .collect::<Vec<_>>();
            Ok(ScriptValue::Series(series.take(&keep)?))
        }
        "astype" => {
            args.check(method, 1, &["dtype"])?;
            let target = expect_str(args.required(0, "dtype", method)?, "dtype")?;
            Ok(ScriptValue::Series(series.with_data(cast(&series.data, &target)?)?))
        }
        "round" => {
            args.check(method, 1, &["decimals"])?;
            let decimals = args
                .get(0, "decimals")
                .map(|d| expect_int(d, "decimals"))
                .transpose()?
                .unwrap_or(0);
            Ok(ScriptValue::Series(series.with_data(round_data(&series.data, decimals)?)?))
        }
        "abs" => {
            args.check(method, 0, &[])?;
            let values = series
                .values()
                .into_iter()
                .map(|v| match v {
                    Some(Value::Integer(i)) => i
                        .checked_abs()
                        .map(|a| Some(Value::Integer(a)))
                        .ok_or_else(|| anyhow!("integer overflow in abs")),
                    Some(Value::Float(f)) => Ok(Some(Value::Float(f.abs()))),
                    None => Ok(None),
                    Some(other) => bail!("bad operand type for abs(): '{}'", other.type_tag()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ScriptValue::Series(
                series.with_data(ColumnData::from_values_inferred(values))?,
            ))
        }
        "isin" => {
            args.check(method, 1, &["values"])?;
            let candidates = expect_values(args.required(0, "values", method)?, "values")?;
            let mask = series
                .values()
                .iter()
                .map(|value| {
                    value.is_some()
                        && candidates
                            .iter()
                            .any(|c| compare(CompareOp::Eq, value, c).unwrap_or(false))
                })
                .collect();
            mask_series(series, mask)
        }
        "between" => {
            args.check(method, 3, &["left", "right", "inclusive"])?;
            let left = expect_scalar(args.required(0, "left", method)?, "left")?;
            let right = expect_scalar(args.required(1, "right", method)?, "right")?;
            let inclusive = args
                .get(2, "inclusive")
                .map(|v| expect_str(v, "inclusive"))
                .transpose()?
                .unwrap_or_else(|| "both".to_string());
            let (low_op, high_op) = match inclusive.as_str() {
                "both" => (CompareOp::Ge, CompareOp::Le),
                "neither" => (CompareOp::Gt, CompareOp::Lt),
                "left" => (CompareOp::Ge, CompareOp::Lt),
                "right" => (CompareOp::Gt, CompareOp::Le),
                other => bail!("inclusive must be one of both, neither, left, right; got '{other}'"),
            };
            let mask = series
                .values()
                .iter()
                .map(|v| {
                    Ok(v.is_some() && compare(low_op, v, &left)? && compare(high_op, v, &right)?)
                })
                .collect::<Result<Vec<_>>>()?;
            mask_series(series, mask)
        }
        "head" => {
            let n = head_count(args, method)?.min(series.len());
            Ok(ScriptValue::Series(series.take(&(0..n).collect::<Vec<_>>())?))
        }
        "tail" => {
            let n = head_count(args, method)?.min(series.len());
            let start = series.len() - n;
            Ok(ScriptValue::Series(
                series.take(&(start..series.len()).collect::<Vec<_>>())?,
            ))
        }
        "sort_values" => {
            args.check(method, 1, &["ascending"])?;
            let asc = ascending(args, 0)?;
            let order = sort_order(&[(&series.data, asc)])?;
            Ok(ScriptValue::Series(series.take(&order)?))
        }
        "sort_index" => {
            args.check(method, 1, &["ascending"])?;
            let asc = ascending(args, 0)?;
            let labels = ColumnData::from_values_inferred(series.index.labels());
            let order = sort_order(&[(&labels, asc)])?;
            Ok(ScriptValue::Series(series.take(&order)?))
        }
        "reset_index" => {
            args.check(method, 0, &["drop", "name"])?;
            let drop = args
                .get(usize::MAX, "drop")
                .map(|v| expect_bool(v, "drop"))
                .transpose()?
                .unwrap_or(false);
            if drop {
                return Ok(ScriptValue::Series(series.with_index(SeriesIndex::range(series.len()))));
            }
            Ok(ScriptValue::table(reset_index(series, args)?))
        }
        "to_dict" => {
            args.check(method, 0, &[])?;
            Ok(ScriptValue::Mapping(
                (0..series.len())
                    .map(|idx| {
                        (
                            scalar_display(&series.index.label(idx)),
                            ScriptValue::Scalar(series.data.get(idx)),
                        )
                    })
                    .collect(),
            ))
        }
        "tolist" | "to_list" => {
            args.check(method, 0, &[])?;
            Ok(to_list(series))
        }
        "idxmax" | "idxmin" => {
            args.check(method, 0, &[])?;
            let want_max = method == "idxmax";
            let mut best: Option<(usize, Value)> = None;
            for (idx, value) in series.values().into_iter().enumerate() {
                let Some(value) = value else { continue };
                let better = match &best {
                    None => true,
                    Some((_, current)) if want_max => value > *current,
                    Some((_, current)) => value < *current,
                };
                if better {
                    best = Some((idx, value));
                }
            }
            let (idx, _) = best.ok_or_else(|| anyhow!("{method} of an empty or all-null series"))?;
            Ok(ScriptValue::Scalar(series.index.label(idx)))
        }
        "cumsum" => {
            args.check(method, 0, &[])?;
            let mut total: Option<Value> = None;
            let mut values = Vec::with_capacity(series.len());
            for value in series.values() {
                if value.is_none() {
                    values.push(None);
                    continue;
                }
                total = match total {
                    None => arithmetic(BinaryOp::Add, &Some(Value::Integer(0)), &value)?,
                    Some(current) => arithmetic(BinaryOp::Add, &Some(current), &value)?,
                };
                values.push(total.clone());
            }
            Ok(ScriptValue::Series(
                series.with_data(ColumnData::from_values_inferred(values))?,
            ))
        }
        "describe" => {
            args.check(method, 0, &[])?;
            Ok(ScriptValue::Series(describe(series)?))
        }
        "rename" => {
            args.check(method, 1, &["name"])?;
            let name = expect_scalar(args.required(0, "name", method)?, "name")?;
            let mut renamed = series.clone();
            renamed.name = name.map(|v| v.as_display());
            Ok(ScriptValue::Series(renamed))
        }
        "copy" => {
            args.check(method, 0, &["deep"])?;
            Ok(ScriptValue::Series(series.clone()))
        }
        "to_frame" => {
            args.check(method, 0, &[])?;
            let name = series.name.clone().unwrap_or_else(|| "0".to_string());
            Ok(ScriptValue::table(Dataset::new(vec![Column::new(name, series.data.clone())])?))
        }
        other => bail!("series has no method '{other}'"),
    }
}

fn numeric_stats(series: &Series, method: &str) -> Result<ColumnStats> {
    if !series.data.column_type().is_numeric() && series.data.null_count() < series.len() {
        bail!("{method} requires a numeric series, '{}' holds {}", series.name.as_deref().unwrap_or("series"), series.data.dtype());
    }
    Ok(ColumnStats::from_values(&series.values()))
}

/// Counts per distinct value, most frequent first.
pub fn value_counts(series: &Series, normalize: bool) -> Result<Series> {
    let counts = frequency::value_counts(&series.data);
    let total: usize = counts.iter().map(|(_, count)| count).sum();
    let (labels, values): (Vec<_>, Vec<_>) = counts
        .into_iter()
        .map(|(value, count)| {
            let measure = if normalize {
                Value::Float(count as f64 / total.max(1) as f64)
            } else {
                Value::Integer(count as i64)
            };
            (Some(value), Some(measure))
        })
        .unzip();
    let name = if normalize { "proportion" } else { "count" };
    labelled(Some(name.to_string()), series.name.clone(), labels, values)
}

fn reset_index(series: &Series, args: &Args) -> Result<Dataset> {
    let index_name = series.index.name().unwrap_or("index").to_string();
    let value_name = match args.get(usize::MAX, "name") {
        Some(name) => expect_str(name, "name")?,
        None => series.name.clone().unwrap_or_else(|| "0".to_string()),
    };
    let value_name = if value_name == index_name {
        format!("{value_name}_value")
    } else {
        value_name
    };
    Ok(Dataset::new(vec![
        Column::new(index_name, ColumnData::from_values_inferred(series.index.labels())),
        Column::new(value_name, series.data.clone()),
    ])?)
}

/// Summary statistics; numeric series get the quartiles, others the mode.
pub fn describe(series: &Series) -> Result<Series> {
    let count = series.len() - series.data.null_count();
    let (labels, values): (Vec<&str>, Vec<Option<Value>>) = if series.data.column_type().is_numeric() {
        let stats = ColumnStats::from_values(&series.values());
        vec![
            ("count", Some(Value::Float(count as f64))),
            ("mean", stats.mean().map(Value::Float)),
            ("std", stats.std_dev().map(Value::Float)),
            ("min", stats.min().map(Value::Float)),
            ("25%", stats.quantile(0.25).map(Value::Float)),
            ("50%", stats.quantile(0.5).map(Value::Float)),
            ("75%", stats.quantile(0.75).map(Value::Float)),
            ("max", stats.max().map(Value::Float)),
        ]
        .into_iter()
        .unzip()
    } else {
        let counts = frequency::value_counts(&series.data);
        let top = counts.first().cloned();
        vec![
            ("count", Some(Value::Integer(count as i64))),
            ("unique", Some(Value::Integer(counts.len() as i64))),
            ("top", top.as_ref().map(|(value, _)| value.clone())),
            ("freq", top.map(|(_, freq)| Value::Integer(freq as i64))),
        ]
        .into_iter()
        .unzip()
    };
    labelled(
        series.name.clone(),
        None,
        labels
            .into_iter()
            .map(|label| Some(Value::String(label.to_string())))
            .collect(),
        values,
    )
}

pub fn fill_nulls(data: &ColumnData, fill: &Option<Value>) -> ColumnData {
    if fill.is_none() {
        return data.clone();
    }
    let values = data
        .iter()
        .map(|v| v.or_else(|| fill.clone()))
        .collect::<Vec<_>>();
    ColumnData::from_values(data.column_type(), values.clone())
        .unwrap_or_else(|_| ColumnData::from_values_inferred(values))
}

fn round_data(data: &ColumnData, decimals: i64) -> Result<ColumnData> {
    let exponent = i32::try_from(decimals).map_err(|_| anyhow!("decimals out of range"))?;
    let scale = 10f64.powi(exponent);
    let values = data
        .iter()
        .map(|v| match v {
            Some(Value::Float(f)) => Ok(Some(Value::Float((f * scale).round_ties_even() / scale))),
            Some(Value::Integer(_)) | None => Ok(v),
            Some(other) => bail!("cannot round a '{}' value", other.type_tag()),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ColumnData::from_values_inferred(values))
}

/// Conversion behind `astype`, including the `category` pseudo-type.
pub fn cast(data: &ColumnData, target: &str) -> Result<ColumnData> {
    if target.trim().eq_ignore_ascii_case("category") {
        let labels = data
            .iter()
            .map(|v| v.map(|value| value.as_display()))
            .collect::<Vec<_>>();
        return Ok(ColumnData::categorical(labels)?);
    }
    let ty: ColumnType = target.parse()?;
    let values = data
        .iter()
        .map(|value| cast_value(value, ty))
        .collect::<Result<Vec<_>>>()?;
    Ok(ColumnData::from_values(ty, values)?)
}

fn cast_value(value: Option<Value>, ty: ColumnType) -> Result<Option<Value>> {
    let Some(value) = value else {
        return Ok(None);
    };
    Ok(match (ty, value) {
        (ColumnType::String, v) => Some(Value::String(v.as_display())),
        (ColumnType::Integer, Value::Float(f)) => {
            if !f.is_finite() {
                bail!("cannot convert non-finite value {f} to integer");
            }
            Some(Value::Integer(f.trunc() as i64))
        }
        (ColumnType::Boolean, Value::Integer(i)) => Some(Value::Boolean(i != 0)),
        (ColumnType::Boolean, Value::Float(f)) => Some(Value::Boolean(f != 0.0)),
        (ty, Value::String(s)) => parse_typed_value(&s, &ty)?,
        (_, other) => Some(other),
    })
}

/// Label lookup, boolean masks and label lists.
pub fn index(series: &Series, key: &ScriptValue) -> Result<ScriptValue> {
    match key {
        ScriptValue::Series(mask) if mask.data.is_boolean() => {
            if mask.len() != series.len() {
                bail!(
                    "boolean mask has {} values but the series has {}",
                    mask.len(),
                    series.len()
                );
            }
            let keep = (0..mask.len())
                .filter(|&idx| matches!(mask.data.get(idx), Some(Value::Boolean(true))))
                .collect::<Vec<_>>();
            Ok(ScriptValue::Series(series.take(&keep)?))
        }
        ScriptValue::List(_) | ScriptValue::Series(_) => {
            let labels = expect_values(key, "labels")?;
            let positions = labels
                .iter()
                .map(|label| position_of(series, label))
                .collect::<Result<Vec<_>>>()?;
            Ok(ScriptValue::Series(series.take(&positions)?))
        }
        ScriptValue::Scalar(label) => {
            let position = position_of(series, label)?;
            Ok(ScriptValue::Scalar(series.data.get(position)))
        }
        other => bail!("cannot index a series with a {}", other.kind()),
    }
}

fn position_of(series: &Series, label: &Option<Value>) -> Result<usize> {
    (0..series.len())
        .find(|&idx| compare(CompareOp::Eq, &series.index.label(idx), label).unwrap_or(false))
        .ok_or_else(|| anyhow!("label {} not found in the series index", scalar_display(label)))
}

/// Methods of `series.str`.
pub fn str_call(series: &Series, method: &str, args: &Args) -> Result<ScriptValue> {
    let text = |idx: usize| match series.data.get(idx) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };
    let transform = |op: StrOp| -> Result<ScriptValue> {
        let values = (0..series.len())
            .map(|idx| text(idx).map(|s| Value::String(op.apply(&s).into_owned())))
            .collect::<Vec<_>>();
        Ok(ScriptValue::Series(
            series.with_data(ColumnData::from_values(ColumnType::String, values)?)?,
        ))
    };
    let test = |predicate: StrPredicate| -> Result<ScriptValue> {
        let mask = (0..series.len())
            .map(|idx| Some(text(idx).is_some_and(|s| predicate.test(&s))))
            .collect();
        Ok(ScriptValue::Series(series.with_data(ColumnData::boolean(mask))?))
    };
    match method {
        "lower" | "upper" | "strip" | "snake_case" | "title" => {
            args.check(method, 0, &[])?;
            transform(match method {
                "lower" => StrOp::Lower,
                "upper" => StrOp::Upper,
                "strip" => StrOp::Strip,
                "title" => StrOp::TitleCase,
                _ => StrOp::SnakeCase,
            })
        }
        "slice" => {
            args.check(method, 2, &["start", "stop"])?;
            let start = args.get(0, "start").map(|v| expect_usize(v, "start")).transpose()?.unwrap_or(0);
            let stop = args.get(1, "stop").map(|v| expect_usize(v, "stop")).transpose()?;
            let length = stop.map_or(usize::MAX, |stop| stop.saturating_sub(start));
            transform(StrOp::Slice { start, length })
        }
        "replace" => {
            args.check(method, 2, &["pat", "repl", "regex"])?;
            let from = expect_str(args.required(0, "pat", method)?, "pat")?;
            let to = expect_str(args.required(1, "repl", method)?, "repl")?;
            let regex = args
                .get(usize::MAX, "regex")
                .map(|v| expect_bool(v, "regex"))
                .transpose()?
                .unwrap_or(false);
            if regex {
                let pattern = Regex::new(&from).map_err(|err| anyhow!("invalid regex '{from}': {err}"))?;
                transform(StrOp::RegexReplace {
                    pattern,
                    replacement: to,
                })
            } else {
                transform(StrOp::Replace { from, to })
            }
        }
        "contains" => {
            args.check(method, 1, &["pat", "case", "regex"])?;
            let pattern = expect_str(args.required(0, "pat", method)?, "pat")?;
            let case_sensitive = args
                .get(usize::MAX, "case")
                .map(|v| expect_bool(v, "case"))
                .transpose()?
                .unwrap_or(true);
            let regex = args
                .get(usize::MAX, "regex")
                .map(|v| expect_bool(v, "regex"))
                .transpose()?
                .unwrap_or(false);
            if regex {
                let source = if case_sensitive { pattern.clone() } else { format!("(?i){pattern}") };
                let compiled = Regex::new(&source).map_err(|err| anyhow!("invalid regex '{pattern}': {err}"))?;
                test(StrPredicate::Matches(compiled))
            } else {
                test(StrPredicate::Contains {
                    needle: pattern,
                    case_sensitive,
                })
            }
        }
        "startswith" => {
            args.check(method, 1, &["pat"])?;
            test(StrPredicate::StartsWith(expect_str(args.required(0, "pat", method)?, "pat")?))
        }
        "endswith" => {
            args.check(method, 1, &["pat"])?;
            test(StrPredicate::EndsWith(expect_str(args.required(0, "pat", method)?, "pat")?))
        }
        "len" => {
            args.check(method, 0, &[])?;
            let lengths = (0..series.len())
                .map(|idx| text(idx).map(|s| s.chars().count() as i64))
                .collect();
            Ok(ScriptValue::Series(series.with_data(ColumnData::int64(lengths))?))
        }
        other => bail!(".str has no method '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(data: ColumnData) -> Series {
        let len = data.len();
        Series::new(Some("v".into()), SeriesIndex::range(len), data).expect("series")
    }

    fn no_args() -> Args {
        Args::default()
    }

    #[test]
    fn value_counts_orders_by_frequency() {
        let letters = series(ColumnData::text(
            ["b", "a", "b", "c", "b", "a"].iter().map(|s| Some(s.to_string())).collect(),
        ));
        let counts = value_counts(&letters, false).expect("counts");
        assert_eq!(counts.index.labels()[0], Some(Value::String("b".into())));
        assert_eq!(counts.values()[0], Some(Value::Integer(3)));
        assert_eq!(counts.index.name(), Some("v"));
    }

    #[test]
    fn describe_numeric_quartiles() {
        let numbers = series(ColumnData::int64(vec![Some(1), Some(2), Some(3), Some(4), None]));
        let summary = describe(&numbers).expect("describe");
        let lookup = |label: &str| {
            let position = summary
                .index
                .labels()
                .iter()
                .position(|l| *l == Some(Value::String(label.into())))
                .expect("label");
            summary.data.get(position)
        };
        assert_eq!(lookup("count"), Some(Value::Float(4.0)));
        assert_eq!(lookup("50%"), Some(Value::Float(2.5)));
        assert_eq!(lookup("max"), Some(Value::Float(4.0)));
    }

    #[test]
    fn astype_and_fillna() {
        let raw = series(ColumnData::text(vec![Some("1".into()), None, Some("3".into())]));
        let ints = cast(&raw.data, "int").expect("cast");
        assert_eq!(ints, ColumnData::int64(vec![Some(1), None, Some(3)]));
        let filled = fill_nulls(&ints, &Some(Value::Integer(0)));
        assert_eq!(filled, ColumnData::int64(vec![Some(1), Some(0), Some(3)]));
        assert!(cast(&raw.data, "bool").is_err());
        assert!(cast(&raw.data, "category").expect("category").is_categorical());
    }

    #[test]
    fn str_accessor_operations() {
        let names = series(ColumnData::text(vec![
            Some(" North ".into()),
            None,
            Some("south-east".into()),
        ]));
        let ScriptValue::Series(stripped) = str_call(&names, "strip", &no_args()).expect("strip") else {
            panic!("expected series");
        };
        assert_eq!(stripped.data.get(0), Some(Value::String("North".into())));
        let args = Args::new(vec![ScriptValue::string("east")], Vec::new());
        let ScriptValue::Series(mask) = str_call(&names, "contains", &args).expect("contains") else {
            panic!("expected series");
        };
        assert_eq!(mask.data, ColumnData::boolean(vec![Some(false), Some(false), Some(true)]));
    }

    #[test]
    fn index_by_label_and_mask() {
        let numbers = series(ColumnData::int64(vec![Some(5), Some(7)]));
        let value = index(&numbers, &ScriptValue::int(1)).expect("label");
        assert!(matches!(value, ScriptValue::Scalar(Some(Value::Integer(7)))));
        assert!(index(&numbers, &ScriptValue::int(9)).is_err());
        let idx = call(&numbers, "idxmax", &no_args()).expect("idxmax");
        assert!(matches!(idx, ScriptValue::Scalar(Some(Value::Integer(1)))));
    }
}
