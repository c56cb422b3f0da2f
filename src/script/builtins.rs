//! Free functions callable by name and the `pd.` namespace.

use anyhow::{Result, anyhow, bail};

use super::{
    series,
    value::{Args, ScriptValue, expect_int, expect_names, expect_scalar, expect_str, expect_values},
};
use crate::{
    data::{Value, parse_naive_date, parse_naive_datetime},
    frame::{Column, ColumnData, Dataset, Series, SeriesIndex},
    stats::{Aggregation, aggregate},
};

const BUILTINS: &[&str] = &[
    "len", "round", "abs", "min", "max", "sum", "str", "int", "float", "bool", "list", "sorted",
    "print",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Calls a builtin; `print` appends its line to `output`.
pub fn call(name: &str, args: &Args, output: &mut Vec<String>) -> Result<ScriptValue> {
    match name {
        "print" => {
            args.check(name, usize::MAX, &["sep"])?;
            let sep = args
                .get(usize::MAX, "sep")
                .map(|v| expect_str(v, "sep"))
                .transpose()?
                .unwrap_or_else(|| " ".to_string());
            let line = args
                .positional()
                .iter()
                .map(ScriptValue::display)
                .collect::<Vec<_>>()
                .join(&sep);
            output.push(line);
            Ok(ScriptValue::none())
        }
        "len" => {
            let value = single(name, args)?;
            let len = match value {
                ScriptValue::Table(table) => table.row_count(),
                ScriptValue::Series(series) => series.len(),
                ScriptValue::List(items) => items.len(),
                ScriptValue::Mapping(entries) => entries.len(),
                ScriptValue::Scalar(Some(Value::String(s))) => s.chars().count(),
                other => bail!("object of kind {} has no len()", other.kind()),
            };
            Ok(ScriptValue::int(len as i64))
        }
        "round" => {
            args.check(name, 2, &["ndigits"])?;
            let value = args.required(0, "number", name)?;
            let ndigits = args.get(1, "ndigits").map(|v| expect_int(v, "ndigits")).transpose()?;
            match value {
                ScriptValue::Series(series) => {
                    let digits = ScriptValue::int(ndigits.unwrap_or(0));
                    series::call(series, "round", &Args::new(vec![digits], Vec::new()))
                }
                ScriptValue::Scalar(Some(Value::Float(f))) => Ok(match ndigits {
                    None => ScriptValue::int(f.round_ties_even() as i64),
                    Some(digits) => {
                        let exponent = i32::try_from(digits).map_err(|_| anyhow!("ndigits out of range"))?;
                        let scale = 10f64.powi(exponent);
                        ScriptValue::Scalar(Some(Value::Float((f * scale).round_ties_even() / scale)))
                    }
                }),
                ScriptValue::Scalar(Some(Value::Integer(_))) => Ok(value.clone()),
                other => bail!("round() needs a number, got {}", super::value::describe(other)),
            }
        }
        "abs" => match single(name, args)? {
            ScriptValue::Series(series) => series::call(series, "abs", &Args::default()),
            ScriptValue::Scalar(Some(Value::Integer(i))) => i
                .checked_abs()
                .map(ScriptValue::int)
                .ok_or_else(|| anyhow!("integer overflow in abs()")),
            ScriptValue::Scalar(Some(Value::Float(f))) => Ok(ScriptValue::Scalar(Some(Value::Float(f.abs())))),
            other => bail!("bad operand for abs(): {}", super::value::describe(other)),
        },
        "min" | "max" | "sum" => {
            args.check(name, usize::MAX, &[])?;
            let values = match args.positional() {
                [] => bail!("{name}() expected at least one argument"),
                [only] => expect_values(only, name)?,
                many => many
                    .iter()
                    .map(|v| expect_scalar(v, name))
                    .collect::<Result<Vec<_>>>()?,
            };
            let aggregation: Aggregation = name.parse()?;
            if aggregation != Aggregation::Sum && values.iter().all(Option::is_none) {
                bail!("{name}() arg is an empty sequence");
            }
            Ok(ScriptValue::Scalar(aggregate(aggregation, &values)?))
        }
        "str" => Ok(ScriptValue::string(single(name, args)?.display())),
        "int" => {
            let converted = match expect_scalar(single(name, args)?, "int() argument")? {
                Some(Value::Integer(i)) => i,
                Some(Value::Float(f)) if f.is_finite() => f.trunc() as i64,
                Some(Value::Boolean(b)) => b as i64,
                Some(Value::String(s)) => s
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("invalid literal for int(): '{s}'"))?,
                other => bail!("int() cannot convert {}", super::value::scalar_display(&other)),
            };
            Ok(ScriptValue::int(converted))
        }
        "float" => {
            let converted = match expect_scalar(single(name, args)?, "float() argument")? {
                Some(Value::String(s)) => s
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("could not convert string to float: '{s}'"))?,
                Some(other) => other
                    .as_f64()
                    .ok_or_else(|| anyhow!("float() cannot convert a {}", other.type_tag()))?,
                None => bail!("float() cannot convert None"),
            };
            Ok(ScriptValue::Scalar(Some(Value::Float(converted))))
        }
        "bool" => Ok(ScriptValue::bool(single(name, args)?.truthy()?)),
        "list" => match single(name, args)? {
            ScriptValue::Table(table) => Ok(ScriptValue::List(
                table.column_names().into_iter().map(ScriptValue::string).collect(),
            )),
            ScriptValue::Series(series) => Ok(ScriptValue::List(
                series.values().into_iter().map(ScriptValue::Scalar).collect(),
            )),
            ScriptValue::List(items) => Ok(ScriptValue::List(items.clone())),
            ScriptValue::Mapping(entries) => Ok(ScriptValue::List(
                entries.iter().map(|(key, _)| ScriptValue::string(key.clone())).collect(),
            )),
            other => bail!("a {} is not iterable", other.kind()),
        },
        "sorted" => {
            let mut values = expect_values(single(name, args)?, "sorted() argument")?;
            values.sort_by(|a, b| (a.is_none(), a).cmp(&(b.is_none(), b)));
            Ok(ScriptValue::List(values.into_iter().map(ScriptValue::Scalar).collect()))
        }
        other => bail!("name '{other}' is not defined"),
    }
}

fn single<'a>(name: &str, args: &'a Args) -> Result<&'a ScriptValue> {
    args.check(name, 1, &[])?;
    args.required(0, "x", name)
}

/// Functions reached through the pandas module binding.
pub fn pandas_call(function: &str, args: &Args) -> Result<ScriptValue> {
    match function {
        "to_numeric" => {
            args.check(function, 1, &["arg", "errors"])?;
            let coerce = errors_mode(args, function)?;
            map_values(args.required(0, "arg", function)?, |value| to_numeric(value, coerce))
        }
        "to_datetime" => {
            args.check(function, 1, &["arg", "errors"])?;
            let coerce = errors_mode(args, function)?;
            map_values(args.required(0, "arg", function)?, |value| to_datetime(value, coerce))
        }
        "isna" | "isnull" | "notna" | "notnull" => {
            args.check(function, 1, &["obj"])?;
            let want_null = function.starts_with("is");
            match args.required(0, "obj", function)? {
                ScriptValue::Scalar(value) => Ok(ScriptValue::bool(value.is_none() == want_null)),
                ScriptValue::Series(series) => series::call(series, function, &Args::default()),
                ScriptValue::Table(table) => super::table_ops::call(table, function, &Args::default()),
                other => bail!("pd.{function}() does not accept a {}", other.kind()),
            }
        }
        "DataFrame" => {
            args.check(function, 1, &["data"])?;
            let ScriptValue::Mapping(entries) = args.required(0, "data", function)? else {
                bail!("pd.DataFrame() expects a dict of column name to values");
            };
            let columns = entries
                .iter()
                .map(|(name, values)| {
                    let values = match values {
                        ScriptValue::Scalar(_) => vec![expect_scalar(values, name)?],
                        other => expect_values(other, name)?,
                    };
                    Ok(Column::new(name.clone(), ColumnData::from_values_inferred(values)))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ScriptValue::table(Dataset::new(columns)?))
        }
        "Series" => {
            args.check(function, 1, &["data", "name"])?;
            let values = expect_values(args.required(0, "data", function)?, "data")?;
            let name = args
                .get(usize::MAX, "name")
                .map(|v| expect_names(v, "name").map(|mut names| names.remove(0)))
                .transpose()?;
            Ok(ScriptValue::Series(Series::new(
                name,
                SeriesIndex::range(values.len()),
                ColumnData::from_values_inferred(values),
            )?))
        }
        other => bail!("module 'pandas' has no function '{other}'"),
    }
}

/// `errors='coerce'` turns unparseable values into nulls; `'raise'` (the default) fails.
fn errors_mode(args: &Args, function: &str) -> Result<bool> {
    match args.get(usize::MAX, "errors") {
        None => Ok(false),
        Some(mode) => match expect_str(mode, "errors")?.as_str() {
            "raise" => Ok(false),
            "coerce" => Ok(true),
            other => bail!("{function}() errors must be 'raise' or 'coerce', got '{other}'"),
        },
    }
}

fn map_values<F>(input: &ScriptValue, convert: F) -> Result<ScriptValue>
where
    F: Fn(Option<Value>) -> Result<Option<Value>>,
{
    match input {
        ScriptValue::Scalar(value) => Ok(ScriptValue::Scalar(convert(value.clone())?)),
        ScriptValue::Series(series) => {
            let values = series
                .values()
                .into_iter()
                .map(&convert)
                .collect::<Result<Vec<_>>>()?;
            Ok(ScriptValue::Series(series.with_data(ColumnData::from_values_inferred(values))?))
        }
        ScriptValue::List(_) => {
            let values = expect_values(input, "arg")?
                .into_iter()
                .map(&convert)
                .collect::<Result<Vec<_>>>()?;
            Ok(ScriptValue::List(values.into_iter().map(ScriptValue::Scalar).collect()))
        }
        other => bail!("cannot convert a {}", other.kind()),
    }
}

fn to_numeric(value: Option<Value>, coerce: bool) -> Result<Option<Value>> {
    match value {
        None => Ok(None),
        Some(Value::Boolean(b)) => Ok(Some(Value::Integer(b as i64))),
        Some(number @ (Value::Integer(_) | Value::Float(_))) => Ok(Some(number)),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            let parsed = trimmed
                .parse::<i64>()
                .map(Value::Integer)
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(Value::Float));
            match parsed {
                Some(number) => Ok(Some(number)),
                None if coerce => Ok(None),
                None => bail!("unable to parse string '{s}' as a number"),
            }
        }
        Some(_) if coerce => Ok(None),
        Some(other) => bail!("cannot convert a {} to a number", other.type_tag()),
    }
}

fn to_datetime(value: Option<Value>, coerce: bool) -> Result<Option<Value>> {
    match value {
        None => Ok(None),
        Some(Value::DateTime(dt)) => Ok(Some(Value::DateTime(dt))),
        Some(Value::Date(d)) => Ok(Some(Value::DateTime(d.and_time(chrono::NaiveTime::MIN)))),
        Some(Value::String(s)) => match parse_naive_datetime(&s)
            .or_else(|_| parse_naive_date(&s).map(|d| d.and_time(chrono::NaiveTime::MIN)))
        {
            Ok(dt) => Ok(Some(Value::DateTime(dt))),
            Err(_) if coerce => Ok(None),
            Err(err) => Err(err),
        },
        Some(_) if coerce => Ok(None),
        Some(other) => bail!("cannot convert a {} to a datetime", other.type_tag()),
    }
}
