//! Table indexing, attributes, methods and column assignment.

use std::{collections::HashSet, rc::Rc};

use anyhow::{Result, bail};

use super::{
    groupby::GroupBy,
    series::{self, cast, describe, fill_nulls, labelled},
    value::{
        Args, ScriptValue, expect_bool, expect_int, expect_names, expect_scalar, expect_str,
        expect_usize, scalar_display,
    },
};
use crate::{
    data::{ComparableValue, Value},
    expr::RowEvaluator,
    frame::{Column, ColumnData, Dataset, Series, SeriesIndex},
    stats::{Aggregation, aggregate_column},
};

const DEFAULT_HEAD: usize = 5;

/// `table['col']`, `table[['a', 'b']]` and `table[mask]`.
pub fn index(table: &Rc<Dataset>, key: &ScriptValue) -> Result<ScriptValue> {
    match key {
        ScriptValue::Scalar(Some(Value::String(name))) => {
            Ok(ScriptValue::Series(Series::from_column(table.column(name)?)))
        }
        ScriptValue::Series(mask) if mask.data.is_boolean() => {
            let keep = (0..mask.len())
                .map(|idx| matches!(mask.data.get(idx), Some(Value::Boolean(true))))
                .collect::<Vec<_>>();
            Ok(ScriptValue::table(table.filter(&keep)?))
        }
        ScriptValue::List(_) | ScriptValue::Series(_) => {
            let names = expect_names(key, "columns")?;
            Ok(ScriptValue::table(table.select(&names)?))
        }
        other => bail!(
            "tables are indexed by a column name, a list of names or a boolean mask, not {}",
            super::value::describe(other)
        ),
    }
}

pub fn attribute(table: &Rc<Dataset>, name: &str) -> Result<ScriptValue> {
    match name {
        "columns" => Ok(ScriptValue::Series(Series::new(
            None,
            SeriesIndex::range(table.column_count()),
            ColumnData::text(table.column_names().into_iter().map(Some).collect()),
        )?)),
        "shape" => Ok(ScriptValue::List(vec![
            ScriptValue::int(table.row_count() as i64),
            ScriptValue::int(table.column_count() as i64),
        ])),
        "dtypes" => Ok(ScriptValue::Series(labelled(
            None,
            None,
            table
                .columns()
                .iter()
                .map(|c| Some(Value::String(c.name.clone())))
                .collect(),
            table
                .columns()
                .iter()
                .map(|c| Some(Value::String(c.data.dtype().to_string())))
                .collect(),
        )?)),
        "size" => Ok(ScriptValue::int((table.row_count() * table.column_count()) as i64)),
        "empty" => Ok(ScriptValue::bool(table.row_count() == 0 || table.column_count() == 0)),
        "index" => Ok(ScriptValue::Series(Series::new(
            None,
            SeriesIndex::range(table.row_count()),
            ColumnData::int64((0..table.row_count() as i64).map(Some).collect()),
        )?)),
        column if table.column_index(column).is_some() => {
            Ok(ScriptValue::Series(Series::from_column(table.column(column)?)))
        }
        other => Err(table.missing_column(other).into()),
    }
}

/// Stores `value` as column `name`: series align by position, scalars broadcast.
pub fn assign_column(table: &Dataset, name: &str, value: &ScriptValue) -> Result<Dataset> {
    let rows = table.row_count();
    let data = match value {
        ScriptValue::Series(series) => {
            if series.len() != rows && table.column_count() > 0 {
                bail!(
                    "cannot assign {} values to column '{name}' of a table with {rows} rows",
                    series.len()
                );
            }
            series.data.clone()
        }
        ScriptValue::Scalar(scalar) => {
            ColumnData::from_values_inferred(vec![scalar.clone(); rows])
        }
        ScriptValue::List(items) => ColumnData::from_values_inferred(
            items
                .iter()
                .map(|item| expect_scalar(item, "column values"))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => bail!("cannot store a {} in a table column", other.kind()),
    };
    let mut updated = table.clone();
    updated.set_column(Column::new(name, data))?;
    Ok(updated)
}

fn count_arg(args: &Args, method: &str) -> Result<usize> {
    args.check(method, 1, &["n"])?;
    args.get(0, "n")
        .map(|n| expect_usize(n, "n"))
        .transpose()
        .map(|n| n.unwrap_or(DEFAULT_HEAD))
}

fn optional_names(args: &Args, position: usize, name: &str) -> Result<Option<Vec<String>>> {
    match args.get(position, name) {
        None | Some(ScriptValue::Scalar(None)) => Ok(None),
        Some(value) => expect_names(value, name).map(Some),
    }
}

pub fn call(table: &Rc<Dataset>, method: &str, args: &Args) -> Result<ScriptValue> {
    if let Ok(aggregation) = method.parse::<Aggregation>() {
        if !matches!(aggregation, Aggregation::First | Aggregation::Last | Aggregation::Size) {
            args.check(method, 0, &["numeric_only"])?;
            let numeric_only = args
                .get(usize::MAX, "numeric_only")
                .map(|v| expect_bool(v, "numeric_only"))
                .transpose()?;
            return reduce_columns(table, aggregation, numeric_only);
        }
    }
    match method {
        "head" => Ok(ScriptValue::table(table.head(count_arg(args, method)?)?)),
        "tail" => Ok(ScriptValue::table(table.tail(count_arg(args, method)?)?)),
        "copy" => {
            args.check(method, 0, &["deep"])?;
            Ok(ScriptValue::Table(Rc::new(table.as_ref().clone())))
        }
        "groupby" => {
            args.check(method, 1, &["by", "as_index", "sort", "dropna"])?;
            let keys = expect_names(args.required(0, "by", method)?, "by")?;
            let as_index = args
                .get(usize::MAX, "as_index")
                .map(|v| expect_bool(v, "as_index"))
                .transpose()?
                .unwrap_or(true);
            Ok(ScriptValue::GroupBy(GroupBy::new(Rc::clone(table), keys, as_index)?))
        }
        "sort_values" => {
            args.check(method, 2, &["by", "ascending"])?;
            let keys = expect_names(args.required(0, "by", method)?, "by")?;
            let ascending = match args.get(1, "ascending") {
                None => vec![true; keys.len()],
                Some(ScriptValue::List(flags)) => flags
                    .iter()
                    .map(|flag| expect_bool(flag, "ascending"))
                    .collect::<Result<Vec<_>>>()?,
                Some(flag) => vec![expect_bool(flag, "ascending")?; keys.len()],
            };
            if ascending.len() != keys.len() {
                bail!(
                    "ascending has {} flags for {} sort keys",
                    ascending.len(),
                    keys.len()
                );
            }
            let order = table.sort_indices(&keys, &ascending)?;
            Ok(ScriptValue::table(table.take_rows(&order)?))
        }
        "nlargest" | "nsmallest" => {
            args.check(method, 2, &["n", "columns"])?;
            let n = expect_usize(args.required(0, "n", method)?, "n")?;
            let keys = expect_names(args.required(1, "columns", method)?, "columns")?;
            let ascending = vec![method == "nsmallest"; keys.len()];
            let order = table.sort_indices(&keys, &ascending)?;
            let kept = order
                .into_iter()
                .filter(|&row| {
                    keys.iter().all(|key| {
                        table
                            .column(key)
                            .map(|c| !c.data.is_null(row))
                            .unwrap_or(false)
                    })
                })
                .take(n)
                .collect::<Vec<_>>();
            Ok(ScriptValue::table(table.take_rows(&kept)?))
        }
        "dropna" => {
            args.check(method, 0, &["subset", "how"])?;
            let subset = optional_names(args, usize::MAX, "subset")?.unwrap_or_else(|| table.column_names());
            let how = args
                .get(usize::MAX, "how")
                .map(|v| expect_str(v, "how"))
                .transpose()?
                .unwrap_or_else(|| "any".to_string());
            let columns = subset
                .iter()
                .map(|name| table.column(name))
                .collect::<crate::error::Result<Vec<_>>>()?;
            let keep = (0..table.row_count())
                .map(|row| {
                    let mut nulls = columns.iter().map(|c| c.data.is_null(row));
                    match how.as_str() {
                        "any" => Ok(!nulls.any(|null| null)),
                        "all" => Ok(!nulls.all(|null| null)),
                        other => bail!("how must be 'any' or 'all', got '{other}'"),
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ScriptValue::table(table.filter(&keep)?))
        }
        "fillna" => {
            args.check(method, 1, &["value"])?;
            let fill = args.required(0, "value", method)?;
            let mut filled = Vec::with_capacity(table.column_count());
            for column in table.columns() {
                let value = match fill {
                    ScriptValue::Mapping(entries) => entries
                        .iter()
                        .find(|(name, _)| *name == column.name)
                        .map(|(_, value)| expect_scalar(value, "fill value"))
                        .transpose()?
                        .flatten(),
                    other => expect_scalar(other, "fill value")?,
                };
                filled.push(Column::new(column.name.clone(), fill_nulls(&column.data, &value)));
            }
            Ok(ScriptValue::table(Dataset::new(filled)?))
        }
        "drop_duplicates" => {
            args.check(method, 1, &["subset", "keep"])?;
            let subset = optional_names(args, 0, "subset")?.unwrap_or_else(|| table.column_names());
            let keep_last = match args.get(usize::MAX, "keep") {
                None => false,
                Some(keep) => match expect_str(keep, "keep")?.as_str() {
                    "first" => false,
                    "last" => true,
                    other => bail!("keep must be 'first' or 'last', got '{other}'"),
                },
            };
            let columns = subset
                .iter()
                .map(|name| table.column(name))
                .collect::<crate::error::Result<Vec<_>>>()?;
            let mut seen = HashSet::new();
            let mut rows: Vec<usize> = (0..table.row_count()).collect();
            if keep_last {
                rows.reverse();
            }
            let mut kept = rows
                .into_iter()
                .filter(|&row| {
                    let key = columns
                        .iter()
                        .map(|c| ComparableValue(c.data.get(row)))
                        .collect::<Vec<_>>();
                    seen.insert(key)
                })
                .collect::<Vec<_>>();
            kept.sort_unstable();
            Ok(ScriptValue::table(table.take_rows(&kept)?))
        }
        "drop" => {
            args.check(method, 1, &["labels", "columns", "axis"])?;
            let axis = args
                .get(usize::MAX, "axis")
                .map(|v| match v {
                    ScriptValue::Scalar(Some(Value::String(s))) if s == "columns" => Ok(1),
                    ScriptValue::Scalar(Some(Value::String(s))) if s == "index" => Ok(0),
                    other => expect_int(other, "axis"),
                })
                .transpose()?
                .unwrap_or(0);
            if let Some(columns) = optional_names(args, usize::MAX, "columns")? {
                return Ok(ScriptValue::table(table.drop_columns(&columns)?));
            }
            let labels = args.required(0, "labels", method)?;
            if axis == 1 {
                return Ok(ScriptValue::table(table.drop_columns(&expect_names(labels, "labels")?)?));
            }
            let rows = match labels {
                ScriptValue::List(items) => items
                    .iter()
                    .map(|item| expect_usize(item, "row label"))
                    .collect::<Result<HashSet<_>>>()?,
                other => HashSet::from([expect_usize(other, "row label")?]),
            };
            if let Some(missing) = rows.iter().find(|&&row| row >= table.row_count()) {
                bail!("row label {missing} not found; the table has {} rows", table.row_count());
            }
            let keep = (0..table.row_count()).map(|row| !rows.contains(&row)).collect::<Vec<_>>();
            Ok(ScriptValue::table(table.filter(&keep)?))
        }
        "rename" => {
            args.check(method, 0, &["columns"])?;
            let ScriptValue::Mapping(entries) = args.required(usize::MAX, "columns", method)? else {
                bail!("rename() expects columns={{'old': 'new'}}");
            };
            let mapping = entries
                .iter()
                .map(|(from, to)| Ok((from.clone(), expect_str(to, "new column name")?)))
                .collect::<Result<Vec<_>>>()?;
            for (from, _) in &mapping {
                table.column(from)?;
            }
            Ok(ScriptValue::table(table.rename(&mapping)?))
        }
        "query" => {
            args.check(method, 1, &["expr"])?;
            let expression = expect_str(args.required(0, "expr", method)?, "expr")?;
            let mask = RowEvaluator::new(table, &expression)?.filter_mask()?;
            Ok(ScriptValue::table(table.filter(&mask)?))
        }
        "derive" => {
            args.check(method, 2, &["name", "expr"])?;
            let name = expect_str(args.required(0, "name", method)?, "name")?;
            let expression = expect_str(args.required(1, "expr", method)?, "expr")?;
            let values = RowEvaluator::new(table, &expression)?.derive_values()?;
            let mut derived = table.as_ref().clone();
            derived.set_column(Column::new(name, ColumnData::from_values_inferred(values)))?;
            Ok(ScriptValue::table(derived))
        }
        "assign" => {
            if !args.positional().is_empty() {
                bail!("assign() only takes keyword arguments");
            }
            let mut updated = table.as_ref().clone();
            for (name, value) in args.keywords() {
                updated = assign_column(&updated, name, value)?;
            }
            Ok(ScriptValue::table(updated))
        }
        "astype" => {
            args.check(method, 1, &["dtype"])?;
            let target = args.required(0, "dtype", method)?;
            let mut converted = Vec::with_capacity(table.column_count());
            for column in table.columns() {
                let dtype = match target {
                    ScriptValue::Mapping(entries) => entries
                        .iter()
                        .find(|(name, _)| *name == column.name)
                        .map(|(_, dtype)| expect_str(dtype, "dtype"))
                        .transpose()?,
                    other => Some(expect_str(other, "dtype")?),
                };
                let data = match dtype {
                    Some(dtype) => cast(&column.data, &dtype)?,
                    None => column.data.clone(),
                };
                converted.push(Column::new(column.name.clone(), data));
            }
            Ok(ScriptValue::table(Dataset::new(converted)?))
        }
        "describe" => {
            args.check(method, 0, &[])?;
            Ok(ScriptValue::table(describe_table(table)?))
        }
        "value_counts" => {
            args.check(method, 1, &["subset"])?;
            let subset = optional_names(args, 0, "subset")?.unwrap_or_else(|| table.column_names());
            Ok(ScriptValue::table(value_counts(table, &subset)?))
        }
        "nunique" => {
            args.check(method, 0, &[])?;
            reduce_columns(table, Aggregation::Nunique, Some(false))
        }
        "isna" | "isnull" | "notna" | "notnull" => {
            args.check(method, 0, &[])?;
            let want_null = method.starts_with("is");
            let columns = table
                .columns()
                .iter()
                .map(|c| {
                    let mask = (0..c.len()).map(|row| Some(c.data.is_null(row) == want_null)).collect();
                    Column::new(c.name.clone(), ColumnData::boolean(mask))
                })
                .collect();
            Ok(ScriptValue::table(Dataset::new(columns)?))
        }
        "reset_index" => {
            args.check(method, 0, &["drop"])?;
            let drop = args
                .get(usize::MAX, "drop")
                .map(|v| expect_bool(v, "drop"))
                .transpose()?
                .unwrap_or(false);
            if drop || table.column_index("index").is_some() {
                return Ok(ScriptValue::Table(Rc::clone(table)));
            }
            let mut columns = vec![Column::new(
                "index",
                ColumnData::int64((0..table.row_count() as i64).map(Some).collect()),
            )];
            columns.extend(table.columns().iter().cloned());
            Ok(ScriptValue::table(Dataset::new(columns)?))
        }
        "to_dict" => {
            args.check(method, 1, &["orient"])?;
            let orient = args
                .get(0, "orient")
                .map(|v| expect_str(v, "orient"))
                .transpose()?
                .unwrap_or_else(|| "dict".to_string());
            to_dict(table, &orient)
        }
        other => bail!("table has no method '{other}'"),
    }
}

/// Per-column reduction, labelled by column name. Numeric reductions skip text columns unless
/// `numeric_only=False` is passed.
fn reduce_columns(
    table: &Dataset,
    aggregation: Aggregation,
    numeric_only: Option<bool>,
) -> Result<ScriptValue> {
    let numeric = numeric_only.unwrap_or(matches!(
        aggregation,
        Aggregation::Sum | Aggregation::Mean | Aggregation::Median | Aggregation::Std
    ));
    let (labels, values): (Vec<_>, Vec<_>) = table
        .columns()
        .iter()
        .filter(|c| !numeric || c.data.column_type().is_numeric())
        .map(|c| {
            let value = aggregate_column(aggregation, &c.data)?;
            Ok((Some(Value::String(c.name.clone())), value))
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .unzip();
    Ok(ScriptValue::Series(labelled(None, None, labels, values)?))
}

fn describe_table(table: &Dataset) -> Result<Dataset> {
    let numeric = table
        .columns()
        .iter()
        .filter(|c| c.data.column_type().is_numeric())
        .collect::<Vec<_>>();
    let described = if numeric.is_empty() {
        table.columns().iter().collect()
    } else {
        numeric
    };
    let mut columns = Vec::with_capacity(described.len() + 1);
    for column in described {
        let summary = describe(&Series::from_column(column))?;
        if columns.is_empty() {
            columns.push(Column::new(
                "statistic",
                ColumnData::from_values_inferred(summary.index.labels()),
            ));
        }
        columns.push(Column::new(column.name.clone(), summary.data));
    }
    Ok(Dataset::new(columns)?)
}

/// Distinct row combinations over `subset` with a `count` column, most frequent first.
fn value_counts(table: &Dataset, subset: &[String]) -> Result<Dataset> {
    if subset.len() == 1 {
        let counts = series::value_counts(&Series::from_column(table.column(&subset[0])?), false)?;
        return Ok(Dataset::new(vec![
            Column::new(subset[0].clone(), ColumnData::from_values_inferred(counts.index.labels())),
            Column::new("count", counts.data),
        ])?);
    }
    let projected = table.select(subset)?;
    let groups = projected.group_indices(subset)?;
    let mut entries = groups.into_iter().collect::<Vec<_>>();
    entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
    let firsts = entries.iter().map(|(_, rows)| rows[0]).collect::<Vec<_>>();
    let mut counted = projected.take_rows(&firsts)?;
    counted.set_column(Column::new(
        "count",
        ColumnData::int64(entries.iter().map(|(_, rows)| Some(rows.len() as i64)).collect()),
    ))?;
    Ok(counted)
}

fn to_dict(table: &Dataset, orient: &str) -> Result<ScriptValue> {
    let cell = |column: &Column, row: usize| ScriptValue::Scalar(column.data.get(row));
    match orient {
        "dict" => Ok(ScriptValue::Mapping(
            table
                .columns()
                .iter()
                .map(|c| {
                    let entries = (0..table.row_count())
                        .map(|row| (row.to_string(), cell(c, row)))
                        .collect();
                    (c.name.clone(), ScriptValue::Mapping(entries))
                })
                .collect(),
        )),
        "list" => Ok(ScriptValue::Mapping(
            table
                .columns()
                .iter()
                .map(|c| {
                    let items = (0..table.row_count()).map(|row| cell(c, row)).collect();
                    (c.name.clone(), ScriptValue::List(items))
                })
                .collect(),
        )),
        "records" => Ok(ScriptValue::List(
            (0..table.row_count())
                .map(|row| {
                    ScriptValue::Mapping(
                        table
                            .columns()
                            .iter()
                            .map(|c| (c.name.clone(), cell(c, row)))
                            .collect(),
                    )
                })
                .collect(),
        )),
        other => bail!(
            "orient must be one of dict, list, records; got {}",
            scalar_display(&Some(Value::String(other.to_string())))
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> Rc<Dataset> {
        Rc::new(
            Dataset::new(vec![
                Column::new(
                    "customer",
                    ColumnData::text(
                        ["ann", "bob", "ann", "cy"].iter().map(|s| Some(s.to_string())).collect(),
                    ),
                ),
                Column::new("total", ColumnData::int64(vec![Some(30), None, Some(30), Some(12)])),
            ])
            .expect("dataset"),
        )
    }

    fn positional(values: Vec<ScriptValue>) -> Args {
        Args::new(values, Vec::new())
    }

    #[test]
    fn query_filters_rows_and_treats_nulls_as_false() {
        let args = positional(vec![ScriptValue::string("total > 20")]);
        let ScriptValue::Table(big) = call(&orders(), "query", &args).expect("query") else {
            panic!("expected table");
        };
        assert_eq!(big.row_count(), 2);
    }

    #[test]
    fn drop_duplicates_and_dropna() {
        let ScriptValue::Table(unique) = call(&orders(), "drop_duplicates", &Args::default()).expect("dedupe")
        else {
            panic!("expected table");
        };
        assert_eq!(unique.row_count(), 3);
        let ScriptValue::Table(complete) = call(&orders(), "dropna", &Args::default()).expect("dropna") else {
            panic!("expected table");
        };
        assert_eq!(complete.row_count(), 3);
    }

    #[test]
    fn whole_table_sum_skips_text() {
        let ScriptValue::Series(sums) = call(&orders(), "sum", &Args::default()).expect("sum") else {
            panic!("expected series");
        };
        assert_eq!(sums.index.labels(), vec![Some(Value::String("total".into()))]);
        assert_eq!(sums.data.get(0), Some(Value::Integer(72)));
    }

    #[test]
    fn assignment_broadcasts_scalars_and_checks_lengths() {
        let table = orders();
        let updated = assign_column(&table, "flag", &ScriptValue::bool(true)).expect("assign");
        assert_eq!(updated.column("flag").expect("flag").data.null_count(), 0);
        let short = ScriptValue::Series(
            Series::new(None, SeriesIndex::range(1), ColumnData::int64(vec![Some(1)])).expect("series"),
        );
        assert!(assign_column(&table, "bad", &short).is_err());
    }

    #[test]
    fn multi_column_value_counts() {
        let counted = value_counts(&orders(), &["customer".into(), "total".into()]).expect("counts");
        assert_eq!(counted.column_names(), vec!["customer", "total", "count"]);
        assert_eq!(counted.column("count").expect("count").data.get(0), Some(Value::Integer(2)));
    }

    #[test]
    fn unknown_column_lists_available_names() {
        let err = index(&orders(), &ScriptValue::string("missing")).expect_err("missing column");
        assert!(err.to_string().contains("available columns: customer, total"));
    }
}
