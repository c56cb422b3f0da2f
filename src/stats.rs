//! Summary statistics and named aggregations over nullable cells.

use std::{collections::HashSet, fmt, str::FromStr};

use arrow::array::AsArray;
use arrow::compute;
use arrow::datatypes::{DataType, Float64Type, Int64Type};

use crate::{
    data::{ComparableValue, Value},
    error::{Result, ScoutError},
    frame::ColumnData,
};

/// Running numeric summary.
#[derive(Debug, Clone, Default)]
pub struct ColumnStats {
    values: Vec<f64>,
    sum: f64,
    count: usize,
    min: Option<f64>,
    max: Option<f64>,
}

impl ColumnStats {
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Option<Value>>,
    {
        let mut stats = ColumnStats::default();
        for value in values.into_iter().flatten() {
            if let Some(numeric) = value.as_f64() {
                stats.add(numeric);
            }
        }
        stats
    }

    pub fn add(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |current| current.min(value)));
        self.max = Some(self.max.map_or(value, |current| current.max(value)));
        self.values.push(value);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.sum / self.count as f64)
        } else {
            None
        }
    }

    pub fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len().is_multiple_of(2) {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }

    /// Sample standard deviation (n - 1 denominator).
    pub fn std_dev(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        let mean = self.mean()?;
        let variance = self
            .values
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / (self.count as f64 - 1.0);
        Some(variance.max(0.0).sqrt())
    }

    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        let weight = position - lower as f64;
        Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
    Min,
    Max,
    Median,
    Std,
    Count,
    Nunique,
    Size,
    First,
    Last,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Median => "median",
            Aggregation::Std => "std",
            Aggregation::Count => "count",
            Aggregation::Nunique => "nunique",
            Aggregation::Size => "size",
            Aggregation::First => "first",
            Aggregation::Last => "last",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = ScoutError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "mean" | "avg" | "average" => Ok(Aggregation::Mean),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "median" => Ok(Aggregation::Median),
            "std" => Ok(Aggregation::Std),
            "count" => Ok(Aggregation::Count),
            "nunique" => Ok(Aggregation::Nunique),
            "size" => Ok(Aggregation::Size),
            "first" => Ok(Aggregation::First),
            "last" => Ok(Aggregation::Last),
            other => Err(ScoutError::runtime(format!(
                "unknown aggregation '{other}'; expected one of sum, mean, min, max, median, std, count, nunique, size, first, last"
            ))),
        }
    }
}

/// Applies `aggregation` to `values`, skipping nulls the way pandas does.
pub fn aggregate(aggregation: Aggregation, values: &[Option<Value>]) -> Result<Option<Value>> {
    let present = || values.iter().flatten();
    match aggregation {
        Aggregation::Count => Ok(Some(Value::Integer(present().count() as i64))),
        Aggregation::Size => Ok(Some(Value::Integer(values.len() as i64))),
        Aggregation::Nunique => {
            let distinct = present()
                .map(|v| ComparableValue(Some(v.clone())))
                .collect::<HashSet<_>>();
            Ok(Some(Value::Integer(distinct.len() as i64)))
        }
        Aggregation::Min => Ok(present().min().cloned()),
        Aggregation::Max => Ok(present().max().cloned()),
        Aggregation::First => Ok(present().next().cloned()),
        Aggregation::Last => Ok(present().last().cloned()),
        Aggregation::Sum => sum_values(values),
        Aggregation::Mean | Aggregation::Median | Aggregation::Std => {
            let stats = numeric_stats(aggregation, values)?;
            let result = match aggregation {
                Aggregation::Mean => stats.mean(),
                Aggregation::Median => stats.median(),
                _ => stats.std_dev(),
            };
            Ok(result.map(Value::Float))
        }
    }
}

/// [`aggregate`] over a whole column. Numeric and text columns reduce
/// through arrow's aggregate kernels; anything else goes cell by cell.
pub fn aggregate_column(aggregation: Aggregation, data: &ColumnData) -> Result<Option<Value>> {
    let integral = matches!(data.data_type(), DataType::Int32 | DataType::Int64);
    let floating = matches!(data.data_type(), DataType::Float32 | DataType::Float64);
    let textual = matches!(data.data_type(), DataType::Utf8 | DataType::Dictionary(_, _));
    match aggregation {
        Aggregation::Count => Ok(Some(Value::Integer((data.len() - data.null_count()) as i64))),
        Aggregation::Size => Ok(Some(Value::Integer(data.len() as i64))),
        Aggregation::Sum if integral || data.is_boolean() => {
            let wide = compute::cast(data.array(), &DataType::Int64)?;
            match compute::sum_checked(wide.as_primitive::<Int64Type>()) {
                Ok(total) => Ok(Some(Value::Integer(total.unwrap_or(0)))),
                // Overflow: the cell path carries on in floating point.
                Err(_) => aggregate(aggregation, &data.to_values()),
            }
        }
        Aggregation::Sum if floating => {
            let wide = compute::cast(data.array(), &DataType::Float64)?;
            let total = wide
                .as_primitive::<Float64Type>()
                .iter()
                .flatten()
                .filter(|v| !v.is_nan())
                .sum::<f64>();
            Ok(Some(Value::Float(total)))
        }
        Aggregation::Min | Aggregation::Max if integral => {
            let wide = compute::cast(data.array(), &DataType::Int64)?;
            let values = wide.as_primitive::<Int64Type>();
            let extreme = if aggregation == Aggregation::Min {
                compute::min(values)
            } else {
                compute::max(values)
            };
            Ok(extreme.map(Value::Integer))
        }
        Aggregation::Min | Aggregation::Max if floating => {
            let wide = compute::cast(data.array(), &DataType::Float64)?;
            let values = wide.as_primitive::<Float64Type>();
            let extreme = if aggregation == Aggregation::Min {
                compute::min(values)
            } else {
                compute::max(values)
            };
            Ok(extreme.map(Value::Float))
        }
        Aggregation::Min | Aggregation::Max if textual => {
            let plain = compute::cast(data.array(), &DataType::Utf8)?;
            let strings = plain.as_string::<i32>();
            let extreme = if aggregation == Aggregation::Min {
                compute::min_string(strings)
            } else {
                compute::max_string(strings)
            };
            Ok(extreme.map(|s| Value::String(s.to_string())))
        }
        Aggregation::Mean | Aggregation::Median | Aggregation::Std if integral || floating => {
            let wide = compute::cast(data.array(), &DataType::Float64)?;
            let mut stats = ColumnStats::default();
            wide.as_primitive::<Float64Type>()
                .iter()
                .flatten()
                .for_each(|v| stats.add(v));
            let result = match aggregation {
                Aggregation::Mean => stats.mean(),
                Aggregation::Median => stats.median(),
                _ => stats.std_dev(),
            };
            Ok(result.map(Value::Float))
        }
        _ => aggregate(aggregation, &data.to_values()),
    }
}

fn numeric_stats(aggregation: Aggregation, values: &[Option<Value>]) -> Result<ColumnStats> {
    if let Some(bad) = values.iter().flatten().find(|v| !v.is_numeric() && !matches!(v, Value::Boolean(_))) {
        return Err(ScoutError::runtime(format!(
            "cannot compute {aggregation} of non-numeric value '{bad}' ({})",
            bad.type_tag()
        )));
    }
    Ok(ColumnStats::from_values(values))
}

/// Integer sums stay integers until they overflow; empty input sums to 0.
fn sum_values(values: &[Option<Value>]) -> Result<Option<Value>> {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;
    let mut saw_float = false;
    for value in values.iter().flatten() {
        match value {
            Value::Integer(i) => {
                int_total = int_total.and_then(|t| t.checked_add(*i));
                float_total += *i as f64;
            }
            Value::Boolean(b) => {
                int_total = int_total.and_then(|t| t.checked_add(*b as i64));
                float_total += *b as i64 as f64;
            }
            Value::Float(f) => {
                saw_float = true;
                if !f.is_nan() {
                    float_total += f;
                }
            }
            other => {
                return Err(ScoutError::runtime(format!(
                    "cannot compute sum of non-numeric value '{other}' ({})",
                    other.type_tag()
                )));
            }
        }
    }
    Ok(Some(match (saw_float, int_total) {
        (false, Some(total)) => Value::Integer(total),
        _ => Value::Float(float_total),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[Option<i64>]) -> Vec<Option<Value>> {
        values.iter().map(|v| v.map(Value::Integer)).collect()
    }

    #[test]
    fn std_dev_uses_sample_denominator() {
        let stats = ColumnStats::from_values(&ints(&[Some(2), Some(4), Some(4), Some(4), Some(5), Some(5), Some(7), Some(9)]));
        let std = stats.std_dev().expect("std");
        assert!((std - 2.138_089_935).abs() < 1e-6);
        assert_eq!(stats.median(), Some(4.5));
    }

    #[test]
    fn integer_sum_stays_integer_and_skips_nulls() {
        let result = aggregate(Aggregation::Sum, &ints(&[Some(1), None, Some(2)])).expect("sum");
        assert_eq!(result, Some(Value::Integer(3)));
        let mixed = aggregate(
            Aggregation::Sum,
            &[Some(Value::Integer(1)), Some(Value::Float(0.5))],
        )
        .expect("sum");
        assert_eq!(mixed, Some(Value::Float(1.5)));
        assert_eq!(aggregate(Aggregation::Sum, &[None]).expect("sum"), Some(Value::Integer(0)));
    }

    #[test]
    fn text_min_max_work_but_mean_fails() {
        let text = vec![Some(Value::String("b".into())), Some(Value::String("a".into())), None];
        assert_eq!(
            aggregate(Aggregation::Min, &text).expect("min"),
            Some(Value::String("a".into()))
        );
        assert_eq!(
            aggregate(Aggregation::Count, &text).expect("count"),
            Some(Value::Integer(2))
        );
        assert!(aggregate(Aggregation::Mean, &text).is_err());
    }

    #[test]
    fn column_aggregates_agree_with_cell_rules() {
        let narrow = ColumnData::int32(vec![Some(3), None, Some(-1)]);
        assert_eq!(aggregate_column(Aggregation::Sum, &narrow).expect("sum"), Some(Value::Integer(2)));
        assert_eq!(aggregate_column(Aggregation::Min, &narrow).expect("min"), Some(Value::Integer(-1)));
        assert_eq!(aggregate_column(Aggregation::Mean, &narrow).expect("mean"), Some(Value::Float(1.0)));
        assert_eq!(aggregate_column(Aggregation::Count, &narrow).expect("count"), Some(Value::Integer(2)));

        let huge = ColumnData::int64(vec![Some(i64::MAX), Some(1)]);
        assert_eq!(
            aggregate_column(Aggregation::Sum, &huge).expect("sum"),
            Some(Value::Float(i64::MAX as f64 + 1.0))
        );

        let floats = ColumnData::float64(vec![Some(1.5), Some(f64::NAN), None, Some(2.0)]);
        assert_eq!(aggregate_column(Aggregation::Sum, &floats).expect("sum"), Some(Value::Float(3.5)));
        assert_eq!(aggregate_column(Aggregation::Size, &floats).expect("size"), Some(Value::Integer(4)));
    }

    #[test]
    fn categorical_columns_reduce_like_text() {
        let labels = ColumnData::categorical(vec![Some("west".into()), None, Some("east".into())])
            .expect("categorical");
        assert_eq!(
            aggregate_column(Aggregation::Max, &labels).expect("max"),
            Some(Value::String("west".into()))
        );
        assert_eq!(
            aggregate_column(Aggregation::Nunique, &labels).expect("nunique"),
            Some(Value::Integer(2))
        );
        assert!(aggregate_column(Aggregation::Mean, &labels).is_err());
    }

    #[test]
    fn unknown_aggregation_name_is_rejected() {
        assert!("average".parse::<Aggregation>().is_ok());
        assert!("mode".parse::<Aggregation>().is_err());
    }

    #[test]
    fn quantile_interpolates() {
        let stats = ColumnStats::from_values(&ints(&[Some(1), Some(2), Some(3), Some(4)]));
        assert_eq!(stats.quantile(0.25), Some(1.75));
    }
}
