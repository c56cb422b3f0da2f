//! In-memory table: arrow-backed column storage, the [`Dataset`] container
//! and the labelled one-dimensional [`Series`].
//!
//! Each column is a single arrow [`ArrayRef`]. Narrowing, masking, sorting
//! and gathering run as arrow compute kernels; cells convert to [`Value`]
//! on access, which is how the evaluator and the formatters read them.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float32Array, Float64Array, Int32Array,
    Int64Array, StringArray, TimestampMicrosecondArray, UInt32Array, new_null_array,
};
use arrow::compute::{self, SortColumn, SortOptions};
use arrow::datatypes::{
    DataType, Date32Type, Float32Type, Float64Type, Int32Type, Int64Type, TimeUnit,
    TimestampMicrosecondType, UInt32Type,
};
use arrow::temporal_conversions::{date32_to_datetime, timestamp_us_to_datetime};
use chrono::{NaiveDate, NaiveDateTime};

use crate::{
    data::{ComparableValue, Value},
    error::{Result, ScoutError},
    schema::ColumnType,
};

/// Dictionary type used for categorical text.
pub fn categorical_type() -> DataType {
    DataType::Dictionary(Box::new(DataType::UInt32), Box::new(DataType::Utf8))
}

/// Widest arrow storage for a logical column type.
pub fn arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Date => DataType::Date32,
        ColumnType::DateTime => DataType::Timestamp(TimeUnit::Microsecond, None),
        ColumnType::String => DataType::Utf8,
    }
}

/// One column's values.
#[derive(Debug, Clone)]
pub struct ColumnData(ArrayRef);

impl PartialEq for ColumnData {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_data() == other.0.to_data()
    }
}

impl ColumnData {
    pub fn from_array(array: ArrayRef) -> Self {
        Self(array)
    }

    pub fn int64(values: Vec<Option<i64>>) -> Self {
        Self(Arc::new(Int64Array::from(values)))
    }

    pub fn int32(values: Vec<Option<i32>>) -> Self {
        Self(Arc::new(Int32Array::from(values)))
    }

    pub fn float64(values: Vec<Option<f64>>) -> Self {
        Self(Arc::new(Float64Array::from(values)))
    }

    pub fn float32(values: Vec<Option<f32>>) -> Self {
        Self(Arc::new(Float32Array::from(values)))
    }

    pub fn boolean(values: Vec<Option<bool>>) -> Self {
        Self(Arc::new(BooleanArray::from(values)))
    }

    pub fn date(values: Vec<Option<NaiveDate>>) -> Self {
        Self(Arc::new(Date32Array::from(
            values
                .into_iter()
                .map(|d| d.map(Date32Type::from_naive_date))
                .collect::<Vec<_>>(),
        )))
    }

    pub fn datetime(values: Vec<Option<NaiveDateTime>>) -> Self {
        Self(Arc::new(TimestampMicrosecondArray::from(
            values
                .into_iter()
                .map(|dt| dt.map(|dt| dt.and_utc().timestamp_micros()))
                .collect::<Vec<_>>(),
        )))
    }

    pub fn text(values: Vec<Option<String>>) -> Self {
        Self(Arc::new(StringArray::from(values)))
    }

    /// Dictionary-encoded text; categories keep first-seen order.
    pub fn categorical(values: Vec<Option<String>>) -> Result<Self> {
        ColumnData::text(values).cast(&categorical_type())
    }

    pub fn array(&self) -> &ArrayRef {
        &self.0
    }

    pub fn data_type(&self) -> &DataType {
        self.0.data_type()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Logical type, independent of the storage width.
    pub fn column_type(&self) -> ColumnType {
        match self.data_type() {
            DataType::Int64 | DataType::Int32 => ColumnType::Integer,
            DataType::Float64 | DataType::Float32 => ColumnType::Float,
            DataType::Boolean => ColumnType::Boolean,
            DataType::Date32 => ColumnType::Date,
            DataType::Timestamp(_, _) => ColumnType::DateTime,
            _ => ColumnType::String,
        }
    }

    /// Storage dtype tag as reported in profiles.
    pub fn dtype(&self) -> &'static str {
        match self.data_type() {
            DataType::Int64 => "int64",
            DataType::Int32 => "int32",
            DataType::Float64 => "float64",
            DataType::Float32 => "float32",
            DataType::Boolean => "bool",
            DataType::Date32 => "date",
            DataType::Timestamp(_, _) => "datetime",
            DataType::Dictionary(_, _) => "category",
            _ => "string",
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.data_type(), DataType::Dictionary(_, _))
    }

    pub fn is_boolean(&self) -> bool {
        self.data_type() == &DataType::Boolean
    }

    pub fn get(&self, idx: usize) -> Option<Value> {
        if self.is_null(idx) {
            return None;
        }
        let array = &self.0;
        match array.data_type() {
            DataType::Int64 => Some(Value::Integer(array.as_primitive::<Int64Type>().value(idx))),
            DataType::Int32 => Some(Value::Integer(
                array.as_primitive::<Int32Type>().value(idx).into(),
            )),
            DataType::Float64 => Some(Value::Float(array.as_primitive::<Float64Type>().value(idx))),
            DataType::Float32 => Some(Value::Float(
                array.as_primitive::<Float32Type>().value(idx).into(),
            )),
            DataType::Boolean => Some(Value::Boolean(array.as_boolean().value(idx))),
            DataType::Date32 => {
                date32_to_datetime(array.as_primitive::<Date32Type>().value(idx))
                    .map(|dt| Value::Date(dt.date()))
            }
            DataType::Timestamp(TimeUnit::Microsecond, _) => timestamp_us_to_datetime(
                array.as_primitive::<TimestampMicrosecondType>().value(idx),
            )
            .map(Value::DateTime),
            DataType::Utf8 => Some(Value::String(array.as_string::<i32>().value(idx).to_string())),
            DataType::Dictionary(_, _) => {
                let dictionary = array.as_dictionary_opt::<UInt32Type>()?;
                let key = dictionary.keys().value(idx) as usize;
                let categories = dictionary.values().as_string_opt::<i32>()?;
                (key < categories.len()).then(|| Value::String(categories.value(key).to_string()))
            }
            _ => None,
        }
    }

    pub fn is_null(&self, idx: usize) -> bool {
        idx >= self.0.len() || self.0.is_null(idx)
    }

    pub fn null_count(&self) -> usize {
        self.0.null_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Value>> + '_ {
        (0..self.len()).map(move |idx| self.get(idx))
    }

    pub fn to_values(&self) -> Vec<Option<Value>> {
        self.iter().collect()
    }

    /// Gathers rows by position.
    pub fn take(&self, indices: &[usize]) -> Result<ColumnData> {
        let positions = UInt32Array::from(
            indices
                .iter()
                .map(|&idx| u32::try_from(idx))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| ScoutError::runtime("row position exceeds the 32-bit range"))?,
        );
        Ok(Self(compute::take(self.0.as_ref(), &positions, None)?))
    }

    pub fn filter(&self, mask: &BooleanArray) -> Result<ColumnData> {
        Ok(Self(compute::filter(self.0.as_ref(), mask)?))
    }

    pub fn cast(&self, to: &DataType) -> Result<ColumnData> {
        Ok(Self(compute::cast(&self.0, to)?))
    }

    /// Buffer bytes covered by the column.
    pub fn memory_bytes(&self) -> usize {
        self.0
            .to_data()
            .get_slice_memory_size()
            .unwrap_or_else(|_| self.0.get_array_memory_size())
    }

    /// Builds storage for `ty`, coercing each value; values that cannot be represented fail.
    pub fn from_values(ty: ColumnType, values: Vec<Option<Value>>) -> Result<ColumnData> {
        fn mismatch(ty: ColumnType, value: &Value) -> ScoutError {
            ScoutError::runtime(format!(
                "value '{value}' ({}) cannot be stored in a {ty} column",
                value.type_tag()
            ))
        }
        Ok(match ty {
            ColumnType::Integer => ColumnData::int64(
                values
                    .into_iter()
                    .map(|v| match v {
                        None => Ok(None),
                        Some(Value::Integer(i)) => Ok(Some(i)),
                        Some(Value::Boolean(b)) => Ok(Some(b as i64)),
                        Some(Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                            Ok(Some(f as i64))
                        }
                        Some(other) => Err(mismatch(ty, &other)),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            ColumnType::Float => ColumnData::float64(
                values
                    .into_iter()
                    .map(|v| match v {
                        None => Ok(None),
                        Some(other) => other
                            .as_f64()
                            .map(Some)
                            .ok_or_else(|| mismatch(ty, &other)),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            ColumnType::Boolean => ColumnData::boolean(
                values
                    .into_iter()
                    .map(|v| match v {
                        None => Ok(None),
                        Some(Value::Boolean(b)) => Ok(Some(b)),
                        Some(other) => Err(mismatch(ty, &other)),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            ColumnType::Date => ColumnData::date(
                values
                    .into_iter()
                    .map(|v| match v {
                        None => Ok(None),
                        Some(Value::Date(d)) => Ok(Some(d)),
                        Some(Value::DateTime(dt)) => Ok(Some(dt.date())),
                        Some(other) => Err(mismatch(ty, &other)),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            ColumnType::DateTime => ColumnData::datetime(
                values
                    .into_iter()
                    .map(|v| match v {
                        None => Ok(None),
                        Some(Value::DateTime(dt)) => Ok(Some(dt)),
                        Some(Value::Date(d)) => Ok(Some(d.and_time(chrono::NaiveTime::MIN))),
                        Some(other) => Err(mismatch(ty, &other)),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            ColumnType::String => ColumnData::text(
                values
                    .into_iter()
                    .map(|v| v.map(|value| value.as_display()))
                    .collect(),
            ),
        })
    }

    /// Storage whose type is derived from the values themselves.
    pub fn from_values_inferred(values: Vec<Option<Value>>) -> ColumnData {
        let ty = infer_value_type(&values);
        match ColumnData::from_values(ty, values.clone()) {
            Ok(data) => data,
            Err(_) => ColumnData::text(
                values
                    .into_iter()
                    .map(|v| v.map(|value| value.as_display()))
                    .collect(),
            ),
        }
    }

    pub fn nulls(ty: ColumnType, len: usize) -> ColumnData {
        Self(new_null_array(&arrow_type(ty), len))
    }
}

/// Common type of a value list: integers mixed with floats widen to float,
/// any other mixture falls back to text.
pub fn infer_value_type(values: &[Option<Value>]) -> ColumnType {
    let mut ty: Option<ColumnType> = None;
    for value in values.iter().flatten() {
        let current = match value {
            Value::String(_) => ColumnType::String,
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Date(_) => ColumnType::Date,
            Value::DateTime(_) => ColumnType::DateTime,
        };
        ty = Some(match (ty, current) {
            (None, c) => c,
            (Some(a), b) if a == b => a,
            (Some(ColumnType::Integer), ColumnType::Float)
            | (Some(ColumnType::Float), ColumnType::Integer) => ColumnType::Float,
            (Some(ColumnType::Date), ColumnType::DateTime)
            | (Some(ColumnType::DateTime), ColumnType::Date) => ColumnType::DateTime,
            _ => return ColumnType::String,
        });
    }
    ty.unwrap_or(ColumnType::Float)
}

/// Stable multi-key ordering; nulls go last regardless of direction.
pub fn sort_order(keys: &[(&ColumnData, bool)]) -> Result<Vec<usize>> {
    let rows = keys.first().map_or(0, |(data, _)| data.len());
    let position: ArrayRef = Arc::new(UInt32Array::from_iter_values(0..rows as u32));
    let mut columns = keys
        .iter()
        .map(|(data, ascending)| SortColumn {
            values: Arc::clone(data.array()),
            options: Some(SortOptions {
                descending: !ascending,
                nulls_first: false,
            }),
        })
        .collect::<Vec<_>>();
    columns.push(SortColumn {
        values: position,
        options: None,
    });
    let order = compute::lexsort_to_indices(&columns, None)?;
    Ok(order.values().iter().map(|&idx| idx as usize).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Ordered, equal-length named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map_or(0, Column::len);
        if let Some(bad) = columns.iter().find(|c| c.len() != row_count) {
            return Err(ScoutError::runtime(format!(
                "column '{}' has {} values but the table has {} rows",
                bad.name,
                bad.len(),
                row_count
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.name.as_str())) {
            return Err(ScoutError::runtime(format!(
                "duplicate column name '{}'",
                dup.name
            )));
        }
        Ok(Self { columns, row_count })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| self.missing_column(name))
    }

    pub fn missing_column(&self, name: &str) -> ScoutError {
        ScoutError::runtime(format!(
            "column '{name}' not found; available columns: {}",
            self.columns
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    pub fn memory_bytes(&self) -> usize {
        self.columns.iter().map(|c| c.data.memory_bytes()).sum()
    }

    pub fn select(&self, names: &[String]) -> Result<Dataset> {
        let columns = names
            .iter()
            .map(|name| self.column(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Dataset::new(columns)
    }

    pub fn take_rows(&self, indices: &[usize]) -> Result<Dataset> {
        let columns = self
            .columns
            .iter()
            .map(|c| Ok(Column::new(c.name.clone(), c.data.take(indices)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset {
            columns,
            row_count: indices.len(),
        })
    }

    pub fn head(&self, n: usize) -> Result<Dataset> {
        let end = n.min(self.row_count);
        self.take_rows(&(0..end).collect::<Vec<_>>())
    }

    pub fn tail(&self, n: usize) -> Result<Dataset> {
        let start = self.row_count.saturating_sub(n);
        self.take_rows(&(start..self.row_count).collect::<Vec<_>>())
    }

    pub fn filter(&self, mask: &[bool]) -> Result<Dataset> {
        if mask.len() != self.row_count {
            return Err(ScoutError::runtime(format!(
                "boolean mask has {} values but the table has {} rows",
                mask.len(),
                self.row_count
            )));
        }
        let predicate = BooleanArray::from(mask.to_vec());
        let columns = self
            .columns
            .iter()
            .map(|c| Ok(Column::new(c.name.clone(), c.data.filter(&predicate)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset {
            columns,
            row_count: predicate.true_count(),
        })
    }

    /// Replaces a same-named column or appends a new one.
    pub fn set_column(&mut self, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.row_count {
            return Err(ScoutError::runtime(format!(
                "cannot assign {} values to column '{}' of a table with {} rows",
                column.len(),
                column.name,
                self.row_count
            )));
        }
        if self.columns.is_empty() {
            self.row_count = column.len();
        }
        match self.column_index(&column.name) {
            Some(idx) => self.columns[idx] = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn drop_columns(&self, names: &[String]) -> Result<Dataset> {
        for name in names {
            self.column(name)?;
        }
        let columns = self
            .columns
            .iter()
            .filter(|c| !names.contains(&c.name))
            .cloned()
            .collect();
        Dataset::new(columns).map(|mut ds| {
            ds.row_count = self.row_count;
            ds
        })
    }

    pub fn rename(&self, mapping: &[(String, String)]) -> Result<Dataset> {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let name = mapping
                    .iter()
                    .find(|(from, _)| from == &c.name)
                    .map(|(_, to)| to.clone())
                    .unwrap_or_else(|| c.name.clone());
                Column::new(name, c.data.clone())
            })
            .collect();
        Dataset::new(columns)
    }

    pub fn sort_indices(&self, keys: &[String], ascending: &[bool]) -> Result<Vec<usize>> {
        if keys.is_empty() {
            return Ok((0..self.row_count).collect());
        }
        let key_columns = keys
            .iter()
            .enumerate()
            .map(|(pos, k)| {
                let asc = ascending.get(pos).copied().unwrap_or(true);
                self.column(k).map(|c| (&c.data, asc))
            })
            .collect::<Result<Vec<_>>>()?;
        sort_order(&key_columns)
    }

    /// Row positions per distinct key tuple, keys in ascending order; rows with a null key are skipped.
    pub fn group_indices(&self, keys: &[String]) -> Result<BTreeMap<Vec<ComparableValue>, Vec<usize>>> {
        let key_columns = keys
            .iter()
            .map(|k| self.column(k))
            .collect::<Result<Vec<_>>>()?;
        let mut groups: BTreeMap<Vec<ComparableValue>, Vec<usize>> = BTreeMap::new();
        'rows: for row in 0..self.row_count {
            let mut key = Vec::with_capacity(key_columns.len());
            for column in &key_columns {
                match column.data.get(row) {
                    Some(value) => key.push(ComparableValue(Some(value))),
                    None => continue 'rows,
                }
            }
            groups.entry(key).or_default().push(row);
        }
        Ok(groups)
    }

    /// Values of one row keyed by column name, in column order.
    pub fn row(&self, idx: usize) -> Vec<(String, Option<Value>)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.data.get(idx)))
            .collect()
    }
}

/// Labels of a [`Series`]: row positions or explicit values.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesIndex {
    Range { start: usize, len: usize },
    Labels {
        name: Option<String>,
        labels: Vec<Option<Value>>,
    },
}

impl SeriesIndex {
    pub fn range(len: usize) -> Self {
        SeriesIndex::Range { start: 0, len }
    }

    pub fn len(&self) -> usize {
        match self {
            SeriesIndex::Range { len, .. } => *len,
            SeriesIndex::Labels { labels, .. } => labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            SeriesIndex::Range { .. } => None,
            SeriesIndex::Labels { name, .. } => name.as_deref(),
        }
    }

    pub fn label(&self, idx: usize) -> Option<Value> {
        match self {
            SeriesIndex::Range { start, .. } => Some(Value::Integer((start + idx) as i64)),
            SeriesIndex::Labels { labels, .. } => labels.get(idx).cloned().flatten(),
        }
    }

    pub fn labels(&self) -> Vec<Option<Value>> {
        (0..self.len()).map(|idx| self.label(idx)).collect()
    }

    pub fn take(&self, indices: &[usize]) -> SeriesIndex {
        if let SeriesIndex::Range { start, .. } = self {
            let contiguous = indices.windows(2).all(|w| w[1] == w[0] + 1);
            if contiguous {
                let first = indices.first().copied().unwrap_or(0);
                return SeriesIndex::Range {
                    start: start + first,
                    len: indices.len(),
                };
            }
        }
        SeriesIndex::Labels {
            name: self.name().map(str::to_string),
            labels: indices.iter().map(|&idx| self.label(idx)).collect(),
        }
    }
}

/// One-dimensional labelled sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: Option<String>,
    pub index: SeriesIndex,
    pub data: ColumnData,
}

impl Series {
    pub fn from_column(column: &Column) -> Self {
        Self {
            name: Some(column.name.clone()),
            index: SeriesIndex::range(column.len()),
            data: column.data.clone(),
        }
    }

    pub fn new(name: Option<String>, index: SeriesIndex, data: ColumnData) -> Result<Self> {
        if index.len() != data.len() {
            return Err(ScoutError::runtime(format!(
                "series index has {} labels but {} values",
                index.len(),
                data.len()
            )));
        }
        Ok(Self { name, index, data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn with_data(&self, data: ColumnData) -> Result<Series> {
        Series::new(self.name.clone(), self.index.clone(), data)
    }

    pub fn with_index(&self, index: SeriesIndex) -> Series {
        Series {
            name: self.name.clone(),
            index,
            data: self.data.clone(),
        }
    }

    pub fn take(&self, indices: &[usize]) -> Result<Series> {
        Ok(Series {
            name: self.name.clone(),
            index: self.index.take(indices),
            data: self.data.take(indices)?,
        })
    }

    pub fn values(&self) -> Vec<Option<Value>> {
        self.data.to_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::new(vec![
            Column::new(
                "region",
                ColumnData::text(vec![
                    Some("East".into()),
                    Some("West".into()),
                    Some("East".into()),
                    None,
                ]),
            ),
            Column::new(
                "sales",
                ColumnData::int64(vec![Some(10), Some(5), Some(7), Some(1)]),
            ),
        ])
        .expect("dataset")
    }

    #[test]
    fn unequal_columns_are_rejected() {
        let err = Dataset::new(vec![
            Column::new("a", ColumnData::int64(vec![Some(1)])),
            Column::new("b", ColumnData::int64(vec![Some(1), Some(2)])),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn group_indices_skip_null_keys_and_sort() {
        let groups = sample()
            .group_indices(&["region".to_string()])
            .expect("groups");
        let keys = groups
            .keys()
            .map(|k| k[0].0.clone().unwrap().as_display())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["East", "West"]);
        assert_eq!(groups.values().map(Vec::len).sum::<usize>(), 3);
    }

    #[test]
    fn sort_puts_nulls_last_both_directions_and_keeps_ties_stable() {
        let ds = sample();
        let asc = ds
            .sort_indices(&["region".to_string()], &[true])
            .expect("sort");
        assert_eq!(asc, vec![0, 2, 1, 3]);
        let desc = ds
            .sort_indices(&["region".to_string()], &[false])
            .expect("sort");
        assert_eq!(desc, vec![1, 0, 2, 3]);
    }

    #[test]
    fn filter_checks_mask_length() {
        let ds = sample();
        assert!(ds.filter(&[true]).is_err());
        let filtered = ds.filter(&[true, false, true, false]).expect("filter");
        assert_eq!(filtered.row_count(), 2);
        assert_eq!(
            filtered.column("sales").expect("sales").data,
            ColumnData::int64(vec![Some(10), Some(7)])
        );
    }

    #[test]
    fn categorical_cells_read_back_as_text() {
        let data = ColumnData::categorical(vec![Some("b".into()), None, Some("a".into()), Some("b".into())])
            .expect("categorical");
        assert_eq!(data.dtype(), "category");
        assert_eq!(data.get(0), Some(Value::String("b".into())));
        assert_eq!(data.get(1), None);
        assert_eq!(data.null_count(), 1);
        let gathered = data.take(&[3, 2]).expect("take");
        assert_eq!(gathered.to_values(), vec![Some(Value::String("b".into())), Some(Value::String("a".into()))]);
    }

    #[test]
    fn temporal_cells_round_trip() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).expect("date");
        let moment = day.and_hms_opt(13, 45, 7).expect("time");
        assert_eq!(ColumnData::date(vec![Some(day)]).get(0), Some(Value::Date(day)));
        assert_eq!(ColumnData::datetime(vec![Some(moment), None]).get(0), Some(Value::DateTime(moment)));
    }

    #[test]
    fn series_index_take_keeps_ranges_when_contiguous() {
        let index = SeriesIndex::range(10);
        assert_eq!(index.take(&[3, 4, 5]), SeriesIndex::Range { start: 3, len: 3 });
        let scattered = index.take(&[1, 7]);
        assert_eq!(scattered.label(1), Some(Value::Integer(7)));
    }

    #[test]
    fn inferred_storage_widens_mixed_numbers() {
        let data =
            ColumnData::from_values_inferred(vec![Some(Value::Integer(1)), Some(Value::Float(1.5))]);
        assert_eq!(data.dtype(), "float64");
        let text = ColumnData::from_values_inferred(vec![
            Some(Value::Integer(1)),
            Some(Value::String("x".into())),
        ]);
        assert_eq!(text.dtype(), "string");
    }
}
