//! Column storage narrowing.
//!
//! Integers narrow to 32 bits when every value fits, floats narrow to 32 bits
//! only when every value survives the `f64 -> f32 -> f64` round trip
//! unchanged, and text recodes to a categorical dictionary when values
//! repeat enough. Each is an arrow cast, reversed by [`widen`].

use std::collections::HashSet;

use arrow::array::AsArray;
use arrow::compute;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use log::debug;
use serde::Serialize;

use crate::{
    error::Result,
    frame::{ColumnData, Dataset, categorical_type},
};

pub const CATEGORICAL_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Optimization {
    pub column: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationReport {
    pub changes: Vec<Optimization>,
    pub memory_before: usize,
    pub memory_after: usize,
}

impl OptimizationReport {
    pub fn saved_bytes(&self) -> usize {
        self.memory_before.saturating_sub(self.memory_after)
    }
}

#[derive(Debug, Clone)]
pub struct DtypeOptimizer {
    categorical_ratio: f64,
}

impl Default for DtypeOptimizer {
    fn default() -> Self {
        Self {
            categorical_ratio: CATEGORICAL_RATIO,
        }
    }
}

impl DtypeOptimizer {
    pub fn optimize(&self, dataset: &mut Dataset) -> Result<OptimizationReport> {
        let memory_before = dataset.memory_bytes();
        let mut changes = Vec::new();
        for column in dataset.columns_mut() {
            if let Some(narrowed) = self.narrow(&column.data)? {
                debug!(
                    "Column '{}' narrowed from {} to {}",
                    column.name,
                    column.data.dtype(),
                    narrowed.dtype()
                );
                changes.push(Optimization {
                    column: column.name.clone(),
                    from: column.data.dtype().to_string(),
                    to: narrowed.dtype().to_string(),
                });
                column.data = narrowed;
            }
        }
        let memory_after = dataset.memory_bytes();
        Ok(OptimizationReport {
            changes,
            memory_before,
            memory_after,
        })
    }

    /// Narrower storage for `data`, or `None` when no lossless option applies.
    pub fn narrow(&self, data: &ColumnData) -> Result<Option<ColumnData>> {
        let target = match data.data_type() {
            DataType::Int64 if fits_i32(data) => DataType::Int32,
            DataType::Float64 if fits_f32(data) => DataType::Float32,
            DataType::Utf8 if self.repeats_enough(data) => categorical_type(),
            _ => return Ok(None),
        };
        data.cast(&target).map(Some)
    }

    fn repeats_enough(&self, data: &ColumnData) -> bool {
        let strings = data.array().as_string::<i32>();
        let distinct = strings.iter().flatten().collect::<HashSet<_>>();
        !distinct.is_empty() && (distinct.len() as f64 / data.len() as f64) < self.categorical_ratio
    }
}

fn fits_i32(data: &ColumnData) -> bool {
    let values = data.array().as_primitive::<Int64Type>();
    let in_range = |v: Option<i64>| v.is_none_or(|v| i32::try_from(v).is_ok());
    in_range(compute::min(values)) && in_range(compute::max(values))
}

/// Every value is exactly representable in single precision.
fn fits_f32(data: &ColumnData) -> bool {
    data.array()
        .as_primitive::<Float64Type>()
        .iter()
        .flatten()
        .all(|v| v.is_nan() || f64::from(v as f32) == v)
}

/// Restores the widest representation of a column's logical type.
pub fn widen(data: &ColumnData) -> Result<ColumnData> {
    match data.data_type() {
        DataType::Int32 => data.cast(&DataType::Int64),
        DataType::Float32 => data.cast(&DataType::Float64),
        DataType::Dictionary(_, _) => data.cast(&DataType::Utf8),
        _ => Ok(data.clone()),
    }
}
