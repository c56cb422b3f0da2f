//! Operators over cells, broadcast across series.
//!
//! Numeric, text and boolean series run through arrow's compute kernels; any
//! other operand mix, or a kernel that overflows, falls back to the cell by
//! cell rules below.

use std::{cmp::Ordering, sync::Arc};

use anyhow::{Result, bail};
use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Datum, Float64Array, Int64Array, Scalar, StringArray};
use arrow::compute::{
    self,
    kernels::{cmp, numeric},
};
use arrow::datatypes::DataType;
use arrow::error::ArrowError;

use super::{
    ast::{BinaryOp, CompareOp, UnaryOp},
    value::ScriptValue,
};
use crate::{
    data::{Value, parse_naive_date, parse_naive_datetime},
    frame::{ColumnData, Series},
    optimize::widen,
};

fn as_number(value: &Value) -> Option<Value> {
    match value {
        Value::Integer(_) | Value::Float(_) => Some(value.clone()),
        Value::Boolean(b) => Some(Value::Integer(*b as i64)),
        _ => None,
    }
}

fn type_error(op: &str, left: &Value, right: &Value) -> anyhow::Error {
    anyhow::anyhow!(
        "unsupported operand types for {op}: '{}' and '{}'",
        left.type_tag(),
        right.type_tag()
    )
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let quotient = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(quotient - 1)
    } else {
        Some(quotient)
    }
}

/// Arithmetic and bitwise operators on two cells; a null on either side gives null.
pub fn arithmetic(op: BinaryOp, left: &Option<Value>, right: &Option<Value>) -> Result<Option<Value>> {
    let (Some(left), Some(right)) = (left, right) else {
        return Ok(None);
    };
    if let (BinaryOp::And | BinaryOp::Or, Value::Boolean(a), Value::Boolean(b)) = (op, left, right) {
        let combined = if op == BinaryOp::And { *a && *b } else { *a || *b };
        return Ok(Some(Value::Boolean(combined)));
    }
    if let (BinaryOp::Add, Value::String(a), Value::String(b)) = (op, left, right) {
        return Ok(Some(Value::String(format!("{a}{b}"))));
    }
    let (Some(l), Some(r)) = (as_number(left), as_number(right)) else {
        return Err(type_error(op.symbol(), left, right));
    };
    if let (Value::Integer(a), Value::Integer(b)) = (&l, &r) {
        let (a, b) = (*a, *b);
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::FloorDiv if b == 0 => return Ok(None),
            BinaryOp::FloorDiv => floor_div(a, b),
            BinaryOp::Mod if b == 0 => return Ok(None),
            BinaryOp::Mod => a
                .checked_rem(b)
                .map(|r| if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }),
            BinaryOp::And => Some(a & b),
            BinaryOp::Or => Some(a | b),
            BinaryOp::Div => None,
        };
        if let Some(result) = exact {
            return Ok(Some(Value::Integer(result)));
        }
    }
    let (a, b) = (l.as_f64().unwrap_or(f64::NAN), r.as_f64().unwrap_or(f64::NAN));
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => return Ok(None),
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => a - b * (a / b).floor(),
        BinaryOp::And | BinaryOp::Or => return Err(type_error(op.symbol(), left, right)),
    };
    Ok(Some(Value::Float(result)))
}

/// Brings a string up to a date when compared against a temporal value.
fn coerce_pair(left: &Value, right: &Value) -> Option<(Value, Value)> {
    match (left, right) {
        (Value::Date(_) | Value::DateTime(_), Value::String(s)) => {
            temporal_from_str(s).map(|parsed| (left.clone(), parsed))
        }
        (Value::String(s), Value::Date(_) | Value::DateTime(_)) => {
            temporal_from_str(s).map(|parsed| (parsed, right.clone()))
        }
        _ => {
            let comparable = matches!(
                (left, right),
                (Value::String(_), Value::String(_))
                    | (Value::Date(_) | Value::DateTime(_), Value::Date(_) | Value::DateTime(_))
            ) || (as_number(left).is_some() && as_number(right).is_some());
            comparable.then(|| {
                (
                    as_number(left).unwrap_or_else(|| left.clone()),
                    as_number(right).unwrap_or_else(|| right.clone()),
                )
            })
        }
    }
}

fn temporal_from_str(value: &str) -> Option<Value> {
    parse_naive_datetime(value)
        .map(Value::DateTime)
        .or_else(|_| parse_naive_date(value).map(Value::Date))
        .ok()
}

/// Comparison of two cells. Nulls are equal only to nulls and never ordered.
pub fn compare(op: CompareOp, left: &Option<Value>, right: &Option<Value>) -> Result<bool> {
    let (left, right) = match (left, right) {
        (None, None) => return Ok(op == CompareOp::Eq),
        (None, _) | (_, None) => return Ok(op == CompareOp::Ne),
        (Some(l), Some(r)) => (l, r),
    };
    let Some((l, r)) = coerce_pair(left, right) else {
        return match op {
            CompareOp::Eq => Ok(false),
            CompareOp::Ne => Ok(true),
            _ => bail!(
                "'{}' not supported between '{}' and '{}'",
                op.symbol(),
                left.type_tag(),
                right.type_tag()
            ),
        };
    };
    let ordering = l.cmp(&r);
    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}

pub fn unary_value(op: UnaryOp, value: &Option<Value>) -> Result<Option<Value>> {
    let Some(value) = value else {
        return Ok(None);
    };
    Ok(Some(match (op, value) {
        (UnaryOp::Pos, v) if as_number(v).is_some() => v.clone(),
        (UnaryOp::Neg, Value::Integer(i)) => {
            Value::Integer(i.checked_neg().ok_or_else(|| anyhow::anyhow!("integer overflow"))?)
        }
        (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
        (UnaryOp::Neg, Value::Boolean(b)) => Value::Integer(-(*b as i64)),
        (UnaryOp::Invert, Value::Boolean(b)) => Value::Boolean(!b),
        (UnaryOp::Invert, Value::Integer(i)) => Value::Integer(!i),
        (UnaryOp::Not, _) => bail!("'not' is handled by truthiness"),
        (op, v) => bail!("bad operand type for unary {op:?}: '{}'", v.type_tag()),
    }))
}

enum Side<'a> {
    Column(&'a Series),
    Constant(&'a Option<Value>),
}

impl Side<'_> {
    fn at(&self, idx: usize) -> Option<Value> {
        match self {
            Side::Column(series) => series.data.get(idx),
            Side::Constant(value) => (*value).clone(),
        }
    }

    fn is_null(&self, idx: usize) -> bool {
        match self {
            Side::Column(series) => series.data.is_null(idx),
            Side::Constant(value) => value.is_none(),
        }
    }

    fn kind(&self) -> Option<Kind> {
        match self {
            Side::Column(series) => match series.data.data_type() {
                DataType::Int32 | DataType::Int64 => Some(Kind::Int),
                DataType::Float32 | DataType::Float64 => Some(Kind::Float),
                DataType::Utf8 | DataType::Dictionary(_, _) => Some(Kind::Text),
                _ => None,
            },
            Side::Constant(Some(Value::Integer(_))) => Some(Kind::Int),
            Side::Constant(Some(Value::Float(_))) => Some(Kind::Float),
            Side::Constant(Some(Value::String(_))) => Some(Kind::Text),
            Side::Constant(_) => None,
        }
    }

    /// The operand as a kernel input of type `target`.
    fn datum(&self, target: &DataType) -> Result<Box<dyn Datum>> {
        Ok(match self {
            Side::Column(series) => Box::new(compute::cast(series.data.array(), target)?),
            Side::Constant(value) => {
                let array: ArrayRef = match (target, value) {
                    (DataType::Int64, Some(Value::Integer(i))) => Arc::new(Int64Array::from(vec![*i])),
                    (DataType::Float64, Some(Value::Integer(i))) => Arc::new(Float64Array::from(vec![*i as f64])),
                    (DataType::Float64, Some(Value::Float(f))) => Arc::new(Float64Array::from(vec![*f])),
                    (DataType::Utf8, Some(Value::String(s))) => Arc::new(StringArray::from(vec![s.as_str()])),
                    (target, value) => bail!("no {target} kernel operand for {value:?}"),
                };
                Box::new(Scalar::new(array))
            }
        })
    }

    fn booleans(&self, len: usize) -> Option<BooleanArray> {
        match self {
            Side::Column(series) => series.data.array().as_boolean_opt().cloned(),
            Side::Constant(Some(Value::Boolean(b))) => Some(BooleanArray::from(vec![*b; len])),
            Side::Constant(_) => None,
        }
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Int,
    Float,
    Text,
}

/// Common arrow type for a pair of operands, when a kernel can take them.
fn kernel_type(left: &Side, right: &Side) -> Option<DataType> {
    match (left.kind()?, right.kind()?) {
        (Kind::Int, Kind::Int) => Some(DataType::Int64),
        (Kind::Int | Kind::Float, Kind::Int | Kind::Float) => Some(DataType::Float64),
        (Kind::Text, Kind::Text) => Some(DataType::Utf8),
        _ => None,
    }
}

type NumericKernel = fn(&dyn Datum, &dyn Datum) -> std::result::Result<ArrayRef, ArrowError>;

fn binary_kernel(op: BinaryOp, left: &Side, right: &Side, len: usize) -> Result<Option<ColumnData>> {
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let (Some(a), Some(b)) = (left.booleans(len), right.booleans(len)) else {
            return Ok(None);
        };
        let combined = if op == BinaryOp::And {
            compute::and(&a, &b)?
        } else {
            compute::or(&a, &b)?
        };
        return Ok(Some(ColumnData::boolean(
            combined.iter().map(|v| Some(v.unwrap_or(false))).collect(),
        )));
    }
    let kernel: NumericKernel = match op {
        BinaryOp::Add => numeric::add,
        BinaryOp::Sub => numeric::sub,
        BinaryOp::Mul => numeric::mul,
        _ => return Ok(None),
    };
    let Some(target) = kernel_type(left, right).filter(|t| *t != DataType::Utf8) else {
        return Ok(None);
    };
    let (lhs, rhs) = (left.datum(&target)?, right.datum(&target)?);
    // Integer overflow is an error here; the cell path promotes to float instead.
    Ok(kernel(lhs.as_ref(), rhs.as_ref()).ok().map(ColumnData::from_array))
}

fn comparison_kernel(op: CompareOp, left: &Side, right: &Side) -> Result<Option<ColumnData>> {
    let Some(target) = kernel_type(left, right) else {
        return Ok(None);
    };
    let (lhs, rhs) = (left.datum(&target)?, right.datum(&target)?);
    let (lhs, rhs) = (lhs.as_ref(), rhs.as_ref());
    let mask = match op {
        CompareOp::Eq => cmp::eq(lhs, rhs)?,
        CompareOp::Ne => cmp::neq(lhs, rhs)?,
        CompareOp::Lt => cmp::lt(lhs, rhs)?,
        CompareOp::Le => cmp::lt_eq(lhs, rhs)?,
        CompareOp::Gt => cmp::gt(lhs, rhs)?,
        CompareOp::Ge => cmp::gt_eq(lhs, rhs)?,
    };
    let settled = (0..mask.len())
        .map(|idx| {
            Some(if mask.is_valid(idx) {
                mask.value(idx)
            } else if left.is_null(idx) && right.is_null(idx) {
                op == CompareOp::Eq
            } else {
                op == CompareOp::Ne
            })
        })
        .collect();
    Ok(Some(ColumnData::boolean(settled)))
}

fn unary_kernel(op: UnaryOp, data: &ColumnData) -> Option<ColumnData> {
    match (op, data.data_type()) {
        (UnaryOp::Invert, DataType::Boolean) => compute::not(data.array().as_boolean())
            .ok()
            .map(|negated| ColumnData::from_array(Arc::new(negated))),
        (UnaryOp::Neg, DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64) => {
            let wide = widen(data).ok()?;
            numeric::neg(wide.array()).ok().map(ColumnData::from_array)
        }
        _ => None,
    }
}

fn side<'a>(value: &'a ScriptValue, op: &str) -> Result<Side<'a>> {
    match value {
        ScriptValue::Series(series) => Ok(Side::Column(series)),
        ScriptValue::Scalar(scalar) => Ok(Side::Constant(scalar)),
        other => bail!("operator {op} is not supported for a {}", other.kind()),
    }
}

/// Shape of the result of combining two operands.
fn template<'a>(left: &Side<'a>, right: &Side<'a>, op: &str) -> Result<Option<(&'a Series, Option<String>)>> {
    Ok(match (left, right) {
        (Side::Column(a), Side::Column(b)) => {
            if a.len() != b.len() {
                bail!(
                    "cannot combine series of length {} and {} with {op}",
                    a.len(),
                    b.len()
                );
            }
            let name = if a.name == b.name { a.name.clone() } else { None };
            Some((*a, name))
        }
        (Side::Column(a), Side::Constant(_)) | (Side::Constant(_), Side::Column(a)) => {
            Some((*a, a.name.clone()))
        }
        (Side::Constant(_), Side::Constant(_)) => None,
    })
}

pub fn binary(op: BinaryOp, left: &ScriptValue, right: &ScriptValue) -> Result<ScriptValue> {
    let (l, r) = (side(left, op.symbol())?, side(right, op.symbol())?);
    let Some((shape, name)) = template(&l, &r, op.symbol())? else {
        return Ok(ScriptValue::Scalar(arithmetic(op, &l.at(0), &r.at(0))?));
    };
    if let Some(data) = binary_kernel(op, &l, &r, shape.len())? {
        return Ok(ScriptValue::Series(Series::new(name, shape.index.clone(), data)?));
    }
    let values = (0..shape.len())
        .map(|idx| arithmetic(op, &l.at(idx), &r.at(idx)))
        .collect::<Result<Vec<_>>>()?;
    let data = if matches!(op, BinaryOp::And | BinaryOp::Or)
        && values.iter().flatten().all(|v| matches!(v, Value::Boolean(_)))
    {
        ColumnData::boolean(
            values
                .into_iter()
                .map(|v| Some(matches!(v, Some(Value::Boolean(true)))))
                .collect(),
        )
    } else {
        ColumnData::from_values_inferred(values)
    };
    Ok(ScriptValue::Series(Series::new(name, shape.index.clone(), data)?))
}

pub fn comparison(op: CompareOp, left: &ScriptValue, right: &ScriptValue) -> Result<ScriptValue> {
    let (l, r) = (side(left, op.symbol())?, side(right, op.symbol())?);
    let Some((shape, name)) = template(&l, &r, op.symbol())? else {
        return Ok(ScriptValue::bool(compare(op, &l.at(0), &r.at(0))?));
    };
    if let Some(data) = comparison_kernel(op, &l, &r)? {
        return Ok(ScriptValue::Series(Series::new(name, shape.index.clone(), data)?));
    }
    let values = (0..shape.len())
        .map(|idx| compare(op, &l.at(idx), &r.at(idx)).map(Some))
        .collect::<Result<Vec<_>>>()?;
    Ok(ScriptValue::Series(Series::new(
        name,
        shape.index.clone(),
        ColumnData::boolean(values),
    )?))
}

pub fn unary(op: UnaryOp, operand: &ScriptValue) -> Result<ScriptValue> {
    if op == UnaryOp::Not {
        return Ok(ScriptValue::bool(!operand.truthy()?));
    }
    match operand {
        ScriptValue::Scalar(value) => Ok(ScriptValue::Scalar(unary_value(op, value)?)),
        ScriptValue::Series(series) => {
            if let Some(data) = unary_kernel(op, &series.data) {
                return Ok(ScriptValue::Series(series.with_data(data)?));
            }
            let values = series
                .data
                .iter()
                .map(|v| unary_value(op, &v))
                .collect::<Result<Vec<_>>>()?;
            Ok(ScriptValue::Series(
                series.with_data(ColumnData::from_values_inferred(values))?,
            ))
        }
        other => bail!("unary operator not supported for a {}", other.kind()),
    }
}
