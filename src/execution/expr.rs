// Vectorized expression evaluation for derived columns

use crate::error::{EtlError, EtlResult};
use crate::execution::batch::RecordBatch;
use crate::planner::logical_plan::{ArithmeticOp, LogicalExpr, LogicalValue};
use arrow::array::{
    Array, ArrayRef, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

/// Days from 0001-01-01 (CE day 1) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Evaluate `expr` against every row of `batch`, producing one array of `num_rows` values
pub fn evaluate(expr: &LogicalExpr, batch: &RecordBatch) -> EtlResult<ArrayRef> {
    match expr {
        LogicalExpr::Column(name) => batch.required_column(name).cloned(),
        LogicalExpr::Literal(value) => Ok(literal_array(value, batch.num_rows())),
        LogicalExpr::DateDiff { end, start } => {
            let end = cast_array(&evaluate(end, batch)?, &DataType::Date32)?;
            let start = cast_array(&evaluate(start, batch)?, &DataType::Date32)?;
            let end = as_date32(&end)?;
            let start = as_date32(&start)?;
            let days: Int32Array = end
                .iter()
                .zip(start.iter())
                .map(|(e, s)| match (e, s) {
                    (Some(e), Some(s)) => e.checked_sub(s),
                    _ => None,
                })
                .collect();
            Ok(Arc::new(days))
        }
        LogicalExpr::Arithmetic { left, op, right } => {
            let left = cast_array(&evaluate(left, batch)?, &DataType::Float64)?;
            let right = cast_array(&evaluate(right, batch)?, &DataType::Float64)?;
            let left = as_float64(&left)?;
            let right = as_float64(&right)?;
            let out: Float64Array = left
                .iter()
                .zip(right.iter())
                .map(|(l, r)| match (l, r) {
                    (Some(l), Some(r)) => apply(*op, l, r),
                    _ => None,
                })
                .collect();
            Ok(Arc::new(out))
        }
        LogicalExpr::Cast { expr, data_type } => cast_array(&evaluate(expr, batch)?, data_type),
    }
}

fn apply(op: ArithmeticOp, l: f64, r: f64) -> Option<f64> {
    match op {
        ArithmeticOp::Add => Some(l + r),
        ArithmeticOp::Sub => Some(l - r),
        ArithmeticOp::Mul => Some(l * r),
        ArithmeticOp::Div if r == 0.0 => None,
        ArithmeticOp::Div => Some(l / r),
    }
}

/// Convert `array` to `to`. Float to integer truncates toward zero;
/// values that cannot be represented or parsed become null.
pub fn cast_array(array: &ArrayRef, to: &DataType) -> EtlResult<ArrayRef> {
    if array.data_type() == to {
        return Ok(array.clone());
    }
    arrow::compute::cast(array.as_ref(), to).map_err(|e| EtlError::TypeCastFailure {
        from: array.data_type().clone(),
        to: to.clone(),
        reason: e.to_string(),
    })
}

/// Arrow Date32 representation (days since the Unix epoch)
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn literal_array(value: &LogicalValue, len: usize) -> ArrayRef {
    match value {
        LogicalValue::Int32(v) => Arc::new(Int32Array::from(vec![*v; len])),
        LogicalValue::Int64(v) => Arc::new(Int64Array::from(vec![*v; len])),
        LogicalValue::Float64(v) => Arc::new(Float64Array::from(vec![*v; len])),
        LogicalValue::String(v) => Arc::new(StringArray::from(vec![v.as_str(); len])),
        LogicalValue::Date(d) => Arc::new(Date32Array::from(vec![date_to_days(*d); len])),
    }
}

fn as_date32(array: &ArrayRef) -> EtlResult<&Date32Array> {
    array
        .as_any()
        .downcast_ref::<Date32Array>()
        .ok_or_else(|| EtlError::InvalidBatch("expected Date32 array".to_string()))
}

fn as_float64(array: &ArrayRef) -> EtlResult<&Float64Array> {
    array
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| EtlError::InvalidBatch("expected Float64 array".to_string()))
}
