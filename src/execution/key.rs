// Hashable scalar values for join and group keys

use crate::error::{EtlError, EtlResult};
use arrow::array::*;
use arrow::datatypes::DataType;
use std::sync::Arc;

/// A single cell value usable as a hash key.
/// Floats are keyed by their bit pattern so the type can be `Eq + Hash`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKey {
    Int(i64),
    Float(u64),
    Str(String),
    Bool(bool),
    Null,
}

impl ScalarKey {
    /// Read the value at `row` of `col`
    pub fn from_array(col: &ArrayRef, row: usize, context: &'static str) -> EtlResult<Self> {
        if col.is_null(row) {
            return Ok(ScalarKey::Null);
        }
        let unsupported = || EtlError::UnsupportedType {
            context,
            data_type: col.data_type().clone(),
        };
        let key = match col.data_type() {
            DataType::Int32 => {
                let a = col.as_any().downcast_ref::<Int32Array>().ok_or_else(unsupported)?;
                ScalarKey::Int(a.value(row) as i64)
            }
            DataType::Int64 => {
                let a = col.as_any().downcast_ref::<Int64Array>().ok_or_else(unsupported)?;
                ScalarKey::Int(a.value(row))
            }
            DataType::Date32 => {
                let a = col.as_any().downcast_ref::<Date32Array>().ok_or_else(unsupported)?;
                ScalarKey::Int(a.value(row) as i64)
            }
            DataType::Float64 => {
                let a = col.as_any().downcast_ref::<Float64Array>().ok_or_else(unsupported)?;
                ScalarKey::Float(a.value(row).to_bits())
            }
            DataType::Utf8 => {
                let a = col.as_any().downcast_ref::<StringArray>().ok_or_else(unsupported)?;
                ScalarKey::Str(a.value(row).to_string())
            }
            DataType::LargeUtf8 => {
                let a = col
                    .as_any()
                    .downcast_ref::<LargeStringArray>()
                    .ok_or_else(unsupported)?;
                ScalarKey::Str(a.value(row).to_string())
            }
            DataType::Boolean => {
                let a = col.as_any().downcast_ref::<BooleanArray>().ok_or_else(unsupported)?;
                ScalarKey::Bool(a.value(row))
            }
            _ => return Err(unsupported()),
        };
        Ok(key)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarKey::Null)
    }
}

/// Whether values of `data_type` can be used as join or group keys
pub fn is_key_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int32
            | DataType::Int64
            | DataType::Date32
            | DataType::Float64
            | DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Boolean
    )
}

/// Composite key for `row` across `cols`
pub fn row_key(cols: &[ArrayRef], row: usize, context: &'static str) -> EtlResult<Vec<ScalarKey>> {
    cols.iter()
        .map(|c| ScalarKey::from_array(c, row, context))
        .collect()
}

/// Rebuild an array of `data_type` from keys previously read out of such an array
pub fn keys_to_array<'a, I>(keys: I, data_type: &DataType) -> EtlResult<ArrayRef>
where
    I: Iterator<Item = &'a ScalarKey>,
{
    let array: ArrayRef = match data_type {
        DataType::Int32 => Arc::new(
            keys.map(|k| match k {
                ScalarKey::Int(v) => i32::try_from(*v).ok(),
                _ => None,
            })
            .collect::<Int32Array>(),
        ),
        DataType::Int64 => Arc::new(
            keys.map(|k| match k {
                ScalarKey::Int(v) => Some(*v),
                _ => None,
            })
            .collect::<Int64Array>(),
        ),
        DataType::Date32 => Arc::new(
            keys.map(|k| match k {
                ScalarKey::Int(v) => i32::try_from(*v).ok(),
                _ => None,
            })
            .collect::<Date32Array>(),
        ),
        DataType::Float64 => Arc::new(
            keys.map(|k| match k {
                ScalarKey::Float(bits) => Some(f64::from_bits(*bits)),
                _ => None,
            })
            .collect::<Float64Array>(),
        ),
        DataType::Utf8 => Arc::new(
            keys.map(|k| match k {
                ScalarKey::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .collect::<StringArray>(),
        ),
        DataType::LargeUtf8 => Arc::new(
            keys.map(|k| match k {
                ScalarKey::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .collect::<LargeStringArray>(),
        ),
        DataType::Boolean => Arc::new(
            keys.map(|k| match k {
                ScalarKey::Bool(b) => Some(*b),
                _ => None,
            })
            .collect::<BooleanArray>(),
        ),
        other => {
            return Err(EtlError::UnsupportedType {
                context: "group",
                data_type: other.clone(),
            })
        }
    };
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_values() {
        let col: ArrayRef = Arc::new(Int32Array::from(vec![Some(20), None]));
        assert_eq!(ScalarKey::from_array(&col, 0, "group").unwrap(), ScalarKey::Int(20));
        assert!(ScalarKey::from_array(&col, 1, "group").unwrap().is_null());
    }

    #[test]
    fn test_unsupported_type() {
        let col: ArrayRef = Arc::new(UInt8Array::from(vec![1u8]));
        assert!(matches!(
            ScalarKey::from_array(&col, 0, "join key"),
            Err(EtlError::UnsupportedType { context: "join key", .. })
        ));
    }

    #[test]
    fn test_keys_to_array_keeps_nulls() {
        let keys = [ScalarKey::Int(31), ScalarKey::Null, ScalarKey::Int(24)];
        let arr = keys_to_array(keys.iter(), &DataType::Int32).unwrap();
        let arr = arr.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.value(0), 31);
        assert!(arr.is_null(1));
        assert_eq!(arr.value(2), 24);
    }
}
