//! Materialized column values and conversion to and from arrow arrays

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
    StringDictionaryBuilder, TimestampMillisecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int32Type};

use super::value::{ColumnType, Value};
use crate::error::{DpsError, Result};

/// A named, typed column held as plain values
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: ColumnType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    /// An all-null column of the given length
    pub fn nulls(name: impl Into<String>, dtype: ColumnType, len: usize) -> Self {
        Self::new(name, dtype, vec![Value::Null; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Non-null numeric values in row order
    pub fn numeric_values(&self) -> Vec<f64> {
        self.values.iter().filter_map(Value::as_f64).collect()
    }

    /// Fail with `TypeMismatch` unless the column is numeric
    pub fn require_numeric(&self) -> Result<()> {
        if self.dtype.is_numeric() {
            Ok(())
        } else {
            Err(DpsError::type_mismatch(&self.name, "numeric", self.dtype.name()))
        }
    }

    /// Read an arrow array into plain values
    pub fn from_array(name: impl Into<String>, array: &ArrayRef) -> Result<Self> {
        let name = name.into();
        let dtype = ColumnType::from_arrow(array.data_type())?;

        let values = match &dtype {
            ColumnType::Integer => {
                let array = cast_if_needed(array, &DataType::Int64)?;
                let typed = downcast::<Int64Array>(&array, &name)?;
                (0..typed.len())
                    .map(|i| if typed.is_valid(i) { Value::Int(typed.value(i)) } else { Value::Null })
                    .collect()
            }
            ColumnType::Float => {
                let array = cast_if_needed(array, &DataType::Float64)?;
                let typed = downcast::<Float64Array>(&array, &name)?;
                (0..typed.len())
                    .map(|i| {
                        if typed.is_valid(i) && !typed.value(i).is_nan() {
                            Value::Float(typed.value(i))
                        } else {
                            Value::Null
                        }
                    })
                    .collect()
            }
            ColumnType::Boolean => {
                let typed = downcast::<BooleanArray>(array, &name)?;
                (0..typed.len())
                    .map(|i| if typed.is_valid(i) { Value::Bool(typed.value(i)) } else { Value::Null })
                    .collect()
            }
            ColumnType::Text | ColumnType::Categorical => {
                let array = cast_if_needed(array, &DataType::Utf8)?;
                let typed = downcast::<StringArray>(&array, &name)?;
                (0..typed.len())
                    .map(|i| {
                        if typed.is_valid(i) {
                            Value::Text(typed.value(i).to_string())
                        } else {
                            Value::Null
                        }
                    })
                    .collect()
            }
            ColumnType::Temporal { .. } => {
                let array = cast_if_needed(array, &dtype.to_arrow())?;
                let typed = downcast::<TimestampMillisecondArray>(&array, &name)?;
                (0..typed.len())
                    .map(|i| if typed.is_valid(i) { Value::Timestamp(typed.value(i)) } else { Value::Null })
                    .collect()
            }
        };

        Ok(Self { name, dtype, values })
    }

    /// Build the canonical arrow array for this column
    ///
    /// Integers are accepted in float columns; any other value that does not
    /// fit the column type is a `TypeMismatch`.
    pub fn to_array(&self) -> Result<ArrayRef> {
        let array: ArrayRef = match &self.dtype {
            ColumnType::Integer => {
                let data = self
                    .values
                    .iter()
                    .map(|v| match v {
                        v if v.is_null() => Ok(None),
                        Value::Int(i) => Ok(Some(*i)),
                        other => Err(self.mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(Int64Array::from(data))
            }
            ColumnType::Float => {
                let data = self
                    .values
                    .iter()
                    .map(|v| match v {
                        v if v.is_null() => Ok(None),
                        Value::Float(f) => Ok(Some(*f)),
                        Value::Int(i) => Ok(Some(*i as f64)),
                        other => Err(self.mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(Float64Array::from(data))
            }
            ColumnType::Boolean => {
                let data = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Bool(b) => Ok(Some(*b)),
                        other => Err(self.mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(BooleanArray::from(data))
            }
            ColumnType::Text => {
                let data = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Text(s) => Ok(Some(s.as_str())),
                        other => Err(self.mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(StringArray::from(data))
            }
            ColumnType::Categorical => {
                let mut builder = StringDictionaryBuilder::<Int32Type>::new();
                for value in &self.values {
                    match value {
                        Value::Null => builder.append_null(),
                        Value::Text(s) => builder.append_value(s),
                        other => return Err(self.mismatch(other)),
                    }
                }
                Arc::new(builder.finish())
            }
            ColumnType::Temporal { timezone } => {
                let data = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Timestamp(ms) => Ok(Some(*ms)),
                        other => Err(self.mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(TimestampMillisecondArray::from(data).with_timezone_opt(timezone.clone()))
            }
        };
        Ok(array)
    }

    fn mismatch(&self, value: &Value) -> DpsError {
        let found = match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "temporal",
        };
        DpsError::type_mismatch(&self.name, self.dtype.name(), found)
    }
}

fn cast_if_needed(array: &ArrayRef, target: &DataType) -> Result<ArrayRef> {
    if array.data_type() == target {
        Ok(array.clone())
    } else {
        Ok(cast(array.as_ref(), target)?)
    }
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, name: &str) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        DpsError::InvalidOperation(format!("Column '{}' has an unexpected storage layout", name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_round_trip_keeps_nulls() {
        let column = Column::new(
            "a",
            ColumnType::Integer,
            vec![Value::Int(1), Value::Null, Value::Int(3)],
        );
        let array = column.to_array().unwrap();
        assert_eq!(array.null_count(), 1);
        assert_eq!(Column::from_array("a", &array).unwrap(), column);
    }

    #[test]
    fn test_categorical_round_trip() {
        let column = Column::new(
            "c",
            ColumnType::Categorical,
            vec![Value::Text("x".into()), Value::Text("y".into()), Value::Text("x".into())],
        );
        let array = column.to_array().unwrap();
        assert!(matches!(array.data_type(), DataType::Dictionary(_, _)));
        assert_eq!(Column::from_array("c", &array).unwrap(), column);
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let column = Column::new("a", ColumnType::Integer, vec![Value::Text("x".into())]);
        let err = column.to_array().unwrap_err();
        assert!(matches!(err, DpsError::TypeMismatch { .. }));
    }

    #[test]
    fn test_int32_input_is_widened() {
        let array: ArrayRef = Arc::new(arrow::array::Int32Array::from(vec![Some(5), None]));
        let column = Column::from_array("n", &array).unwrap();
        assert_eq!(column.dtype, ColumnType::Integer);
        assert_eq!(column.values, vec![Value::Int(5), Value::Null]);
    }
}
