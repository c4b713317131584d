//! Typed column storage for one field of one event.
//!
//! Scalars are stored as length-1 columns so that scalar and array fields
//! share the same representation inside an [`EventBuffer`](crate::EventBuffer).

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Element type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Boolean (1 byte in ROOT, `O` leaf).
    Bool,
    /// 32-bit signed integer (`I` leaf).
    I32,
    /// 64-bit signed integer (`L` leaf).
    I64,
    /// 32-bit float (`F` leaf).
    F32,
    /// 64-bit float (`D` leaf).
    F64,
}

impl ValueType {
    /// ROOT leaf type code.
    pub fn leaf_code(self) -> char {
        match self {
            ValueType::Bool => 'O',
            ValueType::I32 => 'I',
            ValueType::I64 => 'L',
            ValueType::F32 => 'F',
            ValueType::F64 => 'D',
        }
    }

    /// C-style type name used in listings.
    pub fn type_name(self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::I32 => "int",
            ValueType::I64 => "long",
            ValueType::F32 => "float",
            ValueType::F64 => "double",
        }
    }

    /// Whether the type can hold an object count.
    pub fn is_integer(self) -> bool {
        matches!(self, ValueType::I32 | ValueType::I64)
    }
}

/// A typed vector of values.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Booleans.
    Bool(Vec<bool>),
    /// 32-bit integers.
    I32(Vec<i32>),
    /// 64-bit integers.
    I64(Vec<i64>),
    /// 32-bit floats.
    F32(Vec<f32>),
    /// 64-bit floats.
    F64(Vec<f64>),
}

macro_rules! each_column {
    ($col:expr, $v:ident => $body:expr) => {
        match $col {
            Column::Bool($v) => $body,
            Column::I32($v) => $body,
            Column::I64($v) => $body,
            Column::F32($v) => $body,
            Column::F64($v) => $body,
        }
    };
}

impl Column {
    /// Empty column of the given type.
    pub fn new(ty: ValueType) -> Self {
        Self::zeros(ty, 0)
    }

    /// Column of `n` zero (or `false`) values.
    pub fn zeros(ty: ValueType, n: usize) -> Self {
        match ty {
            ValueType::Bool => Column::Bool(vec![false; n]),
            ValueType::I32 => Column::I32(vec![0; n]),
            ValueType::I64 => Column::I64(vec![0; n]),
            ValueType::F32 => Column::F32(vec![0.0; n]),
            ValueType::F64 => Column::F64(vec![0.0; n]),
        }
    }

    /// Element type.
    pub fn value_type(&self) -> ValueType {
        match self {
            Column::Bool(_) => ValueType::Bool,
            Column::I32(_) => ValueType::I32,
            Column::I64(_) => ValueType::I64,
            Column::F32(_) => ValueType::F32,
            Column::F64(_) => ValueType::F64,
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        each_column!(self, v => v.len())
    }

    /// Whether the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all values.
    pub fn clear(&mut self) {
        each_column!(self, v => v.clear())
    }

    /// Value at `i` converted to `f64`.
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            Column::Bool(v) => v.get(i).map(|&x| if x { 1.0 } else { 0.0 }),
            Column::I32(v) => v.get(i).map(|&x| x as f64),
            Column::I64(v) => v.get(i).map(|&x| x as f64),
            Column::F32(v) => v.get(i).map(|&x| x as f64),
            Column::F64(v) => v.get(i).copied(),
        }
    }

    /// All values converted to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.get_f64(i)).collect()
    }

    /// Keep only the values at `index`, in the order given.
    ///
    /// Indices may repeat. Any index `>= len()` is an error and leaves the
    /// column untouched.
    pub fn compact(&mut self, index: &[usize]) -> Result<()> {
        let n = self.len();
        if let Some(&bad) = index.iter().find(|&&i| i >= n) {
            return Err(Error::Selection(format!(
                "index {bad} out of range for column of length {n}"
            )));
        }
        each_column!(self, v => {
            let kept = index.iter().map(|&i| v[i]).collect();
            *v = kept;
        });
        Ok(())
    }

    /// Append all values of `other`, which must have the same type.
    pub fn extend_from(&mut self, other: &Column) -> Result<()> {
        match (self, other) {
            (Column::Bool(a), Column::Bool(b)) => a.extend_from_slice(b),
            (Column::I32(a), Column::I32(b)) => a.extend_from_slice(b),
            (Column::I64(a), Column::I64(b)) => a.extend_from_slice(b),
            (Column::F32(a), Column::F32(b)) => a.extend_from_slice(b),
            (Column::F64(a), Column::F64(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(Error::Schema(format!(
                    "cannot append {} values to a {} column",
                    b.value_type().type_name(),
                    a.value_type().type_name()
                )));
            }
        }
        Ok(())
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Rust types that can be stored in a [`Column`].
pub trait ColumnValue: Copy + sealed::Sealed + 'static {
    /// Matching [`ValueType`].
    const TYPE: ValueType;

    /// Borrow the values if `col` has this type.
    fn slice(col: &Column) -> Option<&[Self]>;

    /// Mutably borrow the values if `col` has this type.
    fn vec_mut(col: &mut Column) -> Option<&mut Vec<Self>>;

    /// Wrap a vector into a [`Column`].
    fn into_column(values: Vec<Self>) -> Column;
}

macro_rules! impl_column_value {
    ($t:ty, $variant:ident) => {
        impl ColumnValue for $t {
            const TYPE: ValueType = ValueType::$variant;

            fn slice(col: &Column) -> Option<&[Self]> {
                match col {
                    Column::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn vec_mut(col: &mut Column) -> Option<&mut Vec<Self>> {
                match col {
                    Column::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_column(values: Vec<Self>) -> Column {
                Column::$variant(values)
            }
        }
    };
}

impl_column_value!(bool, Bool);
impl_column_value!(i32, I32);
impl_column_value!(i64, I64);
impl_column_value!(f32, F32);
impl_column_value!(f64, F64);
