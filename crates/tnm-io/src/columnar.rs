//! Arrow mapping of the TNM ntuple schema.
//!
//! # Schema: `tnm_ntuple_v1`
//!
//! | TNM field                | Arrow type           | Field metadata            |
//! |--------------------------|----------------------|---------------------------|
//! | scalar `bool/int/long/float/double` | `Boolean/Int32/Int64/Float32/Float64` | - |
//! | array of the above       | `List<primitive>`    | `tnm.counter` = counter   |
//!
//! ## Parquet key-value metadata
//!
//! | Key                  | Value                                  |
//! |----------------------|----------------------------------------|
//! | `tnm.schema_version` | `"tnm_ntuple_v1"`                      |
//! | `tnm.tree`           | tree name (`Events`)                   |
//! | `tnm.counts`         | JSON list of count bins, set on close  |

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    ListArray,
};
use arrow::buffer::{OffsetBuffer, ScalarBuffer};
use arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Int32Type, Int64Type, Schema as ArrowSchema,
    SchemaRef,
};
use arrow::record_batch::RecordBatch;

use tnm_core::{Column, Error, FieldShape, FieldSpec, Result, Schema, ValueType};

/// Schema version string embedded in Parquet key-value metadata.
pub const NTUPLE_SCHEMA_V1: &str = "tnm_ntuple_v1";

/// Parquet metadata key for the schema version.
pub const META_KEY_SCHEMA_VERSION: &str = "tnm.schema_version";

/// Parquet metadata key for the tree name.
pub const META_KEY_TREE: &str = "tnm.tree";

/// Parquet metadata key for the counts table (JSON).
pub const META_KEY_COUNTS: &str = "tnm.counts";

/// Arrow field metadata key naming an array's counter field.
pub const FIELD_META_COUNTER: &str = "tnm.counter";

const LIST_ITEM: &str = "item";

fn arrow_type(ty: ValueType) -> DataType {
    match ty {
        ValueType::Bool => DataType::Boolean,
        ValueType::I32 => DataType::Int32,
        ValueType::I64 => DataType::Int64,
        ValueType::F32 => DataType::Float32,
        ValueType::F64 => DataType::Float64,
    }
}

fn value_type(name: &str, dt: &DataType) -> Result<ValueType> {
    match dt {
        DataType::Boolean => Ok(ValueType::Bool),
        DataType::Int32 => Ok(ValueType::I32),
        DataType::Int64 => Ok(ValueType::I64),
        DataType::Float32 => Ok(ValueType::F32),
        DataType::Float64 => Ok(ValueType::F64),
        other => Err(Error::Schema(format!("column '{name}' has unsupported type {other:?}"))),
    }
}

fn list_item(ty: ValueType) -> Arc<Field> {
    Arc::new(Field::new(LIST_ITEM, arrow_type(ty), true))
}

/// Arrow field for one TNM field.
pub fn arrow_field(spec: &FieldSpec) -> Field {
    match &spec.shape {
        FieldShape::Scalar => Field::new(&spec.name, arrow_type(spec.value_type), false),
        FieldShape::Array { counter } => {
            let field =
                Field::new(&spec.name, DataType::List(list_item(spec.value_type)), false);
            match counter {
                Some(c) => field.with_metadata(HashMap::from([(
                    FIELD_META_COUNTER.to_string(),
                    c.clone(),
                )])),
                None => field,
            }
        }
    }
}

/// Arrow schema for a TNM schema, tagged with the tree name.
pub fn to_arrow_schema(schema: &Schema, tree: &str) -> SchemaRef {
    let fields: Vec<Field> = schema.fields().iter().map(arrow_field).collect();
    let metadata = HashMap::from([
        (META_KEY_SCHEMA_VERSION.to_string(), NTUPLE_SCHEMA_V1.to_string()),
        (META_KEY_TREE.to_string(), tree.to_string()),
    ]);
    Arc::new(ArrowSchema::new(fields).with_metadata(metadata))
}

/// TNM schema of an Arrow schema.
///
/// `List` and `LargeList` columns become array fields; their counter is read
/// from the `tnm.counter` field metadata when present.
pub fn from_arrow_schema(schema: &ArrowSchema) -> Result<Schema> {
    let mut fields = Vec::with_capacity(schema.fields().len());
    for f in schema.fields() {
        let spec = match f.data_type() {
            DataType::List(item) | DataType::LargeList(item) => {
                let ty = value_type(f.name(), item.data_type())?;
                match f.metadata().get(FIELD_META_COUNTER) {
                    Some(c) => FieldSpec::counted(f.name(), ty, c.as_str()),
                    None => FieldSpec::array(f.name(), ty),
                }
            }
            dt => FieldSpec::scalar(f.name(), value_type(f.name(), dt)?),
        };
        fields.push(spec);
    }
    Schema::new(fields)
}

/// Tree name stored in the schema metadata, if any.
pub fn tree_name(schema: &ArrowSchema) -> Option<&str> {
    schema.metadata().get(META_KEY_TREE).map(String::as_str)
}

/// Flat values of a primitive Arrow array. Nulls read as zero.
pub fn column_from_array(array: &dyn Array, ty: ValueType) -> Result<Column> {
    let mismatch = || {
        Error::Format(format!(
            "expected {} values, found Arrow type {:?}",
            ty.type_name(),
            array.data_type()
        ))
    };
    let col = match ty {
        ValueType::Bool => {
            let values = array.as_boolean_opt().ok_or_else(mismatch)?;
            Column::Bool(values.iter().map(|v| v.unwrap_or(false)).collect())
        }
        ValueType::I32 => Column::I32(
            array.as_primitive_opt::<Int32Type>().ok_or_else(mismatch)?.values().to_vec(),
        ),
        ValueType::I64 => Column::I64(
            array.as_primitive_opt::<Int64Type>().ok_or_else(mismatch)?.values().to_vec(),
        ),
        ValueType::F32 => Column::F32(
            array.as_primitive_opt::<Float32Type>().ok_or_else(mismatch)?.values().to_vec(),
        ),
        ValueType::F64 => Column::F64(
            array.as_primitive_opt::<Float64Type>().ok_or_else(mismatch)?.values().to_vec(),
        ),
    };
    Ok(col)
}

/// Values of field `spec` at `row` of `array` (one value for scalars).
pub fn row_column(array: &ArrayRef, spec: &FieldSpec, row: usize) -> Result<Column> {
    if !spec.is_array() {
        return column_from_array(array.slice(row, 1).as_ref(), spec.value_type);
    }
    let values = if let Some(list) = array.as_list_opt::<i32>() {
        if list.is_null(row) { None } else { Some(list.value(row)) }
    } else if let Some(list) = array.as_list_opt::<i64>() {
        if list.is_null(row) { None } else { Some(list.value(row)) }
    } else {
        return Err(Error::Format(format!(
            "array field '{}' is stored as {:?}, expected a list",
            spec.name,
            array.data_type()
        )));
    };
    match values {
        Some(v) => column_from_array(v.as_ref(), spec.value_type),
        None => Ok(Column::new(spec.value_type)),
    }
}

fn primitive_array(col: Column) -> ArrayRef {
    match col {
        Column::Bool(v) => Arc::new(BooleanArray::from(v)),
        Column::I32(v) => Arc::new(Int32Array::from(v)),
        Column::I64(v) => Arc::new(Int64Array::from(v)),
        Column::F32(v) => Arc::new(Float32Array::from(v)),
        Column::F64(v) => Arc::new(Float64Array::from(v)),
    }
}

/// Row-wise accumulator for one output field.
#[derive(Debug)]
pub(crate) struct ColumnSink {
    spec: FieldSpec,
    values: Column,
    offsets: Vec<i32>,
}

impl ColumnSink {
    pub(crate) fn new(spec: FieldSpec) -> Self {
        let values = Column::new(spec.value_type);
        Self { spec, values, offsets: vec![0] }
    }

    /// Append one event's values for this field.
    pub(crate) fn push(&mut self, col: &Column) -> Result<()> {
        if !self.spec.is_array() && col.len() != 1 {
            return Err(Error::Schema(format!(
                "scalar field '{}' holds {} values",
                self.spec.name,
                col.len()
            )));
        }
        self.values.extend_from(col).map_err(|e| {
            Error::Schema(format!("field '{}': {e}", self.spec.name))
        })?;
        if self.spec.is_array() {
            let end = i32::try_from(self.values.len()).map_err(|_| {
                Error::Format(format!("field '{}' exceeds the list offset range", self.spec.name))
            })?;
            self.offsets.push(end);
        }
        Ok(())
    }

    /// Take the accumulated values as an Arrow array.
    pub(crate) fn finish(&mut self) -> Result<ArrayRef> {
        let values = std::mem::replace(&mut self.values, Column::new(self.spec.value_type));
        let offsets = std::mem::replace(&mut self.offsets, vec![0]);
        let values = primitive_array(values);
        if !self.spec.is_array() {
            return Ok(values);
        }
        let list = ListArray::try_new(
            list_item(self.spec.value_type),
            OffsetBuffer::new(ScalarBuffer::from(offsets)),
            values,
            None,
        )
        .map_err(|e| Error::Format(format!("failed to build list '{}': {e}", self.spec.name)))?;
        Ok(Arc::new(list))
    }
}

/// Drain every sink into one record batch.
pub(crate) fn finish_batch(schema: &SchemaRef, sinks: &mut [ColumnSink]) -> Result<RecordBatch> {
    let arrays = sinks.iter_mut().map(ColumnSink::finish).collect::<Result<Vec<_>>>()?;
    RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| Error::Format(format!("failed to build RecordBatch: {e}")))
}
