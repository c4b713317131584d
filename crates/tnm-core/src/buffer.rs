//! Event buffer: one event's flat fields in struct-of-arrays form.
//!
//! The buffer is filled from an [`EventSource`] one entry at a time. Objects
//! (groups of parallel arrays such as `Particle_*`) can be registered for
//! selection with [`EventBuffer::select`]; [`EventBuffer::save_objects`] then
//! compacts their arrays to the selected indices before the event is written.

use std::collections::BTreeMap;
use std::fmt;

use crate::column::{Column, ColumnValue};
use crate::schema::{FieldShape, Schema};
use crate::{Error, Result};

/// Anything that can load entries into an [`EventBuffer`].
pub trait EventSource {
    /// Schema of the entries produced by this source.
    fn schema(&self) -> &Schema;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether the source has no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy entry `entry` into `buffer`.
    ///
    /// Fields the source does not provide need not be touched:
    /// [`EventBuffer::read`] empties such arrays and keeps such scalars.
    fn read_into(&mut self, entry: usize, buffer: &mut EventBuffer) -> Result<()>;
}

/// One event's fields, in schema order.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    schema: Schema,
    values: Vec<Column>,
    loaded: Vec<bool>,
    index_map: BTreeMap<String, Vec<usize>>,
    entry: Option<usize>,
}

impl EventBuffer {
    /// Buffer with every scalar set to zero and every array empty.
    pub fn new(schema: Schema) -> Self {
        let values = initial_values(&schema);
        let loaded = vec![false; values.len()];
        Self { schema, values, loaded, index_map: BTreeMap::new(), entry: None }
    }

    /// Schema mirrored by this buffer.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Entry most recently loaded by [`read`](Self::read), if any.
    pub fn entry(&self) -> Option<usize> {
        self.entry
    }

    /// Load entry `entry` from `source` and reset every selection list.
    ///
    /// Registered objects stay registered; their index lists are emptied.
    /// Array fields the source did not fill are emptied, so a projected
    /// read never leaves values of an earlier entry behind.
    pub fn read<S: EventSource + ?Sized>(&mut self, source: &mut S, entry: usize) -> Result<()> {
        let n = source.len();
        if entry >= n {
            return Err(Error::Validation(format!(
                "entry {entry} out of range: source has {n} entries"
            )));
        }
        self.loaded.fill(false);
        source.read_into(entry, self)?;
        for (i, f) in self.schema.fields().iter().enumerate() {
            if f.is_array() && !self.loaded[i] {
                self.values[i] = Column::new(f.value_type);
            }
        }
        for index in self.index_map.values_mut() {
            index.clear();
        }
        self.entry = Some(entry);
        Ok(())
    }

    /// Reset all values to the [`new`](Self::new) state and drop all selections.
    pub fn clear(&mut self) {
        self.values = initial_values(&self.schema);
        self.loaded.fill(false);
        self.index_map.clear();
        self.entry = None;
    }

    /// Register `object` for selection with an empty index list.
    pub fn select(&mut self, object: &str) -> Result<()> {
        self.check_object(object)?;
        self.index_map.insert(object.to_string(), Vec::new());
        Ok(())
    }

    /// Mark element `index` of `object` for retention.
    ///
    /// Registers the object if [`select`](Self::select) was not called.
    pub fn select_index(&mut self, object: &str, index: usize) -> Result<()> {
        self.check_object(object)?;
        let size = self.object_size(object);
        if index >= size {
            return Err(Error::Selection(format!(
                "index {index} out of range for object '{object}' with {size} elements"
            )));
        }
        self.index_map.entry(object.to_string()).or_default().push(index);
        Ok(())
    }

    /// Indices retained so far for `object`, if it is registered.
    pub fn selected(&self, object: &str) -> Option<&[usize]> {
        self.index_map.get(object).map(Vec::as_slice)
    }

    /// Compact every registered object to its retained indices.
    ///
    /// The object's counter field, if any, is set to the retained count.
    /// Objects that were never registered are left whole.
    pub fn save_objects(&mut self) -> Result<()> {
        let index_map = std::mem::take(&mut self.index_map);
        let result = self.compact_all(&index_map);
        self.index_map = index_map;
        result
    }

    fn compact_all(&mut self, index_map: &BTreeMap<String, Vec<usize>>) -> Result<()> {
        for (object, index) in index_map {
            tracing::trace!(object = %object, kept = index.len(), "saving object");
            let positions: Vec<usize> = self
                .schema
                .fields()
                .iter()
                .enumerate()
                .filter(|&(i, f)| f.is_array() && f.object() == object && self.loaded[i])
                .map(|(i, _)| i)
                .collect();
            for i in positions {
                self.values[i].compact(index).map_err(|e| {
                    Error::Selection(format!(
                        "saving '{}': {e}",
                        self.schema.fields()[i].name
                    ))
                })?;
            }
            if let Some(counter) = self.schema.counter_of(object).map(str::to_string) {
                self.set_count(&counter, index.len())?;
            }
        }
        Ok(())
    }

    fn set_count(&mut self, counter: &str, n: usize) -> Result<()> {
        let i = self.require(counter)?;
        match &mut self.values[i] {
            Column::I32(v) => {
                let n = i32::try_from(n).map_err(|_| {
                    Error::Validation(format!("count {n} does not fit counter '{counter}'"))
                })?;
                *v = vec![n];
            }
            Column::I64(v) => *v = vec![n as i64],
            other => {
                return Err(Error::Schema(format!(
                    "counter '{counter}' has non-integer type {}",
                    other.value_type().type_name()
                )));
            }
        }
        self.loaded[i] = true;
        Ok(())
    }

    fn check_object(&self, object: &str) -> Result<()> {
        if self.schema.object_fields(object).is_empty() {
            return Err(Error::Selection(format!("no array fields for object '{object}'")));
        }
        Ok(())
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.schema.index_of(name).ok_or_else(|| Error::Schema(format!("unknown field '{name}'")))
    }

    /// Number of elements currently held by `object`.
    ///
    /// This is the value of the object's counter when it was filled, else
    /// the longest of the object's arrays that were filled.
    pub fn object_size(&self, object: &str) -> usize {
        let counter = self.schema.counter_of(object).and_then(|c| self.schema.index_of(c));
        if let Some(i) = counter.filter(|&i| self.loaded[i]) {
            return self.values[i].get_f64(0).map_or(0, |n| n.max(0.0) as usize);
        }
        self.schema
            .fields()
            .iter()
            .enumerate()
            .filter(|&(i, f)| f.is_array() && f.object() == object && self.loaded[i])
            .map(|(i, _)| self.values[i].len())
            .max()
            .unwrap_or(0)
    }

    /// Whether `name` has been filled since the last [`read`](Self::read) or
    /// [`clear`](Self::clear).
    pub fn is_loaded(&self, name: &str) -> bool {
        self.schema.index_of(name).is_some_and(|i| self.loaded[i])
    }

    /// Raw column of a field.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    /// Columns in schema order.
    pub fn columns(&self) -> &[Column] {
        &self.values
    }

    /// Replace a field's values. The column type must match the schema, and
    /// scalar fields take exactly one value.
    pub fn set_column(&mut self, name: &str, column: Column) -> Result<()> {
        let i = self.require(name)?;
        let spec = &self.schema.fields()[i];
        if column.value_type() != spec.value_type {
            return Err(Error::Schema(format!(
                "field '{name}' is {}, got {} values",
                spec.value_type.type_name(),
                column.value_type().type_name()
            )));
        }
        if spec.shape == FieldShape::Scalar && column.len() != 1 {
            return Err(Error::Schema(format!(
                "scalar field '{name}' takes one value, got {}",
                column.len()
            )));
        }
        self.values[i] = column;
        self.loaded[i] = true;
        Ok(())
    }

    /// Typed values of a field (length 1 for scalars).
    pub fn get<T: ColumnValue>(&self, name: &str) -> Result<&[T]> {
        let i = self.require(name)?;
        T::slice(&self.values[i]).ok_or_else(|| type_mismatch::<T>(name, &self.values[i]))
    }

    /// Typed value of a scalar field.
    pub fn scalar<T: ColumnValue>(&self, name: &str) -> Result<T> {
        self.get::<T>(name)?
            .first()
            .copied()
            .ok_or_else(|| Error::Validation(format!("field '{name}' holds no value")))
    }

    /// Set a scalar field.
    pub fn set_scalar<T: ColumnValue>(&mut self, name: &str, value: T) -> Result<()> {
        self.set_column(name, T::into_column(vec![value]))
    }

    /// Set an array field.
    pub fn set_array<T: ColumnValue>(&mut self, name: &str, values: Vec<T>) -> Result<()> {
        let i = self.require(name)?;
        if !self.schema.fields()[i].is_array() {
            return Err(Error::Schema(format!("field '{name}' is not an array")));
        }
        self.set_column(name, T::into_column(values))
    }

    /// Materialise the parallel arrays of `object` as one record per element.
    pub fn fill_objects(&self, object: &str) -> Result<Vec<ObjectRecord>> {
        self.check_object(object)?;
        let fields: Vec<(usize, &str)> = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .filter(|&(i, f)| f.is_array() && f.object() == object && self.loaded[i])
            .map(|(i, f)| (i, f.variable()))
            .collect();
        let n = self.object_size(object);
        let mut out = Vec::with_capacity(n);
        for k in 0..n {
            let mut values = Vec::with_capacity(fields.len());
            for &(i, var) in &fields {
                let v = self.values[i].get_f64(k).ok_or_else(|| {
                    Error::Validation(format!(
                        "array '{}' is shorter than object '{object}' ({n})",
                        self.schema.fields()[i].name
                    ))
                })?;
                values.push((var.to_string(), v));
            }
            out.push(ObjectRecord { object: object.to_string(), index: k, values });
        }
        Ok(out)
    }
}

fn initial_values(schema: &Schema) -> Vec<Column> {
    schema
        .fields()
        .iter()
        .map(|f| match f.shape {
            FieldShape::Scalar => Column::zeros(f.value_type, 1),
            FieldShape::Array { .. } => Column::new(f.value_type),
        })
        .collect()
}

fn type_mismatch<T: ColumnValue>(name: &str, col: &Column) -> Error {
    Error::Schema(format!(
        "field '{name}' is {}, requested as {}",
        col.value_type().type_name(),
        T::TYPE.type_name()
    ))
}

/// One element of an object, with its variables as `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    /// Object name (`Particle`).
    pub object: String,
    /// Position within the object's arrays.
    pub index: usize,
    /// `(variable, value)` pairs in schema order.
    pub values: Vec<(String, f64)>,
}

impl ObjectRecord {
    /// Value of `variable`.
    pub fn get(&self, variable: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == variable).map(|&(_, v)| v)
    }
}

impl fmt::Display for ObjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.object)?;
        for (name, value) in &self.values {
            writeln!(f, "  {name:<32}: {value:.6}")?;
        }
        Ok(())
    }
}
