//! Flat tree schema: the ordered list of branches an event buffer mirrors.
//!
//! Field names follow the TheNtupleMaker convention `<object>_<variable>`
//! (`Particle_px`, `Event_number`). Array fields belong to the object named
//! by their prefix; an object's arrays all share the same length, which is
//! stored in an integer *counter* field (`Particle_px[Event_numberP]`).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::column::ValueType;
use crate::{Error, Result};

/// Shape of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldShape {
    /// One value per event.
    Scalar,
    /// Variable-length array per event.
    Array {
        /// Scalar integer field holding the array length, if the tree has one.
        counter: Option<String>,
    },
}

/// Description of one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Branch name.
    pub name: String,
    /// Element type.
    pub value_type: ValueType,
    /// Scalar or array.
    pub shape: FieldShape,
}

impl FieldSpec {
    /// Scalar field.
    pub fn scalar(name: impl Into<String>, value_type: ValueType) -> Self {
        Self { name: name.into(), value_type, shape: FieldShape::Scalar }
    }

    /// Array field without a counter branch.
    pub fn array(name: impl Into<String>, value_type: ValueType) -> Self {
        Self { name: name.into(), value_type, shape: FieldShape::Array { counter: None } }
    }

    /// Array field whose length is stored in `counter`.
    pub fn counted(
        name: impl Into<String>,
        value_type: ValueType,
        counter: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value_type,
            shape: FieldShape::Array { counter: Some(counter.into()) },
        }
    }

    /// Whether this is an array field.
    pub fn is_array(&self) -> bool {
        matches!(self.shape, FieldShape::Array { .. })
    }

    /// Counter field name, for counted arrays.
    pub fn counter(&self) -> Option<&str> {
        match &self.shape {
            FieldShape::Array { counter } => counter.as_deref(),
            FieldShape::Scalar => None,
        }
    }

    /// Object name: the prefix before the first `_`.
    pub fn object(&self) -> &str {
        split_name(&self.name).0
    }

    /// Variable name: the remainder after the first `_`.
    pub fn variable(&self) -> &str {
        split_name(&self.name).1
    }

    /// ROOT-style leaf title, e.g. `Particle_px[Event_numberP]/D`.
    pub fn leaf_title(&self) -> String {
        let code = self.value_type.leaf_code();
        match &self.shape {
            FieldShape::Scalar => format!("{}/{code}", self.name),
            FieldShape::Array { counter: Some(c) } => format!("{}[{c}]/{code}", self.name),
            FieldShape::Array { counter: None } => format!("{}[]/{code}", self.name),
        }
    }
}

/// Split `Particle_px` into `("Particle", "px")`.
///
/// A name without `_` is its own object with the same variable name.
pub fn split_name(name: &str) -> (&str, &str) {
    match name.split_once('_') {
        Some((obj, var)) if !obj.is_empty() && !var.is_empty() => (obj, var),
        _ => (name, name),
    }
}

/// Ordered set of fields with lookup by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    name_to_index: HashMap<String, usize>,
}

impl Schema {
    /// Build and validate a schema.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        let mut name_to_index = HashMap::with_capacity(fields.len());
        for (i, f) in fields.iter().enumerate() {
            if f.name.trim().is_empty() {
                return Err(Error::Schema(format!("field {i} has an empty name")));
            }
            if name_to_index.insert(f.name.clone(), i).is_some() {
                return Err(Error::Schema(format!("duplicate field '{}'", f.name)));
            }
        }

        for f in &fields {
            let Some(counter) = f.counter() else { continue };
            let Some(&ci) = name_to_index.get(counter) else {
                return Err(Error::Schema(format!(
                    "field '{}' is counted by '{counter}', which is not in the schema",
                    f.name
                )));
            };
            let c = &fields[ci];
            if c.is_array() || !c.value_type.is_integer() {
                return Err(Error::Schema(format!(
                    "counter '{counter}' of field '{}' must be an integer scalar, got {}",
                    f.name,
                    c.leaf_title()
                )));
            }
        }

        Ok(Self { fields, name_to_index })
    }

    /// All fields in order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Position of a field.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Field names in order.
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Distinct objects owning array fields, in first-seen order.
    pub fn objects(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for f in self.fields.iter().filter(|f| f.is_array()) {
            if !out.contains(&f.object()) {
                out.push(f.object());
            }
        }
        out
    }

    /// Array fields belonging to `object`.
    pub fn object_fields(&self, object: &str) -> Vec<&FieldSpec> {
        self.fields.iter().filter(|f| f.is_array() && f.object() == object).collect()
    }

    /// Counter field of `object` (taken from its first counted array).
    pub fn counter_of(&self, object: &str) -> Option<&str> {
        self.object_fields(object).into_iter().find_map(|f| f.counter())
    }

    /// Append a field.
    pub fn with_field(self, field: FieldSpec) -> Result<Self> {
        let mut fields = self.fields;
        fields.push(field);
        Self::new(fields)
    }

    /// Restrict to the named fields (schema order is kept).
    ///
    /// Counters of kept arrays are kept too, so the result is always valid.
    pub fn project(&self, names: &[&str]) -> Result<Self> {
        for n in names {
            if self.index_of(n).is_none() {
                return Err(Error::Schema(format!("unknown field '{n}'")));
            }
        }
        let mut keep: Vec<&str> = names.to_vec();
        for n in names {
            if let Some(c) = self.field(n).and_then(|f| f.counter()) {
                keep.push(c);
            }
        }
        let fields =
            self.fields.iter().filter(|f| keep.contains(&f.name.as_str())).cloned().collect();
        Self::new(fields)
    }

    /// Human-readable listing, one leaf title per line.
    pub fn ls(&self) -> String {
        let mut out = String::new();
        for (i, f) in self.fields.iter().enumerate() {
            let ty = f.value_type.type_name();
            out.push_str(&format!("{:4}  {ty:<8} {}\n", i + 1, f.leaf_title()));
        }
        out
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ls())
    }
}
