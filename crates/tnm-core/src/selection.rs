//! Declarative object selections that drive [`EventBuffer::select`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::buffer::EventBuffer;
use crate::counts::Counts;
use crate::{Error, Result};

/// Comparison applied by a [`Cut`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutOp {
    /// `x == value`
    Eq,
    /// `x != value`
    Ne,
    /// `x < value`
    Lt,
    /// `x <= value`
    Le,
    /// `x > value`
    Gt,
    /// `x >= value`
    Ge,
    /// `|x| == value`
    AbsEq,
    /// `|x| < value`
    AbsLt,
    /// `|x| > value`
    AbsGt,
}

impl CutOp {
    /// Evaluate `x <op> value`.
    pub fn test(self, x: f64, value: f64) -> bool {
        match self {
            CutOp::Eq => x == value,
            CutOp::Ne => x != value,
            CutOp::Lt => x < value,
            CutOp::Le => x <= value,
            CutOp::Gt => x > value,
            CutOp::Ge => x >= value,
            CutOp::AbsEq => x.abs() == value,
            CutOp::AbsLt => x.abs() < value,
            CutOp::AbsGt => x.abs() > value,
        }
    }
}

/// A cut on one array column of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    /// Column name (`Particle_status`).
    pub column: String,
    /// Comparison.
    pub op: CutOp,
    /// Threshold.
    pub value: f64,
}

impl Cut {
    /// Create a cut.
    pub fn new(column: impl Into<String>, op: CutOp, value: f64) -> Self {
        Self { column: column.into(), op, value }
    }
}

/// Selection of one object's elements plus a minimum multiplicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSelection {
    /// Object name (`Particle`).
    pub name: String,
    /// Every cut must pass for an element to be kept.
    #[serde(default)]
    pub cuts: Vec<Cut>,
    /// Minimum number of kept elements for the event to pass.
    #[serde(default)]
    pub min_count: usize,
}

impl ObjectSelection {
    /// Selection keeping every element.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), cuts: Vec::new(), min_count: 0 }
    }

    /// Add a cut.
    pub fn cut(mut self, column: impl Into<String>, op: CutOp, value: f64) -> Self {
        self.cuts.push(Cut::new(column, op, value));
        self
    }

    /// Require at least `n` kept elements.
    pub fn min_count(mut self, n: usize) -> Self {
        self.min_count = n;
        self
    }

    /// Label used in the counts table.
    pub fn label(&self) -> String {
        format!("{} >= {}", self.name, self.min_count)
    }

    /// Check that every cut names an array column of this object.
    pub fn validate(&self, buffer: &EventBuffer) -> Result<()> {
        for cut in &self.cuts {
            let ok = buffer
                .schema()
                .field(&cut.column)
                .is_some_and(|f| f.is_array() && f.object() == self.name);
            if !ok {
                return Err(Error::Selection(format!(
                    "cut column '{}' is not an array of object '{}'",
                    cut.column, self.name
                )));
            }
        }
        Ok(())
    }

    /// Register the object and select every element passing all cuts.
    ///
    /// Replaces any earlier selection of the same object. Returns the number
    /// of selected elements.
    pub fn apply(&self, buffer: &mut EventBuffer) -> Result<usize> {
        let kept = self.passing(buffer)?;
        buffer.select(&self.name)?;
        for &i in &kept {
            buffer.select_index(&self.name, i)?;
        }
        Ok(kept.len())
    }

    /// Indices of the elements passing all cuts, in ascending order.
    pub fn passing(&self, buffer: &EventBuffer) -> Result<Vec<usize>> {
        self.validate(buffer)?;
        let n = buffer.object_size(&self.name);
        let mut kept = Vec::new();
        for i in 0..n {
            let mut pass = true;
            for cut in &self.cuts {
                let x = buffer.column(&cut.column).and_then(|c| c.get_f64(i)).ok_or_else(|| {
                    Error::Selection(format!(
                        "column '{}' has no element {i} (object '{}' has {n})",
                        cut.column, self.name
                    ))
                })?;
                if !cut.op.test(x, cut.value) {
                    pass = false;
                    break;
                }
            }
            if pass {
                kept.push(i);
            }
        }
        Ok(kept)
    }
}

/// Ordered list of object selections forming an event selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSelection {
    /// Object selections, applied in order.
    #[serde(default)]
    pub objects: Vec<ObjectSelection>,
}

impl EventSelection {
    /// Add an object selection.
    pub fn with(mut self, object: ObjectSelection) -> Self {
        self.objects.push(object);
        self
    }

    /// Validate every object selection against the buffer's schema.
    pub fn validate(&self, buffer: &EventBuffer) -> Result<()> {
        self.objects.iter().try_for_each(|o| o.validate(buffer))
    }

    /// Apply the selections in order, stopping at the first failed
    /// multiplicity requirement.
    ///
    /// Each passed requirement fills `counts` under the object's label.
    /// Selections of the same object add up: the buffer keeps the union of
    /// their elements in ascending order.
    pub fn apply(
        &self,
        buffer: &mut EventBuffer,
        counts: &mut Counts,
        weight: f64,
    ) -> Result<bool> {
        let mut merged: BTreeMap<&str, BTreeSet<usize>> = BTreeMap::new();
        for object in &self.objects {
            let kept = object.passing(buffer)?;
            let n = kept.len();
            let indices = merged.entry(object.name.as_str()).or_default();
            indices.extend(kept);
            buffer.select(&object.name)?;
            for &i in indices.iter() {
                buffer.select_index(&object.name, i)?;
            }
            if n < object.min_count {
                return Ok(false);
            }
            counts.fill(&object.label(), weight);
        }
        Ok(true)
    }
}
