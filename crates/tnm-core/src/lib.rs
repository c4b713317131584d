//! # tnm-core
//!
//! Core types for TNM ntuple analysis.
//!
//! This crate provides:
//! - A flat tree [`Schema`] following the `<object>_<variable>` naming convention.
//! - A struct-of-arrays [`EventBuffer`] with read / select / save semantics.
//! - Declarative object selections and a labelled [`Counts`] table.
//! - The analyzer [`CommandLine`] and small text / kinematics helpers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod cmdline;
pub mod column;
pub mod counts;
pub mod error;
pub mod physics;
pub mod schema;
pub mod selection;
pub mod text;

pub use buffer::{EventBuffer, EventSource, ObjectRecord};
pub use cmdline::CommandLine;
pub use column::{Column, ColumnValue, ValueType};
pub use counts::{CountBin, Counts};
pub use error::{Error, Result};
pub use physics::{MatchedPair, PtThing};
pub use schema::{FieldShape, FieldSpec, Schema};
pub use selection::{Cut, CutOp, EventSelection, ObjectSelection};

/// Version of the TNM crates.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
