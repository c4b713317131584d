//! # tnm-io
//!
//! Parquet storage for TNM ntuples.
//!
//! This crate provides:
//! - [`InputStream`]: a chain of Parquet files read entry by entry into an
//!   [`EventBuffer`](tnm_core::EventBuffer), decoding one row group at a time.
//! - [`OutputFile`]: a counts table plus an optional skimmed tree with an
//!   appended `eventWeight` column and periodic row-group flushes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod columnar;
pub mod input;
pub mod output;

pub use input::InputStream;
pub use output::{DEFAULT_SAVE_COUNT, OutputFile, OutputSummary, WEIGHT_COLUMN, read_counts};
