//! # tnm-hepmc
//!
//! HepMC2 event records for TNM.
//!
//! This crate provides:
//! - A streaming reader for the `IO_GenEvent` ASCII format ([`HepMcReader`]).
//! - Conversion of HepMC events into a flat `Events` ntuple ([`convert_file`]).
//! - A decay filter that copies selected events verbatim ([`filter_file`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filter;
pub mod ntuple;
pub mod reader;

pub use filter::{DecayFilter, FilterSummary, filter_file};
pub use ntuple::{
    ConvertOptions, ConvertSummary, MAX_PARTICLES, convert_file, fill_buffer, ntuple_schema,
};
pub use reader::{CrossSection, GenEvent, GenParticle, GenVertex, HepMcReader, PdfInfo};
