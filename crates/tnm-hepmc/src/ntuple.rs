//! Flattening of HepMC events into an `Events` ntuple.

use std::path::{Path, PathBuf};

use tnm_core::{Column, ColumnValue, Error, EventBuffer, FieldSpec, Result, Schema, ValueType};
use tnm_io::{DEFAULT_SAVE_COUNT, OutputFile};

use crate::reader::{GenEvent, GenParticle, GenVertex, HepMcReader};

/// Default tree name.
pub const TREE_NAME: &str = "Events";

/// Default maximum number of particles stored per event.
pub const MAX_PARTICLES: usize = 5000;

/// Counter of the `Particle_*` arrays.
pub const PARTICLE_COUNTER: &str = "Event_numberP";

const EVENT_FIELDS: &[(&str, ValueType)] = &[
    ("Event_number", ValueType::I32),
    ("Event_numberMP", ValueType::I32),
    ("Event_scale", ValueType::F64),
    ("Event_alphaQCD", ValueType::F64),
    ("Event_alphaQED", ValueType::F64),
    ("Event_processID", ValueType::I32),
    ("Event_barcodeSPV", ValueType::I32),
    ("Event_numberV", ValueType::I32),
    ("Event_barcodeBP1", ValueType::I32),
    ("Event_barcodeBP2", ValueType::I32),
    (PARTICLE_COUNTER, ValueType::I32),
    ("Xsection_value", ValueType::F64),
    ("Xsection_error", ValueType::F64),
    ("PDF_parton1", ValueType::I32),
    ("PDF_parton2", ValueType::I32),
    ("PDF_x1", ValueType::F64),
    ("PDF_x2", ValueType::F64),
    ("PDF_Q2", ValueType::F64),
    ("PDF_x1f", ValueType::F64),
    ("PDF_x2f", ValueType::F64),
    ("PDF_id1", ValueType::I32),
    ("PDF_id2", ValueType::I32),
];

const PARTICLE_FIELDS: &[(&str, ValueType)] = &[
    ("Particle_x", ValueType::F64),
    ("Particle_y", ValueType::F64),
    ("Particle_z", ValueType::F64),
    ("Particle_ctau", ValueType::F64),
    ("Particle_barcode", ValueType::I32),
    ("Particle_pid", ValueType::I32),
    ("Particle_px", ValueType::F64),
    ("Particle_py", ValueType::F64),
    ("Particle_pz", ValueType::F64),
    ("Particle_energy", ValueType::F64),
    ("Particle_mass", ValueType::F64),
    ("Particle_status", ValueType::I32),
    ("Particle_d1", ValueType::I32),
    ("Particle_d2", ValueType::I32),
];

/// Schema of the flattened ntuple.
pub fn ntuple_schema() -> Result<Schema> {
    let scalars = EVENT_FIELDS.iter().map(|&(name, ty)| FieldSpec::scalar(name, ty));
    let particles = PARTICLE_FIELDS
        .iter()
        .map(|&(name, ty)| FieldSpec::counted(name, ty, PARTICLE_COUNTER));
    Schema::new(scalars.chain(particles).collect())
}

fn to_i32(n: usize, what: &str) -> Result<i32> {
    i32::try_from(n)
        .map_err(|_| Error::Validation(format!("{what} {n} does not fit an int branch")))
}

fn vertex_of(event: &GenEvent, particle: usize) -> &GenVertex {
    &event.vertices[event.particles[particle].vertex]
}

fn particle_column<T: ColumnValue>(
    event: &GenEvent,
    n: usize,
    f: impl Fn(&GenParticle) -> T,
) -> Column {
    T::into_column(event.particles.iter().take(n).map(f).collect())
}

/// Copy `event` into `buffer`, keeping at most `max_particles` particles.
///
/// Returns the number of particles stored. `Particle_d1` is the first stored
/// outgoing particle of a particle's end vertex and `Particle_d2` the last
/// one when there are at least two. Missing daughters are `-1`.
pub fn fill_buffer(
    event: &GenEvent,
    buffer: &mut EventBuffer,
    max_particles: usize,
) -> Result<usize> {
    let n = event.particles.len().min(max_particles);
    if n < event.particles.len() {
        tracing::warn!(
            event = event.number,
            particles = event.particles.len(),
            max_particles,
            "particle list truncated"
        );
    }

    buffer.set_scalar("Event_number", event.number)?;
    buffer.set_scalar("Event_numberMP", event.mpi)?;
    buffer.set_scalar("Event_scale", event.scale)?;
    buffer.set_scalar("Event_alphaQCD", event.alpha_qcd)?;
    buffer.set_scalar("Event_alphaQED", event.alpha_qed)?;
    buffer.set_scalar("Event_processID", event.process_id)?;
    buffer.set_scalar("Event_barcodeSPV", event.signal_vertex)?;
    buffer.set_scalar("Event_numberV", to_i32(event.n_vertices, "vertex count")?)?;
    buffer.set_scalar("Event_barcodeBP1", event.beam1)?;
    buffer.set_scalar("Event_barcodeBP2", event.beam2)?;
    buffer.set_scalar(PARTICLE_COUNTER, to_i32(n, "particle count")?)?;

    let xs = event.cross_section.unwrap_or_default();
    buffer.set_scalar("Xsection_value", xs.value)?;
    buffer.set_scalar("Xsection_error", xs.error)?;

    let pdf = event.pdf.unwrap_or_default();
    buffer.set_scalar("PDF_parton1", pdf.parton1)?;
    buffer.set_scalar("PDF_parton2", pdf.parton2)?;
    buffer.set_scalar("PDF_x1", pdf.x1)?;
    buffer.set_scalar("PDF_x2", pdf.x2)?;
    buffer.set_scalar("PDF_Q2", pdf.q2)?;
    buffer.set_scalar("PDF_x1f", pdf.x1f)?;
    buffer.set_scalar("PDF_x2f", pdf.x2f)?;
    buffer.set_scalar("PDF_id1", pdf.id1)?;
    buffer.set_scalar("PDF_id2", pdf.id2)?;

    buffer.set_array("Particle_x", (0..n).map(|i| vertex_of(event, i).x).collect())?;
    buffer.set_array("Particle_y", (0..n).map(|i| vertex_of(event, i).y).collect())?;
    buffer.set_array("Particle_z", (0..n).map(|i| vertex_of(event, i).z).collect())?;
    buffer.set_array("Particle_ctau", (0..n).map(|i| vertex_of(event, i).ctau).collect())?;

    buffer.set_column("Particle_barcode", particle_column(event, n, |p| p.barcode))?;
    buffer.set_column("Particle_pid", particle_column(event, n, |p| p.pid))?;
    buffer.set_column("Particle_px", particle_column(event, n, |p| p.px))?;
    buffer.set_column("Particle_py", particle_column(event, n, |p| p.py))?;
    buffer.set_column("Particle_pz", particle_column(event, n, |p| p.pz))?;
    buffer.set_column("Particle_energy", particle_column(event, n, |p| p.energy))?;
    buffer.set_column("Particle_mass", particle_column(event, n, |p| p.mass))?;
    buffer.set_column("Particle_status", particle_column(event, n, |p| p.status))?;

    let vertex_index = event.vertex_index();
    let mut d1 = Vec::with_capacity(n);
    let mut d2 = Vec::with_capacity(n);
    for p in event.particles.iter().take(n) {
        let kept: Vec<usize> = vertex_index
            .get(&p.end_vertex)
            .map(|&vi| event.vertices[vi].outgoing.iter().copied().filter(|&k| k < n).collect())
            .unwrap_or_default();
        match kept.as_slice() {
            [] => {
                d1.push(-1);
                d2.push(-1);
            }
            [only] => {
                d1.push(to_i32(*only, "daughter index")?);
                d2.push(-1);
            }
            [first, .., last] => {
                d1.push(to_i32(*first, "daughter index")?);
                d2.push(to_i32(*last, "daughter index")?);
            }
        }
    }
    buffer.set_array("Particle_d1", d1)?;
    buffer.set_array("Particle_d2", d2)?;
    Ok(n)
}

/// Options of [`convert_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    /// Output tree name.
    pub tree: String,
    /// Maximum particles stored per event.
    pub max_particles: usize,
    /// Entries between row-group flushes.
    pub save_count: usize,
    /// Stop after this many events.
    pub max_events: Option<usize>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            tree: TREE_NAME.to_string(),
            max_particles: MAX_PARTICLES,
            save_count: DEFAULT_SAVE_COUNT,
            max_events: None,
        }
    }
}

/// Result of [`convert_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertSummary {
    /// Output file.
    pub output: PathBuf,
    /// HepMC version of the input.
    pub version: String,
    /// Events written.
    pub events: usize,
    /// Events whose particle list was truncated.
    pub truncated: usize,
}

/// Default output name: `<nameonly(input)>.parquet`.
pub fn default_output(input: &Path) -> PathBuf {
    let stem = tnm_core::text::nameonly(&input.to_string_lossy());
    PathBuf::from(format!("{stem}.parquet"))
}

/// Convert a HepMC file into a Parquet ntuple.
///
/// Each event's first weight (or 1) is stored as `eventWeight`.
pub fn convert_file(input: &Path, output: &Path, opts: &ConvertOptions) -> Result<ConvertSummary> {
    let mut reader = HepMcReader::open(input)?;
    tracing::info!(input = %input.display(), version = reader.version(), "HepMC file");

    let mut buffer = EventBuffer::new(ntuple_schema()?);
    let mut out = OutputFile::skim(output, &buffer, &opts.tree, opts.save_count)?;
    let mut events = 0usize;
    let mut truncated = 0usize;
    while opts.max_events.is_none_or(|max| events < max) {
        let Some(event) = reader.next_event()? else { break };
        if events % 1000 == 0 {
            tracing::info!(events, "converting");
        }
        let n = fill_buffer(&event, &mut buffer, opts.max_particles)?;
        if n < event.particles.len() {
            truncated += 1;
        }
        out.count("events", event.weight());
        out.write(&mut buffer, event.weight())?;
        events += 1;
    }
    let summary = out.close()?;
    tracing::info!(events, output = %summary.path.display(), "converted");
    Ok(ConvertSummary {
        output: summary.path,
        version: reader.version().to_string(),
        events,
        truncated,
    })
}
