//! Line reader for the HepMC2 `IO_GenEvent` ASCII format.
//!
//! ```text
//! HepMC::Version 2.06.09
//! HepMC::IO_GenEvent-START_EVENT_LISTING
//! E 1 -1 -1.0 0.0078 0.118 0 1 3 1 2 0 1 1.0
//! C 1.2e3 4.5
//! V -1 0 0 0 0 0 2 1 0
//! P 1 2212 0 0 6500 6500 0.938 4 0 0 -1 0
//! P 2 2212 0 0 -6500 6500 0.938 4 0 0 -1 0
//! P 3 25 0 0 0 125 125 2 0 0 -2 0
//! ...
//! HepMC::IO_GenEvent-END_EVENT_LISTING
//! ```
//!
//! Each `V` line is followed by its `n_orphan` incoming and `n_out` outgoing
//! `P` lines. An event is complete once its declared number of vertices has
//! been read.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use tnm_core::{Error, Result};

/// Version line prefix.
pub const VERSION_PREFIX: &str = "HepMC::Version";

/// Line closing an event listing.
pub const END_LISTING: &str = "HepMC::IO_GenEvent-END_EVENT_LISTING";

/// Cross section in pb.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CrossSection {
    /// Value.
    pub value: f64,
    /// Uncertainty.
    pub error: f64,
}

/// Parton distribution information of the hard process.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PdfInfo {
    /// PDG ID of the first parton.
    pub parton1: i32,
    /// PDG ID of the second parton.
    pub parton2: i32,
    /// Momentum fraction of the first parton.
    pub x1: f64,
    /// Momentum fraction of the second parton.
    pub x2: f64,
    /// Factorisation scale squared.
    pub q2: f64,
    /// `x * f(x)` of the first parton.
    pub x1f: f64,
    /// `x * f(x)` of the second parton.
    pub x2f: f64,
    /// LHAPDF set of the first beam.
    pub id1: i32,
    /// LHAPDF set of the second beam.
    pub id2: i32,
}

/// An interaction vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct GenVertex {
    /// Barcode (negative by convention).
    pub barcode: i32,
    /// Vertex status / id.
    pub id: i32,
    /// Position x.
    pub x: f64,
    /// Position y.
    pub y: f64,
    /// Position z.
    pub z: f64,
    /// Proper time `c * tau`.
    pub ctau: f64,
    /// Positions in [`GenEvent::particles`] of incoming particles listed here.
    pub incoming: Vec<usize>,
    /// Positions in [`GenEvent::particles`] of outgoing particles.
    pub outgoing: Vec<usize>,
}

/// A particle.
#[derive(Debug, Clone, PartialEq)]
pub struct GenParticle {
    /// Barcode.
    pub barcode: i32,
    /// PDG ID.
    pub pid: i32,
    /// Momentum x.
    pub px: f64,
    /// Momentum y.
    pub py: f64,
    /// Momentum z.
    pub pz: f64,
    /// Energy.
    pub energy: f64,
    /// Generated mass.
    pub mass: f64,
    /// Status code.
    pub status: i32,
    /// Polarisation theta.
    pub theta: f64,
    /// Polarisation phi.
    pub phi: f64,
    /// Barcode of the end vertex, 0 when the particle does not decay.
    pub end_vertex: i32,
    /// Position in [`GenEvent::vertices`] of the vertex it is listed under.
    pub vertex: usize,
}

/// One event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenEvent {
    /// Event number.
    pub number: i32,
    /// Number of multi-parton interactions.
    pub mpi: i32,
    /// Event scale.
    pub scale: f64,
    /// alpha_QCD.
    pub alpha_qcd: f64,
    /// alpha_QED.
    pub alpha_qed: f64,
    /// Signal process id.
    pub process_id: i32,
    /// Barcode of the signal process vertex.
    pub signal_vertex: i32,
    /// Declared number of vertices.
    pub n_vertices: usize,
    /// Barcode of beam particle 1.
    pub beam1: i32,
    /// Barcode of beam particle 2.
    pub beam2: i32,
    /// Random number generator states.
    pub random_states: Vec<i64>,
    /// Event weights.
    pub weights: Vec<f64>,
    /// Cross section (`C` line).
    pub cross_section: Option<CrossSection>,
    /// PDF information (`F` line).
    pub pdf: Option<PdfInfo>,
    /// Vertices in listing order.
    pub vertices: Vec<GenVertex>,
    /// Particles in listing order.
    pub particles: Vec<GenParticle>,
    /// Raw lines of the event, `E` line first, without line terminators.
    pub lines: Vec<String>,
}

impl GenEvent {
    /// First weight, or 1 when the event carries none.
    pub fn weight(&self) -> f64 {
        self.weights.first().copied().unwrap_or(1.0)
    }

    /// Vertex with the given barcode.
    pub fn vertex(&self, barcode: i32) -> Option<&GenVertex> {
        self.vertices.iter().find(|v| v.barcode == barcode)
    }

    /// Map from vertex barcode to position in [`vertices`](Self::vertices).
    pub fn vertex_index(&self) -> HashMap<i32, usize> {
        self.vertices.iter().enumerate().map(|(i, v)| (v.barcode, i)).collect()
    }

    /// Outgoing particles of the end vertex of particle `index`.
    pub fn daughters(&self, index: usize) -> &[usize] {
        self.particles
            .get(index)
            .and_then(|p| self.vertex(p.end_vertex))
            .map(|v| v.outgoing.as_slice())
            .unwrap_or(&[])
    }
}

struct Tokens<'a> {
    line_no: usize,
    kind: &'a str,
    tokens: Vec<&'a str>,
}

impl<'a> Tokens<'a> {
    fn new(line_no: usize, line: &'a str) -> Self {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let kind = tokens.first().copied().unwrap_or_default();
        Self { line_no, kind, tokens }
    }

    fn len(&self) -> usize {
        self.tokens.len()
    }

    fn get<T: FromStr>(&self, i: usize, what: &str) -> Result<T> {
        let tok = self.tokens.get(i).ok_or_else(|| {
            Error::Format(format!(
                "line {}: '{}' record has no {what} (field {i})",
                self.line_no, self.kind
            ))
        })?;
        tok.parse().map_err(|_| {
            Error::Format(format!("line {}: invalid {what} '{tok}'", self.line_no))
        })
    }
}

/// Streaming reader of [`GenEvent`]s.
pub struct HepMcReader<R> {
    input: R,
    line_no: usize,
    peeked: Option<String>,
    version: String,
    header: Vec<String>,
    done: bool,
}

impl HepMcReader<BufReader<File>> {
    /// Open a HepMC file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::Validation(format!("can't open HepMC file {}: {e}", path.display()))
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: BufRead> HepMcReader<R> {
    /// Read the header (version line and listing start).
    pub fn new(input: R) -> Result<Self> {
        let mut reader = Self {
            input,
            line_no: 0,
            peeked: None,
            version: String::new(),
            header: Vec::new(),
            done: false,
        };

        loop {
            let Some(line) = reader.next_line()? else {
                return Err(Error::Format("no HepMC::Version line found".into()));
            };
            let trimmed = line.trim().to_string();
            reader.header.push(line);
            if trimmed.is_empty() {
                continue;
            }
            let mut tokens = trimmed.split_whitespace();
            if tokens.next() != Some(VERSION_PREFIX) {
                return Err(Error::Format(format!(
                    "line {}: expected '{VERSION_PREFIX}', found '{trimmed}'",
                    reader.line_no
                )));
            }
            reader.version = tokens.next().unwrap_or_default().to_string();
            break;
        }

        // start of listing
        if let Some(line) = reader.next_line()? {
            reader.header.push(line);
        }
        Ok(reader)
    }

    /// HepMC version from the header.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Header lines, as read.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.peeked.take() {
            return Ok(Some(line));
        }
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        let len = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(len);
        Ok(Some(line))
    }

    fn peek_line(&mut self) -> Result<Option<&str>> {
        if self.peeked.is_none() {
            self.peeked = self.next_line()?;
        }
        Ok(self.peeked.as_deref())
    }

    /// Read the next event, or `None` at the end of the listing.
    pub fn next_event(&mut self) -> Result<Option<GenEvent>> {
        if self.done {
            return Ok(None);
        }

        let e_line = loop {
            let Some(line) = self.next_line()? else {
                self.done = true;
                return Ok(None);
            };
            if line.starts_with('E') {
                break line;
            }
            if line.starts_with(END_LISTING) {
                self.done = true;
                return Ok(None);
            }
        };

        let mut event = parse_event_line(&Tokens::new(self.line_no, &e_line))?;
        event.lines.push(e_line);

        loop {
            if event.n_vertices > 0 && event.vertices.len() >= event.n_vertices {
                return Ok(Some(event));
            }
            let next = self.peek_line()?;
            let at_boundary = next.is_none_or(|l| l.starts_with('E') || l.starts_with("HepMC::"));
            if at_boundary {
                if event.vertices.len() < event.n_vertices {
                    return Err(Error::Format(format!(
                        "event {}: expected {} vertices, found {}",
                        event.number,
                        event.n_vertices,
                        event.vertices.len()
                    )));
                }
                return Ok(Some(event));
            }

            let Some(line) = self.next_line()? else {
                return Ok(Some(event));
            };
            let tokens = Tokens::new(self.line_no, &line);
            match tokens.kind {
                "C" => {
                    event.cross_section = Some(CrossSection {
                        value: tokens.get(1, "value")?,
                        error: tokens.get(2, "error")?,
                    });
                }
                "F" => event.pdf = Some(parse_pdf_line(&tokens)?),
                "V" => {
                    let (vertex, n_orphan, n_out) = parse_vertex_line(&tokens)?;
                    event.lines.push(line);
                    self.read_vertex_particles(&mut event, vertex, n_orphan, n_out)?;
                    continue;
                }
                _ => {}
            }
            event.lines.push(line);
        }
    }

    fn read_vertex_particles(
        &mut self,
        event: &mut GenEvent,
        mut vertex: GenVertex,
        n_orphan: usize,
        n_out: usize,
    ) -> Result<()> {
        let vi = event.vertices.len();
        for k in 0..n_orphan.saturating_add(n_out) {
            let Some(line) = self.next_line()? else {
                return Err(Error::Format(format!(
                    "event {}: end of file inside vertex {}",
                    event.number, vertex.barcode
                )));
            };
            let tokens = Tokens::new(self.line_no, &line);
            if tokens.kind != "P" {
                return Err(Error::Format(format!(
                    "faulty event record at line {}: {line}",
                    self.line_no
                )));
            }
            let particle = parse_particle_line(&tokens, vi)?;
            let pi = event.particles.len();
            event.particles.push(particle);
            if k < n_orphan {
                vertex.incoming.push(pi);
            } else {
                vertex.outgoing.push(pi);
            }
            event.lines.push(line);
        }
        event.vertices.push(vertex);
        Ok(())
    }
}

impl<R: BufRead> Iterator for HepMcReader<R> {
    type Item = Result<GenEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn parse_event_line(t: &Tokens<'_>) -> Result<GenEvent> {
    let mut event = GenEvent {
        number: t.get(1, "event number")?,
        mpi: t.get(2, "MPI count")?,
        scale: t.get(3, "scale")?,
        alpha_qcd: t.get(4, "alpha_QCD")?,
        alpha_qed: t.get(5, "alpha_QED")?,
        process_id: t.get(6, "process id")?,
        signal_vertex: t.get(7, "signal vertex barcode")?,
        n_vertices: t.get(8, "vertex count")?,
        beam1: t.get(9, "beam 1 barcode")?,
        beam2: t.get(10, "beam 2 barcode")?,
        ..GenEvent::default()
    };

    // optional trailer: n_rng rng... n_weights weights...
    let mut i = 11;
    if t.len() > i {
        let n_rng: usize = t.get(i, "RNG state count")?;
        event.random_states =
            (0..n_rng).map(|k| t.get(i + 1 + k, "RNG state")).collect::<Result<_>>()?;
        i += 1 + n_rng;
    }
    if t.len() > i {
        let n_weights: usize = t.get(i, "weight count")?;
        event.weights =
            (0..n_weights).map(|k| t.get(i + 1 + k, "weight")).collect::<Result<_>>()?;
    }
    Ok(event)
}

fn parse_pdf_line(t: &Tokens<'_>) -> Result<PdfInfo> {
    Ok(PdfInfo {
        parton1: t.get(1, "parton 1")?,
        parton2: t.get(2, "parton 2")?,
        x1: t.get(3, "x1")?,
        x2: t.get(4, "x2")?,
        q2: t.get(5, "Q2")?,
        x1f: t.get(6, "x1f")?,
        x2f: t.get(7, "x2f")?,
        id1: t.get(8, "PDF id 1")?,
        id2: t.get(9, "PDF id 2")?,
    })
}

fn parse_vertex_line(t: &Tokens<'_>) -> Result<(GenVertex, usize, usize)> {
    let vertex = GenVertex {
        barcode: t.get(1, "vertex barcode")?,
        id: t.get(2, "vertex id")?,
        x: t.get(3, "x")?,
        y: t.get(4, "y")?,
        z: t.get(5, "z")?,
        ctau: t.get(6, "ctau")?,
        incoming: Vec::new(),
        outgoing: Vec::new(),
    };
    Ok((vertex, t.get(7, "orphan count")?, t.get(8, "outgoing count")?))
}

fn parse_particle_line(t: &Tokens<'_>, vertex: usize) -> Result<GenParticle> {
    Ok(GenParticle {
        barcode: t.get(1, "particle barcode")?,
        pid: t.get(2, "PDG id")?,
        px: t.get(3, "px")?,
        py: t.get(4, "py")?,
        pz: t.get(5, "pz")?,
        energy: t.get(6, "energy")?,
        mass: t.get(7, "mass")?,
        status: t.get(8, "status")?,
        theta: t.get(9, "theta")?,
        phi: t.get(10, "phi")?,
        end_vertex: t.get(11, "end vertex barcode")?,
        vertex,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two events: a Higgs decaying to tau pairs, then a Z to muons.
    pub(crate) const SAMPLE: &str = "\
HepMC::Version 2.06.09
HepMC::IO_GenEvent-START_EVENT_LISTING
E 1 -1 -1.0 7.8e-03 1.18e-01 0 -2 2 1 2 0 1 0.5
N 1 \"0\"
U GEV MM
C 1.25e+01 3.0e-01
F 21 21 1.0e-01 2.0e-01 1.6e+04 3.0e-01 4.0e-01 0 0
V -1 0 0 0 0 0 2 1 0
P 1 2212 0 0 6500 6500 0.938 4 0 0 -1 0
P 2 2212 0 0 -6500 6500 0.938 4 0 0 -1 0
P 3 35 1 2 3 300 250 2 0 0 -2 0
V -2 0 0.1 0.2 0.3 0.4 0 2 0
P 4 15 50 0 10 140 1.777 1 0 0 0 0
P 5 -15 -49 2 -7 160 1.777 1 0 0 0 0
E 2 -1 -1.0 7.8e-03 1.18e-01 0 -1 1 1 2 0 0
V -1 0 0 0 0 0 2 2 0
P 1 2212 0 0 6500 6500 0.938 4 0 0 -1 0
P 2 2212 0 0 -6500 6500 0.938 4 0 0 -1 0
P 3 13 20 0 0 30 0.105 1 0 0 0 0
P 4 -13 -20 0 0 30 0.105 1 0 0 0 0
HepMC::IO_GenEvent-END_EVENT_LISTING
";

    #[test]
    fn reads_header_and_events() {
        let mut r = HepMcReader::new(SAMPLE.as_bytes()).unwrap();
        assert_eq!(r.version(), "2.06.09");
        assert_eq!(r.header().len(), 2);

        let e = r.next_event().unwrap().unwrap();
        assert_eq!(e.number, 1);
        assert_eq!(e.n_vertices, 2);
        assert_eq!(e.weights, vec![0.5]);
        assert_eq!(e.weight(), 0.5);
        assert_eq!(e.cross_section, Some(CrossSection { value: 12.5, error: 0.3 }));
        assert_eq!(e.pdf.unwrap().q2, 1.6e4);
        assert_eq!(e.particles.len(), 5);
        assert_eq!(e.vertices[0].incoming, vec![0, 1]);
        assert_eq!(e.vertices[0].outgoing, vec![2]);
        assert_eq!(e.daughters(2), &[3, 4]);
        assert!(e.daughters(3).is_empty());
        assert_eq!(e.particles[4].vertex, 1);
        assert_eq!(e.lines.len(), 12);
        assert!(e.lines[0].starts_with("E 1"));

        let e = r.next_event().unwrap().unwrap();
        assert_eq!(e.number, 2);
        assert!(e.weights.is_empty());
        assert_eq!(e.weight(), 1.0);
        assert!(e.cross_section.is_none());
        assert_eq!(e.particles.len(), 4);

        assert!(r.next_event().unwrap().is_none());
        assert!(r.next_event().unwrap().is_none());
    }

    #[test]
    fn iterator_yields_every_event() {
        let r = HepMcReader::new(SAMPLE.as_bytes()).unwrap();
        let numbers: Vec<i32> = r.map(|e| e.unwrap().number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn missing_version_is_an_error() {
        let err = HepMcReader::new("\n\nE 1 2 3\n".as_bytes()).err().unwrap();
        assert!(err.to_string().contains("HepMC::Version"));
        assert!(HepMcReader::new("".as_bytes()).is_err());
    }

    #[test]
    fn non_particle_line_in_vertex_is_faulty() {
        let text = "HepMC::Version 2.06.09\nSTART\nE 1 -1 0 0 0 0 -1 1 1 2 0 0\nV -1 0 0 0 0 0 0 2 0\nP 1 11 0 0 1 1 0 1 0 0 0 0\nV -2 0 0 0 0 0 0 1 0\n";
        let mut r = HepMcReader::new(text.as_bytes()).unwrap();
        let err = r.next_event().unwrap_err();
        assert!(err.to_string().contains("faulty event record"));
    }

    #[test]
    fn truncated_events_are_errors() {
        let eof_in_vertex = "HepMC::Version 2\nSTART\nE 1 -1 0 0 0 0 -1 1 1 2 0 0\nV -1 0 0 0 0 0 0 2 0\nP 1 11 0 0 1 1 0 1 0 0 0 0\n";
        let mut r = HepMcReader::new(eof_in_vertex.as_bytes()).unwrap();
        assert!(r.next_event().unwrap_err().to_string().contains("end of file"));

        let missing_vertex = "HepMC::Version 2\nSTART\nE 1 -1 0 0 0 0 -1 2 1 2 0 0\nV -1 0 0 0 0 0 0 0 0\nE 2 -1 0 0 0 0 -1 0 1 2 0 0\n";
        let mut r = HepMcReader::new(missing_vertex.as_bytes()).unwrap();
        assert!(r.next_event().unwrap_err().to_string().contains("expected 2 vertices"));
    }

    #[test]
    fn bad_numbers_name_the_field() {
        let text = "HepMC::Version 2\nSTART\nE one -1 0 0 0 0 -1 0 1 2\n";
        let mut r = HepMcReader::new(text.as_bytes()).unwrap();
        let err = r.next_event().unwrap_err().to_string();
        assert!(err.contains("invalid event number 'one'"), "{err}");
    }
}
