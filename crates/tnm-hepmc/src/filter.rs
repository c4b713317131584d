//! Decay-based event filter for HepMC files.
//!
//! A filter such as `"35 15 -15, 35 6 -6"` keeps events in which particle 35
//! decays either to `15 -15` or to `6 -6`. Several parents may be given; an
//! event must satisfy one requested decay of every parent.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tnm_core::{Error, Result};

use crate::reader::{END_LISTING, GenEvent, HepMcReader};

/// Requested decays, keyed by parent PDG ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecayFilter {
    decays: BTreeMap<i32, Vec<Vec<i32>>>,
}

impl DecayFilter {
    /// Parse comma-separated `parent daughter...` groups.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut decays: BTreeMap<i32, Vec<Vec<i32>>> = BTreeMap::new();
        for group in spec.split(',') {
            let ids = group
                .split_whitespace()
                .map(|t| {
                    t.parse::<i32>().map_err(|_| {
                        let decay = group.trim();
                        Error::Validation(format!("invalid PDG id '{t}' in decay '{decay}'"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let Some((&parent, daughters)) = ids.split_first() else {
                return Err(Error::Validation(format!("empty decay in '{spec}'")));
            };
            decays.entry(parent).or_default().push(daughters.to_vec());
        }
        Ok(Self { decays })
    }

    /// Requested parent PDG IDs.
    pub fn parents(&self) -> impl Iterator<Item = i32> + '_ {
        self.decays.keys().copied()
    }

    /// Requested decays of `parent`.
    pub fn decays_of(&self, parent: i32) -> &[Vec<i32>] {
        self.decays.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the event contains a requested decay of every parent.
    ///
    /// When a parent appears several times, its last instance is used.
    pub fn keep(&self, event: &GenEvent) -> bool {
        let mut last: HashMap<i32, i32> = HashMap::new();
        for p in &event.particles {
            if self.decays.contains_key(&p.pid) {
                last.insert(p.pid, p.end_vertex);
            }
        }

        self.decays.iter().all(|(parent, decays)| {
            let Some(vertex) = last.get(parent).and_then(|&bc| event.vertex(bc)) else {
                return false;
            };
            let daughters: HashSet<i32> =
                vertex.outgoing.iter().map(|&i| event.particles[i].pid).collect();
            decays.iter().any(|d| d.iter().all(|pid| daughters.contains(pid)))
        })
    }
}

impl FromStr for DecayFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for DecayFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut groups = Vec::new();
        for (parent, decays) in &self.decays {
            for d in decays {
                let mut ids = vec![parent.to_string()];
                ids.extend(d.iter().map(i32::to_string));
                groups.push(ids.join(" "));
            }
        }
        f.write_str(&groups.join(", "))
    }
}

/// Counts reported by [`filter_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSummary {
    /// Output file.
    pub output: PathBuf,
    /// Events read.
    pub events_in: usize,
    /// Events kept.
    pub events_out: usize,
}

impl FilterSummary {
    /// Fraction of events kept (0 for an empty input).
    pub fn fraction(&self) -> f64 {
        if self.events_in == 0 { 0.0 } else { self.events_out as f64 / self.events_in as f64 }
    }
}

impl fmt::Display for FilterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary")?;
        writeln!(f, "    events(in):    {:10}", self.events_in)?;
        writeln!(f, "    events(out):   {:10}", self.events_out)?;
        write!(f, "    fraction:      {:10.3e}", self.fraction())
    }
}

/// Default output name: `filtered_<nameonly(input)>.hepmc`.
pub fn default_output(input: &Path) -> PathBuf {
    let stem = tnm_core::text::nameonly(&input.to_string_lossy());
    PathBuf::from(format!("filtered_{stem}.hepmc"))
}

/// Copy the header and every kept event of `input` to `output`.
pub fn filter_file(input: &Path, output: &Path, filter: &DecayFilter) -> Result<FilterSummary> {
    let mut reader = HepMcReader::open(input)?;
    let file = File::create(output)
        .map_err(|e| Error::Validation(format!("failed to create {}: {e}", output.display())))?;
    let mut out = BufWriter::new(file);
    for line in reader.header() {
        writeln!(out, "{line}")?;
    }

    let mut events_in = 0usize;
    let mut events_out = 0usize;
    while let Some(event) = reader.next_event()? {
        events_in += 1;
        if filter.keep(&event) {
            events_out += 1;
            for line in &event.lines {
                writeln!(out, "{line}")?;
            }
        }
        if events_in % 100 == 0 {
            tracing::debug!(events_in, events_out, "filtering");
        }
    }
    writeln!(out, "{END_LISTING}")?;
    out.flush()?;

    let summary = FilterSummary { output: output.to_path_buf(), events_in, events_out };
    tracing::info!(events_in, events_out, output = %output.display(), "filtered");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::SAMPLE;

    fn events() -> Vec<GenEvent> {
        HepMcReader::new(SAMPLE.as_bytes()).unwrap().map(|e| e.unwrap()).collect()
    }

    #[test]
    fn parse_groups_by_parent() {
        let f = DecayFilter::parse("35 15 -15, 35 6 -6, 23 13 -13").unwrap();
        assert_eq!(f.parents().collect::<Vec<_>>(), vec![23, 35]);
        assert_eq!(f.decays_of(35), &[vec![15, -15], vec![6, -6]]);
        assert_eq!(f.to_string(), "23 13 -13, 35 15 -15, 35 6 -6");
        assert!(DecayFilter::parse("35 15, ").is_err());
        assert!(DecayFilter::parse("35 tau").unwrap_err().to_string().contains("'tau'"));
        assert!("".parse::<DecayFilter>().is_err());
    }

    #[test]
    fn keep_requires_every_parent_decay() {
        let ev = events();
        let taus: DecayFilter = "35 15 -15".parse().unwrap();
        assert!(taus.keep(&ev[0]));
        assert!(!taus.keep(&ev[1]));

        let either: DecayFilter = "35 6 -6, 35 -15 15".parse().unwrap();
        assert!(either.keep(&ev[0]));

        let tops = DecayFilter::parse("35 6 -6").unwrap();
        assert!(!tops.keep(&ev[0]));

        // 15 is present but has no end vertex
        let tau_decay = DecayFilter::parse("35 15 -15, 15 16").unwrap();
        assert!(!tau_decay.keep(&ev[0]));
    }

    #[test]
    fn summary_fraction() {
        let s = FilterSummary { output: PathBuf::from("x"), events_in: 4, events_out: 1 };
        assert_eq!(s.fraction(), 0.25);
        assert!(s.to_string().contains("events(out):"));
        assert_eq!(FilterSummary { events_in: 0, ..s }.fraction(), 0.0);
        assert_eq!(
            default_output(Path::new("a/b/susy200.hepmc")),
            PathBuf::from("filtered_susy200.hepmc")
        );
    }
}
