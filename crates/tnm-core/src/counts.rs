//! Labelled event counts (a cut-flow table).
//!
//! Bins are created on first fill and keep their creation order, like a
//! ROOT histogram with alphanumeric, extendable bin labels.

use serde::{Deserialize, Serialize};

/// One labelled bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountBin {
    /// Bin label (the condition name).
    pub label: String,
    /// Sum of weights.
    pub sumw: f64,
    /// Sum of squared weights.
    pub sumw2: f64,
    /// Number of fills.
    pub entries: u64,
}

impl CountBin {
    /// Statistical uncertainty `sqrt(sumw2)`.
    pub fn error(&self) -> f64 {
        self.sumw2.sqrt()
    }
}

/// Ordered collection of [`CountBin`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counts {
    bins: Vec<CountBin>,
}

impl Counts {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `weight` to the bin labelled `label`, creating it if needed.
    pub fn fill(&mut self, label: &str, weight: f64) {
        let bin = match self.bins.iter().position(|b| b.label == label) {
            Some(i) => &mut self.bins[i],
            None => {
                self.bins.push(CountBin {
                    label: label.to_string(),
                    sumw: 0.0,
                    sumw2: 0.0,
                    entries: 0,
                });
                let last = self.bins.len() - 1;
                &mut self.bins[last]
            }
        };
        bin.sumw += weight;
        bin.sumw2 += weight * weight;
        bin.entries += 1;
    }

    /// Bin with the given label.
    pub fn get(&self, label: &str) -> Option<&CountBin> {
        self.bins.iter().find(|b| b.label == label)
    }

    /// All bins in creation order.
    pub fn bins(&self) -> &[CountBin] {
        &self.bins
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Whether no bin was filled.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Fixed-width table, one bin per line.
    pub fn table(&self) -> String {
        let mut out = String::new();
        for b in &self.bins {
            out.push_str(&format!(
                "{:<32} {:>12.4} +/- {:<10.4} ({} entries)\n",
                b.label,
                b.sumw,
                b.error(),
                b.entries
            ));
        }
        out
    }
}
