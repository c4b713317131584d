//! Small kinematics helpers used by analyzers.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Azimuthal separation, folded onto `[0, π]` when it exceeds π.
///
/// Inside `(-π, π]` the signed difference `phi2 - phi1` is returned.
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    let dphi = phi2 - phi1;
    if dphi.abs() > PI { 2.0 * PI - dphi.abs() } else { dphi }
}

/// `ΔR = sqrt(Δη² + Δφ²)`.
pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    let deta = eta1 - eta2;
    let dphi = delta_phi(phi1, phi2);
    (deta * deta + dphi * dphi).sqrt()
}

/// Transverse momentum, pseudorapidity and azimuth of a 3-momentum.
///
/// Pseudorapidity is `±∞` along the beam axis.
pub fn kinematics(px: f64, py: f64, pz: f64) -> (f64, f64, f64) {
    let pt = px.hypot(py);
    let phi = py.atan2(px);
    let eta = if pt > 0.0 {
        (pz / pt).asinh()
    } else if pz >= 0.0 {
        f64::INFINITY
    } else {
        f64::NEG_INFINITY
    };
    (pt, eta, phi)
}

/// A reconstructed or generated object with the standard attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PtThing {
    /// Position of the object in its source arrays.
    pub index: usize,
    /// Identifier (typically the PDG ID).
    pub id: i32,
    /// Transverse momentum.
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuth.
    pub phi: f64,
    /// Display name.
    pub name: String,
    /// Additional variables.
    pub var: BTreeMap<String, f64>,
}

impl PtThing {
    /// Create a thing without a name or extra variables.
    pub fn new(index: usize, id: i32, pt: f64, eta: f64, phi: f64) -> Self {
        Self { index, id, pt, eta, phi, name: String::new(), var: BTreeMap::new() }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// `ΔR` between this thing and another.
    pub fn delta_r(&self, other: &PtThing) -> f64 {
        delta_r(self.eta, self.phi, other.eta, other.phi)
    }

    /// Whether `other` lies within `drcut` of this thing (0.4 is customary).
    pub fn matches(&self, other: &PtThing, drcut: f64) -> bool {
        self.delta_r(other) < drcut
    }

    /// Ordering that puts higher `pt` first.
    pub fn cmp_pt_desc(&self, other: &PtThing) -> Ordering {
        other.pt.total_cmp(&self.pt)
    }
}

/// Sort in descending `pt`.
pub fn sort_by_pt(things: &mut [PtThing]) {
    things.sort_by(PtThing::cmp_pt_desc);
}

/// Pair of positions in two lists and their separation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPair {
    /// Position in the first list.
    pub first: usize,
    /// Position in the second list.
    pub second: usize,
    /// `ΔR` between the two.
    pub distance: f64,
}

/// For each element of `v1`, the closest element of `v2` in `ΔR`.
///
/// Returns an empty list when either input is empty. Pairs are not exclusive:
/// several elements of `v1` may match the same element of `v2`.
pub fn match_by_delta_r(v1: &[PtThing], v2: &[PtThing]) -> Vec<MatchedPair> {
    if v2.is_empty() {
        return Vec::new();
    }
    v1.iter()
        .enumerate()
        .filter_map(|(i, a)| {
            v2.iter()
                .enumerate()
                .map(|(j, b)| MatchedPair { first: i, second: j, distance: a.delta_r(b) })
                .min_by(|x, y| x.distance.total_cmp(&y.distance))
        })
        .collect()
}
