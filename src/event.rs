//! Per-event physics records: reconstructed calorimeter clusters and truth particles.
//!
//! Energies, masses and momenta are in MeV, the native unit of the input files.

use std::cmp::Ordering;

use crate::kinematics::pt_from_energy;

/// Name of the reconstructed cluster collection in the input table.
pub const CLUSTER_COLLECTION: &str = "CaloCalTopoClusters";
/// Name of the truth particle collection in the input table.
pub const PARTICLE_COLLECTION: &str = "TruthParticles";
/// PDG code of the positive charged pion.
pub const PDG_PION: i64 = 211;
/// MeV per GeV.
pub const MEV_PER_GEV: f64 = 1000.0;

/// A topological calorimeter cluster.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cluster {
    /// Uncalibrated energy.
    pub raw_e: f64,
    /// Uncalibrated mass.
    pub raw_m: f64,
    /// Uncalibrated pseudorapidity.
    pub raw_eta: f64,
    /// Uncalibrated azimuth.
    pub raw_phi: f64,
    /// Calibrated azimuth.
    pub phi: f64,
    /// Calibrated mass.
    pub m: f64,
}

impl Cluster {
    /// Transverse momentum reconstructed from the raw energy, mass and pseudorapidity.
    pub fn raw_pt(&self) -> f64 {
        pt_from_energy(self.raw_e, self.raw_m, self.raw_eta)
    }
}

/// A generator-level particle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TruthParticle {
    pub pdg_id: i32,
    pub pt: f64,
    pub eta: f64,
}

/// One row of the event table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub event_number: Option<i64>,
    pub clusters: Vec<Cluster>,
    pub particles: Vec<TruthParticle>,
}

impl Event {
    /// Reorder both collections by descending transverse momentum.
    ///
    /// Clusters are ranked by [`Cluster::raw_pt`]; NaN values sort last.
    pub fn sort_by_pt(&mut self) {
        self.clusters
            .sort_by(|a, b| descending_nan_last(a.raw_pt(), b.raw_pt()));
        self.particles.sort_by(|a, b| descending_nan_last(a.pt, b.pt));
    }
}

fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

/// How the leading cluster/particle of an event is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeadingSelection {
    /// Trust the source ordering: the first element is the leading one.
    #[default]
    AssumeSorted,
    /// Sort both collections by descending pT when loading.
    SortByPt,
}
