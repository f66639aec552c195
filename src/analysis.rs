//! The calorimeter cluster pT response analysis.
//!
//! The leading truth particle is the reference for the leading cluster; no geometric
//! matching is done. Events must have at least one cluster, at least one particle, and a
//! positive pion as leading particle.

use std::io::Write;
use std::sync::Arc;

use polars::prelude::*;

use crate::config::AnalysisConfig;
use crate::error::AnalysisResult;
use crate::event::{CLUSTER_COLLECTION, MEV_PER_GEV, PARTICLE_COLLECTION, PDG_PION};
use crate::execution::{ExecutionEngine, ExecutionMetricsSnapshot, StdErrExecutionObserver};
use crate::ingestion::{column_name, open_event_source, FileObserver, SourceObserver, SourceOptions, StdErrObserver};
use crate::kinematics::{pt_from_energy_expr, transverse_momentum_expr};
use crate::output::{write_snapshot_csv, OutputContainer};
use crate::processing::{Axis, CutFlowReport, Frame, Hist1D, Hist3D, HistModel1D, HistModel3D, ResultHandle};
use crate::types::DataSet;

pub const CUT_CLUSTER: &str = "At least 1 cluster";
pub const CUT_PARTICLE: &str = "At least 1 particle";
pub const CUT_PION: &str = "At least 1 pion";

/// Value of `response` when the event has fewer than two clusters.
pub const RESPONSE_SENTINEL: f64 = -1.0;

/// Columns of the selected-events snapshot.
pub const SNAPSHOT_COLUMNS: [&str; 3] = ["eventNumber", "leading_cluster_e", "response"];

pub fn n_clusters_model() -> HistModel1D {
    HistModel1D::new("h_nClusters", "Number of Clusters;N_{Clusters};Events", 20, -0.5, 19.5)
}

pub fn n_particles_model() -> HistModel1D {
    HistModel1D::new("h_nParticles", "Number of Particles;N_{Particles};Events", 20, -0.5, 19.5)
}

pub fn pdg_ids_model() -> HistModel1D {
    HistModel1D::new("h_PDGIDs", "Leading Particle PDGID;PDGID^{lead particle};Events", 1000, 0.0, 1000.0)
}

pub fn leading_cluster_e_model() -> HistModel1D {
    HistModel1D::new(
        "h_leading_cluster_e",
        "Leading Cluster E;E^{lead cluster} [GeV];Events",
        100,
        0.0,
        500.0,
    )
}

pub fn inclusive_response_model() -> HistModel1D {
    HistModel1D::new(
        "h_inclusive_response",
        "Response (inclusive); p_{T,cluster}/p_{T,particle};Events",
        100,
        0.0,
        3.0,
    )
}

pub fn response_model() -> HistModel3D {
    HistModel3D::new(
        "h_response",
        "Response (binned); p_{T,cluster}/p_{T,particle},p_{T,particle},eta;Events",
        Axis::new(50, 0.0, 2.0),
        Axis::new(100, 0.0, 500.0),
        Axis::new(60, -3.0, 3.0),
    )
}

/// First element of a collection attribute column, null for an empty collection.
fn leading(collection: &str, attribute: &str) -> Expr {
    col(column_name(collection, attribute)).list().first()
}

/// Number of elements of a collection, from one of its attribute columns.
fn multiplicity(collection: &str, attribute: &str) -> Expr {
    col(column_name(collection, attribute))
        .list()
        .len()
        .cast(DataType::Int64)
}

/// pT response of the leading cluster with respect to the leading truth particle.
///
/// Reads the `nClusters` column and evaluates to [`RESPONSE_SENTINEL`] when it is below 2.
/// Null when the event has no truth particle.
pub fn response_expr() -> Expr {
    let cluster_pt = pt_from_energy_expr(
        leading(CLUSTER_COLLECTION, "rawE"),
        leading(CLUSTER_COLLECTION, "rawM"),
        leading(CLUSTER_COLLECTION, "rawEta"),
    );
    let cluster = transverse_momentum_expr(cluster_pt, leading(CLUSTER_COLLECTION, "rawPhi"));
    // The particle vector takes its phi from the calibrated leading cluster, not the particle.
    // It does not change the pT.
    let particle = transverse_momentum_expr(
        leading(PARTICLE_COLLECTION, "pt"),
        leading(CLUSTER_COLLECTION, "phi"),
    );
    when(col("nClusters").lt(lit(2i64)))
        .then(lit(RESPONSE_SENTINEL))
        .otherwise(cluster / particle)
}

/// Handles of everything the analysis books on a frame.
pub struct ResponseAnalysis {
    total: ResultHandle<u64>,
    selected: ResultHandle<u64>,
    n_clusters: ResultHandle<Hist1D>,
    n_particles: ResultHandle<Hist1D>,
    pdg_ids: ResultHandle<Hist1D>,
    leading_cluster_e: ResultHandle<Hist1D>,
    inclusive_response: ResultHandle<Hist1D>,
    response: ResultHandle<Hist3D>,
    report: ResultHandle<CutFlowReport>,
    snapshot: Option<ResultHandle<DataSet>>,
}

/// The six analysis histograms, in output order.
#[derive(Debug, Clone)]
pub struct ResponseHistograms {
    pub n_clusters: Hist1D,
    pub n_particles: Hist1D,
    pub pdg_ids: Hist1D,
    pub leading_cluster_e: Hist1D,
    pub inclusive_response: Hist1D,
    pub response: Hist3D,
}

impl ResponseHistograms {
    pub fn write_to(&self, out: &mut OutputContainer) -> AnalysisResult<()> {
        for h in [
            &self.n_clusters,
            &self.n_particles,
            &self.pdg_ids,
            &self.leading_cluster_e,
            &self.inclusive_response,
        ] {
            out.write_hist1d(h)?;
        }
        out.write_hist3d(&self.response)
    }
}

/// Materialized results of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub total_events: u64,
    pub selected_events: u64,
    pub histograms: ResponseHistograms,
    pub report: CutFlowReport,
    pub snapshot: Option<DataSet>,
}

impl ResponseAnalysis {
    /// Define the analysis columns and filters on `frame` and book every result.
    ///
    /// Nothing is evaluated here.
    pub fn book(frame: &Frame, with_snapshot: bool) -> AnalysisResult<Self> {
        let counted = frame
            .define("nClusters", multiplicity(CLUSTER_COLLECTION, "rawE"))?
            .define("nParticles", multiplicity(PARTICLE_COLLECTION, "pt"))?;

        let filtered = counted
            .filter(CUT_CLUSTER, col("nClusters").gt_eq(lit(1i64)))?
            .filter(CUT_PARTICLE, col("nParticles").gt_eq(lit(1i64)))?
            .define(
                "pdgId_lead",
                leading(PARTICLE_COLLECTION, "pdgId").cast(DataType::Int64),
            )?;

        let defined = filtered
            .filter(CUT_PION, col("pdgId_lead").eq(lit(PDG_PION)))?
            .define(
                "leading_cluster_e",
                leading(CLUSTER_COLLECTION, "rawE") / lit(MEV_PER_GEV),
            )?
            .define("response", response_expr())?
            .define(
                "lead_particle_pt",
                leading(PARTICLE_COLLECTION, "pt") / lit(MEV_PER_GEV),
            )?
            .define("lead_particle_eta", leading(PARTICLE_COLLECTION, "eta"))?;

        let snapshot = if with_snapshot {
            Some(defined.snapshot(&SNAPSHOT_COLUMNS)?)
        } else {
            None
        };

        Ok(Self {
            total: counted.count(),
            selected: defined.count(),
            n_clusters: counted.histo1d(n_clusters_model(), "nClusters")?,
            n_particles: counted.histo1d(n_particles_model(), "nParticles")?,
            pdg_ids: filtered.histo1d(pdg_ids_model(), "pdgId_lead")?,
            leading_cluster_e: defined.histo1d(leading_cluster_e_model(), "leading_cluster_e")?,
            inclusive_response: defined.histo1d(inclusive_response_model(), "response")?,
            response: defined.histo3d(response_model(), ["response", "lead_particle_pt", "lead_particle_eta"])?,
            report: defined.report(),
            snapshot,
        })
    }

    /// Run the event loop (once) and collect every booked result.
    pub fn results(&self) -> AnalysisResult<AnalysisOutput> {
        Ok(AnalysisOutput {
            total_events: self.total.get()?,
            selected_events: self.selected.get()?,
            histograms: ResponseHistograms {
                n_clusters: self.n_clusters.get()?,
                n_particles: self.n_particles.get()?,
                pdg_ids: self.pdg_ids.get()?,
                leading_cluster_e: self.leading_cluster_e.get()?,
                inclusive_response: self.inclusive_response.get()?,
                response: self.response.get()?,
            },
            report: self.report.get()?,
            snapshot: self.snapshot.as_ref().map(ResultHandle::get).transpose()?,
        })
    }
}

/// Summary of a complete run, as returned by [`run_analysis`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output: AnalysisOutput,
    pub files: Vec<std::path::PathBuf>,
    pub threads: usize,
    /// Metrics of the last event loop pass.
    pub metrics: ExecutionMetricsSnapshot,
}

/// Run the whole analysis described by `config`, writing console messages to `console`.
///
/// The output container is created before any event is read; if the event loop fails, no
/// histogram is written to it.
pub fn run_analysis(config: &AnalysisConfig, console: &mut dyn Write) -> AnalysisResult<RunSummary> {
    config.validate()?;
    let mut container = OutputContainer::create(&config.output_path)?;

    let mut engine = ExecutionEngine::new(config.execution.clone())?;
    if config.log_execution {
        engine = engine.with_observer(Arc::new(StdErrExecutionObserver::default()));
    }
    let threads = engine.num_threads();
    writeln!(console, "Multi-threading enabled using {threads} threads.")?;
    writeln!(console, "Processing file(s): {}", config.inputs.join(", "))?;

    let stderr = Arc::new(StdErrObserver {
        verbose: config.log_execution,
    });
    let observer: Arc<dyn SourceObserver> = match &config.source_log {
        Some(log) => Arc::new(vec![
            stderr as Arc<dyn SourceObserver>,
            Arc::new(FileObserver::new(log)),
        ]),
        None => stderr,
    };
    let options = SourceOptions {
        leading: config.leading,
        observer: Some(observer),
        ..Default::default()
    };
    let table = engine.install(|| open_event_source(config.inputs.as_slice(), &config.tree_name, &options))?;
    let source = table.to_dataframe()?;
    let files = table.files;

    let frame = Frame::new(source, engine)?;
    let n_total = frame.count().get()?;
    writeln!(console, "Total events in {}: {n_total}", config.tree_name)?;

    let analysis = ResponseAnalysis::book(&frame, config.snapshot_path.is_some())?;
    writeln!(console, "Event loop running...")?;
    let output = analysis.results()?;

    writeln!(console, "Saving histograms to: {}", container.path().display())?;
    output.histograms.write_to(&mut container)?;
    container.close()?;
    writeln!(console, "Histograms saved.")?;

    if let (Some(path), Some(ds)) = (&config.snapshot_path, &output.snapshot) {
        write_snapshot_csv(path, ds)?;
        writeln!(console, "Snapshot file created: {}", path.display())?;
    }

    writeln!(console, "\n--- Analysis Report ---")?;
    write!(console, "{}", output.report)?;
    writeln!(console, "---------------------\n")?;

    Ok(RunSummary {
        output,
        files,
        threads,
        metrics: frame.metrics().snapshot(),
    })
}
