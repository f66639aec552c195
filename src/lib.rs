//! `calo-response` measures the transverse-momentum response of calorimeter clusters to the
//! truth particles that produced them.
//!
//! For every event it takes the leading reconstructed cluster and the leading truth particle,
//! computes their transverse momenta and fills the ratio into histograms,
//! after a short chain of named selections. The histograms are persisted to a JSON output
//! container and a cut-flow report is printed.
//!
//! The primary entrypoint is [`analysis::run_analysis`], driven by an [`config::AnalysisConfig`].
//!
//! ## Pipeline
//!
//! 1. **Event source** ([`ingestion`]): Parquet files (paths, glob patterns or directories)
//!    holding the `CaloCalTopoClusters` and `TruthParticles` collections of each event.
//! 2. **Derived columns and filters** ([`processing::Frame`]): polars expressions over the event
//!    frame, declared lazily as a graph.
//! 3. **Aggregation**: 1D/3D histograms, counts, snapshots and cut-flow reports booked on any
//!    node of the graph.
//! 4. **Execution** ([`execution`]): one parallel pass over all events fills every pending result.
//! 5. **Output** ([`output`]): histograms go to the output container, selected events optionally
//!    to a CSV snapshot.
//!
//! ## Selection
//!
//! | Filter | Condition |
//! |---|---|
//! | `At least 1 cluster` | `nClusters >= 1` |
//! | `At least 1 particle` | `nParticles >= 1` |
//! | `At least 1 pion` | `pdgId_lead == 211` |
//!
//! ## Example: a small lazy frame
//!
//! ```rust
//! use calo_response::execution::{ExecutionEngine, ExecutionOptions};
//! use calo_response::processing::{Frame, HistModel1D};
//! use polars::prelude::*;
//!
//! let engine = ExecutionEngine::new(ExecutionOptions {
//!     num_threads: Some(2),
//!     chunk_size: 16,
//! })
//! .unwrap();
//! let source = df!("r" => [0.5f64, 1.5, 2.5, 3.5]).unwrap();
//! let frame = Frame::new(source, engine).unwrap();
//! let x = frame.define("x", col("r")).unwrap();
//! let above_one = x.filter("x > 1", col("x").gt(lit(1.0))).unwrap();
//!
//! let h = above_one
//!     .histo1d(HistModel1D::new("h_x", "x;x;Entries", 4, 0.0, 4.0), "x")
//!     .unwrap();
//! let report = above_one.report();
//!
//! // The first read runs the event loop once for every booked result.
//! assert_eq!(h.get().unwrap().entries, 3);
//! assert_eq!(report.get().unwrap().selected(), 3);
//! ```
//!
//! ## Configuration
//!
//! The defaults reproduce the production run. `AOD_FILE_PATH` (comma-separated inputs),
//! `CALO_RESPONSE_THREADS` and `CALO_RESPONSE_SNAPSHOT` override them.

pub mod analysis;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod ingestion;
pub mod kinematics;
pub mod output;
pub mod processing;
pub mod types;

pub use error::{AnalysisError, AnalysisResult};
