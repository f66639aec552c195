//! Lazy event processing: derived columns, named filters and booked aggregations.
//!
//! A [`Frame`] records a graph of `define`/`filter` nodes, written as polars expressions, over a
//! source [`polars::prelude::DataFrame`]. Actions (counts, histograms, snapshots, cut-flow
//! reports) are booked on any node and filled together in one pass by
//! [`crate::execution::ExecutionEngine`].
//!
//! - [`histogram`]: fixed-binning [`Hist1D`] / [`Hist3D`] accumulators
//! - [`report`]: [`CutFlowReport`] built from per-filter pass counts
//! - [`frame`]: the user-facing [`Frame`] and [`ResultHandle`]

pub mod frame;
pub mod graph;
pub mod histogram;
pub mod report;

pub use frame::{Frame, FromOutput, ResultHandle};
pub use graph::ActionOutput;
pub use histogram::{Axis, Hist1D, Hist3D, HistModel1D, HistModel3D};
pub use report::{CutFlowReport, CutInfo};
