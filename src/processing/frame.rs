//! Lazy, declarative frame over a polars [`DataFrame`].
//!
//! `define`, `filter` and the booking methods only record nodes and actions. Derived columns and
//! predicates are polars expressions over the columns visible at the node. Results are computed
//! when a [`ResultHandle`] is first read (or [`Frame::run`] is called): one pass fills every
//! action that has no result yet, and the outputs are memoized.
//!
//! ```rust
//! use calo_response::execution::{ExecutionEngine, ExecutionOptions};
//! use calo_response::processing::{Frame, HistModel1D};
//! use polars::prelude::*;
//!
//! let engine = ExecutionEngine::new(ExecutionOptions::default()).unwrap();
//! let frame = Frame::new(df!("r" => (1..=10i64).collect::<Vec<_>>()).unwrap(), engine).unwrap();
//! let doubled = frame.define("doubled", col("r") * lit(2i64)).unwrap();
//! let big = doubled.filter("big", col("doubled").gt(lit(10i64))).unwrap();
//!
//! let n = big.count();
//! let h = big
//!     .histo1d(HistModel1D::new("h", "doubled", 10, 0.0, 20.0), "doubled")
//!     .unwrap();
//!
//! assert_eq!(n.get().unwrap(), 5);
//! assert_eq!(h.get().unwrap().entries, 5);
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use polars::prelude::{DataFrame, Expr};

use crate::error::{AnalysisError, AnalysisResult};
use crate::execution::{ExecutionEngine, ExecutionMetrics};
use crate::types::DataSet;

use super::graph::{ActionKind, ActionOutput, Graph, NodeId, SOURCE};
use super::histogram::{Hist1D, Hist3D, HistModel1D, HistModel3D};
use super::report::CutFlowReport;

struct Shared {
    graph: Graph,
    source: DataFrame,
    engine: ExecutionEngine,
}

impl Shared {
    fn run_pending(&mut self) -> AnalysisResult<()> {
        let Some(plan) = self.graph.plan_pending() else {
            return Ok(());
        };
        let state = self.engine.run_pass(&self.graph, &plan, &self.source)?;
        self.graph.store_results(&plan, state);
        Ok(())
    }
}

/// A node of the computation graph. Cloning is cheap; clones share the graph.
#[derive(Clone)]
pub struct Frame {
    shared: Rc<RefCell<Shared>>,
    node: NodeId,
}

impl Frame {
    /// Root frame over `source`, executed on `engine`.
    pub fn new(source: DataFrame, engine: ExecutionEngine) -> AnalysisResult<Self> {
        Ok(Self {
            shared: Rc::new(RefCell::new(Shared {
                graph: Graph::new(&source)?,
                source,
                engine,
            })),
            node: SOURCE,
        })
    }

    pub fn row_count(&self) -> usize {
        self.shared.borrow().source.height()
    }

    /// Columns visible from this node: the source columns, then derived columns in definition
    /// order.
    pub fn column_names(&self) -> Vec<String> {
        self.shared.borrow().graph.visible_columns(self.node)
    }

    pub fn metrics(&self) -> std::sync::Arc<ExecutionMetrics> {
        self.shared.borrow().engine.metrics()
    }

    /// Add a derived column computed by `expr`.
    ///
    /// `expr` may read source columns and columns defined upstream of this node only; anything
    /// else fails with [`AnalysisError::UnknownColumn`]. Rows filtered out upstream hold null.
    pub fn define(&self, name: &str, expr: Expr) -> AnalysisResult<Frame> {
        let node = self.shared.borrow_mut().graph.add_define(self.node, name, expr)?;
        Ok(self.at(node))
    }

    /// Keep only rows for which `predicate` is true; null counts as false. `name` labels the cut
    /// in reports.
    pub fn filter(&self, name: &str, predicate: Expr) -> AnalysisResult<Frame> {
        let node = self.shared.borrow_mut().graph.add_filter(self.node, name, predicate)?;
        Ok(self.at(node))
    }

    /// Number of rows alive at this node.
    pub fn count(&self) -> ResultHandle<u64> {
        self.book(ActionKind::Count)
    }

    /// Cut-flow report of the filters between the source and this node.
    pub fn report(&self) -> ResultHandle<CutFlowReport> {
        self.book(ActionKind::Report)
    }

    pub fn histo1d(&self, model: HistModel1D, column: &str) -> AnalysisResult<ResultHandle<Hist1D>> {
        let x = self.shared.borrow().graph.resolve(self.node, column)?;
        Ok(self.book(ActionKind::Histo1D { model, x }))
    }

    pub fn histo3d(&self, model: HistModel3D, columns: [&str; 3]) -> AnalysisResult<ResultHandle<Hist3D>> {
        let axes = {
            let shared = self.shared.borrow();
            [
                shared.graph.resolve(self.node, columns[0])?,
                shared.graph.resolve(self.node, columns[1])?,
                shared.graph.resolve(self.node, columns[2])?,
            ]
        };
        Ok(self.book(ActionKind::Histo3D { model, axes }))
    }

    /// Selected columns of every row alive at this node, in source order.
    pub fn snapshot(&self, columns: &[&str]) -> AnalysisResult<ResultHandle<DataSet>> {
        let columns = {
            let shared = self.shared.borrow();
            columns
                .iter()
                .map(|c| shared.graph.resolve(self.node, c))
                .collect::<AnalysisResult<Vec<_>>>()?
        };
        Ok(self.book(ActionKind::Snapshot { columns }))
    }

    /// Materialize every booked action that has no result yet.
    pub fn run(&self) -> AnalysisResult<()> {
        self.shared.borrow_mut().run_pending()
    }

    fn at(&self, node: NodeId) -> Frame {
        Frame {
            shared: Rc::clone(&self.shared),
            node,
        }
    }

    fn book<T: FromOutput>(&self, kind: ActionKind) -> ResultHandle<T> {
        let action = self.shared.borrow_mut().graph.book(self.node, kind);
        ResultHandle {
            source: self.shared.clone(),
            action,
            _marker: PhantomData,
        }
    }
}

trait Materialize {
    fn output(&self, action: usize) -> AnalysisResult<ActionOutput>;
}

impl Materialize for RefCell<Shared> {
    fn output(&self, action: usize) -> AnalysisResult<ActionOutput> {
        if let Some(out) = self.borrow().graph.result(action) {
            return Ok(out.clone());
        }
        let mut shared = self.borrow_mut();
        shared.run_pending()?;
        shared
            .graph
            .result(action)
            .cloned()
            .ok_or_else(|| AnalysisError::InvalidConfig {
                message: format!("action {action} produced no result"),
            })
    }
}

/// Lazy result of a booked action.
///
/// The first [`ResultHandle::get`] on any handle of a frame triggers a pass that fills every
/// pending action; later calls return the memoized value.
pub struct ResultHandle<T> {
    source: Rc<dyn Materialize>,
    action: usize,
    _marker: PhantomData<T>,
}

impl<T: FromOutput> ResultHandle<T> {
    pub fn get(&self) -> AnalysisResult<T> {
        T::from_output(self.source.output(self.action)?)
    }
}

/// Conversion from an [`ActionOutput`] to the typed value of a [`ResultHandle`].
pub trait FromOutput: Sized {
    fn from_output(out: ActionOutput) -> AnalysisResult<Self>;
}

fn mismatch(expected: &str, out: &ActionOutput) -> AnalysisError {
    AnalysisError::InvalidConfig {
        message: format!("expected a {expected} result, found {out:?}"),
    }
}

impl FromOutput for u64 {
    fn from_output(out: ActionOutput) -> AnalysisResult<Self> {
        match out {
            ActionOutput::Count(n) => Ok(n),
            other => Err(mismatch("count", &other)),
        }
    }
}

impl FromOutput for Hist1D {
    fn from_output(out: ActionOutput) -> AnalysisResult<Self> {
        match out {
            ActionOutput::Hist1D(h) => Ok(h),
            other => Err(mismatch("1D histogram", &other)),
        }
    }
}

impl FromOutput for Hist3D {
    fn from_output(out: ActionOutput) -> AnalysisResult<Self> {
        match out {
            ActionOutput::Hist3D(h) => Ok(h),
            other => Err(mismatch("3D histogram", &other)),
        }
    }
}

impl FromOutput for DataSet {
    fn from_output(out: ActionOutput) -> AnalysisResult<Self> {
        match out {
            ActionOutput::Snapshot(ds) => Ok(ds),
            other => Err(mismatch("snapshot", &other)),
        }
    }
}

impl FromOutput for CutFlowReport {
    fn from_output(out: ActionOutput) -> AnalysisResult<Self> {
        match out {
            ActionOutput::Report(r) => Ok(r),
            other => Err(mismatch("report", &other)),
        }
    }
}
