//! Parallel execution of frame passes.
//!
//! The engine owns its own rayon pool, so every pipeline run picks its worker count explicitly
//! instead of relying on a process-wide setting. Event loading runs on it through
//! [`ExecutionEngine::install`]. A pass first collects the frame's expressions with polars (which
//! evaluates them on its own process-wide pool, sized by `POLARS_MAX_THREADS`), then splits the
//! rows into fixed-size chunks, folds each chunk on the engine pool with private accumulators,
//! and merges the per-chunk states in chunk order once all chunks are done.

mod observer;

use std::sync::Arc;
use std::time::Instant;

use polars::prelude::DataFrame;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::error::{AnalysisError, AnalysisResult};
use crate::processing::graph::{Graph, PassData, PassPlan, PassState};

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, StdErrExecutionObserver,
};

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Number of worker threads used by the engine.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Number of rows per chunk.
    pub chunk_size: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            chunk_size: 4_096,
        }
    }
}

impl ExecutionOptions {
    /// Worker count the engine will use for these options.
    pub fn resolved_threads(&self) -> usize {
        self.num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }
}

/// Runs frame passes on a private thread pool.
pub struct ExecutionEngine {
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl ExecutionEngine {
    /// Create a new engine with the given options.
    ///
    /// Fails with [`AnalysisError::InvalidConfig`] if `chunk_size == 0`, `num_threads == Some(0)`,
    /// or the pool cannot be built.
    pub fn new(opts: ExecutionOptions) -> AnalysisResult<Self> {
        if opts.chunk_size == 0 {
            return Err(AnalysisError::InvalidConfig {
                message: "chunk_size must be > 0".to_string(),
            });
        }
        if opts.num_threads == Some(0) {
            return Err(AnalysisError::InvalidConfig {
                message: "num_threads must be > 0 when set".to_string(),
            });
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(opts.resolved_threads())
            .thread_name(|i| format!("calo-response-{i}"))
            .build()
            .map_err(|e| AnalysisError::InvalidConfig {
                message: format!("failed to build thread pool: {e}"),
            })?;

        Ok(Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    /// Attach an observer for execution events (metrics/logging).
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Number of worker threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` inside the engine's pool, so rayon parallelism in `op` uses its workers.
    pub fn install<OP, T>(&self, op: OP) -> T
    where
        OP: FnOnce() -> T + Send,
        T: Send,
    {
        self.pool.install(op)
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Evaluate one pass of `plan` over every row of `source`.
    ///
    /// The first failing row aborts the pass; no partial state is returned.
    pub(crate) fn run_pass(&self, graph: &Graph, plan: &PassPlan, source: &DataFrame) -> AnalysisResult<PassState> {
        self.pool.install(|| self.run_pass_impl(graph, plan, source))
    }

    fn run_pass_impl(&self, graph: &Graph, plan: &PassPlan, source: &DataFrame) -> AnalysisResult<PassState> {
        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(ExecutionEvent::RunStarted {
            rows: source.height(),
            actions: plan.action_count(),
        });

        let merged = graph
            .collect(plan, source)
            .and_then(|data| self.fill(graph, plan, &data));

        self.metrics.end_run(start.elapsed());
        self.emit(ExecutionEvent::RunFinished {
            elapsed: start.elapsed(),
            succeeded: merged.is_ok(),
            metrics: self.metrics.snapshot(),
        });

        merged
    }

    fn fill(&self, graph: &Graph, plan: &PassPlan, data: &PassData) -> AnalysisResult<PassState> {
        let per_chunk: AnalysisResult<Vec<PassState>> = chunk_ranges(data.row_count(), self.opts.chunk_size)
            .into_par_iter()
            .map(|range| {
                self.metrics.on_chunk_start();
                self.emit(ExecutionEvent::ChunkStarted {
                    start_row: range.start,
                    row_count: range.len(),
                });

                let rows = range.len() as u64;
                let start_row = range.start;
                let result = graph.process_chunk(plan, data, range);

                self.metrics.on_rows_processed(rows);
                self.metrics.on_chunk_end();
                match &result {
                    Err(e) => self.emit(ExecutionEvent::ChunkFailed {
                        start_row,
                        error: e.to_string(),
                    }),
                    Ok(_) => self.emit(ExecutionEvent::ChunkFinished { start_row }),
                }
                result
            })
            .collect();

        per_chunk.map(|states| {
            states.into_iter().fold(graph.new_state(plan, data), |mut acc, s| {
                acc.merge(s);
                acc
            })
        })
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("num_threads", &self.num_threads())
            .field("opts", &self.opts)
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}

fn chunk_ranges(row_count: usize, chunk_size: usize) -> Vec<std::ops::Range<usize>> {
    if row_count == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(row_count.div_ceil(chunk_size));
    let mut start = 0usize;
    while start < row_count {
        let end = (start + chunk_size).min(row_count);
        out.push(start..end);
        start = end;
    }
    out
}
