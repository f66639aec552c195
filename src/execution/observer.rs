use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Execution events emitted by the engine.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted { rows: usize, actions: usize },
    ChunkStarted { start_row: usize, row_count: usize },
    ChunkFinished { start_row: usize },
    ChunkFailed { start_row: usize, error: String },
    RunFinished {
        elapsed: Duration,
        succeeded: bool,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// A simple stderr logger for execution events.
///
/// Chunk-level events are only printed when `verbose` is set.
#[derive(Default)]
pub struct StdErrExecutionObserver {
    pub verbose: bool,
}

impl ExecutionObserver for StdErrExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::RunStarted { rows, actions } => {
                eprintln!("[execution] pass started: rows={rows} actions={actions}");
            }
            ExecutionEvent::RunFinished {
                succeeded, metrics, ..
            } => {
                let status = if *succeeded { "finished" } else { "failed" };
                eprintln!("[execution] pass {status}: {metrics}");
            }
            ExecutionEvent::ChunkFailed { start_row, error } => {
                eprintln!("[execution] chunk at row {start_row} failed: {error}");
            }
            other if self.verbose => eprintln!("[execution] {other:?}"),
            _ => {}
        }
    }
}

/// Real-time metrics for the most recent pass.
///
/// The engine resets and updates these counters during a pass; callers can snapshot them at any
/// time. `run_id` counts passes since the engine was created.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    rows_processed: AtomicU64,
    chunks_started: AtomicU64,
    chunks_finished: AtomicU64,

    active_chunks: AtomicUsize,
    max_active_chunks: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            rows_processed: AtomicU64::new(0),
            chunks_started: AtomicU64::new(0),
            chunks_finished: AtomicU64::new(0),
            active_chunks: AtomicUsize::new(0),
            max_active_chunks: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.rows_processed.store(0, Ordering::SeqCst);
        self.chunks_started.store(0, Ordering::SeqCst);
        self.chunks_finished.store(0, Ordering::SeqCst);
        self.active_chunks.store(0, Ordering::SeqCst);
        self.max_active_chunks.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        // Keep a non-zero marker so a finished empty pass still reports an elapsed time.
        let ns = (elapsed.as_nanos().min(u64::MAX as u128) as u64).max(1);
        self.elapsed_ns.store(ns, Ordering::SeqCst);
    }

    pub fn on_rows_processed(&self, n: u64) {
        let _ = self.rows_processed.fetch_add(n, Ordering::SeqCst);
    }

    pub fn on_chunk_start(&self) {
        let _ = self.chunks_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_chunks.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_chunks, now);
    }

    pub fn on_chunk_end(&self) {
        let _ = self.chunks_finished.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_chunks.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed,
            rows_processed: self.rows_processed.load(Ordering::SeqCst),
            chunks_started: self.chunks_started.load(Ordering::SeqCst),
            chunks_finished: self.chunks_finished.load(Ordering::SeqCst),
            max_active_chunks: self.max_active_chunks.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    loop {
        let cur = dst.load(Ordering::SeqCst);
        if now <= cur {
            break;
        }
        if dst.compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            break;
        }
    }
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub rows_processed: u64,
    pub chunks_started: u64,
    pub chunks_finished: u64,
    pub max_active_chunks: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, rows_processed={}, chunks={}/{}, max_active_chunks={}, elapsed={:?}",
            self.run_id,
            self.rows_processed,
            self.chunks_finished,
            self.chunks_started,
            self.max_active_chunks,
            self.elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ExecutionMetrics;

    #[test]
    fn begin_run_resets_counters_but_not_run_id() {
        let m = ExecutionMetrics::new();
        m.begin_run();
        m.on_chunk_start();
        m.on_rows_processed(5);
        m.on_chunk_end();
        m.end_run(Duration::from_millis(2));
        assert_eq!(m.snapshot().rows_processed, 5);

        m.begin_run();
        let snap = m.snapshot();
        assert_eq!(snap.run_id, 2);
        assert_eq!(snap.rows_processed, 0);
        assert_eq!(snap.chunks_started, 0);
        assert!(snap.elapsed.is_none());
    }

    #[test]
    fn display_mentions_counters() {
        let m = ExecutionMetrics::new();
        m.begin_run();
        m.on_chunk_start();
        m.on_chunk_start();
        m.on_chunk_end();
        let text = m.snapshot().to_string();
        assert!(text.contains("chunks=1/2"));
        assert!(text.contains("max_active_chunks=2"));
    }
}
