//! Observers of event source loading.
//!
//! [`open_event_source`](super::open_event_source) reports one [`SourceEvent::FileLoaded`] per
//! input file (from the loading workers, in completion order), then either
//! [`SourceEvent::Opened`] or [`SourceEvent::Failed`]. A list of observers is itself an
//! observer that forwards to each entry.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::AnalysisError;

/// Severity classification used for failures and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceSeverity {
    Info,
    /// The inputs were readable but hold nothing to analyse.
    Warning,
    /// The inputs were readable but malformed.
    Error,
    /// Inputs missing or unreadable (I/O and resolution failures).
    Critical,
}

impl fmt::Display for SourceSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceSeverity::Info => "info",
            SourceSeverity::Warning => "warning",
            SourceSeverity::Error => "error",
            SourceSeverity::Critical => "critical",
        })
    }
}

/// What is being opened.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// Input specs as given (paths, glob patterns or directories).
    pub inputs: Vec<String>,
    /// Requested table name.
    pub table: String,
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table={} inputs={}", self.table, self.inputs.join(","))
    }
}

/// One step of opening an event source.
#[derive(Debug, Clone, Copy)]
pub enum SourceEvent<'a> {
    /// One resolved file was read.
    FileLoaded { path: &'a Path, events: usize },
    /// The whole table was loaded.
    Opened {
        files: usize,
        events: usize,
        elapsed: Duration,
    },
    /// Loading failed; `alert` is set when `severity` reached the configured threshold.
    Failed {
        severity: SourceSeverity,
        error: &'a AnalysisError,
        alert: bool,
    },
}

impl SourceEvent<'_> {
    /// Single-line `key=value` rendering shared by the bundled observers.
    pub fn describe(&self, ctx: &SourceContext) -> String {
        match self {
            SourceEvent::FileLoaded { path, events } => {
                format!("file table={} path={} events={events}", ctx.table, path.display())
            }
            SourceEvent::Opened {
                files,
                events,
                elapsed,
            } => format!(
                "ok {ctx} files={files} events={events} elapsed_ms={}",
                elapsed.as_millis()
            ),
            SourceEvent::Failed {
                severity,
                error,
                alert,
            } => format!(
                "{} severity={severity} {ctx} err={error}",
                if *alert { "ALERT" } else { "fail" }
            ),
        }
    }
}

/// Receives [`SourceEvent`]s. Called from loading worker threads, hence `Send + Sync`.
pub trait SourceObserver: Send + Sync {
    fn on_event(&self, ctx: &SourceContext, event: &SourceEvent<'_>);
}

impl SourceObserver for Vec<Arc<dyn SourceObserver>> {
    fn on_event(&self, ctx: &SourceContext, event: &SourceEvent<'_>) {
        for o in self {
            o.on_event(ctx, event);
        }
    }
}

/// Logs source events to stderr. Per-file lines only when `verbose`.
#[derive(Debug, Default)]
pub struct StdErrObserver {
    pub verbose: bool,
}

impl SourceObserver for StdErrObserver {
    fn on_event(&self, ctx: &SourceContext, event: &SourceEvent<'_>) {
        if matches!(event, SourceEvent::FileLoaded { .. }) && !self.verbose {
            return;
        }
        eprintln!("[source] {}", event.describe(ctx));
    }
}

/// Appends every source event, timestamped, to a log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Writes are best-effort; failures to open or write the log are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }
}

impl SourceObserver for FileObserver {
    fn on_event(&self, ctx: &SourceContext, event: &SourceEvent<'_>) {
        let line = format!("{} {}", unix_ts(), event.describe(ctx));
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::{SourceContext, SourceEvent, SourceSeverity};
    use crate::error::AnalysisError;

    fn ctx() -> SourceContext {
        SourceContext {
            inputs: vec!["a.parquet".to_string(), "dir".to_string()],
            table: "CollectionTree".to_string(),
        }
    }

    #[test]
    fn events_render_as_key_value_lines() {
        let file = SourceEvent::FileLoaded {
            path: Path::new("dir/b.parquet"),
            events: 7,
        };
        assert_eq!(
            file.describe(&ctx()),
            "file table=CollectionTree path=dir/b.parquet events=7"
        );

        let opened = SourceEvent::Opened {
            files: 2,
            events: 9,
            elapsed: Duration::from_millis(12),
        };
        assert_eq!(
            opened.describe(&ctx()),
            "ok table=CollectionTree inputs=a.parquet,dir files=2 events=9 elapsed_ms=12"
        );

        let error = AnalysisError::EmptyInput {
            table: "CollectionTree".to_string(),
        };
        let failed = SourceEvent::Failed {
            severity: SourceSeverity::Warning,
            error: &error,
            alert: false,
        };
        assert!(failed
            .describe(&ctx())
            .starts_with("fail severity=warning table=CollectionTree inputs=a.parquet,dir err="));
    }

    #[test]
    fn severities_order_by_impact() {
        assert!(SourceSeverity::Critical > SourceSeverity::Error);
        assert!(SourceSeverity::Error > SourceSeverity::Warning);
        assert_eq!(SourceSeverity::Critical.to_string(), "critical");
    }
}
