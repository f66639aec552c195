//! Event source: resolves input specs to Parquet files and loads one event table from them.

use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use polars::prelude::DataFrame;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::{AnalysisError, AnalysisResult};
use crate::event::{Event, LeadingSelection};

use super::observability::{SourceContext, SourceEvent, SourceObserver, SourceSeverity};
use super::columns::events_to_dataframe;
use super::parquet::read_events_from_path;

/// File extensions picked up when an input is a directory.
pub const PARQUET_EXTENSIONS: [&str; 2] = ["parquet", "pq"];

/// Options controlling how the event source is opened.
#[derive(Clone)]
pub struct SourceOptions {
    /// How the leading cluster/particle of each event is chosen.
    pub leading: LeadingSelection,
    /// Optional observer of per-file progress, the outcome, and alerts.
    pub observer: Option<Arc<dyn SourceObserver>>,
    /// Failures at or above this severity are reported with `alert: true`.
    pub alert_at_or_above: SourceSeverity,
}

impl fmt::Debug for SourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceOptions")
            .field("leading", &self.leading)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            leading: LeadingSelection::default(),
            observer: None,
            alert_at_or_above: SourceSeverity::Critical,
        }
    }
}

/// All events of one table, in file order then row order.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    pub table: String,
    /// Resolved input files, sorted.
    pub files: Vec<PathBuf>,
    pub events: Vec<Event>,
}

impl EventTable {
    /// Columnar view of the events, see [`super::columns`].
    pub fn to_dataframe(&self) -> AnalysisResult<DataFrame> {
        events_to_dataframe(&self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Expand input specs into a sorted, de-duplicated list of files.
///
/// A spec containing `*`, `?` or `[` is a glob pattern; a directory is walked recursively for
/// Parquet files; anything else must be an existing file.
pub fn resolve_inputs<S: AsRef<str>>(inputs: &[S]) -> AnalysisResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for spec in inputs {
        let spec = spec.as_ref();
        if is_glob(spec) {
            let matched = glob::glob(spec).map_err(|e| AnalysisError::SourceLoad {
                message: format!("invalid glob pattern '{spec}': {e}"),
            })?;
            let before = files.len();
            for entry in matched {
                let path = entry.map_err(|e| AnalysisError::SourceLoad {
                    message: format!("cannot read match of '{spec}': {e}"),
                })?;
                if path.is_file() {
                    files.push(path);
                }
            }
            if files.len() == before {
                return Err(AnalysisError::SourceLoad {
                    message: format!("no files match '{spec}'"),
                });
            }
        } else {
            let path = Path::new(spec);
            if path.is_dir() {
                let before = files.len();
                collect_parquet_files(path, &mut files)?;
                if files.len() == before {
                    return Err(AnalysisError::SourceLoad {
                        message: format!("no Parquet files under directory '{spec}'"),
                    });
                }
            } else if path.is_file() {
                files.push(path.to_path_buf());
            } else {
                return Err(AnalysisError::SourceLoad {
                    message: format!("input '{spec}' does not exist"),
                });
            }
        }
    }

    if files.is_empty() {
        return Err(AnalysisError::SourceLoad {
            message: "no input files given".to_string(),
        });
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn is_glob(spec: &str) -> bool {
    spec.contains(['*', '?', '['])
}

fn collect_parquet_files(dir: &Path, out: &mut Vec<PathBuf>) -> AnalysisResult<()> {
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| AnalysisError::SourceLoad {
            message: format!("cannot walk '{}': {e}", dir.display()),
        })?;
        let is_parquet = entry
            .path()
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| PARQUET_EXTENSIONS.iter().any(|p| ext.eq_ignore_ascii_case(p)));
        if entry.file_type().is_file() && is_parquet {
            out.push(entry.into_path());
        }
    }
    Ok(())
}

/// Open the event table `table` from the given input specs.
///
/// Files are read in parallel on the current rayon pool and their events concatenated in sorted
/// path order. Call it through [`crate::execution::ExecutionEngine::install`] to load on the
/// engine's workers.
///
/// The observer, if any, receives [`SourceEvent::FileLoaded`] for each file read, then
/// [`SourceEvent::Opened`] or [`SourceEvent::Failed`].
///
/// ```no_run
/// use std::sync::Arc;
///
/// use calo_response::execution::{ExecutionEngine, ExecutionOptions};
/// use calo_response::ingestion::{open_event_source, SourceOptions, StdErrObserver};
///
/// # fn main() -> Result<(), calo_response::AnalysisError> {
/// let engine = ExecutionEngine::new(ExecutionOptions::default())?;
/// let opts = SourceOptions {
///     observer: Some(Arc::new(StdErrObserver { verbose: true })),
///     ..Default::default()
/// };
/// let table = engine.install(|| open_event_source(&["data/*.parquet"], "CollectionTree", &opts))?;
/// println!("events={}", table.len());
/// # Ok(())
/// # }
/// ```
pub fn open_event_source<S: AsRef<str>>(
    inputs: &[S],
    table: &str,
    options: &SourceOptions,
) -> AnalysisResult<EventTable> {
    let ctx = SourceContext {
        inputs: inputs.iter().map(|s| s.as_ref().to_string()).collect(),
        table: table.to_string(),
    };
    let observer = options.observer.as_deref();
    let start = Instant::now();

    let result = load_table(inputs, &ctx, options.leading, observer);

    if let Some(obs) = observer {
        let event = match &result {
            Ok(t) => SourceEvent::Opened {
                files: t.files.len(),
                events: t.len(),
                elapsed: start.elapsed(),
            },
            Err(e) => {
                let severity = severity_for_error(e);
                SourceEvent::Failed {
                    severity,
                    error: e,
                    alert: severity >= options.alert_at_or_above,
                }
            }
        };
        obs.on_event(&ctx, &event);
    }

    result
}

fn load_table<S: AsRef<str>>(
    inputs: &[S],
    ctx: &SourceContext,
    leading: LeadingSelection,
    observer: Option<&dyn SourceObserver>,
) -> AnalysisResult<EventTable> {
    let files = resolve_inputs(inputs)?;

    let per_file: Vec<Vec<Event>> = files
        .par_iter()
        .map(|path| {
            let events = read_events_from_path(path, &ctx.table)?;
            if let Some(obs) = observer {
                obs.on_event(
                    ctx,
                    &SourceEvent::FileLoaded {
                        path,
                        events: events.len(),
                    },
                );
            }
            Ok(events)
        })
        .collect::<AnalysisResult<_>>()?;
    let mut events: Vec<Event> = per_file.into_iter().flatten().collect();

    if events.is_empty() {
        return Err(AnalysisError::EmptyInput {
            table: ctx.table.clone(),
        });
    }
    if leading == LeadingSelection::SortByPt {
        events.par_iter_mut().for_each(Event::sort_by_pt);
    }

    Ok(EventTable {
        table: ctx.table.clone(),
        files,
        events,
    })
}

fn severity_for_error(e: &AnalysisError) -> SourceSeverity {
    match e {
        AnalysisError::Io(_) | AnalysisError::SourceLoad { .. } => SourceSeverity::Critical,
        AnalysisError::Parquet(err) => {
            // Parquet errors may wrap IO without exposing it structurally.
            if error_chain_contains_io(err) {
                SourceSeverity::Critical
            } else {
                SourceSeverity::Error
            }
        }
        AnalysisError::EmptyInput { .. } => SourceSeverity::Warning,
        _ => SourceSeverity::Error,
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::{is_glob, severity_for_error};
    use crate::error::AnalysisError;
    use crate::ingestion::SourceSeverity;

    #[test]
    fn glob_detection() {
        assert!(is_glob("data/*.parquet"));
        assert!(is_glob("run_?.pq"));
        assert!(is_glob("file[0-9].parquet"));
        assert!(!is_glob("user.cyoung.43212508.EXT0._000438.pool.parquet"));
    }

    #[test]
    fn severity_classification() {
        let missing = AnalysisError::SourceLoad {
            message: "x".to_string(),
        };
        let empty = AnalysisError::EmptyInput {
            table: "t".to_string(),
        };
        let schema = AnalysisError::SchemaMismatch {
            message: "x".to_string(),
        };
        assert_eq!(severity_for_error(&missing), SourceSeverity::Critical);
        assert_eq!(severity_for_error(&empty), SourceSeverity::Warning);
        assert_eq!(severity_for_error(&schema), SourceSeverity::Error);
    }
}
