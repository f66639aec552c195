//! Event source loading.
//!
//! Most callers should use [`open_event_source`] (from [`source`]) which:
//!
//! - resolves paths, glob patterns and directories to a sorted list of Parquet files
//! - reads every file in parallel into one [`EventTable`]
//! - reports per-file progress, the outcome and alerts to a [`SourceObserver`]
//!
//! The per-file reader is [`parquet::read_events_from_path`]; [`columns::events_to_dataframe`]
//! turns loaded events into the polars frame the analysis runs on.

pub mod columns;
pub mod observability;
pub mod parquet;
pub mod source;

pub use columns::{column_name, events_to_dataframe};
pub use observability::{FileObserver, SourceContext, SourceEvent, SourceObserver, SourceSeverity, StdErrObserver};
pub use source::{open_event_source, resolve_inputs, EventTable, SourceOptions};
