use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type used across the crate.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Error type returned by source loading, pipeline construction, execution and output.
///
/// Every variant is fatal for the analysis: there is no retry and no partial-results mode.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Underlying I/O error (e.g. permission denied while reading an input file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet decoding error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Column expression error raised by polars while planning or collecting a pass.
    #[error("polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// CSV error while writing a snapshot.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization error while writing the output container.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The output container could not be created.
    #[error("could not open output file {}: {source}", path.display())]
    OutputCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input files are missing or unreadable, or the requested table is absent.
    #[error("failed to load event source: {message}")]
    SourceLoad { message: String },

    /// The table was found but holds no events.
    #[error("input file(s) contain no events in the table '{table}'")]
    EmptyInput { table: String },

    /// The input does not have the expected columns/shape.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A cell could not be converted into the expected type.
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// A column name was defined twice in the same pipeline.
    #[error("column '{name}' is already defined")]
    DuplicateColumn { name: String },

    /// A column was referenced that is not visible from the booking node.
    #[error("unknown column '{name}' (not defined upstream of this node)")]
    UnknownColumn { name: String },

    /// A row alive at an action has no usable value for one of its columns; aborts the whole pass.
    #[error("row {row}: evaluating '{node}' failed: {message}")]
    RowEvaluation {
        row: usize,
        node: String,
        message: String,
    },

    /// Configuration is not usable.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}
