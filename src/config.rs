//! Run configuration of the response analysis.
//!
//! [`AnalysisConfig::default`] reproduces the fixed production setup. A few environment
//! variables may override it (see [`AnalysisConfig::with_env_overrides`]).

use std::path::PathBuf;

use crate::error::{AnalysisError, AnalysisResult};
use crate::event::LeadingSelection;
use crate::execution::ExecutionOptions;

/// Input file read when no override is given.
pub const DEFAULT_INPUT: &str = "user.cyoung.43212508.EXT0._000438.pool.parquet";
/// Standard event table name of the input files.
pub const DEFAULT_TREE_NAME: &str = "CollectionTree";
/// Histogram output container.
///
/// The production job writes `analysis_output.root`. No ROOT writer is available, so the same
/// six objects go to a JSON container of the same stem instead (see [`crate::output`]). This
/// departure is intentional; readers that expect the `.root` file must use the JSON one.
pub const DEFAULT_OUTPUT: &str = "analysis_output.json";

/// Comma-separated list of input files, glob patterns or directories.
pub const ENV_INPUTS: &str = "AOD_FILE_PATH";
/// Worker thread count of the execution engine.
pub const ENV_THREADS: &str = "CALO_RESPONSE_THREADS";
/// Path of the optional selected-events CSV snapshot.
pub const ENV_SNAPSHOT: &str = "CALO_RESPONSE_SNAPSHOT";

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub inputs: Vec<String>,
    pub tree_name: String,
    pub output_path: PathBuf,
    /// Write a CSV of the selected events when set.
    pub snapshot_path: Option<PathBuf>,
    /// Append event source outcomes to this file in addition to stderr.
    pub source_log: Option<PathBuf>,
    /// Print per-pass execution metrics to stderr.
    pub log_execution: bool,
    pub leading: LeadingSelection,
    pub execution: ExecutionOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            inputs: vec![DEFAULT_INPUT.to_string()],
            tree_name: DEFAULT_TREE_NAME.to_string(),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            snapshot_path: None,
            source_log: None,
            log_execution: true,
            leading: LeadingSelection::default(),
            execution: ExecutionOptions::default(),
        }
    }
}

impl AnalysisConfig {
    /// Apply `AOD_FILE_PATH`, `CALO_RESPONSE_THREADS` and `CALO_RESPONSE_SNAPSHOT`.
    pub fn with_env_overrides(self) -> AnalysisResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup. Empty values are ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> AnalysisResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = lookup(ENV_INPUTS) {
            self.inputs = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = lookup(ENV_THREADS) {
            let n: usize = raw.trim().parse().map_err(|e| AnalysisError::InvalidConfig {
                message: format!("{ENV_THREADS}='{raw}' is not a thread count: {e}"),
            })?;
            self.execution.num_threads = Some(n);
        }
        if let Some(raw) = lookup(ENV_SNAPSHOT) {
            self.snapshot_path = Some(PathBuf::from(raw.trim()));
        }
        Ok(self)
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if self.inputs.is_empty() {
            return Err(invalid("at least one input is required"));
        }
        if self.tree_name.is_empty() {
            return Err(invalid("tree name must not be empty"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(invalid("output path must not be empty"));
        }
        if self.execution.chunk_size == 0 {
            return Err(invalid("chunk_size must be > 0"));
        }
        if self.execution.num_threads == Some(0) {
            return Err(invalid("thread count must be > 0"));
        }
        if self.snapshot_path.as_ref() == Some(&self.output_path) {
            return Err(invalid("snapshot path must differ from the output path"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> AnalysisError {
    AnalysisError::InvalidConfig {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::{AnalysisConfig, DEFAULT_INPUT, DEFAULT_OUTPUT, ENV_INPUTS, ENV_SNAPSHOT, ENV_THREADS};
    use crate::error::AnalysisError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_the_production_setup() {
        let c = AnalysisConfig::default();
        assert_eq!(c.inputs, vec![DEFAULT_INPUT.to_string()]);
        assert_eq!(c.tree_name, "CollectionTree");
        assert_eq!(c.output_path, PathBuf::from("analysis_output.json"));
        assert!(c.snapshot_path.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn default_output_replaces_the_root_file_with_json() {
        let path = PathBuf::from(DEFAULT_OUTPUT);
        assert_eq!(path.file_stem().and_then(|s| s.to_str()), Some("analysis_output"));
        assert_eq!(path.extension().and_then(|s| s.to_str()), Some("json"));
    }

    #[test]
    fn overrides_are_applied() {
        let c = AnalysisConfig::default()
            .with_overrides_from(env(&[
                (ENV_INPUTS, "a.parquet, data/*.parquet,,"),
                (ENV_THREADS, "3"),
                (ENV_SNAPSHOT, "selected.csv"),
            ]))
            .unwrap();
        assert_eq!(c.inputs, vec!["a.parquet".to_string(), "data/*.parquet".to_string()]);
        assert_eq!(c.execution.num_threads, Some(3));
        assert_eq!(c.snapshot_path, Some(PathBuf::from("selected.csv")));
    }

    #[test]
    fn empty_values_are_ignored() {
        let c = AnalysisConfig::default()
            .with_overrides_from(env(&[(ENV_INPUTS, "  "), (ENV_THREADS, "")]))
            .unwrap();
        assert_eq!(c, AnalysisConfig::default());
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = AnalysisConfig::default()
            .with_overrides_from(env(&[(ENV_THREADS, "many")]))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig { .. }));

        let zero = AnalysisConfig::default()
            .with_overrides_from(env(&[(ENV_THREADS, "0")]))
            .unwrap();
        assert!(zero.validate().is_err());

        let only_commas = AnalysisConfig::default()
            .with_overrides_from(env(&[(ENV_INPUTS, ",,")]))
            .unwrap();
        assert!(only_commas.validate().is_err());
    }
}
