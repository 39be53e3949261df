//! Tunables for the search engine, loadable from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Search behaviour switches.
///
/// ```toml
/// single_answer_leaves = true
/// short_circuit = false
/// log_procedure_on_error = true
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraversalOptions {
    /// Stop enumerating an unprojected, unnamed leaf after its first candidate.
    pub single_answer_leaves: bool,
    /// Skip vertices between a failed vertex and its last dependee when the
    /// failed vertex never produced a candidate.
    pub short_circuit: bool,
    /// Include parameters and the procedure rendering in error logs.
    pub log_procedure_on_error: bool,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            single_answer_leaves: true,
            short_circuit: true,
            log_procedure_on_error: true,
        }
    }
}

impl TraversalOptions {
    /// Sets [`TraversalOptions::single_answer_leaves`].
    pub fn single_answer_leaves(mut self, enabled: bool) -> Self {
        self.single_answer_leaves = enabled;
        self
    }

    /// Sets [`TraversalOptions::short_circuit`].
    pub fn short_circuit(mut self, enabled: bool) -> Self {
        self.short_circuit = enabled;
        self
    }

    /// Sets [`TraversalOptions::log_procedure_on_error`].
    pub fn log_procedure_on_error(mut self, enabled: bool) -> Self {
        self.log_procedure_on_error = enabled;
        self
    }

    /// Parses options from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, OptionsError> {
        toml::from_str(contents).map_err(|source| OptionsError::Parse { path: None, source })
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| OptionsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| OptionsError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })
    }
}

/// Failure to obtain [`TraversalOptions`].
#[derive(Debug, Error)]
pub enum OptionsError {
    /// The file could not be read.
    #[error("failed to read traversal options {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The contents are not valid options.
    #[error("failed to parse traversal options{}: {source}", display_path(.path))]
    Parse {
        /// File that failed, when parsing a file.
        path: Option<PathBuf>,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" {}", path.display()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_keys_keep_defaults() {
        let options = TraversalOptions::from_toml_str("short_circuit = false").expect("parse");
        assert_eq!(options, TraversalOptions::default().short_circuit(false));
        assert!(options.single_answer_leaves);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = TraversalOptions::from_toml_str("shortcircuit = false").expect_err("typo");
        assert!(matches!(err, OptionsError::Parse { path: None, .. }));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "single_answer_leaves = false").expect("write");
        let options = TraversalOptions::load(file.path()).expect("load");
        assert!(!options.single_answer_leaves);

        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            TraversalOptions::load(&missing),
            Err(OptionsError::Read { .. })
        ));
    }
}
