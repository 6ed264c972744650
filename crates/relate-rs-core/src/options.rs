//! Compiler options for relate-rs.
//!
//! [`CompilerOptions`] collects the tunables the query compiler consults
//! while planning: the join-flattening depth past which eagerly requested
//! Reference chains are split into follow-up statements, whether literals
//! are parameterized, and logging configuration. Options can be loaded from
//! a TOML document or constructed with defaults.

use serde::Deserialize;

use crate::error::{RelateError, RelateResult};

/// Default maximum depth for folding Reference include chains into the
/// primary statement before they are promoted to follow-up statements.
const DEFAULT_MAX_JOIN_DEPTH: usize = 8;

/// Tunable options consulted during query compilation.
///
/// # Examples
///
/// ```
/// use relate_rs_core::options::CompilerOptions;
///
/// let opts = CompilerOptions::default();
/// assert_eq!(opts.max_join_depth, 8);
///
/// let opts = CompilerOptions::from_toml("max_join_depth = 3").unwrap();
/// assert_eq!(opts.max_join_depth, 3);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Reference include chains longer than this are promoted to separate
    /// correlated statements instead of being folded as joins.
    pub max_join_depth: usize,
    /// Whether literal values in predicates are emitted as parameters.
    /// When `false`, literals are inlined (useful for debugging output).
    pub parameterize_literals: bool,
    /// Log level filter for [`setup_logging`](crate::logging::setup_logging)
    /// (e.g. "debug", "info", "warn").
    pub log_level: String,
    /// Pretty human-readable log output when `true`, JSON otherwise.
    pub debug: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_join_depth: DEFAULT_MAX_JOIN_DEPTH,
            parameterize_literals: true,
            log_level: "info".to_string(),
            debug: false,
        }
    }
}

impl CompilerOptions {
    /// Parses options from a TOML document, falling back to defaults for
    /// absent keys.
    ///
    /// # Errors
    ///
    /// Returns [`RelateError::ConfigurationError`] if the document is not
    /// valid TOML or a key has the wrong type.
    pub fn from_toml(document: &str) -> RelateResult<Self> {
        toml::from_str(document).map_err(|e| RelateError::ConfigurationError(e.to_string()))
    }
}
