//! Core error types for the relate-rs query compiler.
//!
//! All compilation failures are raised synchronously through [`RelateError`]
//! before any statement is returned to the caller; the compiler never emits a
//! partial statement list. Runtime database errors (syntax, constraint
//! violations) belong to the external executor layer and never appear here.

use thiserror::Error;

/// The primary error type for the relate-rs compiler.
///
/// Variants cover the full compilation-failure taxonomy: model lookups that
/// cannot be resolved, invalid model or query construction, identifier
/// limits, and dialect capabilities the requested query exceeds.
#[derive(Error, Debug)]
pub enum RelateError {
    // ── Resolution errors ────────────────────────────────────────────

    /// The query IR references a navigation property absent from the Model.
    ///
    /// Fails the whole compilation; no SQL is ever partially returned.
    #[error("Unresolved navigation '{navigation}' on entity '{entity}'")]
    UnresolvedNavigation {
        /// The entity the navigation was looked up on.
        entity: String,
        /// The navigation property name that could not be resolved.
        navigation: String,
    },

    /// The query IR references a property absent from the resolved entity.
    #[error("Unresolved property index {index} on entity '{entity}'")]
    UnresolvedProperty {
        /// The entity the property was looked up on.
        entity: String,
        /// The out-of-range property index.
        index: usize,
    },

    // ── Construction errors ──────────────────────────────────────────

    /// The Model failed validation at build time (missing key, FK arity
    /// mismatch, dangling navigation target, disagreeing inverse pair).
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// The query IR is structurally invalid for the Model it references
    /// (e.g. `Count` over a Reference navigation, a flattened path whose
    /// tail is not a Collection).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // ── Emission errors ──────────────────────────────────────────────

    /// Alias-collision suffixing produced an identifier longer than the
    /// dialect permits.
    #[error("Identifier '{identifier}' exceeds the dialect limit of {limit} characters")]
    UnsupportedIdentifier {
        /// The generated identifier that could not be shortened.
        identifier: String,
        /// The dialect's maximum identifier length.
        limit: usize,
    },

    /// The requested construct cannot be rendered by the given dialect.
    ///
    /// Raised instead of emitting syntactically invalid SQL.
    #[error("Dialect '{dialect}' cannot express {feature}")]
    UnsupportedDialectFeature {
        /// The dialect name.
        dialect: String,
        /// A description of the inexpressible construct.
        feature: String,
    },

    // ── Internal invariants ──────────────────────────────────────────

    /// A translated predicate omitted a required null guard for an optional
    /// navigation path. This is a compiler defect, caught by tests; it is
    /// never expected to surface to callers.
    #[error("Null-semantics invariant violated: {0}")]
    NullSemanticsViolation(String),

    // ── Configuration ────────────────────────────────────────────────

    /// Compiler options could not be parsed.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// A convenience type alias for `Result<T, RelateError>`.
pub type RelateResult<T> = Result<T, RelateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_navigation_display() {
        let err = RelateError::UnresolvedNavigation {
            entity: "Blog".into(),
            navigation: "Posts".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unresolved navigation 'Posts' on entity 'Blog'"
        );
    }

    #[test]
    fn test_unsupported_identifier_display() {
        let err = RelateError::UnsupportedIdentifier {
            identifier: "a_very_long_alias_2".into(),
            limit: 8,
        };
        assert!(err.to_string().contains("exceeds the dialect limit of 8"));
    }

    #[test]
    fn test_unsupported_dialect_feature_display() {
        let err = RelateError::UnsupportedDialectFeature {
            dialect: "legacy".into(),
            feature: "OFFSET paging".into(),
        };
        assert_eq!(
            err.to_string(),
            "Dialect 'legacy' cannot express OFFSET paging"
        );
    }

    #[test]
    fn test_invalid_model_display() {
        let err = RelateError::InvalidModel("entity 'A' has no primary key".into());
        assert!(err.to_string().starts_with("Invalid model:"));
    }
}
