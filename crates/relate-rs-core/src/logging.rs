//! Logging integration for relate-rs.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`CompilerOptions`](crate::options::CompilerOptions) and for creating
//! per-compilation spans.

use crate::options::CompilerOptions;

/// Sets up the global tracing subscriber based on the given options.
///
/// The log level is read from `options.log_level` (e.g. "debug", "info",
/// "warn", "error"). In debug mode a pretty, human-readable format is used;
/// otherwise a structured JSON format is used. Installing a second
/// subscriber is a no-op.
pub fn setup_logging(options: &CompilerOptions) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&options.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if options.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span covering one query compilation.
///
/// All alias-allocation, join-selection, and include-planning events emitted
/// while the span is entered carry the root entity name.
///
/// # Examples
///
/// ```
/// use relate_rs_core::logging::compile_span;
///
/// let span = compile_span("Blog");
/// let _guard = span.enter();
/// tracing::debug!("starting compilation");
/// ```
pub fn compile_span(root_entity: &str) -> tracing::Span {
    tracing::debug_span!("compile", root = root_entity)
}
