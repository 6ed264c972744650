//! # relate-rs-core
//!
//! Shared foundation for the relate-rs query compiler: the
//! [`RelateError`](error::RelateError) taxonomy, tunable
//! [`CompilerOptions`](options::CompilerOptions), and [`tracing`]-based
//! logging helpers.

pub mod error;
pub mod logging;
pub mod options;

pub use error::{RelateError, RelateResult};
pub use options::CompilerOptions;
