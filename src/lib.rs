//! Generates and executes batches of benchmark invocations.
//!
//! The generator expands a named configuration (ordered parameter axes) into
//! a batch file; the runner executes that file line by line and appends the
//! elapsed time of every case to a result file named after the case.

pub mod batch;
pub mod error;
pub mod execution;
pub mod generation;
pub mod logging;

pub use error::{Error, Result};
