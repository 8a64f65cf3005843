/// Core Module
///
/// This module contains the error types and the database layer that the
/// rest of the crate is built on.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{BatchStep, DriverError, OperatorError, Result};
