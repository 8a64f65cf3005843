/// Operator Error Module
///
/// This module defines the error types returned by the operator and by the
/// driver layer underneath it. Every failure that used to be reported as a
/// bare `false` carries its diagnostic detail here.
use std::fmt;
use thiserror::Error;

/// Error reported by a database driver.
///
/// Carries the driver message together with the numeric error code and the
/// SQLSTATE-style state string, so callers can tell failures apart without
/// reading logs.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (error code: {code}, SQLState: {sql_state})")]
pub struct DriverError {
    pub message: String,
    pub code: i32,
    pub sql_state: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>, code: i32, sql_state: impl Into<String>) -> Self {
        DriverError {
            message: message.into(),
            code,
            sql_state: sql_state.into(),
        }
    }
}

/// The step of a batch that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStep {
    /// Opening the batch transaction
    Begin,
    /// The statement at this zero-based position
    Statement(usize),
    /// Committing the batch transaction
    Commit,
}

impl fmt::Display for BatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStep::Begin => write!(f, "begin"),
            BatchStep::Statement(index) => write!(f, "statement #{}", index),
            BatchStep::Commit => write!(f, "commit"),
        }
    }
}

/// Error type for every operator operation.
///
/// The variants follow the failure taxonomy of the operator:
/// - connection acquisition (retried, then `ConnectionUnavailable`)
/// - statement execution (never retried)
/// - transaction state violations and losses
/// - rollback failures
/// - driver loading and configuration
#[derive(Error, Debug)]
pub enum OperatorError {
    /// A statement failed; any active transaction was rolled back
    #[error("Statement failed: {0}")]
    Driver(#[from] DriverError),

    /// No usable connection after all connection attempts
    #[error("Connection unavailable after {attempts} attempt(s){}", last_cause(.last))]
    ConnectionUnavailable {
        attempts: u32,
        last: Option<DriverError>,
    },

    /// The connection was closed while a transaction was active
    #[error("Transaction lost: connection closed while a transaction was active")]
    TransactionLost,

    /// A transaction is already active
    #[error("Transaction error: a transaction is already active")]
    TransactionActive,

    /// A batch failed at `step` and was rolled back
    #[error("Batch failed at {step}: {source}")]
    Batch {
        step: BatchStep,
        #[source]
        source: DriverError,
    },

    /// A failure was followed by a rollback that failed too
    #[error("Rollback failed: {rollback} (after: {cause})")]
    RollbackFailed {
        cause: DriverError,
        rollback: DriverError,
    },

    /// The shared driver could not be loaded
    #[error("Driver load error: {0}")]
    DriverLoad(String),

    /// Column lookup or conversion failed
    #[error("Column error: {0}")]
    Column(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OperatorError {
    /// Returns true for failures to obtain a usable connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            OperatorError::ConnectionUnavailable { .. } | OperatorError::TransactionLost
        )
    }

    /// Returns true for failures caused by transaction state
    pub fn is_transaction_error(&self) -> bool {
        matches!(
            self,
            OperatorError::TransactionLost
                | OperatorError::TransactionActive
                | OperatorError::RollbackFailed { .. }
        )
    }

    /// The driver error closest to the root cause, if any
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            OperatorError::Driver(e) => Some(e),
            OperatorError::ConnectionUnavailable { last, .. } => last.as_ref(),
            OperatorError::Batch { source, .. } => Some(source),
            OperatorError::RollbackFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

fn last_cause(last: &Option<DriverError>) -> String {
    last.as_ref().map(|e| format!(": {}", e)).unwrap_or_default()
}

/// Type alias for Result to use OperatorError as the error type.
pub type Result<T> = std::result::Result<T, OperatorError>;
