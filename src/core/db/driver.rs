/// Driver Module
///
/// The boundary between the operator and a SQL client library. A [`Driver`]
/// opens connections; a [`DriverConnection`] runs statements. Failures are
/// reported as [`DriverError`] values carrying the driver's code and state.

use crate::core::db::params::Param;
use crate::core::db::result_set::ResultSet;
use crate::core::DriverError;
use std::fmt;

/// Target and credentials for a connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host_name: String,
    pub user: String,
    pub password: String,
}

impl ConnectOptions {
    pub fn new(
        host_name: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        ConnectOptions {
            host_name: host_name.into(),
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host_name", &self.host_name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transaction control statements understood by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSql {
    pub begin: &'static str,
    pub commit: &'static str,
    pub rollback: &'static str,
}

impl Default for TransactionSql {
    fn default() -> Self {
        TransactionSql {
            begin: "START TRANSACTION;",
            commit: "COMMIT;",
            rollback: "ROLLBACK;",
        }
    }
}

/// Entry point of a SQL client library.
pub trait Driver: Send + Sync {
    /// Opens a new connection to the target in `options`
    fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn DriverConnection>, DriverError>;

    /// Statements used to open and resolve transactions
    fn transaction_sql(&self) -> TransactionSql {
        TransactionSql::default()
    }
}

/// A live connection opened by a [`Driver`].
///
/// An empty `params` slice runs the statement as-is; otherwise the statement
/// is prepared and `params` are bound 1-based by position.
pub trait DriverConnection: Send {
    /// Whether the connection can no longer be used
    fn is_closed(&self) -> bool;

    /// Runs a statement that returns no rows and reports the affected row count
    fn execute_update(&mut self, sql: &str, params: &[Param]) -> Result<u64, DriverError>;

    /// Runs a query and buffers its rows
    fn execute_query(&mut self, sql: &str, params: &[Param]) -> Result<ResultSet, DriverError>;

    /// Runs a control statement such as `COMMIT`
    fn execute(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Closes the connection; `is_closed` is true afterwards
    fn close(&mut self) -> Result<(), DriverError>;
}
