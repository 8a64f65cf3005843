//! A single-connection SQL operator.
//!
//! [`Operator`] wraps one driver connection and offers plain and
//! parameterized statements, buffered queries, all-or-nothing batches and
//! explicit transactions. The connection is acquired lazily with bounded
//! retries and replaced when found closed, unless a transaction was active
//! on it.
//!
//! ```no_run
//! use sql_operator::{params, Operator, SqlOperator};
//!
//! let mut op = Operator::open("sqlite://app.db", "root", "")?;
//! op.execute("CREATE TABLE IF NOT EXISTS test (age INTEGER, name TEXT)", &[])?;
//! op.execute("INSERT INTO test (age, name) VALUES (?, ?)", &params![13, "name2"])?;
//! let result = op.execute_query("SELECT age, name FROM test WHERE age = ?", &params![13])?;
//! for row in result.rows() {
//!     println!("age: {}, name: {}", row.get::<i64>("age")?, row.get::<String>("name")?);
//! }
//! # Ok::<(), sql_operator::OperatorError>(())
//! ```

// Core infrastructure modules
pub mod config;
pub mod core;

#[cfg(test)]
mod test_utils;

pub use crate::config::{RetryPolicy, Settings};
pub use crate::core::db::{
    ConnectOptions, ConnectionGuardian, Driver, DriverConnection, FromValue, Operator, Param,
    ResultSet, ResultSetHandle, Row, SqlOperator, SqliteDriver, TransactionSql, TransactionState,
    Value,
};
pub use crate::core::{BatchStep, DriverError, OperatorError, Result};
