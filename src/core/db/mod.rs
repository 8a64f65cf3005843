/// Database Module
///
/// This module provides the database layer of the operator, organized into
/// focused submodules.
///
/// ## Architecture
///
/// - **Driver boundary** (`driver.rs`): traits a SQL client library implements
/// - **SQLite driver** (`sqlite.rs`): the production driver, on rusqlite
/// - **Connection Management** (`connection.rs`): the single connection, retries and transaction state
/// - **Operator** (`operator.rs`): statement execution, batches and transactions
/// - **Parameters and results** (`params.rs`, `result_set.rs`)
///
/// ## Error Handling
///
/// Driver calls return `DriverError`; everything above them returns `OperatorError`.
pub mod connection;
pub mod driver;
pub mod operator;
pub mod params;
pub mod result_set;
pub mod sqlite;

pub use connection::*;
pub use driver::*;
pub use operator::*;
pub use params::*;
pub use result_set::*;
pub use sqlite::*;
