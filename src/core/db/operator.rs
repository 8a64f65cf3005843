/// Operator Module
///
/// The public face of the crate: statement execution, batches and explicit
/// transactions over the single connection kept by a [`ConnectionGuardian`].
///
/// ## Failure handling
///
/// Statements are never retried. When a statement fails inside an active
/// transaction, a `ROLLBACK` is issued straight away on the same connection
/// and the transaction state becomes `Idle`, whether or not the rollback
/// itself succeeded.

use crate::config::{self, RetryPolicy, Settings};
use crate::core::db::connection::{ConnectionGuardian, TransactionState};
use crate::core::db::driver::{ConnectOptions, Driver, DriverConnection, TransactionSql};
use crate::core::db::params::Param;
use crate::core::db::result_set::ResultSetHandle;
use crate::core::db::sqlite::SqliteDriver;
use crate::core::{BatchStep, DriverError, OperatorError, Result};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Contract of a single-connection SQL operator
///
/// `params` are bound 1-based to `?` placeholders; an empty slice runs the
/// statement unprepared.
pub trait SqlOperator {
    /// Runs a data-modifying statement and returns the affected row count
    fn execute(&mut self, sql: &str, params: &[Param]) -> Result<u64>;

    /// Runs a query and returns a shared, buffered result set
    fn execute_query(&mut self, sql: &str, params: &[Param]) -> Result<ResultSetHandle>;

    /// Runs `sqls` in order inside their own transaction
    ///
    /// Either every statement is committed and their row counts are returned
    /// in input order, or the batch is rolled back and an error returned.
    /// Fails with `OperatorError::TransactionActive` without issuing any
    /// statement if a transaction is already active.
    fn execute_batch(&mut self, sqls: &[&str]) -> Result<Vec<u64>>;

    /// Opens a transaction; fails if one is already active
    fn start_transaction(&mut self) -> Result<()>;

    /// Commits the active transaction; a no-op without one
    fn commit(&mut self) -> Result<()>;

    /// Rolls back the active transaction; a no-op without one
    fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;
}

/// [`SqlOperator`] over one lazily (re)connected driver connection
#[derive(Debug)]
pub struct Operator {
    guardian: ConnectionGuardian,
    tx_sql: TransactionSql,
}

impl Operator {
    /// Creates an operator with the default retry policy and connects
    pub fn new(driver: Arc<dyn Driver>, options: ConnectOptions) -> Self {
        Self::with_retry(driver, options, RetryPolicy::default())
    }

    /// Creates an operator and attempts a first connection
    ///
    /// A failed first connection is logged, not returned: the next operation
    /// tries again.
    pub fn with_retry(driver: Arc<dyn Driver>, options: ConnectOptions, retry: RetryPolicy) -> Self {
        let tx_sql = driver.transaction_sql();
        let mut guardian = ConnectionGuardian::new(driver, options, retry);
        if let Err(e) = guardian.connect() {
            warn!("initial connection failed, retrying on first use: {}", e);
        }
        Operator { guardian, tx_sql }
    }

    /// Opens an operator on the shared SQLite driver
    ///
    /// # Errors
    ///
    /// Returns `OperatorError::DriverLoad` if the driver cannot be loaded.
    pub fn open(
        host_name: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let driver = SqliteDriver::shared()?;
        Ok(Self::with_retry(
            driver,
            ConnectOptions::new(host_name, user, password),
            config::defaults().retry_policy(),
        ))
    }

    /// Opens an operator from the given settings on the shared SQLite driver
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let driver = SqliteDriver::shared()?;
        Ok(Self::with_retry(
            driver,
            settings.connect_options(),
            settings.retry_policy(),
        ))
    }

    /// Opens an operator from the process-wide defaults
    pub fn with_defaults() -> Result<Self> {
        Self::from_settings(config::defaults())
    }

    pub fn options(&self) -> &ConnectOptions {
        self.guardian.options()
    }

    pub fn is_connected(&self) -> bool {
        self.guardian.is_connected()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.guardian.transaction_state()
    }

    /// Reconciles transaction state after a failed statement
    fn statement_failed(&mut self, sql: &str, cause: DriverError) -> OperatorError {
        debug!(
            "statement failed: {} (error code: {}, SQLState: {}) sql: {}",
            cause.message, cause.code, cause.sql_state, sql
        );
        if self.guardian.transaction_state() != TransactionState::Active {
            return OperatorError::Driver(cause);
        }

        self.guardian.set_transaction_state(TransactionState::Idle);
        let rollback_sql = self.tx_sql.rollback;
        let rolled_back = self
            .guardian
            .current()
            .map_err(|_| DriverError::new("no connection to roll back on", 2006, "08003"))
            .and_then(|conn| conn.execute(rollback_sql));
        match rolled_back {
            Ok(()) => {
                debug!("rolled back transaction after failed statement");
                OperatorError::Driver(cause)
            }
            Err(rollback) => {
                error!(
                    "rollback error, msg: {} (error code: {}, SQLState: {})",
                    rollback.message, rollback.code, rollback.sql_state
                );
                OperatorError::RollbackFailed { cause, rollback }
            }
        }
    }
}

fn run_batch(
    conn: &mut dyn DriverConnection,
    tx_sql: TransactionSql,
    sqls: &[&str],
) -> std::result::Result<Vec<u64>, (BatchStep, DriverError)> {
    conn.execute(tx_sql.begin).map_err(|e| (BatchStep::Begin, e))?;
    let mut effect_rows = Vec::with_capacity(sqls.len());
    for (index, sql) in sqls.iter().enumerate() {
        let affected = conn
            .execute_update(sql, &[])
            .map_err(|e| (BatchStep::Statement(index), e))?;
        effect_rows.push(affected);
    }
    conn.execute(tx_sql.commit).map_err(|e| (BatchStep::Commit, e))?;
    Ok(effect_rows)
}

impl SqlOperator for Operator {
    fn execute(&mut self, sql: &str, params: &[Param]) -> Result<u64> {
        let conn = self.guardian.ensure_connection()?;
        match conn.execute_update(sql, params) {
            Ok(affected) => Ok(affected),
            Err(e) => Err(self.statement_failed(sql, e)),
        }
    }

    fn execute_query(&mut self, sql: &str, params: &[Param]) -> Result<ResultSetHandle> {
        let conn = self.guardian.ensure_connection()?;
        match conn.execute_query(sql, params) {
            Ok(result) => Ok(Arc::new(result)),
            Err(e) => Err(self.statement_failed(sql, e)),
        }
    }

    fn execute_batch(&mut self, sqls: &[&str]) -> Result<Vec<u64>> {
        if self.guardian.transaction_state() == TransactionState::Active {
            return Err(OperatorError::TransactionActive);
        }
        let tx_sql = self.tx_sql;
        let conn = self.guardian.ensure_connection()?;
        match run_batch(conn, tx_sql, sqls) {
            Ok(effect_rows) => Ok(effect_rows),
            Err((step, cause)) => {
                debug!(
                    "batch failed at {}: {} (error code: {}, SQLState: {})",
                    step, cause.message, cause.code, cause.sql_state
                );
                match conn.execute(tx_sql.rollback) {
                    Ok(()) => Err(OperatorError::Batch { step, source: cause }),
                    Err(rollback) => {
                        error!(
                            "batch rollback error, msg: {} (error code: {}, SQLState: {})",
                            rollback.message, rollback.code, rollback.sql_state
                        );
                        Err(OperatorError::RollbackFailed { cause, rollback })
                    }
                }
            }
        }
    }

    fn start_transaction(&mut self) -> Result<()> {
        if self.guardian.transaction_state() == TransactionState::Active {
            return Err(OperatorError::TransactionActive);
        }
        let begin = self.tx_sql.begin;
        self.execute(begin, &[])?;
        self.guardian.set_transaction_state(TransactionState::Active);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.guardian.transaction_state() == TransactionState::Idle {
            return Ok(());
        }
        let commit = self.tx_sql.commit;
        self.execute(commit, &[])?;
        self.guardian.set_transaction_state(TransactionState::Idle);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.guardian.transaction_state() == TransactionState::Idle {
            return Ok(());
        }
        let rollback = self.tx_sql.rollback;
        self.execute(rollback, &[])?;
        self.guardian.set_transaction_state(TransactionState::Idle);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.guardian.transaction_state() == TransactionState::Active
    }
}

impl Drop for Operator {
    fn drop(&mut self) {
        if self.in_transaction() {
            warn!("operator dropped with an active transaction, closing its connection");
        }
        self.guardian.close();
    }
}
