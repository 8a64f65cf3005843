/// Connection Management Module
///
/// This module owns the operator's single connection: lazy acquisition with
/// bounded retry, replacement of closed handles, and the transaction state
/// that decides whether a replacement is allowed at all.

use crate::config::RetryPolicy;
use crate::core::db::driver::{ConnectOptions, Driver, DriverConnection};
use crate::core::{DriverError, OperatorError, Result};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No active transaction (autocommit mode)
    #[default]
    Idle,
    /// Transaction in progress
    Active,
}

/// Owner of one logical database connection
///
/// The guardian hands out the connection only after checking it is open.
/// A missing or closed connection is replaced by a fresh one, except while a
/// transaction is active: a transaction cannot survive the loss of its
/// connection, so the state drops to `Idle` and the caller gets
/// `OperatorError::TransactionLost` instead.
pub struct ConnectionGuardian {
    driver: Arc<dyn Driver>,
    options: ConnectOptions,
    retry: RetryPolicy,
    connection: Option<Box<dyn DriverConnection>>,
    state: TransactionState,
}

impl ConnectionGuardian {
    /// Creates a guardian without connecting
    pub fn new(driver: Arc<dyn Driver>, options: ConnectOptions, retry: RetryPolicy) -> Self {
        ConnectionGuardian {
            driver,
            options,
            retry,
            connection: None,
            state: TransactionState::Idle,
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Whether an open connection is held right now
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().map_or(false, |c| !c.is_closed())
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.state
    }

    pub fn set_transaction_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    /// Returns an open connection, reconnecting if allowed
    ///
    /// # Errors
    ///
    /// - `OperatorError::TransactionLost` if the connection is gone while a
    ///   transaction is active; the state is `Idle` afterwards.
    /// - `OperatorError::ConnectionUnavailable` if every attempt failed.
    pub fn ensure_connection(&mut self) -> Result<&mut dyn DriverConnection> {
        if !self.is_connected() {
            if self.state == TransactionState::Active {
                warn!("connection closed during an active transaction, transaction is lost");
                self.state = TransactionState::Idle;
                return Err(OperatorError::TransactionLost);
            }
            self.connect()?;
        }
        self.current()
    }

    /// Replaces the current connection, retrying per the retry policy
    ///
    /// Any previous handle is closed and discarded first, so at most one
    /// handle is live at a time.
    pub fn connect(&mut self) -> Result<()> {
        self.discard();

        let mut last: Option<DriverError> = None;
        for attempt in 1..=self.retry.max_attempts {
            if attempt != 1 {
                debug!("waiting {:?} for retry to get connection", self.retry.delay);
                thread::sleep(self.retry.delay);
            }
            match self.driver.connect(&self.options) {
                Ok(conn) if !conn.is_closed() => {
                    debug!("sql operator created connection on attempt {}", attempt);
                    self.connection = Some(conn);
                    return Ok(());
                }
                Ok(_) => {
                    error!("connect to {} returned a closed connection", self.options.host_name);
                    last = None;
                }
                Err(e) => {
                    error!(
                        "connect to {} error, msg: {} (error code: {}, SQLState: {})",
                        self.options.host_name, e.message, e.code, e.sql_state
                    );
                    last = Some(e);
                }
            }
        }

        error!(
            "completely dead, no connection to {} after {} attempt(s)",
            self.options.host_name, self.retry.max_attempts
        );
        Err(OperatorError::ConnectionUnavailable {
            attempts: self.retry.max_attempts,
            last,
        })
    }

    /// The held connection without any liveness check or reconnect
    pub fn current(&mut self) -> Result<&mut dyn DriverConnection> {
        match self.connection.as_deref_mut() {
            Some(conn) => Ok(conn),
            None => Err(OperatorError::ConnectionUnavailable {
                attempts: 0,
                last: None,
            }),
        }
    }

    /// Closes the held connection, logging close failures
    pub fn close(&mut self) {
        self.discard();
        self.state = TransactionState::Idle;
    }

    fn discard(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            if conn.is_closed() {
                return;
            }
            if let Err(e) = conn.close() {
                error!(
                    "connection close error, msg: {} (error code: {}, SQLState: {})",
                    e.message, e.code, e.sql_state
                );
            }
        }
    }
}

impl Drop for ConnectionGuardian {
    fn drop(&mut self) {
        self.discard();
    }
}

impl std::fmt::Debug for ConnectionGuardian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuardian")
            .field("options", &self.options)
            .field("retry", &self.retry)
            .field("connected", &self.is_connected())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedDriver;
    use std::time::{Duration, Instant};

    fn guardian(driver: &ScriptedDriver, retry: RetryPolicy) -> ConnectionGuardian {
        ConnectionGuardian::new(
            Arc::new(driver.clone()),
            ConnectOptions::new("scripted://test", "root", "pw"),
            retry,
        )
    }

    #[test]
    fn test_starts_disconnected_and_connects_lazily() {
        let driver = ScriptedDriver::new();
        let mut guardian = guardian(&driver, RetryPolicy::new(3, Duration::ZERO));
        assert!(!guardian.is_connected());
        assert_eq!(driver.connect_attempts(), 0);

        guardian.ensure_connection().unwrap();
        assert!(guardian.is_connected());
        assert_eq!(driver.connect_attempts(), 1);

        // An open connection is reused
        guardian.ensure_connection().unwrap();
        assert_eq!(driver.connect_attempts(), 1);
    }

    #[test]
    fn test_retry_bound() {
        let driver = ScriptedDriver::new();
        driver.fail_connects(usize::MAX);
        let delay = Duration::from_millis(20);
        let mut guardian = guardian(&driver, RetryPolicy::new(3, delay));

        let start = Instant::now();
        let err = guardian.ensure_connection().err().expect("connect should fail");
        let elapsed = start.elapsed();

        assert_eq!(driver.connect_attempts(), 3);
        assert!(elapsed >= delay * 2, "two pauses expected, waited {:?}", elapsed);
        match err {
            OperatorError::ConnectionUnavailable { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.unwrap().sql_state, "08001");
            }
            other => panic!("Expected ConnectionUnavailable, got {:?}", other),
        }
        assert!(!guardian.is_connected());
    }

    #[test]
    fn test_no_pause_before_first_attempt() {
        let driver = ScriptedDriver::new();
        let mut guardian = guardian(&driver, RetryPolicy::new(3, Duration::from_secs(5)));
        let start = Instant::now();
        guardian.ensure_connection().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_recovers_after_transient_failures() {
        let driver = ScriptedDriver::new();
        driver.fail_connects(2);
        let mut guardian = guardian(&driver, RetryPolicy::new(3, Duration::ZERO));
        guardian.ensure_connection().unwrap();
        assert_eq!(driver.connect_attempts(), 3);
        assert!(guardian.is_connected());
    }

    #[test]
    fn test_closed_connection_is_replaced() {
        let driver = ScriptedDriver::new();
        let mut guardian = guardian(&driver, RetryPolicy::new(3, Duration::ZERO));
        guardian.ensure_connection().unwrap();
        driver.drop_connections();
        assert!(!guardian.is_connected());

        guardian.ensure_connection().unwrap();
        assert!(guardian.is_connected());
        assert_eq!(driver.connect_attempts(), 2);
        assert_eq!(driver.live_connections(), 1);
    }

    #[test]
    fn test_reconnect_closes_previous_handle() {
        let driver = ScriptedDriver::new();
        let mut guardian = guardian(&driver, RetryPolicy::new(3, Duration::ZERO));
        guardian.connect().unwrap();
        guardian.connect().unwrap();
        assert_eq!(driver.connect_attempts(), 2);
        assert_eq!(driver.live_connections(), 1);
    }

    #[test]
    fn test_transaction_lost_on_disconnect() {
        let driver = ScriptedDriver::new();
        let mut guardian = guardian(&driver, RetryPolicy::new(3, Duration::ZERO));
        guardian.ensure_connection().unwrap();
        guardian.set_transaction_state(TransactionState::Active);
        driver.drop_connections();

        let err = guardian.ensure_connection().err().expect("transaction must be lost");
        assert!(matches!(err, OperatorError::TransactionLost));
        assert_eq!(guardian.transaction_state(), TransactionState::Idle);
        assert_eq!(driver.connect_attempts(), 1);

        // The next operation is free to reconnect
        guardian.ensure_connection().unwrap();
        assert_eq!(driver.connect_attempts(), 2);
    }

    #[test]
    fn test_drop_closes_connection() {
        let driver = ScriptedDriver::new();
        let mut guardian = guardian(&driver, RetryPolicy::default());
        guardian.ensure_connection().unwrap();
        assert_eq!(driver.live_connections(), 1);
        drop(guardian);
        assert_eq!(driver.live_connections(), 0);
    }

    #[test]
    fn test_close_failure_is_not_propagated() {
        let driver = ScriptedDriver::new();
        driver.fail_close();
        let mut guardian = guardian(&driver, RetryPolicy::default());
        guardian.ensure_connection().unwrap();
        guardian.close();
        assert!(!guardian.is_connected());
        assert_eq!(guardian.transaction_state(), TransactionState::Idle);
    }
}
