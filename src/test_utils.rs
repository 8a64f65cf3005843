/// # Test Utilities Module
///
/// Fault-injection driver for exercising the operator without a database.
///
/// This module provides:
/// - A scripted driver whose connect attempts can fail on demand
/// - Connections that can be dropped from under the operator
/// - Statements that fail by SQL substring
/// - A shared log of every statement issued

use crate::core::db::{ConnectOptions, Driver, DriverConnection, Param, ResultSet, Value};
use crate::core::DriverError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Once};

/// Installs a tracing subscriber that writes through the test harness.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Default)]
struct Script {
    connect_attempts: usize,
    failing_connects: usize,
    fail_close: bool,
    next_id: usize,
    open: HashSet<usize>,
    executed: Vec<String>,
    failing_sql: Vec<String>,
}

/// Driver whose behaviour is scripted by the test
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        init_tracing();
        ScriptedDriver::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// The next `count` connect attempts fail
    pub fn fail_connects(&self, count: usize) {
        self.script().failing_connects = count;
    }

    /// Every statement containing `fragment` fails
    pub fn fail_statement(&self, fragment: &str) {
        self.script().failing_sql.push(fragment.to_string());
    }

    /// Closing a connection reports an error
    pub fn fail_close(&self) {
        self.script().fail_close = true;
    }

    /// Marks every open connection as closed, as a server restart would
    pub fn drop_connections(&self) {
        self.script().open.clear();
    }

    pub fn connect_attempts(&self) -> usize {
        self.script().connect_attempts
    }

    pub fn live_connections(&self) -> usize {
        self.script().open.len()
    }

    /// Every statement issued so far, in order, including failed ones
    pub fn executed(&self) -> Vec<String> {
        self.script().executed.clone()
    }

    pub fn clear_executed(&self) {
        self.script().executed.clear();
    }
}

impl Driver for ScriptedDriver {
    fn connect(&self, _options: &ConnectOptions) -> Result<Box<dyn DriverConnection>, DriverError> {
        let mut script = self.script();
        script.connect_attempts += 1;
        if script.failing_connects > 0 {
            script.failing_connects -= 1;
            return Err(DriverError::new("Can't connect to server", 2003, "08001"));
        }
        let id = script.next_id;
        script.next_id += 1;
        script.open.insert(id);
        Ok(Box::new(ScriptedConnection {
            id,
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedConnection {
    id: usize,
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnection {
    fn run(&self, sql: &str) -> Result<(), DriverError> {
        let mut script = self.script.lock().unwrap();
        if !script.open.contains(&self.id) {
            return Err(DriverError::new("Lost connection to server", 2013, "08003"));
        }
        script.executed.push(sql.to_string());
        if script.failing_sql.iter().any(|f| sql.contains(f.as_str())) {
            return Err(DriverError::new(format!("scripted failure: {}", sql), 1064, "42000"));
        }
        Ok(())
    }
}

impl DriverConnection for ScriptedConnection {
    fn is_closed(&self) -> bool {
        !self.script.lock().unwrap().open.contains(&self.id)
    }

    fn execute_update(&mut self, sql: &str, _params: &[Param]) -> Result<u64, DriverError> {
        self.run(sql).map(|_| 1)
    }

    fn execute_query(&mut self, sql: &str, params: &[Param]) -> Result<ResultSet, DriverError> {
        self.run(sql)?;
        Ok(ResultSet::new(
            vec!["sql".to_string(), "params".to_string()],
            vec![vec![Value::Text(sql.to_string()), Value::Integer(params.len() as i64)]],
        ))
    }

    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.run(sql)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let mut script = self.script.lock().unwrap();
        if script.fail_close {
            return Err(DriverError::new("close failed", 2006, "HY000"));
        }
        script.open.remove(&self.id);
        Ok(())
    }
}
