/// SQLite Driver Module
///
/// Production [`Driver`] backed by rusqlite. The driver is loaded once per
/// process and shared by every operator through [`SqliteDriver::shared`].

use crate::core::db::driver::{ConnectOptions, Driver, DriverConnection, TransactionSql};
use crate::core::db::params::Param;
use crate::core::db::result_set::{ResultSet, Value};
use crate::core::{DriverError, OperatorError, Result};
use once_cell::sync::OnceCell;
use rusqlite::ffi::ErrorCode;
use rusqlite::types::{Value as SqlValue, ValueRef};
use std::sync::Arc;
use tracing::{debug, error};

/// Oldest SQLite library the driver accepts (3.8.3, first with CTEs).
const MIN_SQLITE_VERSION: i32 = 3_008_003;

const SQLITE_RANGE: i32 = 25;
const SQLITE_MISUSE: i32 = 21;

static SHARED: OnceCell<Arc<SqliteDriver>> = OnceCell::new();

/// SQLite implementation of [`Driver`]
#[derive(Debug)]
pub struct SqliteDriver {
    version: String,
}

impl SqliteDriver {
    /// Loads the driver, checking the linked SQLite library
    ///
    /// # Errors
    ///
    /// Returns `OperatorError::DriverLoad` if the library is too old.
    pub fn load() -> Result<Self> {
        let number = rusqlite::version_number();
        if number < MIN_SQLITE_VERSION {
            return Err(OperatorError::DriverLoad(format!(
                "SQLite {} is older than the supported minimum 3.8.3",
                rusqlite::version()
            )));
        }
        debug!("loaded SQLite driver {}", rusqlite::version());
        Ok(SqliteDriver {
            version: rusqlite::version().to_string(),
        })
    }

    /// The process-wide driver handle, loaded on first use
    pub fn shared() -> Result<Arc<SqliteDriver>> {
        SHARED
            .get_or_try_init(|| SqliteDriver::load().map(Arc::new))
            .map(Arc::clone)
            .map_err(|e| {
                error!("load driver error, msg: {}", e);
                e
            })
    }

    /// Version of the linked SQLite library
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Driver for SqliteDriver {
    fn connect(&self, options: &ConnectOptions) -> std::result::Result<Box<dyn DriverConnection>, DriverError> {
        let path = database_path(&options.host_name);
        if !options.user.is_empty() {
            debug!("SQLite has no user accounts, ignoring credentials for {}", options.user);
        }
        let conn = rusqlite::Connection::open(path).map_err(driver_error)?;
        Ok(Box::new(SqliteConnection {
            conn: Some(conn),
            path: path.to_string(),
        }))
    }

    fn transaction_sql(&self) -> TransactionSql {
        TransactionSql {
            begin: "BEGIN",
            commit: "COMMIT",
            rollback: "ROLLBACK",
        }
    }
}

/// Maps an endpoint address onto a SQLite database path
///
/// Accepts `sqlite://<path>`, `file:` URIs, plain paths and `:memory:`.
fn database_path(host_name: &str) -> &str {
    host_name.strip_prefix("sqlite://").unwrap_or(host_name)
}

/// A connection opened by [`SqliteDriver`]
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
    path: String,
}

impl SqliteConnection {
    fn live(&self) -> std::result::Result<&rusqlite::Connection, DriverError> {
        self.conn.as_ref().ok_or_else(|| {
            DriverError::new(format!("connection to {} is closed", self.path), SQLITE_MISUSE, "08003")
        })
    }
}

impl DriverConnection for SqliteConnection {
    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn execute_update(&mut self, sql: &str, params: &[Param]) -> std::result::Result<u64, DriverError> {
        let conn = self.live()?;
        let affected = if params.is_empty() {
            conn.execute(sql, []).map_err(driver_error)?
        } else {
            let values = bind_values(params)?;
            let mut stmt = conn.prepare(sql).map_err(driver_error)?;
            stmt.execute(rusqlite::params_from_iter(values.iter()))
                .map_err(driver_error)?
        };
        Ok(affected as u64)
    }

    fn execute_query(&mut self, sql: &str, params: &[Param]) -> std::result::Result<ResultSet, DriverError> {
        let conn = self.live()?;
        let values = bind_values(params)?;
        let mut stmt = conn.prepare(sql).map_err(driver_error)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();

        let mut rows = stmt
            .query(rusqlite::params_from_iter(values.iter()))
            .map_err(driver_error)?;
        let mut buffered = Vec::new();
        while let Some(row) = rows.next().map_err(driver_error)? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(to_value(row.get_ref(i).map_err(driver_error)?));
            }
            buffered.push(values);
        }
        Ok(ResultSet::new(columns, buffered))
    }

    fn execute(&mut self, sql: &str) -> std::result::Result<(), DriverError> {
        self.live()?.execute_batch(sql).map_err(driver_error)
    }

    fn close(&mut self) -> std::result::Result<(), DriverError> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| driver_error(e)),
            None => Ok(()),
        }
    }
}

fn bind_values(params: &[Param]) -> std::result::Result<Vec<SqlValue>, DriverError> {
    params.iter().map(to_sql_value).collect()
}

fn to_sql_value(param: &Param) -> std::result::Result<SqlValue, DriverError> {
    Ok(match param {
        Param::Null => SqlValue::Null,
        Param::Int32(v) => SqlValue::Integer(i64::from(*v)),
        Param::UInt32(v) => SqlValue::Integer(i64::from(*v)),
        Param::Int64(v) => SqlValue::Integer(*v),
        Param::UInt64(v) => SqlValue::Integer(i64::try_from(*v).map_err(|_| {
            DriverError::new(
                format!("value {} is out of range for a SQLite INTEGER", v),
                SQLITE_RANGE,
                "22003",
            )
        })?),
        Param::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Param::Double(v) => SqlValue::Real(*v),
        Param::Text(v) => SqlValue::Text(v.clone()),
        Param::Blob(v) => SqlValue::Blob(v.clone()),
    })
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// Converts a rusqlite error into a [`DriverError`]
///
/// The code is SQLite's extended result code; the state is the SQLSTATE class
/// closest to the primary result code.
fn driver_error(err: rusqlite::Error) -> DriverError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => DriverError::new(
            message.unwrap_or_else(|| failure.to_string()),
            failure.extended_code,
            sql_state(failure.code),
        ),
        rusqlite::Error::InvalidParameterCount(given, expected) => DriverError::new(
            format!("wrong number of parameters: {} given, {} expected", given, expected),
            SQLITE_RANGE,
            "07001",
        ),
        other => DriverError::new(other.to_string(), SQLITE_MISUSE, "HY000"),
    }
}

fn sql_state(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::ConstraintViolation => "23000",
        ErrorCode::CannotOpen | ErrorCode::NotADatabase => "08001",
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => "40001",
        ErrorCode::TypeMismatch | ErrorCode::TooBig | ErrorCode::ParameterOutOfRange => "22000",
        ErrorCode::Unknown | ErrorCode::AuthorizationForStatementDenied => "42000",
        _ => "HY000",
    }
}
