//! Positional statement parameters.
//!
//! A statement's parameters are an ordered slice of [`Param`] values, bound
//! 1-based by position through the driver's prepared-statement mechanism.

use std::io::Read;

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Bool(bool),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Param {
    /// Reads a whole binary stream into a blob parameter.
    pub fn blob_from_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Param::Blob(buf))
    }

    /// Name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Param::Null => "null",
            Param::Int32(_) => "i32",
            Param::UInt32(_) => "u32",
            Param::Int64(_) => "i64",
            Param::UInt64(_) => "u64",
            Param::Bool(_) => "bool",
            Param::Double(_) => "f64",
            Param::Text(_) => "text",
            Param::Blob(_) => "blob",
        }
    }
}

macro_rules! impl_from_param {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Param {
                fn from(value: $ty) -> Self {
                    Param::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_param! {
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    bool => Bool,
    f64 => Double,
    String => Text,
    &str => Text,
    &String => Text,
    Vec<u8> => Blob,
    &[u8] => Blob,
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Param::Null)
    }
}

/// Builds a `Vec<Param>` from heterogeneous values.
///
/// ```
/// use sql_operator::params;
/// let params = params![13, "name2"];
/// assert_eq!(params.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Param>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::Param::from($value)),+]
    };
}
