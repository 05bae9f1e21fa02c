#![forbid(unsafe_code)]
use std::{borrow::Cow, fmt};

////////////////////////////////////////////////////////////////////////////////

/// Synthetic 64-bit row identifier stored in the `_id` column.
///
/// `RowId(0)` means "not yet persisted".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
pub struct RowId(pub i64);

impl RowId {
    pub const NONE: RowId = RowId(0);

    pub fn into_i64(&self) -> i64 {
        self.0
    }

    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        RowId(value)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Kind of a [`Value`], used in mismatch reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Text,
    Integer,
    Real,
    Bool,
    Blob,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::Real => "real",
            ValueKind::Bool => "bool",
            ValueKind::Blob => "blob",
        };
        f.write_str(name)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// A storage scalar, the closed set of values exchanged with the database.
#[derive(Clone, Debug, PartialEq)]
pub enum Value<'a> {
    Null,
    Text(Cow<'a, str>),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Blob(Cow<'a, [u8]>),
}

impl<'a> Value<'a> {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Text(_) => ValueKind::Text,
            Value::Integer(_) => ValueKind::Integer,
            Value::Real(_) => ValueKind::Real,
            Value::Bool(_) => ValueKind::Bool,
            Value::Blob(_) => ValueKind::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn into_owned(self) -> Value<'static> {
        match self {
            Value::Null => Value::Null,
            Value::Text(s) => Value::Text(Cow::Owned(s.into_owned())),
            Value::Integer(x) => Value::Integer(x),
            Value::Real(x) => Value::Real(x),
            Value::Bool(x) => Value::Bool(x),
            Value::Blob(b) => Value::Blob(Cow::Owned(b.into_owned())),
        }
    }

    pub fn borrowed(&self) -> Value<'_> {
        match self {
            Value::Null => Value::Null,
            Value::Text(s) => Value::Text(Cow::Borrowed(s)),
            Value::Integer(x) => Value::Integer(*x),
            Value::Real(x) => Value::Real(*x),
            Value::Bool(x) => Value::Bool(*x),
            Value::Blob(b) => Value::Blob(Cow::Borrowed(b)),
        }
    }
}

impl From<&'static str> for Value<'static> {
    fn from(value: &'static str) -> Self {
        Value::Text(Cow::Borrowed(value))
    }
}

impl From<String> for Value<'static> {
    fn from(value: String) -> Self {
        Value::Text(Cow::Owned(value))
    }
}

impl From<i64> for Value<'static> {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value<'static> {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value<'static> {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value<'static> {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<RowId> for Value<'static> {
    fn from(value: RowId) -> Self {
        Value::Integer(value.0)
    }
}

impl From<Vec<u8>> for Value<'static> {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(Cow::Owned(value))
    }
}

////////////////////////////////////////////////////////////////////////////////

pub type Row<'a> = Vec<Value<'a>>;
pub type RowSlice<'a> = [Value<'a>];
