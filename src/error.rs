#![forbid(unsafe_code)]
use crate::{
    coerce::Mismatch,
    data::{RowId, ValueKind},
    object::Schema,
};
use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage session is not open")]
    NotOpen,
    #[error(transparent)]
    TypeMismatch(Box<TypeMismatchError>),
    #[error(transparent)]
    Configuration(Box<ConfigurationError>),
    #[error(transparent)]
    NotFound(Box<NotFoundError>),
    #[error(transparent)]
    MissingColumn(Box<MissingColumnError>),
    #[error("database is locked")]
    LockConflict,
    #[error("storage error: {0}")]
    Storage(#[source] rusqlite::Error),
}

impl<'a> From<ErrorWithCtx<'a, rusqlite::Error>> for Error {
    fn from(err: ErrorWithCtx<'a, rusqlite::Error>) -> Self {
        let missing_column = match &err.err {
            rusqlite::Error::SqliteFailure(_, Some(text)) => {
                missing_column_name(text).map(str::to_string)
            }
            _ => None,
        };

        match (err.err, err.ctx.schema, missing_column) {
            (
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error {
                        code: rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked,
                        ..
                    },
                    _,
                ),
                _,
                _,
            ) => Error::LockConflict,

            (_, Some(schema), Some(column_name)) => {
                Error::MissingColumn(Box::new(MissingColumnError {
                    type_name: schema.type_name,
                    attr_name: schema
                        .field_by_column(&column_name)
                        .map_or("id", |(_, field)| field.attr_name),
                    table_name: schema.table_name,
                    column_name,
                }))
            }

            (err, _, _) => Error::Storage(err),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::from(ErrorWithCtx::new(err, ErrorCtx::default()))
    }
}

impl Error {
    pub(crate) fn not_found(row_id: RowId, type_name: &'static str) -> Error {
        Error::NotFound(Box::new(NotFoundError { row_id, type_name }))
    }

    pub(crate) fn configuration(type_name: &'static str, reason: impl Into<String>) -> Error {
        Error::Configuration(Box::new(ConfigurationError {
            type_name,
            reason: reason.into(),
        }))
    }

    pub(crate) fn field_mismatch(schema: &Schema, index: usize, mismatch: Mismatch) -> Error {
        let (attr_name, column_name) = schema
            .fields
            .get(index)
            .map_or(("id", "_id"), |field| (field.attr_name, field.column_name));
        Error::TypeMismatch(Box::new(TypeMismatchError {
            type_name: schema.type_name,
            attr_name,
            column_name: column_name.to_string(),
            expected: mismatch.expected,
            got: mismatch.got,
        }))
    }

    pub(crate) fn column_mismatch(
        type_name: &'static str,
        attr_name: &'static str,
        column_name: &str,
        mismatch: Mismatch,
    ) -> Error {
        Error::TypeMismatch(Box::new(TypeMismatchError {
            type_name,
            attr_name,
            column_name: column_name.to_string(),
            expected: mismatch.expected,
            got: mismatch.got,
        }))
    }
}

fn missing_column_name(text: &str) -> Option<&str> {
    ["no such column: ", "has no column named "]
        .iter()
        .find_map(|marker| text.find(marker).map(|ind| &text[ind + marker.len()..]))
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Error, Debug)]
#[error("row is not found: type '{type_name}', id {row_id}")]
pub struct NotFoundError {
    pub row_id: RowId,
    pub type_name: &'static str,
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Error, Debug)]
#[error(
    "invalid type for {type_name}::{attr_name}: expected {expected}, \
    got {got} (column: {column_name})"
)]
pub struct TypeMismatchError {
    pub type_name: &'static str,
    pub attr_name: &'static str,
    pub column_name: String,
    pub expected: &'static str,
    pub got: ValueKind,
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Error, Debug)]
#[error("configuration error for {type_name}: {reason}")]
pub struct ConfigurationError {
    pub type_name: &'static str,
    pub reason: String,
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Error, Debug)]
#[error(
    "missing a column for {type_name}::{attr_name} \
    (table: {table_name}, column: {column_name})"
)]
pub struct MissingColumnError {
    pub type_name: &'static str,
    pub attr_name: &'static str,
    pub table_name: &'static str,
    pub column_name: String,
}

pub(crate) struct ErrorWithCtx<'a, E> {
    err: E,
    ctx: ErrorCtx<'a>,
}

impl<E> ErrorWithCtx<'_, E> {
    pub fn new(err: E, ctx: ErrorCtx) -> ErrorWithCtx<E> {
        ErrorWithCtx { err, ctx }
    }
}

#[derive(Default, Clone, Copy)]
pub(crate) struct ErrorCtx<'a> {
    pub schema: Option<&'a Schema>,
}

////////////////////////////////////////////////////////////////////////////////

pub type Result<T> = std::result::Result<T, Error>;
