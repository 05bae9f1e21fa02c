#![forbid(unsafe_code)]
//! DDL synthesis from entity descriptors.

use crate::{
    error::{Error, Result},
    object::{FieldKind, Schema},
    registry::Registry,
    storage::ID_COLUMN,
};
use std::iter;

////////////////////////////////////////////////////////////////////////////////

/// Column type used in DDL for a field kind; `None` for kinds with no mapping.
pub fn column_type(kind: FieldKind) -> Option<&'static str> {
    match kind {
        FieldKind::Text => Some("text"),
        FieldKind::Int32 | FieldKind::Int64 | FieldKind::Timestamp | FieldKind::ForeignKey => {
            Some("int")
        }
        FieldKind::Float32 | FieldKind::Float64 => Some("real"),
        FieldKind::Blob => Some("blob"),
        FieldKind::Bool => Some("bool"),
        FieldKind::Int16 | FieldKind::Char => None,
    }
}

/// `CREATE TABLE <table> (_id integer primary key, <col> <type>, ...)`.
pub fn build_create_statement(schema: &Schema) -> Result<String> {
    let columns = schema
        .fields
        .iter()
        .map(|field| match column_type(field.kind) {
            Some(sql_type) => Ok(format!("{} {}", field.column_name, sql_type)),
            None => Err(Error::configuration(
                schema.type_name,
                format!(
                    "field `{}` of kind {:?} has no storage mapping",
                    field.attr_name, field.kind
                ),
            )),
        });

    let columns = iter::once(Ok(format!("{} integer primary key", ID_COLUMN)))
        .chain(columns)
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    Ok(format!("CREATE TABLE {} ({})", schema.table_name, columns))
}

pub fn build_drop_statement(table_name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", table_name)
}

pub fn list_tables(registry: &Registry) -> Vec<&'static str> {
    registry
        .entity_types()
        .map(|entity_type| entity_type.schema().table_name)
        .collect()
}

////////////////////////////////////////////////////////////////////////////////
