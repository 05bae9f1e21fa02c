#![forbid(unsafe_code)]
use crate::{
    coerce::{CoerceResult, Mismatch},
    data::{Row, Value},
    error::{Error, Result},
    session::Session,
};
use std::{any::Any, collections::HashMap};

////////////////////////////////////////////////////////////////////////////////

/// A persistent type. Implemented by `#[derive(Entity)]`.
///
/// Field indexes used by [`Entity::assign`] and [`Entity::value_of`] follow
/// [`Schema::fields`], which never includes the synthetic `_id` column.
pub trait Entity: Any + Default + Send + Sync {
    fn schema() -> &'static Schema;

    fn value_of(&self, index: usize) -> Option<CoerceResult<Value<'_>>>;
    fn assign(&mut self, index: usize, value: Value<'_>) -> std::result::Result<(), Mismatch>;

    /// Resolves foreign-key fields after every scalar field has been assigned.
    fn resolve_links(&mut self, session: &Session) -> Result<()>;

    /// Storage values of every persisted field, in [`Schema::fields`] order.
    fn deflate(&self) -> Result<Row<'_>> {
        let schema = Self::schema();
        (0..schema.fields.len())
            .filter_map(|index| {
                let value = self.value_of(index)?;
                Some(value.map_err(|mismatch| Error::field_mismatch(schema, index, mismatch)))
            })
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Descriptor of an entity type, built once at compile time.
#[derive(Debug)]
pub struct Schema {
    /// Fully qualified type path, used for identity keys.
    pub type_name: &'static str,
    pub simple_name: &'static str,
    pub table_name: &'static str,

    // static, because list is created at compile-time by derive macro
    pub fields: &'static [Field],
}

impl Schema {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|field| field.column_name)
    }

    pub fn field_by_attr(&self, attr_name: &str) -> Option<(usize, &'static Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.attr_name == attr_name)
    }

    pub fn field_by_column(&self, column_name: &str) -> Option<(usize, &'static Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.column_name == column_name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub attr_name: &'static str,
    pub column_name: &'static str,
    pub kind: FieldKind,
}

/// Declared type of a persisted field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Char,
    Blob,
    Timestamp,
    ForeignKey,
}

////////////////////////////////////////////////////////////////////////////////

/// Anything `copy_from` can read named fields out of.
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<Value<'_>>;
}

impl<T: Entity> FieldSource for T {
    fn field(&self, name: &str) -> Option<Value<'_>> {
        let (index, _) = T::schema().field_by_attr(name)?;
        self.value_of(index)?.ok()
    }
}

impl FieldSource for HashMap<String, Value<'static>> {
    fn field(&self, name: &str) -> Option<Value<'_>> {
        self.get(name).map(Value::borrowed)
    }
}
