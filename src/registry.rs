#![forbid(unsafe_code)]
use crate::{
    error::{Error, Result},
    object::{Entity, Schema},
    schema::build_create_statement,
};
use std::{any::TypeId, collections::HashSet};

////////////////////////////////////////////////////////////////////////////////

/// Handle to a registered entity type.
#[derive(Clone, Copy, Debug)]
pub struct EntityType {
    type_id: TypeId,
    schema: &'static Schema,
}

impl EntityType {
    pub fn of<T: Entity>() -> Self {
        EntityType {
            type_id: TypeId::of::<T>(),
            schema: T::schema(),
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

/// The set of entity types a database is built from, keyed by simple name and
/// kept in registration order.
#[derive(Default, Debug)]
pub struct Registry {
    types: Vec<EntityType>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`. Registering the same type twice is a no-op.
    pub fn register<T: Entity>(&mut self) -> Result<&mut Self> {
        let entity_type = EntityType::of::<T>();
        let schema = entity_type.schema;

        if let Some(existing) = self.find(schema.simple_name) {
            if existing.type_id == entity_type.type_id {
                return Ok(self);
            }
            return Err(Error::configuration(
                schema.type_name,
                format!(
                    "simple name `{}` is already registered by {}",
                    schema.simple_name, existing.schema.type_name
                ),
            ));
        }

        if let Some(other) = self
            .types
            .iter()
            .find(|other| other.schema.table_name == schema.table_name)
        {
            return Err(Error::configuration(
                schema.type_name,
                format!(
                    "table `{}` is already used by {}",
                    schema.table_name, other.schema.type_name
                ),
            ));
        }

        let mut seen = HashSet::new();
        for field in schema.fields {
            if !seen.insert(field.column_name) {
                return Err(Error::configuration(
                    schema.type_name,
                    format!("column `{}` is declared twice", field.column_name),
                ));
            }
        }

        log::debug!("registered {} as table {}", schema.type_name, schema.table_name);
        self.types.push(entity_type);
        Ok(self)
    }

    fn find(&self, simple_name: &str) -> Option<&EntityType> {
        self.types
            .iter()
            .find(|entity_type| entity_type.schema.simple_name == simple_name)
    }

    pub fn get(&self, simple_name: &str) -> Result<&EntityType> {
        self.find(simple_name).ok_or_else(|| {
            Error::configuration("registry", format!("no entity type named `{}`", simple_name))
        })
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.iter()
    }

    pub fn create_statement(&self, simple_name: &str) -> Result<String> {
        build_create_statement(self.get(simple_name)?.schema)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
