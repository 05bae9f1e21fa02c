#![forbid(unsafe_code)]
use crate::{
    coerce::{CoerceResult, FieldType, FromValue, Mismatch},
    data::{RowId, Value},
    error::Result,
    object::{Entity, FieldKind},
    record::Record,
    session::{LoadStrategy, Session},
};
use std::fmt;

////////////////////////////////////////////////////////////////////////////////

/// A foreign-key field referencing another entity.
///
/// Stored as the target's row id, `0` meaning "no reference". After a load the
/// link holds the raw id until it is resolved, which happens during the load
/// itself under [`LoadStrategy::Eager`] or on [`Link::fetch`] otherwise.
pub struct Link<T> {
    target: Option<Record<T>>,
    raw: RowId,
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Link {
            target: None,
            raw: RowId::NONE,
        }
    }
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        Link {
            target: self.target.clone(),
            raw: self.raw,
        }
    }
}

impl<T: Entity> Link<T> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn to(target: &Record<T>) -> Self {
        Link {
            target: Some(target.clone()),
            raw: RowId::NONE,
        }
    }

    pub fn set(&mut self, target: Option<&Record<T>>) {
        self.target = target.cloned();
        self.raw = RowId::NONE;
    }

    /// The referenced record, once resolved.
    pub fn get(&self) -> Option<&Record<T>> {
        self.target.as_ref()
    }

    /// Row id this link stores.
    pub fn id(&self) -> RowId {
        match &self.target {
            Some(target) => target.id(),
            None => self.raw,
        }
    }

    pub fn is_none(&self) -> bool {
        !self.id().is_assigned()
    }

    /// Whether a stored id is still waiting to be turned into a record.
    pub fn is_pending(&self) -> bool {
        self.target.is_none() && self.raw.is_assigned()
    }

    /// Resolves a pending id through `session`. A row that no longer exists
    /// leaves the link pending.
    pub fn fetch(&mut self, session: &Session) -> Result<Option<&Record<T>>> {
        if self.is_pending() {
            match session.find_by_id::<T>(self.raw)? {
                Some(target) => {
                    self.target = Some(target);
                    self.raw = RowId::NONE;
                }
                None => log::warn!(
                    "dangling reference to {} #{}",
                    T::schema().type_name,
                    self.raw
                ),
            }
        }
        Ok(self.target.as_ref())
    }
}

impl<T: Entity> FromValue for Link<T> {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        let raw = Option::<i64>::from_value(value)
            .map_err(|mismatch| Mismatch { expected: "row id", ..mismatch })?;
        Ok(Link {
            target: None,
            raw: RowId(raw.unwrap_or(0)),
        })
    }
}

impl<T: Entity> FieldType for Link<T> {
    const KIND: FieldKind = FieldKind::ForeignKey;

    fn to_storage(&self) -> CoerceResult<Value<'_>> {
        Ok(Value::Integer(self.id().0))
    }

    fn resolve(&mut self, session: &Session) -> Result<()> {
        if session.load_strategy() == LoadStrategy::Eager {
            self.fetch(session)?;
        }
        Ok(())
    }
}

impl<T: Entity> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "Link({} #{})", T::schema().simple_name, target.id()),
            None if self.raw.is_assigned() => {
                write!(f, "Link({} #{}, pending)", T::schema().simple_name, self.raw)
            }
            None => f.write_str("Link(none)"),
        }
    }
}
