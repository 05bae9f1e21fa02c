#![forbid(unsafe_code)]
use crate::{
    data::{RowId, Value},
    error::{Error, Result},
    object::{Entity, FieldSource},
    session::{Session, SessionInner},
    storage::{Storage, ID_COLUMN},
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
    },
};

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RecordState {
    /// No row id, needs insert.
    Transient,
    Persisted,
}

/// Shared state of one entity instance.
pub(crate) struct Slot<T> {
    id: AtomicI64,
    needs_insert: AtomicBool,
    session: Mutex<Weak<SessionInner>>,
    entity: RwLock<T>,
}

/// An entity instance with its row identity, the unit the identity map tracks.
///
/// Clones share the same instance. A record holds a non-owning handle to the
/// session it was attached to or loaded through; once that session is closed
/// or dropped every storage operation fails with [`Error::NotOpen`].
///
/// Mutation of one record from several threads at a time is not coordinated
/// beyond the inner lock: callers keep to one writer per instance.
pub struct Record<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Record<T> {
    fn clone(&self) -> Self {
        Record {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Entity> Record<T> {
    /// A transient record with no session attached.
    pub fn detached(entity: T) -> Self {
        Self::with_state(entity, RowId::NONE, Weak::new())
    }

    pub(crate) fn with_state(entity: T, id: RowId, session: Weak<SessionInner>) -> Self {
        Record {
            slot: Arc::new(Slot {
                id: AtomicI64::new(id.0),
                needs_insert: AtomicBool::new(true),
                session: Mutex::new(session),
                entity: RwLock::new(entity),
            }),
        }
    }

    pub(crate) fn loaded(entity: T, id: RowId, session: &Session) -> Self {
        let record = Self::with_state(entity, id, session.downgrade());
        record.slot.needs_insert.store(false, Ordering::Release);
        record
    }

    pub(crate) fn from_slot(slot: Arc<Slot<T>>) -> Self {
        Record { slot }
    }

    pub(crate) fn slot(&self) -> &Arc<Slot<T>> {
        &self.slot
    }

    pub fn id(&self) -> RowId {
        RowId(self.slot.id.load(Ordering::Acquire))
    }

    /// Assigns a row id without touching storage. `insert` then writes it
    /// explicitly; `save` checks whether the row really exists.
    pub fn set_id(&self, id: RowId) {
        self.slot.id.store(id.0, Ordering::Release);
    }

    pub fn needs_insert(&self) -> bool {
        self.slot.needs_insert.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RecordState {
        if self.needs_insert() {
            RecordState::Transient
        } else {
            RecordState::Persisted
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.slot
            .entity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.slot
            .entity
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ptr_eq(&self, other: &Record<T>) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    pub fn attach(&self, session: &Session) {
        *self.slot.session.lock().unwrap_or_else(PoisonError::into_inner) = session.downgrade();
    }

    /// The session this record is attached to, if it is still open.
    pub fn session(&self) -> Result<Session> {
        let weak = self
            .slot
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let session = Session::from_weak(&weak).ok_or(Error::NotOpen)?;
        if !session.is_open() {
            return Err(Error::NotOpen);
        }
        Ok(session)
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Writes the instance as a new row, registers it in the identity map and
    /// returns the assigned id.
    ///
    /// An id already set on the record is written explicitly; otherwise
    /// storage picks one.
    pub fn insert(&self) -> Result<RowId> {
        let session = self.session()?;
        let schema = T::schema();
        let id = self.id();

        let entity = self.read();
        let mut columns = Vec::with_capacity(schema.fields.len() + 1);
        let mut row = Vec::with_capacity(schema.fields.len() + 1);
        if id.is_assigned() {
            columns.push(ID_COLUMN);
            row.push(Value::Integer(id.0));
        }
        columns.extend(schema.column_names());
        row.extend(entity.deflate()?);

        let new_id = session.with_storage(|storage| storage.insert_row(schema, &columns, &row))?;
        drop(row);
        drop(entity);

        self.slot.id.store(new_id.0, Ordering::Release);
        self.slot.needs_insert.store(false, Ordering::Release);
        session.identity_map().put(self);
        log::debug!("inserted {} #{}", schema.type_name, new_id);
        Ok(new_id)
    }

    /// Rewrites every persisted field of the row keyed by the current id.
    pub fn update(&self) -> Result<usize> {
        let session = self.session()?;
        let schema = T::schema();
        let id = self.id();

        let entity = self.read();
        let row = entity.deflate()?;
        session.with_storage(|storage| storage.update_row(id, schema, &row))
    }

    /// Inserts or updates depending on whether a row with the current id
    /// exists right now, then registers this instance in the identity map.
    pub fn save(&self) -> Result<RowId> {
        let session = self.session()?;
        let schema = T::schema();
        let id = self.id();

        let exists = id.is_assigned()
            && session.with_storage(|storage| storage.row_exists(schema, id))?;
        let id = if exists {
            self.update()?;
            id
        } else {
            self.insert()?
        };

        session.identity_map().put(self);
        Ok(id)
    }

    /// Removes the row; the instance becomes transient again.
    pub fn delete(&self) -> Result<bool> {
        let session = self.session()?;
        let schema = T::schema();
        let id = self.id();

        let filter = format!("{} = ?", ID_COLUMN);
        let removed = session.with_storage(|storage| {
            storage.delete_rows(schema, Some(&filter), &[Value::Integer(id.0)])
        })?;

        session.identity_map().invalidate::<T>(id);
        self.slot.id.store(0, Ordering::Release);
        self.slot.needs_insert.store(true, Ordering::Release);
        Ok(removed > 0)
    }

    /// Copies same-named fields from `source`. Fields missing from the source
    /// are left alone and values that do not fit are skipped.
    ///
    /// Takes the write lock of this record: `source` must not be a guard of
    /// the same record. Use [`Record::copy_from_record`] for records.
    pub fn copy_from(&self, source: &dyn FieldSource) {
        let values = snapshot::<T>(source);
        self.apply(values);
    }

    /// Like [`Record::copy_from`], reading from another record.
    /// Copying a record onto itself does nothing.
    pub fn copy_from_record<S: Entity>(&self, source: &Record<S>) {
        if Arc::as_ptr(&self.slot) as *const () == Arc::as_ptr(&source.slot) as *const () {
            return;
        }
        let values = snapshot::<T>(&*source.read());
        self.apply(values);
    }

    fn apply(&self, values: Vec<(usize, Value<'static>)>) {
        let schema = T::schema();
        let mut entity = self.write();
        for (index, value) in values {
            if let Err(mismatch) = entity.assign(index, value) {
                let field = &schema.fields[index];
                log::warn!(
                    "copy_from skipped {}::{}: {}",
                    schema.type_name,
                    field.attr_name,
                    mismatch
                );
            }
        }
    }
}

/// Owned values of the fields of `T` that `source` provides, by field index.
fn snapshot<T: Entity>(source: &dyn FieldSource) -> Vec<(usize, Value<'static>)> {
    T::schema()
        .fields
        .iter()
        .enumerate()
        .filter_map(|(index, field)| {
            let value = source.field(field.attr_name)?;
            Some((index, value.into_owned()))
        })
        .collect()
}

impl<T: Entity + fmt::Debug> fmt::Debug for Record<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("entity", &*self.read())
            .finish()
    }
}
