#![forbid(unsafe_code)]
use crate::{
    bind::{Bind, MismatchPolicy, ResultSet, RowMapper},
    data::{RowId, RowSlice, Value},
    error::{Error, Result},
    identity::IdentityMap,
    object::Entity,
    record::Record,
    registry::Registry,
    schema::{build_create_statement, build_drop_statement},
    storage::{Storage, StoredRow, ID_COLUMN},
};
use rusqlite::Connection;
use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

////////////////////////////////////////////////////////////////////////////////

/// When foreign-key fields are resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Recursively while the owning row is loaded.
    #[default]
    Eager,
    /// Only on [`Link::fetch`](crate::Link::fetch).
    Explicit,
}

/// Filter and shape of a `find` query. Empty parts are left out of the SQL.
#[derive(Clone, Debug, Default)]
pub struct Query {
    pub distinct: bool,
    pub filter: Option<String>,
    pub args: Vec<Value<'static>>,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>, args: Vec<Value<'static>>) -> Self {
        self.filter = Some(filter.into());
        self.args = args;
        self
    }

    pub fn group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

////////////////////////////////////////////////////////////////////////////////

pub(crate) struct SessionInner {
    connection: Mutex<Option<Connection>>,
    identity: Arc<IdentityMap>,
    load_strategy: LoadStrategy,
}

/// A storage session: one SQLite connection plus the identity map that
/// deduplicates the instances loaded through it.
///
/// Cloning is cheap and yields a handle to the same session. Statements are
/// serialized on the connection; no statement is ever issued re-entrantly.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Default)]
pub struct SessionBuilder {
    identity: Option<Arc<IdentityMap>>,
    load_strategy: LoadStrategy,
}

impl SessionBuilder {
    /// Shares `identity` with other sessions instead of creating a fresh map.
    pub fn identity_map(mut self, identity: Arc<IdentityMap>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Replaces the default weak-reference map with a bounded one.
    pub fn bounded_cache(mut self, capacity: usize) -> Self {
        self.identity = Some(Arc::new(IdentityMap::bounded(capacity)));
        self
    }

    pub fn load_strategy(mut self, load_strategy: LoadStrategy) -> Self {
        self.load_strategy = load_strategy;
        self
    }

    pub fn open(self, path: impl AsRef<Path>) -> Result<Session> {
        Ok(self.connect(Connection::open(path)?))
    }

    pub fn open_in_memory(self) -> Result<Session> {
        Ok(self.connect(Connection::open_in_memory()?))
    }

    pub fn connect(self, connection: Connection) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                connection: Mutex::new(Some(connection)),
                identity: self.identity.unwrap_or_default(),
                load_strategy: self.load_strategy,
            }),
        }
    }
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Session> {
        Self::builder().open(path)
    }

    pub fn open_in_memory() -> Result<Session> {
        Self::builder().open_in_memory()
    }

    pub fn from_connection(connection: Connection) -> Session {
        Self::builder().connect(connection)
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(weak: &Weak<SessionInner>) -> Option<Session> {
        weak.upgrade().map(|inner| Session { inner })
    }

    fn connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn with_storage<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        match self.connection().as_ref() {
            Some(connection) => f(connection),
            None => Err(Error::NotOpen),
        }
    }

    pub fn is_open(&self) -> bool {
        self.connection().is_some()
    }

    /// Closes the connection. Records attached to this session stop working.
    pub fn close(&self) -> Result<()> {
        match self.connection().take() {
            Some(connection) => connection.close().map_err(|(_, err)| Error::from(err)),
            None => Ok(()),
        }
    }

    pub fn identity_map(&self) -> &Arc<IdentityMap> {
        &self.inner.identity
    }

    pub fn load_strategy(&self) -> LoadStrategy {
        self.inner.load_strategy
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Wraps `entity` in a transient record bound to this session.
    pub fn attach<T: Entity>(&self, entity: T) -> Record<T> {
        Record::with_state(entity, RowId::NONE, self.downgrade())
    }

    pub fn find<T: Entity>(&self, query: &Query) -> Result<Vec<Record<T>>> {
        let schema = T::schema();
        let rows = self.with_storage(|storage| storage.select_rows(schema, query))?;
        rows.into_iter().map(|row| self.materialize::<T>(row)).collect()
    }

    pub fn find_all<T: Entity>(&self) -> Result<Vec<Record<T>>> {
        self.find(&Query::new())
    }

    pub fn find_by_id<T: Entity>(&self, id: RowId) -> Result<Option<Record<T>>> {
        let query = Query::new().filter(format!("{} = ?", ID_COLUMN), vec![id.into()]);
        Ok(self.find::<T>(&query)?.into_iter().next())
    }

    pub fn find_by_column<T: Entity>(
        &self,
        column: &str,
        value: impl Into<Value<'static>>,
    ) -> Result<Vec<Record<T>>> {
        let query = Query::new().filter(format!("{} = ?", column), vec![value.into()]);
        self.find(&query)
    }

    /// Like [`Session::find_by_id`], with absence reported as [`Error::NotFound`].
    pub fn get<T: Entity>(&self, id: RowId) -> Result<Record<T>> {
        self.find_by_id(id)?
            .ok_or_else(|| Error::not_found(id, T::schema().type_name))
    }

    /// Deletes every row matching `filter`, bypassing instance state.
    pub fn delete_where<T: Entity>(&self, filter: &str, args: &RowSlice) -> Result<usize> {
        let schema = T::schema();
        let (ids, removed) = self.with_storage(|storage| {
            let ids = storage.select_ids(schema, Some(filter), args)?;
            let removed = storage.delete_rows(schema, Some(filter), args)?;
            Ok((ids, removed))
        })?;

        for id in ids {
            self.identity_map().invalidate::<T>(id);
        }
        Ok(removed)
    }

    pub fn delete_by_column<T: Entity>(
        &self,
        column: &str,
        value: impl Into<Value<'static>>,
    ) -> Result<usize> {
        self.delete_where::<T>(&format!("{} = ?", column), &[value.into()])
    }

    fn materialize<T: Entity>(&self, row: StoredRow) -> Result<Record<T>> {
        if let Some(cached) = self.identity_map().get::<T>(row.id) {
            // the map may be shared with a session that is gone by now
            if cached.session().is_err() {
                cached.attach(self);
            }
            return Ok(cached);
        }

        let schema = T::schema();
        let mut entity = T::default();
        for (index, value) in row.values.into_iter().enumerate() {
            entity
                .assign(index, value)
                .map_err(|mismatch| Error::field_mismatch(schema, index, mismatch))?;
        }

        // registered before links resolve so reference cycles end on a hit
        let record = Record::loaded(entity, row.id, self);
        self.identity_map().put(&record);
        let resolved = record.write().resolve_links(self);
        if let Err(err) = resolved {
            self.identity_map().invalidate::<T>(row.id);
            return Err(err);
        }
        Ok(record)
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Runs a raw statement and returns the number of rows it changed.
    ///
    /// Entities already loaded are not refreshed.
    pub fn execute(&self, sql: &str, args: &RowSlice) -> Result<usize> {
        self.with_storage(|storage| storage.execute_sql(sql, args))
    }

    /// Runs raw SQL and materializes the whole result.
    pub fn query_rows(&self, sql: &str, args: &RowSlice) -> Result<ResultSet> {
        let mut rows = Vec::new();
        let columns = self.with_storage(|storage| {
            storage.scan(sql, args, &mut |_, row| {
                rows.push(row.into_iter().map(Value::into_owned).collect());
                Ok(())
            })
        })?;
        Ok(ResultSet::new(columns, rows))
    }

    /// Runs raw SQL and binds each row to `T` while stepping the cursor.
    pub fn query_as<T: Bind>(&self, sql: &str, args: &RowSlice) -> Result<Vec<T>> {
        self.query_as_with(sql, args, MismatchPolicy::Strict)
    }

    pub fn query_as_with<T: Bind>(
        &self,
        sql: &str,
        args: &RowSlice,
        policy: MismatchPolicy,
    ) -> Result<Vec<T>> {
        let mut mapper: Option<RowMapper<T>> = None;
        let mut res = Vec::new();
        self.with_storage(|storage| {
            storage.scan(sql, args, &mut |columns, row| {
                let mapper =
                    mapper.get_or_insert_with(|| RowMapper::new(columns).with_policy(policy));
                res.push(mapper.bind(columns, row)?);
                Ok(())
            })
        })?;
        Ok(res)
    }

    /// Runs `f` inside a transaction, rolling back if it fails.
    pub fn transaction<R>(&self, f: impl FnOnce(&Session) -> Result<R>) -> Result<R> {
        self.with_storage(|storage| storage.begin())?;
        match f(self) {
            Ok(value) => {
                self.with_storage(|storage| storage.commit())?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.with_storage(|storage| storage.rollback()) {
                    log::error!("rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Creates every registered table that does not exist yet.
    pub fn create_schema(&self, registry: &Registry) -> Result<()> {
        let statements = registry
            .entity_types()
            .map(|entity_type| {
                let schema = entity_type.schema();
                Ok((schema.table_name, build_create_statement(schema)?))
            })
            .collect::<Result<Vec<_>>>()?;

        self.with_storage(|storage| {
            for (table, sql) in &statements {
                if !storage.table_exists(table)? {
                    storage.execute_ddl(sql)?;
                }
            }
            Ok(())
        })
    }

    /// Drops and recreates every registered table when the stored schema
    /// version differs from `version`. Returns whether anything was rebuilt.
    pub fn upgrade(&self, registry: &Registry, version: i64) -> Result<bool> {
        let current = self.with_storage(|storage| storage.user_version())?;
        if current == version {
            return Ok(false);
        }
        log::info!("upgrading schema from version {} to {}", current, version);

        let mut statements = Vec::new();
        for entity_type in registry.entity_types() {
            statements.push(build_drop_statement(entity_type.schema().table_name));
            statements.push(build_create_statement(entity_type.schema())?);
        }

        self.transaction(|session| {
            session.with_storage(|storage| {
                for sql in &statements {
                    storage.execute_ddl(sql)?;
                }
                storage.set_user_version(version)
            })
        })?;

        self.identity_map().clear();
        Ok(true)
    }
}
