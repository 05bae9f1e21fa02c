#![forbid(unsafe_code)]
use crate::{
    bind::ColumnLabel,
    data::{Row, RowId, RowSlice, Value},
    error::{Error, ErrorCtx, ErrorWithCtx, Result},
    object::Schema,
    session::Query,
};
use rusqlite::{
    params_from_iter,
    types::{ToSqlOutput, ValueRef},
    ToSql,
};
use std::{borrow::Cow, iter};

////////////////////////////////////////////////////////////////////////////////

pub(crate) const ID_COLUMN: &str = "_id";

/// A row of an entity table: the row id followed by the persisted fields.
pub(crate) struct StoredRow {
    pub id: RowId,
    pub values: Row<'static>,
}

/// Thin SQL wrapper the rest of the crate talks to.
pub(crate) trait Storage {
    fn table_exists(&self, table: &str) -> Result<bool>;
    fn execute_ddl(&self, sql: &str) -> Result<()>;
    fn execute_sql(&self, sql: &str, args: &RowSlice) -> Result<usize>;

    fn select_rows(&self, schema: &Schema, query: &Query) -> Result<Vec<StoredRow>>;
    fn select_ids(&self, schema: &Schema, filter: Option<&str>, args: &RowSlice)
        -> Result<Vec<RowId>>;
    fn row_exists(&self, schema: &Schema, id: RowId) -> Result<bool>;
    fn insert_row(&self, schema: &Schema, columns: &[&str], row: &RowSlice) -> Result<RowId>;
    fn update_row(&self, id: RowId, schema: &Schema, row: &RowSlice) -> Result<usize>;
    fn delete_rows(&self, schema: &Schema, filter: Option<&str>, args: &RowSlice)
        -> Result<usize>;

    /// Runs `sql` and feeds every row to `visit` as it is stepped.
    fn scan(
        &self,
        sql: &str,
        args: &RowSlice,
        visit: &mut dyn FnMut(&[ColumnLabel], Row<'_>) -> Result<()>,
    ) -> Result<Vec<ColumnLabel>>;

    fn user_version(&self) -> Result<i64>;
    fn set_user_version(&self, version: i64) -> Result<()>;

    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
}

////////////////////////////////////////////////////////////////////////////////

impl Storage for rusqlite::Connection {
    fn table_exists(&self, table: &str) -> Result<bool> {
        let mut stmt = self.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")?;
        Ok(stmt.exists([table])?)
    }

    fn execute_ddl(&self, sql: &str) -> Result<()> {
        log::debug!("{}", sql);
        self.execute_batch(sql)?;
        Ok(())
    }

    fn execute_sql(&self, sql: &str, args: &RowSlice) -> Result<usize> {
        log::debug!("{}", sql);
        Ok(self.execute(sql, params_from_iter(args.iter()))?)
    }

    fn select_rows(&self, schema: &Schema, query: &Query) -> Result<Vec<StoredRow>> {
        let sql = select_sql(schema, query);
        let ctx = ErrorCtx {
            schema: Some(schema),
        };

        let mut res = Vec::new();
        self.scan(&sql, &query.args, &mut |_, row| {
            let mut values = row.into_iter().map(Value::into_owned);
            let id = match values.next() {
                Some(Value::Integer(id)) => RowId(id),
                _ => RowId::NONE,
            };
            res.push(StoredRow {
                id,
                values: values.collect(),
            });
            Ok(())
        })
        .map_err(|err| with_schema(err, ctx))?;

        Ok(res)
    }

    fn select_ids(
        &self,
        schema: &Schema,
        filter: Option<&str>,
        args: &RowSlice,
    ) -> Result<Vec<RowId>> {
        let sql = format!(
            "SELECT {} FROM {}{}",
            ID_COLUMN,
            schema.table_name,
            clause(" WHERE ", filter)
        );

        let mut ids = Vec::new();
        self.scan(&sql, args, &mut |_, row| {
            if let Some(Value::Integer(id)) = row.first() {
                ids.push(RowId(*id));
            }
            Ok(())
        })?;
        Ok(ids)
    }

    fn row_exists(&self, schema: &Schema, id: RowId) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE {} = ?", schema.table_name, ID_COLUMN);
        log::debug!("{} [{}]", sql, id);

        let mut stmt = self.prepare(&sql)?;
        Ok(stmt.exists([id.0])?)
    }

    fn insert_row(&self, schema: &Schema, columns: &[&str], row: &RowSlice) -> Result<RowId> {
        let sql = if !columns.is_empty() {
            format!(
                "INSERT INTO {} ({}) VALUES({})",
                schema.table_name,
                columns.join(", "),
                repeat_with_comma("?", columns.len())
            )
        } else {
            format!("INSERT INTO {} DEFAULT VALUES", schema.table_name)
        };
        log::debug!("{}", sql);

        let ctx_with_schema = ErrorCtx {
            schema: Some(schema),
        };

        let mut stmt = self
            .prepare(&sql)
            .map_err(|err| Error::from(ErrorWithCtx::new(err, ctx_with_schema)))?;

        match stmt.insert(params_from_iter(row.iter())) {
            Ok(id) => Ok(RowId(id)),
            Err(err) => Err(Error::from(ErrorWithCtx::new(err, ctx_with_schema))),
        }
    }

    fn update_row(&self, id: RowId, schema: &Schema, row: &RowSlice) -> Result<usize> {
        let columns = if !schema.fields.is_empty() {
            schema
                .column_names()
                .map(|col| format!("{} = ?", col))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            format!("{0} = {0}", ID_COLUMN)
        };
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            schema.table_name, columns, ID_COLUMN
        );
        log::debug!("{} [{}]", sql, id);
        let params = row_to_sql(row).chain(iter::once(&id.0 as &dyn ToSql));

        self.execute(&sql, params_from_iter(params)).map_err(|error| {
            Error::from(ErrorWithCtx::new(
                error,
                ErrorCtx {
                    schema: Some(schema),
                },
            ))
        })
    }

    fn delete_rows(&self, schema: &Schema, filter: Option<&str>, args: &RowSlice) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {}{}",
            schema.table_name,
            clause(" WHERE ", filter)
        );
        log::debug!("{}", sql);

        self.execute(&sql, params_from_iter(args.iter()))
            .map_err(|error| {
                Error::from(ErrorWithCtx::new(
                    error,
                    ErrorCtx {
                        schema: Some(schema),
                    },
                ))
            })
    }

    fn scan(
        &self,
        sql: &str,
        args: &RowSlice,
        visit: &mut dyn FnMut(&[ColumnLabel], Row<'_>) -> Result<()>,
    ) -> Result<Vec<ColumnLabel>> {
        log::debug!("{}", sql);
        let mut stmt = self.prepare(sql)?;
        let labels = stmt
            .column_names()
            .into_iter()
            .map(|name| ColumnLabel::new(name, name))
            .collect::<Vec<_>>();

        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        while let Some(row) = rows.next()? {
            let values = (0..labels.len())
                .map(|i| value_from_ref(row.get_ref(i)?))
                .collect::<Result<Row>>()?;
            visit(&labels, values)?;
        }

        Ok(labels)
    }

    fn user_version(&self) -> Result<i64> {
        Ok(self.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    fn set_user_version(&self, version: i64) -> Result<()> {
        self.execute_ddl(&format!("PRAGMA user_version = {}", version))
    }

    fn begin(&self) -> Result<()> {
        self.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////

fn select_sql(schema: &Schema, query: &Query) -> String {
    let columns = iter::once(ID_COLUMN)
        .chain(schema.column_names())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT {}{} FROM {}{}{}{}{}{}",
        if query.distinct { "DISTINCT " } else { "" },
        columns,
        schema.table_name,
        clause(" WHERE ", query.filter.as_deref()),
        clause(" GROUP BY ", query.group_by.as_deref()),
        clause(" HAVING ", query.having.as_deref()),
        clause(" ORDER BY ", query.order_by.as_deref()),
        query
            .limit
            .map_or(String::new(), |limit| format!(" LIMIT {}", limit)),
    )
}

fn clause(keyword: &str, body: Option<&str>) -> String {
    match body {
        Some(body) if !body.is_empty() => format!("{}{}", keyword, body),
        _ => String::new(),
    }
}

fn with_schema(err: Error, ctx: ErrorCtx) -> Error {
    match err {
        Error::Storage(err) => Error::from(ErrorWithCtx::new(err, ctx)),
        err => err,
    }
}

impl<'a> ToSql for Value<'a> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::Borrowed(ValueRef::Null)),
            Value::Text(string) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(string.as_bytes()))),
            Value::Blob(bytes) => Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&bytes[..]))),
            Value::Integer(x) => x.to_sql(),
            Value::Real(x) => x.to_sql(),
            Value::Bool(x) => x.to_sql(),
        }
    }
}

fn repeat_with_comma(pattern: &str, count: usize) -> String {
    vec![pattern; count].join(", ")
}

fn row_to_sql<'a>(row: &'a RowSlice<'a>) -> impl Iterator<Item = &'a dyn ToSql> {
    row.iter().map(|val| val as &dyn ToSql)
}

fn value_from_ref(value: ValueRef<'_>) -> Result<Value<'_>> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(x) => Value::Integer(x),
        ValueRef::Real(x) => Value::Real(x),
        ValueRef::Text(bytes) => Value::Text(Cow::Borrowed(
            std::str::from_utf8(bytes).map_err(rusqlite::Error::Utf8Error)?,
        )),
        ValueRef::Blob(bytes) => Value::Blob(Cow::Borrowed(bytes)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    static PROBE: Schema = Schema {
        type_name: "storage::Probe",
        simple_name: "Probe",
        table_name: "probe",
        fields: &[],
    };

    #[test]
    fn select_statement_shape() {
        let query = Query::new()
            .distinct()
            .filter("x > ?", vec![Value::Integer(1)])
            .group_by("x")
            .having("count(*) > 1")
            .order_by("x DESC")
            .limit(5);
        assert_eq!(
            select_sql(&PROBE, &query),
            "SELECT DISTINCT _id FROM probe WHERE x > ? GROUP BY x HAVING count(*) > 1 \
             ORDER BY x DESC LIMIT 5"
        );
        assert_eq!(select_sql(&PROBE, &Query::new()), "SELECT _id FROM probe");
    }
}
