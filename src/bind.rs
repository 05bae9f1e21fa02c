#![forbid(unsafe_code)]
//! Binding of arbitrary tabular results to plain structs.
//!
//! Independent of entities: a [`Bind`] type has no row id, no identity and no
//! session. Columns are matched to properties by name, ignoring case, and
//! unmatched columns or properties are left alone.

use crate::{
    coerce::{FromValue, Mismatch},
    data::{Row, Value},
    error::{Error, Result},
};
use convert_case::{Case, Casing};
use std::{any, marker::PhantomData};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

////////////////////////////////////////////////////////////////////////////////

/// A result column. `label` is the `AS` name and wins when not empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnLabel {
    pub label: String,
    pub name: String,
}

impl ColumnLabel {
    pub fn new(label: impl Into<String>, name: impl Into<String>) -> Self {
        ColumnLabel {
            label: label.into(),
            name: name.into(),
        }
    }

    pub fn effective(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

/// A fully materialized result.
#[derive(Clone, Debug, Default)]
pub struct ResultSet {
    pub columns: Vec<ColumnLabel>,
    pub rows: Vec<Row<'static>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnLabel>, rows: Vec<Row<'static>>) -> Self {
        ResultSet { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// A struct rows can be bound to. Implemented by `#[derive(Bind)]`.
pub trait Bind: Default {
    /// Writable property names, in declaration order.
    const PROPERTIES: &'static [&'static str];

    fn write(&mut self, property: usize, value: Value<'_>) -> std::result::Result<(), Mismatch>;
}

/// Parameter types a property writer may declare.
pub trait Writable: FromValue {
    fn write_from(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        Self::from_value(value)
    }
}

impl Writable for String {}
impl Writable for i16 {}
impl Writable for i32 {}
impl Writable for i64 {}
impl Writable for f32 {}
impl Writable for f64 {}
impl Writable for Vec<u8> {}
impl Writable for OffsetDateTime {}
impl Writable for PrimitiveDateTime {}
impl Writable for Date {}
impl Writable for Time {}
impl<T: Writable> Writable for Option<T> {}

/// What to do with a cell that does not fit its property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// Fail with [`Error::TypeMismatch`].
    #[default]
    Strict,
    /// Leave the property at its current value and go on.
    Lenient,
}

////////////////////////////////////////////////////////////////////////////////

/// Column-to-property correspondence for one result shape.
pub struct RowMapper<T> {
    properties: Vec<Option<usize>>,
    policy: MismatchPolicy,
    _target: PhantomData<fn() -> T>,
}

impl<T: Bind> RowMapper<T> {
    pub fn new(columns: &[ColumnLabel]) -> Self {
        RowMapper {
            properties: columns
                .iter()
                .map(|column| find_property(T::PROPERTIES, column.effective()))
                .collect(),
            policy: MismatchPolicy::Strict,
            _target: PhantomData,
        }
    }

    pub fn with_policy(mut self, policy: MismatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Property index for each column, `None` where nothing matched.
    pub fn properties(&self) -> &[Option<usize>] {
        &self.properties
    }

    pub fn bind(&self, columns: &[ColumnLabel], row: Row<'_>) -> Result<T> {
        let mut target = T::default();
        for (column, (value, property)) in row.into_iter().zip(&self.properties).enumerate() {
            let Some(property) = *property else {
                continue;
            };
            if let Err(mismatch) = target.write(property, value) {
                let label = columns.get(column).map_or("", ColumnLabel::effective);
                match self.policy {
                    MismatchPolicy::Strict => {
                        return Err(Error::column_mismatch(
                            any::type_name::<T>(),
                            T::PROPERTIES[property],
                            label,
                            mismatch,
                        ))
                    }
                    MismatchPolicy::Lenient => log::debug!(
                        "skipped column {} for {}: {}",
                        label,
                        any::type_name::<T>(),
                        mismatch
                    ),
                }
            }
        }
        Ok(target)
    }
}

/// Exact name first, then ignoring case, then the snake_case form of the column.
fn find_property(properties: &[&str], column: &str) -> Option<usize> {
    properties
        .iter()
        .position(|property| *property == column)
        .or_else(|| {
            properties
                .iter()
                .position(|property| property.eq_ignore_ascii_case(column))
        })
        .or_else(|| {
            let snake = column.to_case(Case::Snake);
            properties
                .iter()
                .position(|property| property.eq_ignore_ascii_case(&snake))
        })
}

////////////////////////////////////////////////////////////////////////////////

pub fn bind<T: Bind>(result: &ResultSet, index: usize) -> Result<Option<T>> {
    let Some(row) = result.rows.get(index) else {
        return Ok(None);
    };
    RowMapper::<T>::new(&result.columns)
        .bind(&result.columns, borrow_row(row))
        .map(Some)
}

pub fn bind_all<T: Bind>(result: &ResultSet) -> Result<Vec<T>> {
    bind_all_with(result, MismatchPolicy::Strict)
}

/// Binds every row, skipping cells that do not fit.
pub fn bind_all_lenient<T: Bind>(result: &ResultSet) -> Vec<T> {
    let mapper = RowMapper::<T>::new(&result.columns).with_policy(MismatchPolicy::Lenient);
    result
        .rows
        .iter()
        .filter_map(|row| mapper.bind(&result.columns, borrow_row(row)).ok())
        .collect()
}

pub fn bind_all_with<T: Bind>(result: &ResultSet, policy: MismatchPolicy) -> Result<Vec<T>> {
    let mapper = RowMapper::<T>::new(&result.columns).with_policy(policy);
    result
        .rows
        .iter()
        .map(|row| mapper.bind(&result.columns, borrow_row(row)))
        .collect()
}

fn borrow_row<'a>(row: &'a [Value<'static>]) -> Row<'a> {
    row.iter().map(Value::borrowed).collect()
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Account {
        user_name: String,
        balance: i64,
        rating: Option<f64>,
    }

    impl Bind for Account {
        const PROPERTIES: &'static [&'static str] = &["user_name", "balance", "rating"];

        fn write(&mut self, property: usize, value: Value<'_>) -> std::result::Result<(), Mismatch> {
            match property {
                0 => self.user_name = <String as Writable>::write_from(value)?,
                1 => self.balance = <i64 as Writable>::write_from(value)?,
                2 => self.rating = <Option<f64> as Writable>::write_from(value)?,
                _ => {}
            }
            Ok(())
        }
    }

    fn columns(names: &[&str]) -> Vec<ColumnLabel> {
        names.iter().map(|name| ColumnLabel::new(*name, *name)).collect()
    }

    #[test]
    fn matching_ignores_case_and_camel_case() {
        assert_eq!(find_property(Account::PROPERTIES, "USER_NAME"), Some(0));
        assert_eq!(find_property(Account::PROPERTIES, "userName"), Some(0));
        assert_eq!(find_property(Account::PROPERTIES, "Balance"), Some(1));
        assert_eq!(find_property(Account::PROPERTIES, "unknown"), None);
    }

    #[test]
    fn label_falls_back_to_name() {
        let column = ColumnLabel::new("", "balance");
        assert_eq!(column.effective(), "balance");
        assert_eq!(ColumnLabel::new("b", "balance").effective(), "b");
    }

    #[test]
    fn unmatched_columns_are_ignored() {
        let result = ResultSet::new(
            columns(&["USER_NAME", "extra", "balance"]),
            vec![vec!["ann".into(), Value::Integer(9), Value::Integer(120)]],
        );
        let accounts: Vec<Account> = bind_all(&result).unwrap();
        assert_eq!(
            accounts,
            vec![Account {
                user_name: "ann".to_string(),
                balance: 120,
                rating: None,
            }]
        );
    }

    #[test]
    fn strict_and_lenient_mismatch() {
        let result = ResultSet::new(
            columns(&["user_name", "balance"]),
            vec![vec!["bob".into(), "lots".into()]],
        );
        let err = bind_all::<Account>(&result).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(ref e) if e.attr_name == "balance"));

        let accounts = bind_all_lenient::<Account>(&result);
        assert_eq!(accounts[0].user_name, "bob");
        assert_eq!(accounts[0].balance, 0);
    }

    #[test]
    fn null_gives_defaults() {
        let result = ResultSet::new(
            columns(&["user_name", "balance", "rating"]),
            vec![vec!["c".into(), Value::Null, Value::Null]],
        );
        let account = bind::<Account>(&result, 0).unwrap().unwrap();
        assert_eq!(account.balance, 0);
        assert_eq!(account.rating, None);
        assert!(bind::<Account>(&result, 1).unwrap().is_none());
    }
}
