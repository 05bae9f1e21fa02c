#![forbid(unsafe_code)]
//! A small active-record ORM over SQLite.
//!
//! Entity types describe their persisted fields through `#[derive(Entity)]`;
//! a [`Session`] loads and stores them as shared [`Record`]s, keeping at most
//! one live instance per row through its [`IdentityMap`]. Read-only projections
//! bind to plain structs with `#[derive(Bind)]`.
//!
//! ```rust,ignore
//! use liteorm::{Entity, Link, Session};
//!
//! #[derive(Entity, Default)]
//! struct Author {
//!     name: String,
//! }
//!
//! #[derive(Entity, Default)]
//! struct Book {
//!     title: String,
//!     author: Link<Author>,
//! }
//! ```

extern crate self as liteorm;

pub mod bind;
pub mod coerce;
pub mod data;
pub mod error;
pub mod identity;
pub mod link;
pub mod object;
pub mod record;
pub mod registry;
pub mod schema;
pub mod session;
mod storage;

pub use bind::{Bind, ColumnLabel, MismatchPolicy, ResultSet, RowMapper, Writable};
pub use coerce::{CoerceResult, FieldType, FromValue, Mismatch};
pub use data::{Row, RowId, Value, ValueKind};
pub use error::{Error, Result};
pub use identity::{BoundedPolicy, CacheKey, CachePolicy, IdentityMap, WeakPolicy};
pub use link::Link;
pub use liteorm_derive::{Bind, Entity};
pub use object::{Entity, Field, FieldKind, FieldSource, Schema};
pub use record::{Record, RecordState};
pub use registry::{EntityType, Registry};
pub use session::{LoadStrategy, Query, Session, SessionBuilder};
