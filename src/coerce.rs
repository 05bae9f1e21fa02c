#![forbid(unsafe_code)]
//! Conversions between storage scalars and declared field types.
//!
//! Primitive targets (`i16`, `i32`, `i64`, `f32`, `f64`, `bool`, `char`) never
//! observe a null: it becomes the zero-equivalent of the type. `Option<T>`
//! targets keep the null as `None`. Any other combination that the target cannot
//! represent exactly is reported as a [`Mismatch`], in both directions.

use crate::{
    data::{Value, ValueKind},
    error::Result,
    object::FieldKind,
    session::Session,
};
use std::borrow::Cow;
use thiserror::Error;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date,
    OffsetDateTime, PrimitiveDateTime, Time,
};

////////////////////////////////////////////////////////////////////////////////

/// A storage value that does not fit the declared target type.
///
/// Carries no entity context; callers wrap it into
/// [`Error::TypeMismatch`](crate::Error::TypeMismatch).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {expected}, got {got}")]
pub struct Mismatch {
    pub expected: &'static str,
    pub got: ValueKind,
}

impl Mismatch {
    pub fn new(expected: &'static str, got: &Value) -> Self {
        Mismatch {
            expected,
            got: got.kind(),
        }
    }
}

pub type CoerceResult<T> = std::result::Result<T, Mismatch>;

////////////////////////////////////////////////////////////////////////////////

/// Load direction of the coercion: storage scalar into a Rust value.
pub trait FromValue: Sized {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch>;
}

/// A type that can be used as a persisted entity field.
pub trait FieldType: FromValue {
    const KIND: FieldKind;

    /// Packs the field for storage. Fails rather than store a lossy value.
    fn to_storage(&self) -> CoerceResult<Value<'_>>;

    /// Second loading pass, run after every scalar field of the owner is set.
    /// Only foreign-key fields do anything here.
    fn resolve(&mut self, _session: &Session) -> Result<()> {
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////

macro_rules! impl_integer {
    ($ty:ty, $kind:path) => {
        impl FromValue for $ty {
            fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
                match value {
                    Value::Null => Ok(0),
                    Value::Integer(x) => {
                        <$ty>::try_from(x).map_err(|_| Mismatch::new(stringify!($ty), &value))
                    }
                    _ => Err(Mismatch::new(stringify!($ty), &value)),
                }
            }
        }

        impl FieldType for $ty {
            const KIND: FieldKind = $kind;

            fn to_storage(&self) -> CoerceResult<Value<'_>> {
                Ok(Value::Integer(i64::from(*self)))
            }
        }
    };
}

impl_integer!(i16, FieldKind::Int16);
impl_integer!(i32, FieldKind::Int32);
impl_integer!(i64, FieldKind::Int64);

// Integers with more significant bits than the mantissa would be rounded.
const F64_EXACT_INT: u64 = 1 << f64::MANTISSA_DIGITS;
const F32_EXACT_INT: u64 = 1 << f32::MANTISSA_DIGITS;

impl FromValue for f64 {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Null => Ok(0.0),
            Value::Real(x) => Ok(x),
            Value::Integer(x) if x.unsigned_abs() <= F64_EXACT_INT => Ok(x as f64),
            _ => Err(Mismatch::new("f64", &value)),
        }
    }
}

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::Float64;

    fn to_storage(&self) -> CoerceResult<Value<'_>> {
        Ok(Value::Real(*self))
    }
}

impl FromValue for f32 {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        let wide = match value {
            Value::Null => return Ok(0.0),
            Value::Real(x) => x,
            Value::Integer(x) if x.unsigned_abs() <= F32_EXACT_INT => x as f64,
            _ => return Err(Mismatch::new("f32", &value)),
        };
        if wide.is_finite() && wide.abs() > f32::MAX as f64 {
            return Err(Mismatch::new("f32", &value));
        }
        Ok(wide as f32)
    }
}

impl FieldType for f32 {
    const KIND: FieldKind = FieldKind::Float32;

    fn to_storage(&self) -> CoerceResult<Value<'_>> {
        Ok(Value::Real(f64::from(*self)))
    }
}

impl FromValue for bool {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(x) => Ok(x),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            _ => Err(Mismatch::new("bool", &value)),
        }
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn to_storage(&self) -> CoerceResult<Value<'_>> {
        Ok(Value::Bool(*self))
    }
}

impl FromValue for char {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        if let Value::Null = value {
            return Ok('\u{0}');
        }
        if let Value::Text(ref s) = value {
            let mut chars = s.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                return Ok(c);
            }
        }
        Err(Mismatch::new("char", &value))
    }
}

impl FieldType for char {
    const KIND: FieldKind = FieldKind::Char;

    fn to_storage(&self) -> CoerceResult<Value<'_>> {
        Ok(Value::Text(Cow::Owned(self.to_string())))
    }
}

impl FromValue for String {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Text(s) => Ok(s.into_owned()),
            _ => Err(Mismatch::new("String", &value)),
        }
    }
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_storage(&self) -> CoerceResult<Value<'_>> {
        Ok(Value::Text(Cow::Borrowed(self)))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Blob(b) => Ok(b.into_owned()),
            _ => Err(Mismatch::new("Vec<u8>", &value)),
        }
    }
}

impl FieldType for Vec<u8> {
    const KIND: FieldKind = FieldKind::Blob;

    fn to_storage(&self) -> CoerceResult<Value<'_>> {
        Ok(Value::Blob(Cow::Borrowed(self)))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn to_storage(&self) -> CoerceResult<Value<'_>> {
        match self {
            Some(inner) => inner.to_storage(),
            None => Ok(Value::Null),
        }
    }

    fn resolve(&mut self, session: &Session) -> Result<()> {
        match self {
            Some(inner) => inner.resolve(session),
            None => Ok(()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

// Timestamps are stored as unix nanoseconds, which an i64 holds for the
// years 1677 to 2262.
const TIMESTAMP_RANGE: &str = "timestamp between 1677 and 2262";

/// Reads a generic timestamp: unix nanoseconds or RFC 3339 text.
fn timestamp_from_value(
    value: &Value<'_>,
    expected: &'static str,
) -> std::result::Result<OffsetDateTime, Mismatch> {
    match value {
        Value::Integer(nanos) => OffsetDateTime::from_unix_timestamp_nanos(i128::from(*nanos))
            .map_err(|_| Mismatch::new(expected, value)),
        Value::Text(s) => {
            OffsetDateTime::parse(s, &Rfc3339).map_err(|_| Mismatch::new(expected, value))
        }
        _ => Err(Mismatch::new(expected, value)),
    }
}

fn timestamp_to_nanos(timestamp: &OffsetDateTime) -> CoerceResult<i64> {
    i64::try_from(timestamp.unix_timestamp_nanos()).map_err(|_| Mismatch {
        expected: TIMESTAMP_RANGE,
        got: ValueKind::Integer,
    })
}

impl FromValue for OffsetDateTime {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        timestamp_from_value(&value, "OffsetDateTime")
    }
}

impl FieldType for OffsetDateTime {
    const KIND: FieldKind = FieldKind::Timestamp;

    fn to_storage(&self) -> CoerceResult<Value<'_>> {
        timestamp_to_nanos(self).map(Value::Integer)
    }
}

// The narrower temporal types accept their own text layout first, then fall
// back to a generic timestamp and keep only the part they represent.

impl FromValue for PrimitiveDateTime {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        if let Value::Text(ref s) = value {
            let layout = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
            if let Ok(parsed) = PrimitiveDateTime::parse(s, layout) {
                return Ok(parsed);
            }
        }
        let generic = timestamp_from_value(&value, "PrimitiveDateTime")?;
        Ok(PrimitiveDateTime::new(generic.date(), generic.time()))
    }
}

impl FromValue for Date {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        if let Value::Text(ref s) = value {
            if let Ok(parsed) = Date::parse(s, format_description!("[year]-[month]-[day]")) {
                return Ok(parsed);
            }
        }
        Ok(timestamp_from_value(&value, "Date")?.date())
    }
}

impl FromValue for Time {
    fn from_value(value: Value<'_>) -> std::result::Result<Self, Mismatch> {
        if let Value::Text(ref s) = value {
            let layout = format_description!("[hour]:[minute]:[second]");
            if let Ok(parsed) = Time::parse(s, layout) {
                return Ok(parsed);
            }
        }
        Ok(timestamp_from_value(&value, "Time")?.time())
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn null_becomes_zero_for_primitives() {
        assert_eq!(i32::from_value(Value::Null), Ok(0));
        assert_eq!(i64::from_value(Value::Null), Ok(0));
        assert_eq!(i16::from_value(Value::Null), Ok(0));
        assert_eq!(f64::from_value(Value::Null), Ok(0.0));
        assert_eq!(f32::from_value(Value::Null), Ok(0.0));
        assert_eq!(bool::from_value(Value::Null), Ok(false));
        assert_eq!(char::from_value(Value::Null), Ok('\u{0}'));
    }

    #[test]
    fn null_stays_null_for_optional_fields() {
        assert_eq!(Option::<i32>::from_value(Value::Null), Ok(None));
        assert_eq!(Option::<String>::from_value(Value::Null), Ok(None));
        assert_eq!(Option::<Vec<u8>>::from_value(Value::Null), Ok(None));
        assert_eq!(Option::<OffsetDateTime>::from_value(Value::Null), Ok(None));
    }

    #[test]
    fn null_into_non_nullable_object_is_mismatch() {
        let err = String::from_value(Value::Null).unwrap_err();
        assert_eq!(err.expected, "String");
        assert_eq!(err.got, ValueKind::Null);
        assert!(Vec::<u8>::from_value(Value::Null).is_err());
    }

    #[test]
    fn integers_are_range_checked() {
        assert_eq!(i32::from_value(Value::Integer(i32::MAX as i64)), Ok(i32::MAX));
        assert!(i32::from_value(Value::Integer(i32::MAX as i64 + 1)).is_err());
        assert!(i16::from_value(Value::Integer(-40_000)).is_err());
    }

    #[test]
    fn no_reinterpretation_across_kinds() {
        assert!(i64::from_value(Value::Real(1.5)).is_err());
        assert!(i64::from_value("12".into()).is_err());
        assert!(String::from_value(Value::Integer(12)).is_err());
        assert!(bool::from_value(Value::Integer(2)).is_err());
        assert!(char::from_value("ab".into()).is_err());
    }

    #[test]
    fn storage_booleans_come_back_as_integers() {
        assert_eq!(bool::from_value(Value::Integer(1)), Ok(true));
        assert_eq!(bool::from_value(Value::Integer(0)), Ok(false));
        assert_eq!(true.to_storage(), Ok(Value::Bool(true)));
    }

    #[test]
    fn timestamp_keeps_nanoseconds() {
        let at = datetime!(2024-03-01 12:30:05.250000123 UTC);
        let stored = at.to_storage().unwrap();
        assert_eq!(stored, Value::Integer(1_709_296_205_250_000_123));
        assert_eq!(OffsetDateTime::from_value(stored), Ok(at));
    }

    #[test]
    fn timestamp_outside_nanosecond_range() {
        let far = datetime!(2300-01-01 0:00 UTC);
        let err = far.to_storage().unwrap_err();
        assert_eq!(err.expected, TIMESTAMP_RANGE);
        assert!(datetime!(1600-01-01 0:00 UTC).to_storage().is_err());
        assert!(Some(far).to_storage().is_err());
    }

    #[test]
    fn large_integers_do_not_round_into_floats() {
        let exact = 1_i64 << 53;
        assert_eq!(f64::from_value(Value::Integer(exact)), Ok(exact as f64));
        assert_eq!(f64::from_value(Value::Integer(-exact)), Ok(-exact as f64));
        assert!(f64::from_value(Value::Integer(exact + 1)).is_err());
        assert!(f64::from_value(Value::Integer(i64::MIN)).is_err());

        assert_eq!(f32::from_value(Value::Integer(1 << 24)), Ok(16_777_216.0));
        assert!(f32::from_value(Value::Integer((1 << 24) + 1)).is_err());
    }

    #[test]
    fn temporal_narrowing() {
        let nanos = Value::Integer(1_709_296_205_000_000_000);
        assert_eq!(Date::from_value(nanos.clone()), Ok(date!(2024-03-01)));
        assert_eq!(Time::from_value(nanos.clone()), Ok(time!(12:30:05)));
        assert_eq!(
            PrimitiveDateTime::from_value(nanos),
            Ok(datetime!(2024-03-01 12:30:05))
        );
        assert_eq!(
            PrimitiveDateTime::from_value("2024-03-01 12:30:05".into()),
            Ok(datetime!(2024-03-01 12:30:05))
        );
        assert_eq!(Date::from_value("2024-03-01T23:00:00Z".into()), Ok(date!(2024-03-01)));
    }
}
