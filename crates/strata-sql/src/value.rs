//! Logical types and runtime values.
//!
//! [`TypedValue`] is the runtime representation of a SQL value during
//! compilation and query execution. Two comparison regimes exist:
//!
//! - [`TypedValue::compare`] is the strict, fallible comparison of §typed
//!   values: both sides must share a type (NULL excepted) or it fails with
//!   `NotComparableValues`. Ranges, grouping, MIN/MAX and index ordering use
//!   it; under it NULL equals NULL and sorts before any non-null value.
//! - Filter-position comparisons (`=`, `<`, …) are built on top of it by the
//!   expression tree, which additionally maps any NULL operand to FALSE.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SqlError, SqlResult};

/// Logical SQL type of a column, parameter, or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// 64-bit signed integer.
    Integer,
    /// Boolean.
    Boolean,
    /// Variable-length character string.
    Varchar,
    /// Variable-length binary string.
    Blob,
    /// Nanoseconds since the Unix epoch, stored as a 64-bit integer.
    Timestamp,
    /// Unresolved type, used while parameter types are being inferred.
    Any,
}

impl SqlType {
    /// Returns true if values of this type have a fixed-size key encoding.
    #[must_use]
    pub fn is_fixed_size(&self) -> bool {
        matches!(self, Self::Integer | Self::Boolean | Self::Timestamp)
    }

    /// Returns true if `self` satisfies a requirement for `required`.
    ///
    /// INTEGER and TIMESTAMP unify: both are 64-bit counts on the wire.
    #[must_use]
    pub fn satisfies(&self, required: SqlType) -> bool {
        if *self == required {
            return true;
        }
        matches!(
            (self, required),
            (Self::Integer, Self::Timestamp) | (Self::Timestamp, Self::Integer)
        )
    }

    /// The catalog's ASCII name for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Boolean => "BOOLEAN",
            Self::Varchar => "VARCHAR",
            Self::Blob => "BLOB",
            Self::Timestamp => "TIMESTAMP",
            Self::Any => "ANY",
        }
    }

    /// Parses the catalog's ASCII name back into a type.
    pub fn parse(s: &str) -> SqlResult<Self> {
        match s {
            "INTEGER" => Ok(Self::Integer),
            "BOOLEAN" => Ok(Self::Boolean),
            "VARCHAR" | "STRING" => Ok(Self::Varchar),
            "BLOB" => Ok(Self::Blob),
            "TIMESTAMP" => Ok(Self::Timestamp),
            "ANY" => Ok(Self::Any),
            _ => Err(SqlError::InvalidValue),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime SQL value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypedValue {
    /// NULL, tagged with the type it stands in for (`Any` until narrowed).
    Null(SqlType),
    /// INTEGER / TIMESTAMP value.
    Integer(i64),
    /// BOOLEAN value.
    Boolean(bool),
    /// VARCHAR value.
    Varchar(String),
    /// BLOB value.
    Blob(Vec<u8>),
}

impl TypedValue {
    /// The logical type of this value.
    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        match self {
            Self::Null(t) => *t,
            Self::Integer(_) => SqlType::Integer,
            Self::Boolean(_) => SqlType::Boolean,
            Self::Varchar(_) => SqlType::Varchar,
            Self::Blob(_) => SqlType::Blob,
        }
    }

    /// Returns true if this value is NULL.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Returns the contained boolean, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the contained integer, if any.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Strict typed comparison.
    ///
    /// NULL compares equal to NULL and strictly less than any non-null
    /// value. Non-null values must share a type (modulo INTEGER/TIMESTAMP
    /// unification); otherwise the comparison fails.
    pub fn compare(&self, other: &TypedValue) -> SqlResult<Ordering> {
        match (self, other) {
            (Self::Null(_), Self::Null(_)) => Ok(Ordering::Equal),
            (Self::Null(t), v) | (v, Self::Null(t)) => {
                if *t != SqlType::Any && !v.sql_type().satisfies(*t) {
                    return Err(SqlError::NotComparableValues);
                }
                if self.is_null() {
                    Ok(Ordering::Less)
                } else {
                    Ok(Ordering::Greater)
                }
            }
            (Self::Integer(a), Self::Integer(b)) => Ok(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Ok(a.cmp(b)),
            (Self::Varchar(a), Self::Varchar(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
            (Self::Blob(a), Self::Blob(b)) => Ok(a.cmp(b)),
            _ => Err(SqlError::NotComparableValues),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(_) => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Varchar(s) => write!(f, "'{s}'"),
            Self::Blob(b) => {
                write!(f, "x'")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, "'")
            }
        }
    }
}

impl From<i64> for TypedValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        Self::Varchar(v.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(v: String) -> Self {
        Self::Varchar(v)
    }
}

impl From<Vec<u8>> for TypedValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_satisfies() {
        assert!(SqlType::Integer.satisfies(SqlType::Integer));
        assert!(SqlType::Integer.satisfies(SqlType::Timestamp));
        assert!(SqlType::Timestamp.satisfies(SqlType::Integer));
        assert!(!SqlType::Varchar.satisfies(SqlType::Integer));
    }

    #[test]
    fn test_type_parse_roundtrip() {
        for t in [
            SqlType::Integer,
            SqlType::Boolean,
            SqlType::Varchar,
            SqlType::Blob,
            SqlType::Timestamp,
        ] {
            assert_eq!(SqlType::parse(t.as_str()).unwrap(), t);
        }
        // STRING is accepted as an alias in DDL.
        assert_eq!(SqlType::parse("STRING").unwrap(), SqlType::Varchar);
        assert!(SqlType::parse("FLOAT").is_err());
    }

    #[test]
    fn test_compare_same_type() {
        assert_eq!(
            TypedValue::Integer(1).compare(&TypedValue::Integer(2)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            TypedValue::Varchar("b".into())
                .compare(&TypedValue::Varchar("a".into()))
                .unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_null() {
        let null = TypedValue::Null(SqlType::Any);
        assert_eq!(null.compare(&null).unwrap(), Ordering::Equal);
        assert_eq!(
            null.compare(&TypedValue::Integer(0)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            TypedValue::Integer(0).compare(&null).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_cross_type_fails() {
        let err = TypedValue::Integer(1).compare(&TypedValue::Varchar("1".into()));
        assert!(matches!(err, Err(SqlError::NotComparableValues)));

        let typed_null = TypedValue::Null(SqlType::Varchar);
        assert!(typed_null.compare(&TypedValue::Integer(1)).is_err());
    }
}
