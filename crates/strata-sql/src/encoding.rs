//! Bit-exact value encodings.
//!
//! Two encodings are defined, both deterministic and host-endianness
//! independent:
//!
//! - [`encode_as_key`] produces *key fragments* whose lexicographic byte
//!   order matches the logical order of the values within a type. Integers
//!   are 8 bytes big-endian with the sign bit flipped so negatives sort
//!   before positives; VARCHAR/BLOB are right-padded with `0x00` to the
//!   column's max length and carry a 4-byte big-endian length suffix, which
//!   keeps prefix-insensitive ordering while allowing exact-length recovery.
//! - [`encode_value`] produces the self-delimiting *payload* form used
//!   inside row values: a 4-byte big-endian length prefix followed by the
//!   raw bytes.
//!
//! Catalog and index keys embed 4-byte big-endian ids ([`encode_id`]).

use crate::error::{SqlError, SqlResult};
use crate::value::{SqlType, TypedValue};

/// Width of an encoded id.
pub const ENC_ID_LEN: usize = 4;

/// Width of an encoded length prefix or suffix.
pub const ENC_LEN_LEN: usize = 4;

/// Maximum size of a single encoded key fragment.
pub const MAX_KEY_LEN: usize = 256;

/// Encodes a catalog id as 4 bytes big-endian.
#[inline]
#[must_use]
pub fn encode_id(id: u32) -> [u8; ENC_ID_LEN] {
    id.to_be_bytes()
}

/// Decodes a catalog id from the first 4 bytes of `b`.
pub fn decode_id(b: &[u8]) -> SqlResult<u32> {
    let arr: [u8; ENC_ID_LEN] = b
        .get(..ENC_ID_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or(SqlError::InvalidValue)?;
    Ok(u32::from_be_bytes(arr))
}

/// Builds a store key from an ASCII prefix and encoded fragments.
#[must_use]
pub fn map_key(prefix: &str, fragments: &[&[u8]]) -> Vec<u8> {
    let total = prefix.len() + fragments.iter().map(|f| f.len()).sum::<usize>();
    let mut key = Vec::with_capacity(total);
    key.extend_from_slice(prefix.as_bytes());
    for f in fragments {
        key.extend_from_slice(f);
    }
    key
}

/// Encodes a value as an order-preserving key fragment.
///
/// `max_len` is the column's declared maximum length; it bounds and pads
/// variable-length fragments and is ignored for fixed-size types. Fails with
/// `MaxKeyLengthExceeded` when the fragment would exceed [`MAX_KEY_LEN`].
pub fn encode_as_key(value: &TypedValue, sql_type: SqlType, max_len: usize) -> SqlResult<Vec<u8>> {
    match (value, sql_type) {
        (TypedValue::Integer(v), SqlType::Integer | SqlType::Timestamp) => {
            let flipped = (*v as u64) ^ (1 << 63);
            Ok(flipped.to_be_bytes().to_vec())
        }
        (TypedValue::Boolean(v), SqlType::Boolean) => Ok(vec![u8::from(*v)]),
        (TypedValue::Varchar(s), SqlType::Varchar) => encode_padded(s.as_bytes(), max_len),
        (TypedValue::Blob(b), SqlType::Blob) => encode_padded(b, max_len),
        _ => Err(SqlError::InvalidValue),
    }
}

fn encode_padded(raw: &[u8], max_len: usize) -> SqlResult<Vec<u8>> {
    if raw.len() > max_len {
        return Err(SqlError::MaxKeyLengthExceeded);
    }
    if max_len + ENC_LEN_LEN > MAX_KEY_LEN {
        return Err(SqlError::MaxKeyLengthExceeded);
    }

    let mut out = vec![0u8; max_len + ENC_LEN_LEN];
    out[..raw.len()].copy_from_slice(raw);
    out[max_len..].copy_from_slice(&(raw.len() as u32).to_be_bytes());
    Ok(out)
}

/// Encodes a value in the self-delimiting payload form.
///
/// `max_len` bounds variable-length values when non-zero; oversized values
/// fail with `InvalidValue`.
pub fn encode_value(value: &TypedValue, sql_type: SqlType, max_len: usize) -> SqlResult<Vec<u8>> {
    match (value, sql_type) {
        (TypedValue::Integer(v), SqlType::Integer | SqlType::Timestamp) => {
            let mut out = Vec::with_capacity(ENC_LEN_LEN + 8);
            out.extend_from_slice(&8u32.to_be_bytes());
            out.extend_from_slice(&v.to_be_bytes());
            Ok(out)
        }
        (TypedValue::Boolean(v), SqlType::Boolean) => {
            let mut out = Vec::with_capacity(ENC_LEN_LEN + 1);
            out.extend_from_slice(&1u32.to_be_bytes());
            out.push(u8::from(*v));
            Ok(out)
        }
        (TypedValue::Varchar(s), SqlType::Varchar) => encode_raw(s.as_bytes(), max_len),
        (TypedValue::Blob(b), SqlType::Blob) => encode_raw(b, max_len),
        _ => Err(SqlError::InvalidValue),
    }
}

fn encode_raw(raw: &[u8], max_len: usize) -> SqlResult<Vec<u8>> {
    if max_len > 0 && raw.len() > max_len {
        return Err(SqlError::InvalidValue);
    }

    let mut out = Vec::with_capacity(ENC_LEN_LEN + raw.len());
    out.extend_from_slice(&(raw.len() as u32).to_be_bytes());
    out.extend_from_slice(raw);
    Ok(out)
}

/// Decodes one payload-form value of the given type from the front of `b`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_value(b: &[u8], sql_type: SqlType) -> SqlResult<(TypedValue, usize)> {
    let len = decode_id(b)? as usize;
    let data = b
        .get(ENC_LEN_LEN..ENC_LEN_LEN + len)
        .ok_or(SqlError::InvalidValue)?;
    let consumed = ENC_LEN_LEN + len;

    let value = match sql_type {
        SqlType::Integer | SqlType::Timestamp => {
            if len != 8 {
                return Err(SqlError::InvalidValue);
            }
            let arr: [u8; 8] = data.try_into().map_err(|_| SqlError::InvalidValue)?;
            TypedValue::Integer(i64::from_be_bytes(arr))
        }
        SqlType::Boolean => {
            if len != 1 {
                return Err(SqlError::InvalidValue);
            }
            TypedValue::Boolean(data[0] != 0)
        }
        SqlType::Varchar => TypedValue::Varchar(
            String::from_utf8(data.to_vec()).map_err(|_| SqlError::InvalidValue)?,
        ),
        SqlType::Blob => TypedValue::Blob(data.to_vec()),
        SqlType::Any => return Err(SqlError::InvalidValue),
    };

    Ok((value, consumed))
}

/// Decodes an order-preserving key fragment back into a value.
///
/// `b` must hold exactly one fragment for the given type and max length;
/// the returned usize is the number of bytes consumed.
pub fn decode_key_fragment(
    b: &[u8],
    sql_type: SqlType,
    max_len: usize,
) -> SqlResult<(TypedValue, usize)> {
    match sql_type {
        SqlType::Integer | SqlType::Timestamp => {
            let arr: [u8; 8] = b
                .get(..8)
                .and_then(|s| s.try_into().ok())
                .ok_or(SqlError::InvalidValue)?;
            let v = (u64::from_be_bytes(arr) ^ (1 << 63)) as i64;
            Ok((TypedValue::Integer(v), 8))
        }
        SqlType::Boolean => {
            let byte = b.first().ok_or(SqlError::InvalidValue)?;
            Ok((TypedValue::Boolean(*byte != 0), 1))
        }
        SqlType::Varchar | SqlType::Blob => {
            let fragment = b
                .get(..max_len + ENC_LEN_LEN)
                .ok_or(SqlError::InvalidValue)?;
            let len = decode_id(&fragment[max_len..])? as usize;
            if len > max_len {
                return Err(SqlError::InvalidValue);
            }
            let raw = fragment[..len].to_vec();
            let value = if sql_type == SqlType::Varchar {
                TypedValue::Varchar(String::from_utf8(raw).map_err(|_| SqlError::InvalidValue)?)
            } else {
                TypedValue::Blob(raw)
            };
            Ok((value, max_len + ENC_LEN_LEN))
        }
        SqlType::Any => Err(SqlError::InvalidValue),
    }
}

/// Canonical selector key used inside row maps: `agg(db.table.col)`.
#[must_use]
pub fn encode_selector(agg_fn: &str, db: &str, table: &str, col: &str) -> String {
    format!("{agg_fn}({db}.{table}.{col})")
}
